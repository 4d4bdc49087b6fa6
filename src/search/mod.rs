//! Ranked similarity search over a small, in-memory candidate set.
//!
//! Every candidate is embedded independently and may fail on its own. Failures
//! are dropped from the ranking; successes are scored against a fixed query
//! vector, stable-sorted by score and truncated to the requested top-k.

use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;

use crate::fetch::FetchError;

/// Unit-normalised embedding produced by the embedder.
pub type Vector = Vec<f32>;

/// Number of results returned when the caller does not ask for a specific k.
pub const DEFAULT_TOP_K: usize = 5;

/// Why a single candidate could not be scored.
#[derive(Debug, Error)]
pub enum CandidateError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("embedding failed: {0:#}")]
    Embed(anyhow::Error),

    #[error("dimension mismatch: query has {expected}, candidate has {got}")]
    Dimension { expected: usize, got: usize },

    #[error("similarity score is not finite")]
    NonFinite,
}

/// Per-candidate result of the fetch + embed step.
pub type EmbedOutcome = Result<Vector, CandidateError>;

/// How many ranked results to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopK {
    Limit(usize),
    All,
}

impl TopK {
    /// Interpret a caller-supplied k. Missing or non-positive values fall back
    /// to `default` (itself at least 1).
    pub fn from_request(k: Option<i64>, default: usize) -> Self {
        match k {
            Some(k) if k > 0 => TopK::Limit(usize::try_from(k).unwrap_or(usize::MAX)),
            _ => TopK::Limit(default.max(1)),
        }
    }

    fn truncate<T>(self, items: &mut Vec<T>) {
        if let TopK::Limit(k) = self {
            items.truncate(k);
        }
    }
}

impl Default for TopK {
    fn default() -> Self {
        TopK::Limit(DEFAULT_TOP_K)
    }
}

/// One successfully scored candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredResult {
    pub image_url: String,
    pub similarity_score: f32,
    /// Position of the candidate in the caller's input list.
    pub index: usize,
}

/// Ranked results for one request.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchOutcome {
    pub results: Vec<ScoredResult>,
    /// Candidates that were scored, before truncation to top-k.
    pub total_processed: usize,
}

/// Dot product of two vectors. Equals cosine similarity when both are
/// unit-normalised; nothing is re-normalised here.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Score a single embed outcome against the query.
fn score(query: &[f32], outcome: EmbedOutcome) -> Result<f32, CandidateError> {
    let vector = outcome?;
    if vector.len() != query.len() {
        return Err(CandidateError::Dimension {
            expected: query.len(),
            got: vector.len(),
        });
    }

    let similarity = dot(query, &vector);
    if similarity.is_finite() {
        Ok(similarity)
    } else {
        Err(CandidateError::NonFinite)
    }
}

/// Aggregate embed outcomes, given in input order, into a ranked outcome.
pub fn rank<I>(query: &[f32], outcomes: I, k: TopK) -> SearchOutcome
where
    I: IntoIterator<Item = (String, EmbedOutcome)>,
{
    let mut results = Vec::new();

    for (index, (image_url, outcome)) in outcomes.into_iter().enumerate() {
        match score(query, outcome) {
            Ok(similarity_score) => results.push(ScoredResult {
                image_url,
                similarity_score,
                index,
            }),
            Err(e) => {
                tracing::warn!(image_url = %image_url, index, error = %e, "Failed to process candidate image");
            }
        }
    }

    let total_processed = results.len();

    // sort_by is stable: equal scores keep input order
    results.sort_by(|a, b| {
        b.similarity_score
            .partial_cmp(&a.similarity_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    k.truncate(&mut results);

    SearchOutcome {
        results,
        total_processed,
    }
}

/// Embed every candidate in parallel and rank the successes against `query`.
///
/// `embed` is called once per candidate. Its outcomes are collected back into
/// input order before ranking, so the result is the same as a sequential run.
pub fn search<F>(query: &[f32], candidates: &[String], k: TopK, embed: F) -> SearchOutcome
where
    F: Fn(&str) -> EmbedOutcome + Sync,
{
    let outcomes: Vec<EmbedOutcome> = candidates.par_iter().map(|c| embed(c)).collect();

    rank(query, candidates.iter().cloned().zip(outcomes), k)
}
