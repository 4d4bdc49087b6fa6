//! Search operations exposed over HTTP.
//!
//! `SearchService` ties an [`Embedder`] and an [`ImageFetcher`] to the
//! ranking core. All methods are blocking: they call into ONNX Runtime and
//! fetch candidate images, so async callers should run them on a blocking
//! thread.

use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::clip::{AccelerationInfo, Embedder};
use crate::error::{Result, SearchError};
use crate::fetch::ImageFetcher;
use crate::search::{self, CandidateError, EmbedOutcome, SearchOutcome, TopK, Vector};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub device: String,
    pub model_loaded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInfo {
    pub model_name: String,
    pub device: String,
    pub available_devices: AccelerationInfo,
}

pub struct SearchService {
    embedder: Arc<dyn Embedder>,
    fetcher: Arc<dyn ImageFetcher>,
    default_top_k: usize,
    acceleration: AccelerationInfo,
}

impl SearchService {
    pub fn new(embedder: Arc<dyn Embedder>, fetcher: Arc<dyn ImageFetcher>, default_top_k: usize) -> Self {
        Self {
            embedder,
            fetcher,
            default_top_k,
            acceleration: AccelerationInfo::detect(),
        }
    }

    /// Override the detected acceleration info
    pub fn with_acceleration(mut self, acceleration: AccelerationInfo) -> Self {
        self.acceleration = acceleration;
        self
    }

    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            status: "healthy",
            device: self.embedder.device().to_string(),
            model_loaded: self.embedder.is_ready(),
        }
    }

    pub fn describe_model(&self) -> Result<ModelInfo> {
        self.ensure_ready()?;

        Ok(ModelInfo {
            model_name: self.embedder.model_name().to_string(),
            device: self.embedder.device().to_string(),
            available_devices: self.acceleration,
        })
    }

    /// Rank candidate images against a text query. `top_k` defaults to the
    /// configured value when missing or non-positive.
    pub fn text_to_image_search(
        &self,
        query: &str,
        candidate_urls: &[String],
        top_k: Option<i64>,
    ) -> Result<SearchOutcome> {
        self.ensure_ready()?;

        if query.trim().is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let started = Instant::now();
        let query_vector = self
            .embedder
            .embed_text(query)
            .map_err(SearchError::query_embedding)?;

        let k = TopK::from_request(top_k, self.default_top_k);
        let outcome = self.rank_candidates(&query_vector, candidate_urls, k);

        info!(
            query = %query,
            candidates = candidate_urls.len(),
            processed = outcome.total_processed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Visual search complete"
        );
        Ok(outcome)
    }

    /// Rank candidate images against a query image. Without `top_k` every
    /// successfully processed candidate is returned.
    pub fn image_to_image_search(
        &self,
        query_image: &[u8],
        candidate_urls: &[String],
        top_k: Option<i64>,
    ) -> Result<SearchOutcome> {
        self.ensure_ready()?;

        if candidate_urls.is_empty() {
            return Err(SearchError::NoCandidates);
        }
        if query_image.is_empty() {
            return Err(SearchError::invalid_request("query image is empty"));
        }

        let started = Instant::now();
        let query_vector = self
            .embedder
            .embed_image(query_image)
            .map_err(SearchError::query_embedding)?;

        let k = match top_k {
            None => TopK::All,
            Some(_) => TopK::from_request(top_k, self.default_top_k),
        };
        let outcome = self.rank_candidates(&query_vector, candidate_urls, k);

        info!(
            query_bytes = query_image.len(),
            candidates = candidate_urls.len(),
            processed = outcome.total_processed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Image-to-image search complete"
        );
        Ok(outcome)
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.embedder.is_ready() {
            Ok(())
        } else {
            Err(SearchError::ModelNotLoaded)
        }
    }

    fn rank_candidates(&self, query: &Vector, candidate_urls: &[String], k: TopK) -> SearchOutcome {
        search::search(query, candidate_urls, k, |url| self.embed_candidate(url))
    }

    fn embed_candidate(&self, url: &str) -> EmbedOutcome {
        let bytes = self.fetcher.fetch(url)?;
        self.embedder.embed_image(&bytes).map_err(CandidateError::Embed)
    }
}
