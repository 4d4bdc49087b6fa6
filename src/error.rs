//! Request-level errors for the search service

use thiserror::Error;

/// Failures that abort a whole request. Per-candidate failures never reach
/// this type; they are dropped inside the ranking step.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Embedder has not finished initialising
    #[error("CLIP model not loaded")]
    ModelNotLoaded,

    #[error("No candidate URLs provided")]
    NoCandidates,

    #[error("Query text is empty")]
    EmptyQuery,

    /// Malformed request body or parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The query itself could not be embedded
    #[error("Failed to embed query: {0}")]
    QueryEmbedding(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SearchError {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn query_embedding(err: anyhow::Error) -> Self {
        Self::QueryEmbedding(format!("{:#}", err))
    }

    /// Whether the caller sent something wrong (as opposed to a server fault)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NoCandidates | Self::EmptyQuery | Self::InvalidRequest(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SearchError>;
