//! clipserve: CLIP-based visual search over HTTP.
//!
//! Ranks candidate images against a text query or a reference image. The
//! ranking core lives in [`search`]; [`service`] wires it to the CLIP
//! embedder and the image fetcher, and [`server`] exposes it with axum.

pub mod clip;
pub mod config;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod search;
pub mod server;
pub mod service;

pub use error::SearchError;
pub use search::{ScoredResult, SearchOutcome, TopK};
pub use service::SearchService;
