use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::{JsonRejection, QueryRejection},
        Multipart, Query, State,
    },
    Json,
};
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::error::SearchError;
use crate::search::ScoredResult;
use crate::service::{HealthStatus, ModelInfo};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSearchRequest {
    pub query: String,
    pub image_urls: Vec<String>,
    #[serde(default)]
    pub top_k: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageSearchResponse {
    pub results: Vec<ScoredResult>,
    pub query: String,
    pub total_processed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageToImageResponse {
    pub results: Vec<ScoredResult>,
    pub total_processed: usize,
}

/// Run blocking service work (inference, downloads) off the async executor
async fn run_blocking<T, F>(f: F) -> Result<T, SearchError>
where
    F: FnOnce() -> Result<T, SearchError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SearchError::Internal(e.to_string()))?
}

pub async fn health_check(State(service): State<AppState>) -> Json<HealthStatus> {
    Json(service.health())
}

pub async fn model_info(State(service): State<AppState>) -> Result<Json<ModelInfo>, SearchError> {
    service.describe_model().map(Json)
}

/// Compare a text query with candidate images
pub async fn visual_search(
    State(service): State<AppState>,
    request: Result<Json<ImageSearchRequest>, JsonRejection>,
) -> Result<Json<ImageSearchResponse>, SearchError> {
    let Json(request) = request.map_err(|e| SearchError::invalid_request(e.body_text()))?;
    let ImageSearchRequest {
        query,
        image_urls,
        top_k,
    } = request;

    let (query, outcome) = run_blocking(move || {
        let outcome = service.text_to_image_search(&query, &image_urls, top_k)?;
        Ok((query, outcome))
    })
    .await?;

    Ok(Json(ImageSearchResponse {
        results: outcome.results,
        query,
        total_processed: outcome.total_processed,
    }))
}

/// Find candidates similar to an uploaded image.
///
/// The query image is the `query_image` multipart file. Candidates come from
/// `candidate_urls` multipart fields and/or repeated `candidate_urls` query
/// parameters. `top_k` may be given either way.
pub async fn image_to_image_search(
    State(service): State<AppState>,
    params: Result<Query<Vec<(String, String)>>, QueryRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ImageToImageResponse>, SearchError> {
    let Query(params) = params.map_err(|e| SearchError::invalid_request(e.body_text()))?;
    let mut multipart = multipart.map_err(|e| SearchError::invalid_request(e.body_text()))?;
    let mut query_image: Option<Vec<u8>> = None;
    let mut candidate_urls = Vec::new();
    let mut top_k = None;

    for (key, value) in &params {
        match key.as_str() {
            "candidate_urls" => candidate_urls.extend(split_urls(value)),
            "top_k" => top_k = Some(parse_top_k(value)?),
            _ => {}
        }
    }

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| SearchError::invalid_request(e.to_string()))?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("query_image") => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| SearchError::invalid_request(e.to_string()))?;
                query_image = Some(bytes.to_vec());
            }
            Some("candidate_urls") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| SearchError::invalid_request(e.to_string()))?;
                candidate_urls.extend(split_urls(&text));
            }
            Some("top_k") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| SearchError::invalid_request(e.to_string()))?;
                top_k = Some(parse_top_k(&text)?);
            }
            _ => {}
        }
    }

    let query_image =
        query_image.ok_or_else(|| SearchError::invalid_request("query_image file is required"))?;

    let outcome = run_blocking(move || {
        service.image_to_image_search(&query_image, &candidate_urls, top_k)
    })
    .await?;

    Ok(Json(ImageToImageResponse {
        results: outcome.results,
        total_processed: outcome.total_processed,
    }))
}

/// One locator per non-blank line
fn split_urls(text: &str) -> impl Iterator<Item = String> + '_ {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_owned)
}

fn parse_top_k(value: &str) -> Result<i64, SearchError> {
    value
        .trim()
        .parse()
        .map_err(|_| SearchError::invalid_request(format!("top_k must be an integer, got {:?}", value)))
}
