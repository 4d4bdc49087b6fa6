//! HTTP API built on axum.
//!
//! | Route | Operation |
//! |---|---|
//! | `GET /`, `GET /health` | health check |
//! | `POST /search/visual` | text-to-image search (JSON) |
//! | `POST /search/image-to-image` | image-to-image search (multipart) |
//! | `GET /model/info` | model introspection |

mod error;
mod routes;

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::service::SearchService;

pub use routes::{ImageSearchRequest, ImageSearchResponse, ImageToImageResponse};

type AppState = Arc<SearchService>;

/// Build the router with all routes and middleware layers
pub fn router(service: Arc<SearchService>, config: &ServerConfig) -> Router {
    let mut router = Router::new()
        .route("/", get(routes::health_check))
        .route("/health", get(routes::health_check))
        .route("/search/visual", post(routes::visual_search))
        .route("/search/image-to-image", post(routes::image_to_image_search))
        .route("/model/info", get(routes::model_info))
        .with_state(service)
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(TraceLayer::new_for_http());

    if config.cors_allow_any {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    router
}

/// Bind and serve until Ctrl-C or SIGTERM
pub async fn serve(config: &ServerConfig, service: Arc<SearchService>) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("Invalid address {}:{}", config.host, config.port))?;

    let app = router(service, config);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    tracing::info!("Serving on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
