//! Presentation adapter: a thin HTTP layer over [`search_core::SearchService`].
//! Performs pagination plumbing and rendering only; all ranking decisions
//! live in the engine.

use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use search_core::{SearchError, SearchResponse, SearchService};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

#[derive(Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_page() -> usize {
    1
}

fn default_page_size() -> usize {
    10
}

#[derive(Serialize)]
pub struct SearchReply {
    pub query: String,
    pub took_s: f64,
    #[serde(flatten)]
    pub response: SearchResponse,
}

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SearchService>,
}

/// Build the router over an index artifact on disk.
pub fn build_app(index_dir: &str) -> Result<Router> {
    let generation = search_core::persist::load(index_dir)?;
    let handle = search_core::IndexHandle::with_generation(generation);
    let service = Arc::new(SearchService::new(
        handle,
        None,
        search_core::SearchConfig::default(),
    ));
    Ok(app_with_service(service))
}

/// Build the router over an already-constructed service. Used by tests
/// and by embedders that wire their own embedding provider.
pub fn app_with_service(service: Arc<SearchService>) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new()
                    .allow_origin(AllowOrigin::list(origins))
                    .allow_methods(Any)
                    .allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .with_state(AppState { service })
        .layer(cors)
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchReply>, (StatusCode, String)> {
    let start = std::time::Instant::now();
    let page_size = params.page_size.clamp(1, 100);
    match state.service.search(&params.q, params.page, page_size) {
        Ok(response) => Ok(Json(SearchReply {
            query: params.q,
            took_s: start.elapsed().as_secs_f64(),
            response,
        })),
        Err(SearchError::IndexUnavailable) => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            "no search index loaded".into(),
        )),
        Err(e) => {
            tracing::error!(error = %e, "search failed");
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}
