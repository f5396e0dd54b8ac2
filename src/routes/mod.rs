use axum::{
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::{
    clock::Clock,
    db::{redis::Cache, DocumentStore},
    middleware::{make_request_span, request_context_middleware},
    services::{EngineConfig, RecommendationEngine},
};

pub mod recommendations;

/// Shared state handed to every handler
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub clock: Arc<dyn Clock>,
    pub engine: RecommendationEngine,
    /// Trending cache; reads go straight to the store when absent
    pub cache: Option<Cache>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
        cache: Option<Cache>,
    ) -> Self {
        Self {
            engine: RecommendationEngine::new(Arc::clone(&store), Arc::clone(&clock), config),
            store,
            clock,
            cache,
        }
    }
}

/// Creates the application router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes())
        .layer(TraceLayer::new_for_http().make_span_with(make_request_span))
        .layer(axum::middleware::from_fn(request_context_middleware))
        .with_state(state)
}

/// API routes under /api/v1
fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/recommendations", get(recommendations::list))
        .route("/recommendations/generate", post(recommendations::generate))
        .route("/recommendations/refresh", post(recommendations::refresh))
        .route("/recommendations/stats", get(recommendations::stats))
        .route("/recommendations/trending", get(recommendations::trending))
        .route(
            "/recommendations/:id/interactions",
            post(recommendations::mark_interaction),
        )
        .route(
            "/recommendations/:id/feedback",
            post(recommendations::submit_feedback),
        )
}

/// Health check endpoint
async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}
