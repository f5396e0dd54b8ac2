use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    error::AppResult,
    middleware::{RequestId, Requester},
    models::{Feedback, InteractionType, Recommendation, RecommendationType, TargetEntity},
    routes::AppState,
    services::{
        interactions,
        retrieval::{self, ListQuery, Page, RecommendationStats, TrendingQuery},
    },
};

/// A recommendation as returned over HTTP, tagged with its type
#[derive(Debug, Serialize)]
pub struct RecommendationView {
    #[serde(rename = "type")]
    pub kind: RecommendationType,
    #[serde(flatten)]
    pub recommendation: Recommendation,
}

impl From<Recommendation> for RecommendationView {
    fn from(recommendation: Recommendation) -> Self {
        Self {
            kind: recommendation.kind(),
            recommendation,
        }
    }
}

fn views(recommendations: Vec<Recommendation>) -> Vec<RecommendationView> {
    recommendations.into_iter().map(RecommendationView::from).collect()
}

fn parse_kind(kind: Option<&str>) -> AppResult<Option<RecommendationType>> {
    kind.map(str::parse).transpose()
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub count: usize,
    pub recommendations: Vec<RecommendationView>,
}

/// Generates recommendations for the caller
pub async fn generate(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    requester: Requester,
) -> AppResult<Json<GenerateResponse>> {
    tracing::info!(
        request_id = %request_id,
        user_id = %requester.0,
        "Processing generation request"
    );

    let recommendations = state.engine.generate(requester.0).await?;

    Ok(Json(GenerateResponse {
        count: recommendations.len(),
        recommendations: views(recommendations),
    }))
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub generated: usize,
    pub recommendations: Vec<RecommendationView>,
}

/// Purges stale recommendations and regenerates for the caller
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    requester: Requester,
) -> AppResult<Json<RefreshResponse>> {
    tracing::info!(
        request_id = %request_id,
        user_id = %requester.0,
        "Processing refresh request"
    );

    let summary = state.engine.refresh(requester.0).await?;

    Ok(Json(RefreshResponse {
        generated: summary.generated,
        recommendations: views(summary.recommendations),
    }))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    requester: Requester,
    Query(params): Query<ListParams>,
) -> AppResult<Json<Page<RecommendationView>>> {
    let defaults = ListQuery::default();
    let query = ListQuery {
        kind: parse_kind(params.kind.as_deref())?,
        page: params.page.unwrap_or(defaults.page),
        limit: params.limit.unwrap_or(defaults.limit),
    };

    let page = retrieval::list_recommendations(
        state.store.as_ref(),
        state.clock.as_ref(),
        requester.0,
        query,
    )
    .await?;

    Ok(Json(page.map(RecommendationView::from)))
}

pub async fn stats(
    State(state): State<Arc<AppState>>,
    requester: Requester,
) -> AppResult<Json<RecommendationStats>> {
    let stats =
        retrieval::recommendation_stats(state.store.as_ref(), state.clock.as_ref(), requester.0)
            .await?;
    Ok(Json(stats))
}

#[derive(Debug, Deserialize)]
pub struct TrendingParams {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub limit: Option<i64>,
}

/// Public trending entities; no caller identity required
pub async fn trending(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TrendingParams>,
) -> AppResult<Json<Vec<TargetEntity>>> {
    let query = TrendingQuery {
        kind: parse_kind(params.kind.as_deref())?,
        limit: params.limit,
    };

    let entities = retrieval::trending(
        state.store.as_ref(),
        state.cache.as_ref(),
        state.clock.as_ref(),
        query,
    )
    .await?;

    Ok(Json(entities))
}

#[derive(Debug, Deserialize)]
pub struct InteractionRequest {
    #[serde(rename = "type")]
    pub kind: String,
}

pub async fn mark_interaction(
    State(state): State<Arc<AppState>>,
    requester: Requester,
    Path(id): Path<Uuid>,
    Json(request): Json<InteractionRequest>,
) -> AppResult<Json<RecommendationView>> {
    let interaction: InteractionType = request.kind.parse()?;

    let recommendation = interactions::mark_interaction(
        state.store.as_ref(),
        state.clock.as_ref(),
        requester.0,
        id,
        interaction,
    )
    .await?;

    Ok(Json(recommendation.into()))
}

pub async fn submit_feedback(
    State(state): State<Arc<AppState>>,
    requester: Requester,
    Path(id): Path<Uuid>,
    Json(feedback): Json<Feedback>,
) -> AppResult<Json<RecommendationView>> {
    let recommendation = interactions::submit_feedback(
        state.store.as_ref(),
        state.clock.as_ref(),
        requester.0,
        id,
        feedback,
    )
    .await?;

    Ok(Json(recommendation.into()))
}
