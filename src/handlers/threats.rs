//! Threat analysis handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

use crate::models::{ThreatFilter, ThreatPage, ThreatRecord, ThreatStats, UpdateThreatStatus};
use crate::orchestrator::{self, AnalyzeRequest, BatchItemOutcome};
use crate::{AppResult, AppState};

/// Analyze a single observable
pub async fn analyze(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> AppResult<Json<ThreatRecord>> {
    let record = orchestrator::analyze(&state, request).await?;
    Ok(Json(record))
}

/// Analyze up to 100 observables concurrently with per-item outcomes
pub async fn analyze_batch(
    State(state): State<AppState>,
    Json(requests): Json<Vec<AnalyzeRequest>>,
) -> AppResult<Json<Vec<BatchItemOutcome>>> {
    let outcomes = orchestrator::analyze_batch(&state, requests).await?;
    Ok(Json(outcomes))
}

/// Get single threat record (cache-first)
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ThreatRecord>> {
    let record = orchestrator::get_by_id(&state, id).await?;
    Ok(Json(record))
}

/// List threat records with conjunctive filters and pagination
pub async fn list(
    State(state): State<AppState>,
    Query(filter): Query<ThreatFilter>,
) -> AppResult<Json<ThreatPage>> {
    let page = ThreatRecord::list(&state.pool, filter).await?;
    Ok(Json(page))
}

/// Update threat status, invalidating the cached entry
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(update): Json<UpdateThreatStatus>,
) -> AppResult<Json<ThreatRecord>> {
    let record = orchestrator::set_status(&state, id, update).await?;
    Ok(Json(record))
}

/// Aggregate statistics
pub async fn stats(State(state): State<AppState>) -> AppResult<Json<ThreatStats>> {
    let stats = ThreatStats::compute(&state.pool).await?;
    Ok(Json(stats))
}
