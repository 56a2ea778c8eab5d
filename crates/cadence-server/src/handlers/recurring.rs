//! Recurring pattern handlers: overview, analysis, suggestions, manual edits

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use serde::Deserialize;

use crate::{get_user_id, AppError, AppState, SuccessResponse};
use cadence_core::detect::DetectedPattern;
use cadence_core::models::{
    AnalysisOutcome, BatchActionSummary, IncomeSource, NewPattern, RecurringOverview,
    RecurringPattern, RecurringSuggestion, SuggestionAction, SuggestionStatus,
};

/// GET /api/recurring - Current recurring-item snapshot
///
/// Served from persisted state (confirmed patterns, cached analysis,
/// dismissals) refreshed against the live transaction window. Never calls
/// the AI backend.
pub async fn get_recurring(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<RecurringOverview>, AppError> {
    let user_id = get_user_id(&headers);
    let today = Utc::now().date_naive();

    let overview = state
        .engine
        .overview(&user_id, today)
        .map_err(AppError::from_core)?;

    Ok(Json(overview))
}

/// Query params for re-analysis
#[derive(Debug, Deserialize)]
pub struct AnalyzeQuery {
    /// Bypass the cached analysis and re-run even if fresh
    pub force: Option<bool>,
}

/// POST /api/recurring/analyze - Run (or reuse) the AI-assisted analysis
pub async fn analyze_recurring(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<AnalyzeQuery>,
) -> Result<Json<AnalysisOutcome>, AppError> {
    let user_id = get_user_id(&headers);
    let today = Utc::now().date_naive();
    let force = query.force.unwrap_or(false);

    let outcome = state
        .engine
        .reanalyze(&user_id, force, today)
        .await
        .map_err(AppError::from_core)?;

    Ok(Json(outcome))
}

/// Single-merchant analysis result
#[derive(serde::Serialize)]
pub struct MerchantAnalysis {
    pub recurring: bool,
    pub pattern: Option<DetectedPattern>,
}

/// GET /api/recurring/merchants/:merchant_key - Analyze one merchant's
/// transaction group with the stricter single-merchant thresholds
pub async fn analyze_merchant(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(merchant_key): Path<String>,
) -> Result<Json<MerchantAnalysis>, AppError> {
    let user_id = get_user_id(&headers);
    let today = Utc::now().date_naive();

    let pattern = state
        .engine
        .analyze_merchant(&user_id, &merchant_key, today)
        .map_err(AppError::from_core)?;

    Ok(Json(MerchantAnalysis {
        recurring: pattern.is_some(),
        pattern,
    }))
}

/// Query params for listing suggestions
#[derive(Debug, Deserialize)]
pub struct ListSuggestionsQuery {
    /// Filter by lifecycle state (pending, confirmed, denied)
    pub status: Option<SuggestionStatus>,
}

/// GET /api/recurring/suggestions - List AI-proposed patterns
pub async fn list_suggestions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListSuggestionsQuery>,
) -> Result<Json<Vec<RecurringSuggestion>>, AppError> {
    let user_id = get_user_id(&headers);

    let suggestions = state.engine.db().list_suggestions(&user_id, query.status)?;

    Ok(Json(suggestions))
}

/// Request body for batch suggestion actions
#[derive(Debug, Deserialize)]
pub struct SuggestionActionRequest {
    pub ids: Vec<i64>,
    pub action: SuggestionAction,
}

/// POST /api/recurring/suggestions - Confirm or deny suggestions in bulk
///
/// Items are applied independently; failures are reported in the summary
/// rather than failing the whole batch.
pub async fn apply_suggestion_actions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<SuggestionActionRequest>,
) -> Result<Json<BatchActionSummary>, AppError> {
    let user_id = get_user_id(&headers);
    let today = Utc::now().date_naive();

    if body.ids.is_empty() {
        return Err(AppError::bad_request("ids must not be empty"));
    }

    let summary = state
        .engine
        .apply_suggestions(&user_id, &body.ids, body.action, today)
        .map_err(AppError::from_core)?;

    Ok(Json(summary))
}

/// POST /api/recurring/patterns - Add a manual pattern
pub async fn create_pattern(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(pattern): Json<NewPattern>,
) -> Result<Json<RecurringPattern>, AppError> {
    let user_id = get_user_id(&headers);

    let stored = state
        .engine
        .add_pattern(&user_id, pattern)
        .map_err(AppError::from_core)?;

    Ok(Json(stored))
}

/// PUT /api/recurring/patterns/:merchant_key - Edit an existing pattern
pub async fn update_pattern(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(merchant_key): Path<String>,
    Json(pattern): Json<NewPattern>,
) -> Result<Json<RecurringPattern>, AppError> {
    let user_id = get_user_id(&headers);

    let stored = state
        .engine
        .edit_pattern(&user_id, &merchant_key, pattern)
        .map_err(AppError::from_core)?;

    Ok(Json(stored))
}

/// DELETE /api/recurring/patterns/:merchant_key - Remove a pattern
pub async fn remove_pattern(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(merchant_key): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    let user_id = get_user_id(&headers);

    state
        .engine
        .delete_pattern(&user_id, &merchant_key)
        .map_err(AppError::from_core)?;

    Ok(Json(SuccessResponse { success: true }))
}

/// GET /api/income-sources - List detected/confirmed income sources
pub async fn list_income_sources(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<IncomeSource>>, AppError> {
    let user_id = get_user_id(&headers);

    let sources = state.engine.db().list_income_sources(&user_id)?;

    Ok(Json(sources))
}

/// DELETE /api/income-sources/:merchant_key - Remove an income source
pub async fn remove_income_source(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(merchant_key): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    let user_id = get_user_id(&headers);

    if !state
        .engine
        .db()
        .delete_income_source(&user_id, &merchant_key)?
    {
        return Err(AppError::not_found(&format!(
            "income source {}",
            merchant_key
        )));
    }
    state.engine.db().invalidate_analysis_cache(&user_id)?;

    Ok(Json(SuccessResponse { success: true }))
}
