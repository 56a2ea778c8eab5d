//! Transaction ingest and listing handlers

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{get_user_id, AppError, AppState, MAX_INGEST_BATCH};
use cadence_core::models::{NewTransaction, Transaction};

/// Query params for listing transactions
#[derive(Debug, Deserialize)]
pub struct ListTransactionsQuery {
    /// Earliest date to include (default: one year back)
    pub since: Option<NaiveDate>,
}

/// GET /api/transactions - List a user's transactions, oldest first
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListTransactionsQuery>,
) -> Result<Json<Vec<Transaction>>, AppError> {
    let user_id = get_user_id(&headers);
    let since = query
        .since
        .unwrap_or_else(|| Utc::now().date_naive() - Duration::days(365));

    let txs = state.engine.db().list_transactions_since(&user_id, since)?;

    Ok(Json(txs))
}

/// Response for a transaction ingest
#[derive(Serialize)]
pub struct IngestResponse {
    pub imported: usize,
}

/// POST /api/transactions - Ingest a batch from the bank-sync feed
///
/// Inserting transactions invalidates the user's cached analysis.
pub async fn ingest_transactions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(txs): Json<Vec<NewTransaction>>,
) -> Result<Json<IngestResponse>, AppError> {
    let user_id = get_user_id(&headers);

    if txs.is_empty() {
        return Err(AppError::bad_request("transaction batch must not be empty"));
    }
    if txs.len() > MAX_INGEST_BATCH {
        return Err(AppError::bad_request("transaction batch too large"));
    }

    let imported = state
        .engine
        .ingest_transactions(&user_id, &txs)
        .map_err(AppError::from_core)?;

    Ok(Json(IngestResponse { imported }))
}
