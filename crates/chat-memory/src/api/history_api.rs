//! API endpoints for durable chat-history access

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Json,
};
use axum::http::StatusCode;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info};

use crate::memory_db::StoredRecord;
use crate::metrics;
use crate::shared_state::AppState;

/// Response for fetching a session's durable history
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub owner_id: String,
    pub session_id: String,
    pub records: Vec<StoredRecord>,
}

/// Fetch the full durable history for an owner/session pair
pub async fn get_history(
    State(state): State<AppState>,
    Path((owner_id, session_id)): Path<(String, String)>,
) -> Result<Json<HistoryResponse>, Response> {
    info!("Fetching history for owner {} session {}", owner_id, session_id);
    state.counters.inc_total_requests();

    match state.database.history.fetch_stored(&owner_id, &session_id) {
        Ok(records) => {
            metrics::inc_request("/history", "200");
            Ok(Json(HistoryResponse {
                owner_id,
                session_id,
                records,
            }))
        }
        Err(e) => {
            error!("Failed to fetch history: {}", e);
            metrics::inc_request("/history", "500");
            Err((StatusCode::INTERNAL_SERVER_ERROR, format!("Database error: {}", e)).into_response())
        }
    }
}

/// Delete a session's durable history permanently
pub async fn delete_history(
    State(state): State<AppState>,
    Path((owner_id, session_id)): Path<(String, String)>,
) -> Result<Json<Value>, Response> {
    info!("Deleting history for owner {} session {}", owner_id, session_id);
    state.counters.inc_total_requests();

    match state.database.history.delete_history(&owner_id, &session_id) {
        Ok(0) => {
            info!("No history found for owner {} session {}", owner_id, session_id);
            metrics::inc_request("/history", "404");
            Err((StatusCode::NOT_FOUND, format!("No history for session: {}", session_id)).into_response())
        }
        Ok(deleted) => {
            metrics::inc_request("/history", "200");
            Ok(Json(serde_json::json!({
                "success": true,
                "owner_id": owner_id,
                "session_id": session_id,
                "deleted": deleted,
            })))
        }
        Err(e) => {
            error!("Failed to delete history: {}", e);
            metrics::inc_request("/history", "500");
            Err((StatusCode::INTERNAL_SERVER_ERROR, format!("Database error: {}", e)).into_response())
        }
    }
}
