//! Streaming chat endpoint.
//!
//! Flow: Client POST → load session → record user turn → stream model deltas
//! back as SSE → record assistant turn → back up. The backup runs whether the
//! stream completes, the model errors out, or the client goes away mid-stream.

use axum::{
    extract::State,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    http::StatusCode,
    Json,
};
use futures_util::StreamExt;
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::coordinator::SessionMemoryCoordinator;
use crate::memory::Record;
use crate::metrics;
use crate::shared_state::{AppState, AtomicCounters};

/// Request body matching what the frontend sends
#[derive(Debug, Deserialize)]
pub struct StreamChatRequest {
    pub owner_id: String,
    /// Omitted for a brand-new conversation; the server mints one and echoes
    /// it in the terminal `end` event.
    pub session_id: Option<String>,
    pub message: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// Flushes the session once the response stream is finished with, however it
/// finishes. Dropping the stream on client disconnect takes the same path as
/// normal completion, which is what makes the backup trigger reliable.
struct FlushGuard {
    coordinator: Arc<SessionMemoryCoordinator>,
    counters: Arc<AtomicCounters>,
    owner_id: String,
    session_id: String,
    trigger: &'static str,
}

impl FlushGuard {
    fn new(state: &AppState, owner_id: &str, session_id: &str) -> Self {
        metrics::inc_streams();
        Self {
            coordinator: state.coordinator.clone(),
            counters: state.counters.clone(),
            owner_id: owner_id.to_string(),
            session_id: session_id.to_string(),
            trigger: "disconnect",
        }
    }
}

impl Drop for FlushGuard {
    fn drop(&mut self) {
        metrics::dec_streams();
        match self.coordinator.backup_session(&self.owner_id, &self.session_id) {
            Ok(flushed) => {
                self.counters.add_flushed_records(flushed);
                metrics::observe_backup(self.trigger, flushed);
            }
            Err(e) => {
                warn!(
                    "Backup failed for session {} ({}): {}",
                    self.session_id, self.trigger, e
                );
            }
        }
    }
}

/// POST /chat/stream — Main streaming chat endpoint
///
/// 1. Hydrates the session working set from durable history
/// 2. Records the user turn in the fast store
/// 3. Streams the model response back via SSE
/// 4. Records the assistant turn and backs the session up after completion
pub async fn chat_stream(
    State(state): State<AppState>,
    Json(req): Json<StreamChatRequest>,
) -> Response {
    let request_num = state.counters.inc_total_requests();
    let session_id = req.session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    info!(
        "Stream request #{} for owner {} session {}",
        request_num, req.owner_id, session_id
    );

    if req.owner_id.is_empty() || req.message.is_empty() {
        metrics::inc_request("/chat/stream", "400");
        return (StatusCode::BAD_REQUEST, "owner_id and message are required").into_response();
    }
    let owner_id = req.owner_id;

    if let Err(e) = state.coordinator.load_session(&owner_id, &session_id) {
        error!("Failed to load session {}: {}", session_id, e);
        metrics::inc_request("/chat/stream", "500");
        return (StatusCode::INTERNAL_SERVER_ERROR, format!("Storage error: {}", e)).into_response();
    }

    if let Err(e) = state
        .coordinator
        .record_message(&owner_id, &session_id, Record::user(req.message))
    {
        error!("Failed to record user turn for session {}: {}", session_id, e);
        metrics::inc_request("/chat/stream", "500");
        return (StatusCode::INTERNAL_SERVER_ERROR, format!("Storage error: {}", e)).into_response();
    }
    state.counters.inc_recorded_messages();

    let prompt = match state.fast.fetch_all(&session_id) {
        Ok(prompt) => prompt,
        Err(e) => {
            error!("Failed to read working set for session {}: {}", session_id, e);
            metrics::inc_request("/chat/stream", "500");
            return (StatusCode::INTERNAL_SERVER_ERROR, format!("Storage error: {}", e)).into_response();
        }
    };

    let max_tokens = req.max_tokens.unwrap_or(state.config.llm_max_tokens);
    let temperature = req.temperature.unwrap_or(state.config.llm_temperature);

    match state.llm_worker.stream_chat(prompt, max_tokens, temperature).await {
        Ok(llm_stream) => {
            metrics::inc_request("/chat/stream", "200");
            let coordinator = state.coordinator.clone();
            let counters = state.counters.clone();
            let mut guard = FlushGuard::new(&state, &owner_id, &session_id);

            let output_stream = async_stream::stream! {
                let mut full_response = String::new();

                futures_util::pin_mut!(llm_stream);

                while let Some(item) = llm_stream.next().await {
                    match item {
                        Ok(delta) => {
                            full_response.push_str(&delta);
                            yield Ok::<_, Infallible>(Event::default().data(delta));
                        }
                        Err(e) => {
                            error!("Stream error for session {}: {}", guard.session_id, e);
                            guard.trigger = "error";
                            yield Ok(Event::default().event("error").data(e.to_string()));
                            break;
                        }
                    }
                }

                // Record the assistant turn before the guard flushes so a
                // completed response makes it into the durable history. A
                // partial response cut off by a stream error is not a turn.
                if guard.trigger != "error" && !full_response.is_empty() {
                    match coordinator.record_message(
                        &guard.owner_id,
                        &guard.session_id,
                        Record::assistant(full_response),
                    ) {
                        Ok(()) => {
                            counters.inc_recorded_messages();
                        }
                        Err(e) => {
                            error!(
                                "Failed to record assistant turn for session {}: {}",
                                guard.session_id, e
                            );
                        }
                    }
                }

                if guard.trigger == "disconnect" {
                    guard.trigger = "complete";
                }
                yield Ok(Event::default().event("end").data(guard.session_id.clone()));
                // guard drops here and flushes the session to durable storage
            };

            Sse::new(output_stream)
                .keep_alive(KeepAlive::new().interval(std::time::Duration::from_secs(15)))
                .into_response()
        }
        Err(e) => {
            error!("Failed to start LLM stream: {}", e);
            // The user turn is already in the working set; keep it durable
            // even though no response will follow.
            match state.coordinator.backup_session(&owner_id, &session_id) {
                Ok(flushed) => metrics::observe_backup("error", flushed),
                Err(backup_err) => warn!(
                    "Backup failed for session {} after stream setup error: {}",
                    session_id, backup_err
                ),
            }
            metrics::inc_request("/chat/stream", "502");
            (StatusCode::BAD_GATEWAY, format!("LLM backend error: {}", e)).into_response()
        }
    }
}
