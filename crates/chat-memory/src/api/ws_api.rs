//! WebSocket chat endpoint.
//!
//! Multi-turn loop over one socket: each incoming message runs a full
//! load/record/stream/record cycle, deltas go out as text frames, and a JSON
//! `end` event closes each turn. The session is backed up when the client
//! disconnects or a turn fails — the write-back flush points the coordinator
//! itself never schedules.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::memory::Record;
use crate::metrics;
use crate::shared_state::AppState;

#[derive(Debug, Deserialize)]
struct WsChatRequest {
    owner_id: String,
    session_id: Option<String>,
    message: String,
}

/// GET /chat/ws — upgrade to the chat socket
pub async fn chat_socket(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_chat_socket(socket, state))
}

async fn handle_chat_socket(mut socket: WebSocket, state: AppState) {
    metrics::inc_streams();
    let mut active_key: Option<(String, String)> = None;

    loop {
        let msg = match socket.recv().await {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                info!("WebSocket receive error: {}", e);
                break;
            }
            None => break,
        };

        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let req: WsChatRequest = match serde_json::from_str(&text) {
            Ok(req) => req,
            Err(e) => {
                let reply = json!({"error": format!("Invalid request: {}", e)}).to_string();
                if socket.send(Message::Text(reply)).await.is_err() {
                    break;
                }
                continue;
            }
        };

        if req.owner_id.is_empty() || req.message.is_empty() {
            let reply = json!({"error": "owner_id and message are required"}).to_string();
            if socket.send(Message::Text(reply)).await.is_err() {
                break;
            }
            continue;
        }

        state.counters.inc_total_requests();
        let session_id = req.session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let key = (req.owner_id, session_id);

        // Hydrate once per (owner, session) on this connection; later turns
        // reuse the live working set instead of re-appending durable history.
        let needs_load = active_key.as_ref() != Some(&key);
        if needs_load {
            // switching sessions ends the previous one's lifecycle
            if let Some((prev_owner, prev_session)) = active_key.take() {
                best_effort_backup(&state, &prev_owner, &prev_session, "complete");
            }
        }

        match run_chat_turn(&mut socket, &state, &key.0, &key.1, &req.message, needs_load).await {
            Ok(()) => {
                active_key = Some(key);
            }
            Err(e) => {
                error!("Chat turn failed for session {}: {}", key.1, e);
                best_effort_backup(&state, &key.0, &key.1, "error");
                let reply = json!({"error": e.to_string()}).to_string();
                let _ = socket.send(Message::Text(reply)).await;
                metrics::dec_streams();
                return;
            }
        }
    }

    // Client went away; flush whatever this connection accumulated.
    if let Some((owner_id, session_id)) = active_key {
        info!("Client disconnected: owner {} session {}", owner_id, session_id);
        best_effort_backup(&state, &owner_id, &session_id, "disconnect");
    }
    metrics::dec_streams();
}

async fn run_chat_turn(
    socket: &mut WebSocket,
    state: &AppState,
    owner_id: &str,
    session_id: &str,
    message: &str,
    needs_load: bool,
) -> anyhow::Result<()> {
    if needs_load {
        state.coordinator.load_session(owner_id, session_id)?;
    }

    state
        .coordinator
        .record_message(owner_id, session_id, Record::user(message.to_string()))?;
    state.counters.inc_recorded_messages();

    let prompt = state.fast.fetch_all(session_id)?;
    let llm_stream = state
        .llm_worker
        .stream_chat(prompt, state.config.llm_max_tokens, state.config.llm_temperature)
        .await?;

    futures_util::pin_mut!(llm_stream);
    let mut full_response = String::new();
    while let Some(delta) = llm_stream.next().await {
        let delta = delta?;
        full_response.push_str(&delta);
        socket
            .send(Message::Text(delta))
            .await
            .map_err(|e| anyhow::anyhow!("WebSocket send failed: {}", e))?;
    }

    state
        .coordinator
        .record_message(owner_id, session_id, Record::assistant(full_response.clone()))?;
    state.counters.inc_recorded_messages();

    let end_event = json!({
        "event": "end",
        "session_id": session_id,
        "message": full_response,
    })
    .to_string();
    socket
        .send(Message::Text(end_event))
        .await
        .map_err(|e| anyhow::anyhow!("WebSocket send failed: {}", e))?;

    Ok(())
}

fn best_effort_backup(state: &AppState, owner_id: &str, session_id: &str, trigger: &'static str) {
    match state.coordinator.backup_session(owner_id, session_id) {
        Ok(flushed) => {
            state.counters.add_flushed_records(flushed);
            metrics::observe_backup(trigger, flushed);
        }
        Err(e) => {
            warn!("Backup failed for session {} ({}): {}", session_id, trigger, e);
        }
    }
}
