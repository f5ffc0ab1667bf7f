//! WebSocket command loop at `/ws`.
//!
//! Each text frame carries one JSON command `{"method": ...}`:
//!
//! | method    | reply                                       |
//! |-----------|---------------------------------------------|
//! | `"get"`   | `{"x": ..., "y": ...}` or the error sentinel |
//! | `"reset"` | `{}` after detaching the session log         |
//! | `"close"` | none; the server closes the socket           |
//!
//! The error sentinel is `{"x": <now>, "y": 0, "e": 1}`. Binary frames and
//! text that is not a command get an `{"error": ...}` reply.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::http::{AppState, DataReply};

/// A recognized command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WsCommand {
    Get,
    Reset,
    Close,
}

/// Why a frame was not a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsReject {
    /// Not a JSON object with a string `method`.
    InvalidRequest,
    UnknownMethod(String),
}

impl WsReject {
    /// Reply sent back for a rejected frame.
    pub fn reply(&self) -> Value {
        match self {
            WsReject::InvalidRequest => json!({ "error": "invalid request" }),
            WsReject::UnknownMethod(_) => json!({ "error": "unknown method" }),
        }
    }
}

#[derive(Deserialize)]
struct WsRequest {
    method: String,
}

/// Parse one text frame.
pub fn parse_command(text: &str) -> Result<WsCommand, WsReject> {
    let request: WsRequest = serde_json::from_str(text).map_err(|_| WsReject::InvalidRequest)?;

    match request.method.as_str() {
        "get" => Ok(WsCommand::Get),
        "reset" => Ok(WsCommand::Reset),
        "close" => Ok(WsCommand::Close),
        _ => Err(WsReject::UnknownMethod(request.method)),
    }
}

/// Reply sent when a `get` produced no sample.
pub fn error_sentinel() -> Value {
    let now = chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0;
    json!({ "x": now, "y": 0, "e": 1 })
}

/// Handler for the `/ws` upgrade.
pub(crate) async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| ws_session(socket, state))
}

enum Step {
    Reply(Value),
    Close,
}

async fn ws_session(mut socket: WebSocket, state: AppState) {
    let mut client = state.client();
    debug!("WebSocket session opened");

    loop {
        let message = tokio::select! {
            message = socket.recv() => message,
            _ = state.stopped() => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
        };

        let text = match message {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Binary(_))) => {
                let reply = WsReject::InvalidRequest.reply().to_string();
                if socket.send(Message::Text(reply)).await.is_err() {
                    break;
                }
                continue;
            }
            Some(Ok(Message::Close(_))) | None => break,
            // Ping and pong are answered by axum
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                debug!(error = %e, "WebSocket receive failed");
                break;
            }
        };

        let step = match parse_command(&text) {
            Ok(WsCommand::Get) => {
                let outcome = tokio::select! {
                    outcome = state.sample(&mut client) => outcome,
                    _ = state.stopped() => break,
                };
                match outcome {
                    Ok(sample) => Step::Reply(json!(DataReply::from(sample))),
                    Err(_) => Step::Reply(error_sentinel()),
                }
            }
            Ok(WsCommand::Reset) => {
                state.session_log().reset();
                Step::Reply(json!({}))
            }
            Ok(WsCommand::Close) => Step::Close,
            Err(reject) => {
                debug!(frame = %text, "Rejected WebSocket frame");
                Step::Reply(reject.reply())
            }
        };

        match step {
            Step::Reply(reply) => {
                if socket.send(Message::Text(reply.to_string())).await.is_err() {
                    break;
                }
            }
            Step::Close => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
        }
    }

    client.stop();
    debug!("WebSocket session closed");
}
