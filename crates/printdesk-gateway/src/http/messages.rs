//! Message ingress endpoint: POST /v1/messages.
//!
//! Accepts a batch of already-extracted inbound messages, routes them, and
//! answers with the replies inline. Provider-specific webhook envelopes are
//! expected to be translated into this shape upstream.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use printdesk_channels::{BufferedChannel, InboundMessage};
use printdesk_core::{PrintdeskError, SenderId};

use crate::app::AppState;

#[derive(Debug, Deserialize)]
pub struct MessagesRequest {
    pub messages: Vec<InboundMessage>,
}

#[derive(Debug, Serialize)]
pub struct Reply {
    pub sender_id: SenderId,
    pub reply: String,
}

#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub replies: Vec<Reply>,
    pub skipped: usize,
}

/// POST /v1/messages
///
/// Returns 200 with one reply per well-formed message, 401 on auth failure.
pub async fn messages_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<MessagesRequest>,
) -> Result<Json<MessagesResponse>, (StatusCode, Json<Value>)> {
    if let Some(expected) = state.config.gateway.auth_token.as_deref() {
        verify_bearer_token(&headers, expected).map_err(|e| auth_error(&e))?;
    }

    info!(count = req.messages.len(), "inbound batch arrived");

    let channel = BufferedChannel::new("http");
    let report = state.dispatcher.dispatch(req.messages, &channel).await;

    let replies = channel
        .drain()
        .into_iter()
        .map(|m| Reply {
            sender_id: m.recipient_id,
            reply: m.content,
        })
        .collect();

    Ok(Json(MessagesResponse {
        replies,
        skipped: report.skipped,
    }))
}

/// Verify a static bearer token in the `Authorization: Bearer <token>` header.
fn verify_bearer_token(headers: &HeaderMap, expected: &str) -> Result<(), String> {
    let auth_header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| "missing Authorization header".to_string())?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| "Authorization header must use Bearer scheme".to_string())?;

    if token == expected {
        Ok(())
    } else {
        Err("bearer token mismatch".to_string())
    }
}

fn auth_error(reason: &str) -> (StatusCode, Json<Value>) {
    warn!(reason = %reason, "message ingress authentication failed");
    let err = PrintdeskError::AuthFailed(reason.to_string());
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": err.to_string(), "code": err.code()})),
    )
}
