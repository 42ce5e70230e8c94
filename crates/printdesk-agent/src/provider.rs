use std::time::Duration;

use async_trait::async_trait;

/// TCP connect bound for every completion backend. The whole-request bound
/// is enforced per upstream by the fallback gateway.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// One completion: a grounded system instruction and the customer's message.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub system: String,
    pub user_text: String,
    pub max_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    /// Model that actually answered, as reported by the backend.
    pub model: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
}

/// An HTTP language-model endpoint that can answer a [`CompletionRequest`].
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, req: &CompletionRequest) -> Result<Completion, BackendError>;
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed completion: {0}")]
    Malformed(String),

    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("backend unreachable: {0}")]
    Unreachable(String),
}

/// HTTP client shared by the completion backends.
pub(crate) fn http_client() -> Result<reqwest::Client, BackendError> {
    Ok(reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()?)
}

/// Map a transport failure, keeping connect and timeout errors distinct so
/// the caller can move on to the next upstream.
pub(crate) fn transport_error(e: reqwest::Error) -> BackendError {
    if e.is_connect() || e.is_timeout() {
        BackendError::Unreachable(e.to_string())
    } else {
        BackendError::Http(e)
    }
}

/// System message followed by the single user turn, the shape both the
/// OpenAI and Ollama chat endpoints accept.
pub(crate) fn chat_messages(req: &CompletionRequest) -> serde_json::Value {
    serde_json::json!([
        { "role": "system", "content": req.system },
        { "role": "user", "content": req.user_text },
    ])
}
