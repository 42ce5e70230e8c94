use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::provider::{
    chat_messages, http_client, transport_error, BackendError, Completion, CompletionBackend,
    CompletionRequest,
};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// A local Ollama server's `/api/chat` endpoint.
pub struct OllamaBackend {
    client: reqwest::Client,
    base_url: String,
    model: Option<String>,
}

impl OllamaBackend {
    pub fn new(base_url: Option<String>) -> Result<Self, BackendError> {
        Ok(Self {
            client: http_client()?,
            base_url: base_url
                .as_deref()
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            model: None,
        })
    }

    /// Local model to run; cloud model names mean nothing to Ollama.
    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }
}

#[async_trait]
impl CompletionBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, req: &CompletionRequest) -> Result<Completion, BackendError> {
        let model = self.model.as_deref().unwrap_or(&req.model);
        debug!(model = %model, "requesting Ollama chat");

        let resp = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&request_body(req, model))
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %body, "Ollama rejected the request");
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: ChatBody = resp
            .json()
            .await
            .map_err(|e| BackendError::Malformed(e.to_string()))?;
        Ok(body.into())
    }
}

fn request_body(req: &CompletionRequest, model: &str) -> serde_json::Value {
    serde_json::json!({
        "model": model,
        "messages": chat_messages(req),
        "stream": false,
        "options": { "num_predict": req.max_tokens },
    })
}

#[derive(Deserialize)]
struct ChatBody {
    model: String,
    message: ChatMessage,
    prompt_eval_count: Option<u32>,
    eval_count: Option<u32>,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

impl From<ChatBody> for Completion {
    fn from(body: ChatBody) -> Self {
        Completion {
            text: body.message.content,
            model: body.model,
            tokens_in: body.prompt_eval_count.unwrap_or(0),
            tokens_out: body.eval_count.unwrap_or(0),
        }
    }
}
