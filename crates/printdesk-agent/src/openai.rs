use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::provider::{
    chat_messages, http_client, transport_error, BackendError, Completion, CompletionBackend,
    CompletionRequest,
};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_CHAT_PATH: &str = "/v1/chat/completions";

/// Chat completions over the OpenAI wire format. Also serves every
/// OpenAI-compatible endpoint listed under `providers.openai_compat`.
pub struct OpenAiBackend {
    client: reqwest::Client,
    name: String,
    api_key: String,
    endpoint: String,
    model: Option<String>,
}

impl OpenAiBackend {
    pub fn new(api_key: String, base_url: Option<String>) -> Result<Self, BackendError> {
        let base_url = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self::compatible("openai".to_string(), api_key, &base_url, None)
    }

    /// A named OpenAI-compatible endpoint. `chat_path` defaults to
    /// `/v1/chat/completions`.
    pub fn compatible(
        name: String,
        api_key: String,
        base_url: &str,
        chat_path: Option<&str>,
    ) -> Result<Self, BackendError> {
        let endpoint = format!(
            "{}{}",
            base_url.trim_end_matches('/'),
            chat_path.unwrap_or(DEFAULT_CHAT_PATH)
        );
        Ok(Self {
            client: http_client()?,
            name,
            api_key,
            endpoint,
            model: None,
        })
    }

    /// Request `model` instead of the gateway-wide `fallback.model`.
    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, req: &CompletionRequest) -> Result<Completion, BackendError> {
        let model = self.model.as_deref().unwrap_or(&req.model);
        debug!(backend = %self.name, model = %model, "requesting chat completion");

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request_body(req, model))
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        if status.as_u16() == 429 {
            let retry_after_ms = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map_or(5000, |secs| secs * 1000);
            return Err(BackendError::RateLimited { retry_after_ms });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(backend = %self.name, status = status.as_u16(), body = %body, "completion rejected");
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: CompletionBody = resp
            .json()
            .await
            .map_err(|e| BackendError::Malformed(e.to_string()))?;
        body.into_completion()
    }
}

fn request_body(req: &CompletionRequest, model: &str) -> serde_json::Value {
    serde_json::json!({
        "model": model,
        "messages": chat_messages(req),
        "max_tokens": req.max_tokens,
        "stream": false,
    })
}

#[derive(Deserialize)]
struct CompletionBody {
    model: String,
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

impl CompletionBody {
    fn into_completion(self) -> Result<Completion, BackendError> {
        let text = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::Malformed("no choices".to_string()))?
            .message
            .content
            .unwrap_or_default();
        let (tokens_in, tokens_out) = self
            .usage
            .map_or((0, 0), |u| (u.prompt_tokens, u.completion_tokens));

        Ok(Completion {
            text,
            model: self.model,
            tokens_in,
            tokens_out,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "gpt-4o-mini".to_string(),
            system: "You are a support agent.".to_string(),
            user_text: "my printer is offline".to_string(),
            max_tokens: 256,
        }
    }

    #[test]
    fn system_instruction_precedes_the_customer_message() {
        let body = request_body(&request(), "gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "You are a support agent.");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "my printer is offline");
        assert_eq!(body["stream"], false);
        assert_eq!(body["max_tokens"], 256);
    }

    #[test]
    fn first_choice_becomes_the_completion() {
        let raw = r#"{
            "model": "gpt-4o-mini",
            "choices": [{"message": {"content": "Try power-cycling it."}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 5}
        }"#;
        let body: CompletionBody = serde_json::from_str(raw).unwrap();
        let completion = body.into_completion().unwrap();
        assert_eq!(completion.text, "Try power-cycling it.");
        assert_eq!(completion.tokens_in, 12);
        assert_eq!(completion.tokens_out, 5);
    }

    #[test]
    fn no_choices_is_malformed() {
        let body: CompletionBody =
            serde_json::from_str(r#"{"model": "gpt-4o-mini", "choices": []}"#).unwrap();
        assert!(matches!(body.into_completion(), Err(BackendError::Malformed(_))));
    }

    #[test]
    fn compatible_endpoint_joins_base_and_path() {
        let backend = OpenAiBackend::compatible(
            "groq".into(),
            "key".into(),
            "https://api.groq.com/openai/",
            None,
        )
        .unwrap();
        assert_eq!(backend.name(), "groq");
        assert_eq!(backend.endpoint(), "https://api.groq.com/openai/v1/chat/completions");

        let custom =
            OpenAiBackend::compatible("lab".into(), "k".into(), "http://lab:8080", Some("/chat"))
                .unwrap();
        assert_eq!(custom.endpoint(), "http://lab:8080/chat");
    }
}
