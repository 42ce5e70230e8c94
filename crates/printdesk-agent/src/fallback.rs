//! Generative fallback gateway.
//!
//! Used when no rule yields a definitive answer, or when a rule asks for an
//! AI-composed one. Builds a system instruction grounded in what the session
//! knows about the sender and returns the model's answer verbatim.
//!
//! Upstreams are tried in priority order. The configured timeout is a budget
//! for the whole call: each upstream gets an equal share of what is left, so
//! one that hangs cannot starve the ones behind it. Every failure mode comes
//! back as a [`FallbackError`]; turning that into a user-facing apology is the
//! caller's decision.

use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use printdesk_core::config::FallbackConfig;
use printdesk_sessions::SenderSession;

use crate::provider::{BackendError, CompletionBackend, CompletionRequest};

#[derive(Debug, Error)]
pub enum FallbackError {
    #[error("no completion backend configured")]
    NotConfigured,

    #[error("completion timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("completion returned no text")]
    EmptyResponse,
}

/// A completion backend plus how many extra attempts it gets before the
/// gateway moves on.
pub struct Upstream {
    backend: Box<dyn CompletionBackend>,
    retries: u32,
}

impl Upstream {
    pub fn new(backend: Box<dyn CompletionBackend>, retries: u32) -> Self {
        Self { backend, retries }
    }

    pub fn name(&self) -> &str {
        self.backend.name()
    }
}

pub struct GenerativeFallback {
    upstreams: Vec<Upstream>,
    model: String,
    persona: String,
    max_tokens: u32,
    timeout: Duration,
}

impl GenerativeFallback {
    /// With no upstreams every call fails with [`FallbackError::NotConfigured`].
    pub fn new(upstreams: Vec<Upstream>, config: &FallbackConfig) -> Self {
        Self {
            upstreams,
            model: config.model.clone(),
            persona: config.persona.clone(),
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn upstream_names(&self) -> Vec<&str> {
        self.upstreams.iter().map(Upstream::name).collect()
    }

    /// System instruction: the assistant's role followed by whatever the
    /// session knows about the sender.
    pub fn system_context(&self, session: Option<&SenderSession>) -> String {
        let mut context = self.persona.clone();

        let model = session.and_then(|s| s.printer_model.as_deref());
        let software = session.and_then(|s| s.software_name.as_deref());
        if model.is_some() || software.is_some() {
            context.push_str("\n\nKnown facts about this customer:");
            if let Some(model) = model {
                context.push_str(&format!("\n- Printer model: {model}"));
            }
            if let Some(software) = software {
                context.push_str(&format!("\n- Label software: {software}"));
            }
        }
        context
    }

    /// Ask the upstreams for a free-form answer within the configured budget.
    pub async fn complete(
        &self,
        system_context: &str,
        user_text: &str,
    ) -> Result<String, FallbackError> {
        if self.upstreams.is_empty() {
            return Err(FallbackError::NotConfigured);
        }

        let req = CompletionRequest {
            model: self.model.clone(),
            system: system_context.to_string(),
            user_text: user_text.to_string(),
            max_tokens: self.max_tokens,
        };
        info!(model = %req.model, upstreams = self.upstreams.len(), "requesting generative fallback");

        let deadline = Instant::now() + self.timeout;
        let mut last_err = None;
        for (i, upstream) in self.upstreams.iter().enumerate() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let share = remaining / (self.upstreams.len() - i) as u32;

            match self.ask(upstream, &req, Instant::now() + share).await {
                Ok(answer) => return Ok(answer),
                Err(e) => {
                    warn!(upstream = %upstream.name(), err = %e, "upstream gave no answer");
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or(FallbackError::Timeout {
            ms: self.timeout.as_millis() as u64,
        }))
    }

    /// Attempts against one upstream, none running past `until`.
    async fn ask(
        &self,
        upstream: &Upstream,
        req: &CompletionRequest,
        until: Instant,
    ) -> Result<String, FallbackError> {
        let mut attempt = 0;
        loop {
            let left = until.saturating_duration_since(Instant::now());
            let err = match tokio::time::timeout(left, upstream.backend.complete(req)).await {
                Err(_) => {
                    return Err(FallbackError::Timeout {
                        ms: left.as_millis() as u64,
                    })
                }
                Ok(Ok(completion)) if completion.text.trim().is_empty() => {
                    return Err(FallbackError::EmptyResponse)
                }
                Ok(Ok(completion)) => {
                    debug!(
                        upstream = %upstream.name(),
                        model = %completion.model,
                        tokens_in = completion.tokens_in,
                        tokens_out = completion.tokens_out,
                        "generative fallback answered"
                    );
                    return Ok(completion.text);
                }
                Ok(Err(e)) => e,
            };

            if matches!(err, BackendError::RateLimited { .. }) || attempt >= upstream.retries {
                return Err(err.into());
            }
            attempt += 1;
            debug!(upstream = %upstream.name(), attempt, err = %err, "retrying upstream");

            let backoff = Duration::from_millis(200 * u64::from(attempt));
            tokio::time::sleep(backoff.min(until.saturating_duration_since(Instant::now()))).await;
        }
    }
}
