use tracing::{info, warn};

use printdesk_agent::ollama::OllamaBackend;
use printdesk_agent::openai::OpenAiBackend;
use printdesk_agent::{BackendError, CompletionBackend, Upstream};
use printdesk_core::PrintdeskConfig;

/// Build the ordered upstream list for the generative fallback.
///
/// Priority order:
///   1. providers.openai
///   2. providers.openai_compat[*]  (in declaration order)
///   3. providers.ollama
///   4. OPENAI_API_KEY env var (only when nothing above is configured)
///
/// A backend whose HTTP client cannot be built is logged and left out.
pub fn build_upstreams(config: &PrintdeskConfig) -> Vec<Upstream> {
    let mut upstreams = Vec::new();
    let providers = &config.providers;

    if let Some(openai) = &providers.openai {
        push(
            &mut upstreams,
            OpenAiBackend::new(openai.api_key.clone(), Some(openai.base_url.clone())),
            1,
        );
    }

    for entry in &providers.openai_compat {
        let backend = OpenAiBackend::compatible(
            entry.id.clone(),
            entry.api_key.clone(),
            &entry.base_url,
            entry.chat_path.as_deref(),
        )
        .map(|b| b.with_model(entry.model.clone()));
        push(&mut upstreams, backend, 1);
    }

    if let Some(ollama) = &providers.ollama {
        let backend = OllamaBackend::new(Some(ollama.base_url.clone()))
            .map(|b| b.with_model(ollama.model.clone()));
        push(&mut upstreams, backend, 0);
    }

    if upstreams.is_empty() {
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            info!("using OPENAI_API_KEY from the environment");
            push(&mut upstreams, OpenAiBackend::new(key, None), 1);
        }
    }

    if upstreams.is_empty() {
        warn!("no completion backend configured, generative answers will be apologies");
    }
    upstreams
}

fn push<B>(upstreams: &mut Vec<Upstream>, backend: Result<B, BackendError>, retries: u32)
where
    B: CompletionBackend + 'static,
{
    match backend {
        Ok(backend) => {
            info!(slot = upstreams.len(), upstream = %backend.name(), retries, "completion upstream ready");
            upstreams.push(Upstream::new(Box::new(backend), retries));
        }
        Err(e) => warn!(err = %e, "skipping completion upstream"),
    }
}
