//! `SupportRouter`: the composition root that turns one message into one
//! reply.
//!
//! normalize -> extract model -> extract new software -> resolve -> execute.
//! Every failure past this point becomes the configured apology; callers
//! always get a reply string back.

use std::sync::Arc;

use tracing::{debug, error, info, instrument};

use printdesk_agent::GenerativeFallback;
use printdesk_core::config::RepliesConfig;
use printdesk_core::{PrintdeskConfig, SenderId};
use printdesk_sessions::{SenderSession, SessionStore};

use crate::error::Result;
use crate::extract::Vocabulary;
use crate::normalize::{normalize, Normalized};
use crate::resolver::Resolver;
use crate::rules::{render, ReplyDirective, RuleTable, SessionField};

pub struct SupportRouter {
    store: Arc<dyn SessionStore>,
    vocabulary: Arc<Vocabulary>,
    resolver: Resolver,
    fallback: GenerativeFallback,
    replies: RepliesConfig,
}

impl SupportRouter {
    pub fn new(
        store: Arc<dyn SessionStore>,
        vocabulary: Arc<Vocabulary>,
        rules: RuleTable,
        fallback: GenerativeFallback,
        replies: RepliesConfig,
    ) -> Self {
        let resolver = Resolver::new(vocabulary.clone(), rules, replies.greeting.clone());
        Self {
            store,
            vocabulary,
            resolver,
            fallback,
            replies,
        }
    }

    /// Compile vocabulary and rules from `config`. Fails on an invalid pattern.
    pub fn from_config(
        config: &PrintdeskConfig,
        store: Arc<dyn SessionStore>,
        fallback: GenerativeFallback,
    ) -> Result<Self> {
        let vocabulary = Arc::new(Vocabulary::compile(&config.vocabulary)?);
        let rules = RuleTable::compile(&config.intents, vocabulary.clone(), &config.replies)?;
        info!(
            rules = rules.len(),
            upstreams = ?fallback.upstream_names(),
            "support router ready"
        );
        Ok(Self::new(store, vocabulary, rules, fallback, config.replies.clone()))
    }

    pub fn replies(&self) -> &RepliesConfig {
        &self.replies
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Produce the reply for one text message.
    #[instrument(skip(self, text), fields(sender = %sender))]
    pub async fn route(&self, sender: &SenderId, text: &str) -> String {
        match self.try_route(sender, text).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(err = %e, "routing failed, replying with apology");
                self.replies.apology.clone()
            }
        }
    }

    async fn try_route(&self, sender: &SenderId, text: &str) -> Result<String> {
        let text = normalize(text);

        if let Some(model) = self.vocabulary.extract_model(&text.display) {
            let session = self.store.set_model(sender, model)?;
            info!(intent = "model_registered", model = %model, "printer model remembered");
            return Ok(render(&self.replies.model_ack, &session, None));
        }

        let session = self.store.get(sender)?;

        if let Some(software) = self.vocabulary.extract_software(&text.display) {
            let stored = session.as_ref().and_then(|s| s.software_name.as_deref());
            if stored != Some(software.name.as_str()) {
                let session = self.store.set_software(sender, &software.name)?;
                info!(intent = "software_registered", software = %software.name, "software remembered");
                return Ok(render(&self.replies.software_ack, &session, None));
            }
            debug!(software = %software.name, "software already known, classifying");
        }

        let decision = self.resolver.decide(session.as_ref(), &text);
        info!(intent = decision.intent, "message classified");

        Ok(self.execute(decision.directive, session.as_ref(), &text).await)
    }

    async fn execute(
        &self,
        directive: ReplyDirective,
        session: Option<&SenderSession>,
        text: &Normalized,
    ) -> String {
        match directive {
            ReplyDirective::CannedText(reply) => reply,
            ReplyDirective::GatePrompt(field) => self.gate_prompt(field).to_string(),
            ReplyDirective::DelegateToGenerative(task) => {
                let context = self.fallback.system_context(session);
                let prompt = if task == text.display {
                    task
                } else {
                    format!("{task}\n\nCustomer message: {}", text.display)
                };
                match self.fallback.complete(&context, &prompt).await {
                    Ok(answer) => answer,
                    Err(e) => {
                        error!(err = %e, "generative fallback failed");
                        self.replies.apology.clone()
                    }
                }
            }
        }
    }

    fn gate_prompt(&self, field: SessionField) -> &str {
        debug!(?field, "gating on missing session field");
        match field {
            SessionField::ModelOrSoftware => &self.replies.model_first_gate,
            SessionField::PrinterModel => &self.replies.need_model,
            SessionField::Software => &self.replies.need_software,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration;
    use printdesk_agent::{
        BackendError, Completion, CompletionBackend, CompletionRequest, Upstream,
    };
    use printdesk_core::config::FallbackConfig;
    use printdesk_core::ManualClock;
    use printdesk_sessions::MemorySessionStore;
    use std::sync::Mutex;

    /// Records every request and answers with a fixed text.
    struct Scripted {
        answer: String,
        seen: Arc<Mutex<Vec<CompletionRequest>>>,
    }

    #[async_trait]
    impl CompletionBackend for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }
        async fn complete(
            &self,
            req: &CompletionRequest,
        ) -> std::result::Result<Completion, BackendError> {
            self.seen.lock().unwrap().push(req.clone());
            Ok(Completion {
                text: self.answer.clone(),
                model: req.model.clone(),
                tokens_in: 0,
                tokens_out: 0,
            })
        }
    }

    fn router_with(upstreams: Vec<Upstream>) -> (Arc<ManualClock>, SupportRouter) {
        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(MemorySessionStore::new(clock.clone(), Duration::hours(48)));
        let fallback = GenerativeFallback::new(upstreams, &FallbackConfig::default());
        let router = SupportRouter::from_config(&PrintdeskConfig::default(), store, fallback).unwrap();
        (clock, router)
    }

    fn offline() -> (Arc<ManualClock>, SupportRouter) {
        router_with(Vec::new())
    }

    fn scripted(answer: &str) -> (Arc<Mutex<Vec<CompletionRequest>>>, Vec<Upstream>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let backend = Scripted {
            answer: answer.to_string(),
            seen: seen.clone(),
        };
        (seen, vec![Upstream::new(Box::new(backend), 0)])
    }

    #[tokio::test]
    async fn model_ack_names_the_exact_substring() {
        let (_, router) = offline();
        let a = SenderId::new("A");
        let reply = router.route(&a, "hi, my printer is a Zebra ZD421, driver please").await;
        assert_eq!(reply, "Thanks! Got it. You're using: Zebra ZD421. How can I assist you today?");

        let session = router.store().get(&a).unwrap().unwrap();
        assert_eq!(session.printer_model.as_deref(), Some("Zebra ZD421"));
    }

    #[tokio::test]
    async fn model_wins_over_software_in_one_message() {
        let (_, router) = offline();
        let a = SenderId::new("A");
        router.route(&a, "TSC TE200 with BarTender software").await;
        let session = router.store().get(&a).unwrap().unwrap();
        assert_eq!(session.printer_model.as_deref(), Some("TSC TE200"));
        assert!(session.software_name.is_none());
    }

    #[tokio::test]
    async fn software_is_acknowledged_and_stored_canonically() {
        let (_, router) = offline();
        let a = SenderId::new("A");
        let reply = router.route(&a, "I'm using bar tender").await;
        assert!(reply.contains("BarTender"));

        let reply = router.route(&a, "how do I install the software?").await;
        assert!(reply.contains("https://wa.me/p/25438061125807295/60102317781"));
    }

    #[tokio::test]
    async fn known_software_reaches_the_install_rule() {
        let (_, router) = offline();
        let a = SenderId::new("A");
        router.route(&a, "I use BarTender").await;

        let reply = router.route(&a, "how do I install bartender?").await;
        assert_eq!(
            reply,
            "Sure! You can follow this tutorial to install BarTender: https://wa.me/p/25438061125807295/60102317781"
        );

        let reply = router.route(&a, "we switched to NiceLabel").await;
        assert_eq!(reply, "Thanks! Got it. You're using NiceLabel. How can I assist you today?");
        let session = router.store().get(&a).unwrap().unwrap();
        assert_eq!(session.software_name.as_deref(), Some("NiceLabel"));
    }

    #[tokio::test]
    async fn fallback_is_grounded_in_the_session() {
        let (seen, upstreams) = scripted("Yes, it works on macOS with the CUPS driver.");
        let (_, router) = router_with(upstreams);
        let a = SenderId::new("A");
        router.route(&a, "TSC TTP-247").await;

        let reply = router.route(&a, "does it work on mac?").await;
        assert_eq!(reply, "Yes, it works on macOS with the CUPS driver.");

        let requests = seen.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].system.contains("- Printer model: TSC TTP-247"));
        assert_eq!(requests[0].user_text, "does it work on mac?");
    }

    #[tokio::test]
    async fn delegated_rule_carries_task_and_message() {
        let (seen, upstreams) = scripted("Download it from zebra.com.");
        let (_, router) = router_with(upstreams);
        let a = SenderId::new("A");
        router.route(&a, "Zebra ZD421").await;

        let reply = router.route(&a, "where is the driver").await;
        assert_eq!(reply, "Download it from zebra.com.");
        let prompt = seen.lock().unwrap()[0].user_text.clone();
        assert!(prompt.contains("Zebra ZD421"));
        assert!(prompt.ends_with("Customer message: where is the driver"));
    }

    #[tokio::test]
    async fn fallback_failure_becomes_apology() {
        let (_, router) = offline();
        let a = SenderId::new("A");
        router.route(&a, "TSC TE200").await;

        let reply = router.route(&a, "does it work on mac?").await;
        assert_eq!(reply, RepliesConfig::default().apology);
    }

    #[tokio::test]
    async fn expired_session_is_gated_again() {
        let (clock, router) = offline();
        let a = SenderId::new("A");
        router.route(&a, "TSC TTP-247").await;

        clock.advance(Duration::hours(48) + Duration::seconds(1));
        let reply = router.route(&a, "my labels keep jamming").await;
        assert_eq!(reply, RepliesConfig::default().model_first_gate);
    }
}
