use std::sync::Arc;

use printdesk_sessions::SenderSession;

use crate::extract::Vocabulary;
use crate::normalize::Normalized;
use crate::rules::{ReplyDirective, RuleTable, SessionField};

/// A resolved message: the directive plus the label it is logged under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub intent: &'static str,
    pub directive: ReplyDirective,
}

impl Decision {
    fn new(intent: &'static str, directive: ReplyDirective) -> Self {
        Self { intent, directive }
    }
}

/// Decides what to answer once entity extraction found nothing new.
pub struct Resolver {
    vocabulary: Arc<Vocabulary>,
    rules: RuleTable,
    greeting: String,
}

impl Resolver {
    pub fn new(vocabulary: Arc<Vocabulary>, rules: RuleTable, greeting: String) -> Self {
        Self {
            vocabulary,
            rules,
            greeting,
        }
    }

    /// Greeting, then the model-first gate, then the rule table, then the
    /// generative fallback with the message itself as the task.
    pub fn decide(&self, session: Option<&SenderSession>, text: &Normalized) -> Decision {
        if self.vocabulary.is_greeting(&text.folded) {
            return Decision::new("greeting", ReplyDirective::CannedText(self.greeting.clone()));
        }

        let Some(session) = session.filter(|s| !s.is_empty()) else {
            return Decision::new(
                "model_first_gate",
                ReplyDirective::GatePrompt(SessionField::ModelOrSoftware),
            );
        };

        match self.rules.classify(&text.folded) {
            Some(rule) => Decision::new(rule.kind.as_str(), rule.resolve(session, &text.display)),
            None => Decision::new(
                "fallback",
                ReplyDirective::DelegateToGenerative(text.display.clone()),
            ),
        }
    }
}
