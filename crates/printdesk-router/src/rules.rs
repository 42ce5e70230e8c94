//! The ordered intent rule table.
//!
//! Rules are evaluated in declaration order and the first match wins. Each
//! rule pairs a matcher with a strategy that turns the sender's session into
//! a [`ReplyDirective`]; strategies never perform I/O.

use std::fmt;
use std::sync::Arc;

use regex::Regex;

use printdesk_core::config::{BrandLinks, IntentKind, IntentRuleConfig, RepliesConfig};
use printdesk_sessions::SenderSession;

use crate::error::{Result, RouterError};
use crate::extract::Vocabulary;

/// A session field the user has to provide before a request can be answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionField {
    /// Nothing is known yet; either a model or a software name unlocks help.
    ModelOrSoftware,
    PrinterModel,
    Software,
}

/// What to answer, decided without side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyDirective {
    CannedText(String),
    GatePrompt(SessionField),
    /// Ask the generative backend; carries the task description.
    DelegateToGenerative(String),
}

pub type Strategy = Box<dyn Fn(&SenderSession, &str) -> ReplyDirective + Send + Sync>;

pub struct IntentRule {
    pub kind: IntentKind,
    pub requires_model: bool,
    matcher: Regex,
    strategy: Strategy,
}

impl IntentRule {
    pub fn new(
        kind: IntentKind,
        pattern: &str,
        requires_model: bool,
        strategy: Strategy,
    ) -> Result<Self> {
        let matcher = Regex::new(&format!("(?i){pattern}"))
            .map_err(|e| RouterError::pattern(pattern, e))?;
        Ok(Self {
            kind,
            requires_model,
            matcher,
            strategy,
        })
    }

    pub fn matches(&self, text: &str) -> bool {
        self.matcher.is_match(text)
    }

    /// Resolve the rule for `session`, enforcing `requires_model` before the
    /// strategy ever runs.
    pub fn resolve(&self, session: &SenderSession, text: &str) -> ReplyDirective {
        if self.requires_model && session.printer_model.is_none() {
            return ReplyDirective::GatePrompt(SessionField::PrinterModel);
        }
        (self.strategy)(session, text)
    }
}

impl fmt::Debug for IntentRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntentRule")
            .field("kind", &self.kind)
            .field("pattern", &self.matcher.as_str())
            .field("requires_model", &self.requires_model)
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct RuleTable {
    rules: Vec<IntentRule>,
}

impl RuleTable {
    pub fn new(rules: Vec<IntentRule>) -> Self {
        Self { rules }
    }

    /// Compile the configured rules, attaching the built-in strategy for
    /// each intent kind.
    pub fn compile(
        intents: &[IntentRuleConfig],
        vocabulary: Arc<Vocabulary>,
        replies: &RepliesConfig,
    ) -> Result<Self> {
        let rules = intents
            .iter()
            .map(|cfg| {
                IntentRule::new(
                    cfg.kind,
                    &cfg.pattern,
                    cfg.requires_model,
                    strategy_for(cfg.kind, vocabulary.clone(), replies),
                )
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// The first rule whose matcher accepts `text`.
    pub fn classify(&self, text: &str) -> Option<&IntentRule> {
        self.rules.iter().find(|r| r.matches(text))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn strategy_for(kind: IntentKind, vocabulary: Arc<Vocabulary>, replies: &RepliesConfig) -> Strategy {
    match kind {
        IntentKind::Thanks => {
            let text = replies.thanks.clone();
            Box::new(move |_: &SenderSession, _: &str| ReplyDirective::CannedText(text.clone()))
        }
        IntentKind::Driver => brand_link(
            vocabulary,
            replies.driver_link.clone(),
            driver_link,
            "Find the official driver download page for the {model} label printer and explain how to install the driver on Windows.",
        ),
        IntentKind::Troubleshooting => brand_link(
            vocabulary,
            replies.troubleshooting_link.clone(),
            troubleshooting_link,
            "Help the customer troubleshoot this problem with their {model} label printer, and point to the manufacturer's official support resources.",
        ),
        IntentKind::PrintQuality => brand_link(
            vocabulary,
            replies.print_quality_link.clone(),
            print_quality_link,
            "Explain how to adjust print darkness and speed on a {model} label printer to fix faint or unclear prints.",
        ),
        IntentKind::Calibration => brand_link(
            vocabulary,
            replies.calibration_link.clone(),
            calibration_link,
            "Explain how to calibrate the media sensor and configure the label size on a {model} label printer.",
        ),
        IntentKind::SoftwareInstall => {
            let template = replies.software_install_link.clone();
            Box::new(move |session: &SenderSession, _: &str| {
                let Some(name) = session.software_name.as_deref() else {
                    return ReplyDirective::GatePrompt(SessionField::Software);
                };
                match vocabulary.software(name).and_then(|s| s.install_link.as_deref()) {
                    Some(link) => ReplyDirective::CannedText(render(&template, session, Some(link))),
                    None => ReplyDirective::DelegateToGenerative(render(
                        "Explain how to download {software} from the vendor's official website and install it on Windows.",
                        session,
                        None,
                    )),
                }
            })
        }
    }
}

fn driver_link(links: &BrandLinks) -> Option<&str> {
    links.driver.as_deref()
}

fn troubleshooting_link(links: &BrandLinks) -> Option<&str> {
    links.troubleshooting.as_deref()
}

fn print_quality_link(links: &BrandLinks) -> Option<&str> {
    links.print_quality.as_deref()
}

fn calibration_link(links: &BrandLinks) -> Option<&str> {
    links.calibration.as_deref()
}

/// Canned link for the brand of the stored model, or a delegated task when
/// the brand is unknown or has no link for this slot.
fn brand_link(
    vocabulary: Arc<Vocabulary>,
    template: String,
    slot: fn(&BrandLinks) -> Option<&str>,
    task: &'static str,
) -> Strategy {
    Box::new(move |session: &SenderSession, _: &str| {
        let link = session
            .printer_model
            .as_deref()
            .and_then(|model| vocabulary.brand_for_model(model))
            .and_then(|brand| slot(&brand.links));
        match link {
            Some(link) => ReplyDirective::CannedText(render(&template, session, Some(link))),
            None => ReplyDirective::DelegateToGenerative(render(task, session, None)),
        }
    })
}

/// Fill `{model}`, `{software}` and `{link}` placeholders.
pub fn render(template: &str, session: &SenderSession, link: Option<&str>) -> String {
    template
        .replace("{model}", session.printer_model.as_deref().unwrap_or("printer"))
        .replace("{software}", session.software_name.as_deref().unwrap_or("your label software"))
        .replace("{link}", link.unwrap_or_default())
}
