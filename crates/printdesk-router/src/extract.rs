//! Entity extraction: printer models and label software names.
//!
//! Both extractors are compiled once from [`VocabularyConfig`] and run on
//! every message before any intent rule is considered.

use regex::Regex;
use tracing::debug;

use printdesk_core::config::{BrandConfig, SoftwareConfig, VocabularyConfig};

use crate::error::{Result, RouterError};

struct CompiledBrand {
    config: BrandConfig,
    /// Bare model codes of this brand, word-bounded.
    bare: Option<Regex>,
}

struct CompiledSoftware {
    config: SoftwareConfig,
    matcher: Regex,
}

/// Compiled brand, model and software vocabulary.
pub struct Vocabulary {
    greeting: Regex,
    /// Brand token, an optional short series word ("TTP"), then a fragment
    /// containing at least one digit.
    prefixed_model: Option<Regex>,
    brands: Vec<CompiledBrand>,
    software: Vec<CompiledSoftware>,
}

impl Vocabulary {
    pub fn compile(config: &VocabularyConfig) -> Result<Self> {
        let greeting = case_insensitive(&config.greeting)?;

        let brand_names: Vec<String> = config
            .brands
            .iter()
            .filter(|b| !b.name.trim().is_empty())
            .map(|b| regex::escape(b.name.trim()))
            .collect();
        let prefixed_model = if brand_names.is_empty() {
            None
        } else {
            let pattern = format!(
                r"\b(?:{})(?:[\s\-]+[A-Za-z]{{1,4}})?(?:[\s\-]+[A-Za-z0-9\-]*\d[A-Za-z0-9\-]*|\d[A-Za-z0-9\-]*)",
                brand_names.join("|")
            );
            Some(case_insensitive(&pattern)?)
        };

        let brands = config
            .brands
            .iter()
            .map(|b| -> Result<CompiledBrand> {
                Ok(CompiledBrand {
                    config: b.clone(),
                    bare: word_alternation(&b.bare_models)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut software = Vec::with_capacity(config.software.len());
        for s in &config.software {
            let mut names = vec![s.name.clone()];
            names.extend(s.aliases.iter().cloned());
            if let Some(matcher) = word_alternation(&names)? {
                software.push(CompiledSoftware {
                    config: s.clone(),
                    matcher,
                });
            }
        }

        debug!(
            brands = brands.len(),
            software = software.len(),
            "vocabulary compiled"
        );

        Ok(Self {
            greeting,
            prefixed_model,
            brands,
            software,
        })
    }

    /// True when the whole message is a bare greeting.
    pub fn is_greeting(&self, text: &str) -> bool {
        self.greeting.is_match(text)
    }

    /// The printer model mentioned in `text`, exactly as written.
    ///
    /// Brand-prefixed codes ("TSC TTP-247") take precedence over bare
    /// codes ("TE200").
    pub fn extract_model<'t>(&self, text: &'t str) -> Option<&'t str> {
        if let Some(m) = self.prefixed_model.as_ref().and_then(|re| re.find(text)) {
            return Some(m.as_str().trim_end_matches('-'));
        }
        self.brands
            .iter()
            .filter_map(|b| b.bare.as_ref())
            .find_map(|re| re.find(text))
            .map(|m| m.as_str())
    }

    /// The canonical name of the label software mentioned in `text`.
    pub fn extract_software(&self, text: &str) -> Option<&SoftwareConfig> {
        self.software
            .iter()
            .find(|s| s.matcher.is_match(text))
            .map(|s| &s.config)
    }

    /// The brand a stored model belongs to.
    pub fn brand_for_model(&self, model: &str) -> Option<&BrandConfig> {
        let folded = model.to_lowercase();
        self.brands
            .iter()
            .find(|b| {
                folded.starts_with(&b.config.name.to_lowercase())
                    || b.bare.as_ref().is_some_and(|re| re.is_match(model))
            })
            .map(|b| &b.config)
    }

    /// Look up a software entry by its canonical name.
    pub fn software(&self, name: &str) -> Option<&SoftwareConfig> {
        self.software
            .iter()
            .map(|s| &s.config)
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }
}

fn case_insensitive(pattern: &str) -> Result<Regex> {
    Regex::new(&format!("(?i){pattern}")).map_err(|e| RouterError::pattern(pattern, e))
}

/// `(?i)\b(?:a|b|c)\b` over escaped literals, or `None` for an empty list.
fn word_alternation(words: &[String]) -> Result<Option<Regex>> {
    let escaped: Vec<String> = words
        .iter()
        .map(|w| w.trim())
        .filter(|w| !w.is_empty())
        .map(regex::escape)
        .collect();
    if escaped.is_empty() {
        return Ok(None);
    }
    case_insensitive(&format!(r"\b(?:{})\b", escaped.join("|"))).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocabulary() -> Vocabulary {
        Vocabulary::compile(&VocabularyConfig::default()).unwrap()
    }

    #[test]
    fn brand_prefixed_model_is_captured_verbatim() {
        let v = vocabulary();
        assert_eq!(v.extract_model("TSC TTP-247"), Some("TSC TTP-247"));
        assert_eq!(v.extract_model("i have a zebra zd421 here"), Some("zebra zd421"));
        assert_eq!(v.extract_model("my Zebra-GK420d prints blank"), Some("Zebra-GK420d"));
    }

    #[test]
    fn series_and_number_may_be_split_by_a_space() {
        let v = vocabulary();
        assert_eq!(v.extract_model("TSC TTP 247"), Some("TSC TTP 247"));
        assert_eq!(v.extract_model("it's a zebra zd 421."), Some("zebra zd 421"));
        assert_eq!(v.extract_model("zebra designer 3 crashes"), None);
    }

    #[test]
    fn bare_model_codes_are_recognised() {
        let v = vocabulary();
        assert_eq!(v.extract_model("the te200 keeps beeping"), Some("te200"));
    }

    #[test]
    fn brand_without_digits_is_not_a_model() {
        let v = vocabulary();
        assert_eq!(v.extract_model("my TSC printer is jammed"), None);
        assert_eq!(v.extract_model("I use zebra designer"), None);
    }

    #[test]
    fn software_resolves_to_canonical_name() {
        let v = vocabulary();
        assert_eq!(v.extract_software("i use bar tender").map(|s| s.name.as_str()), Some("BarTender"));
        assert_eq!(
            v.extract_software("ZebraDesigner 3").map(|s| s.name.as_str()),
            Some("ZebraDesigner")
        );
        assert!(v.extract_software("bartenders union").is_none());
    }

    #[test]
    fn brand_lookup_uses_prefix_or_bare_code() {
        let v = vocabulary();
        assert_eq!(v.brand_for_model("TSC TTP-247").map(|b| b.name.as_str()), Some("TSC"));
        assert_eq!(v.brand_for_model("te200").map(|b| b.name.as_str()), Some("TSC"));
        assert_eq!(v.brand_for_model("zebra zd421").map(|b| b.name.as_str()), Some("Zebra"));
        assert!(v.brand_for_model("Brother QL-800").is_none());
    }

    #[test]
    fn greeting_must_be_the_whole_message() {
        let v = vocabulary();
        assert!(v.is_greeting("hello"));
        assert!(v.is_greeting("Good morning!"));
        assert!(!v.is_greeting("hello my printer is jammed"));
    }

    #[test]
    fn invalid_greeting_pattern_is_rejected() {
        let config = VocabularyConfig {
            greeting: "(hi".to_string(),
            ..VocabularyConfig::default()
        };
        assert!(matches!(
            Vocabulary::compile(&config),
            Err(RouterError::InvalidPattern { .. })
        ));
    }
}
