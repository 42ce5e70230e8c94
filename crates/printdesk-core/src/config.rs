use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::PrintdeskError;

pub const DEFAULT_PORT: u16 = 18790;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_RETENTION_HOURS: u64 = 48;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60 * 60;
pub const DEFAULT_FALLBACK_TIMEOUT_SECS: u64 = 20;

/// Top-level config (printdesk.toml + PRINTDESK_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrintdeskConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub fallback: FallbackConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub vocabulary: VocabularyConfig,
    /// Ordered intent rules. Declaration order is the precedence order.
    #[serde(default = "default_intents")]
    pub intents: Vec<IntentRuleConfig>,
    #[serde(default)]
    pub replies: RepliesConfig,
}

impl Default for PrintdeskConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            sessions: SessionsConfig::default(),
            fallback: FallbackConfig::default(),
            providers: ProvidersConfig::default(),
            vocabulary: VocabularyConfig::default(),
            intents: default_intents(),
            replies: RepliesConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// When set, `POST /v1/messages` requires `Authorization: Bearer <token>`.
    pub auth_token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
            auth_token: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SessionBackend {
    #[default]
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    #[serde(default)]
    pub backend: SessionBackend,
    /// SQLite file, only used by the `sqlite` backend.
    #[serde(default = "default_sessions_path")]
    pub path: String,
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            backend: SessionBackend::Memory,
            path: default_sessions_path(),
            retention_hours: DEFAULT_RETENTION_HOURS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_fallback_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Role statement placed at the top of every system instruction.
    #[serde(default = "default_persona")]
    pub persona: String,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            timeout_secs: DEFAULT_FALLBACK_TIMEOUT_SECS,
            max_tokens: default_max_tokens(),
            persona: default_persona(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProvidersConfig {
    pub openai: Option<OpenAiProviderConfig>,
    pub ollama: Option<OllamaConfig>,
    /// Additional OpenAI-compatible providers, tried in order after `openai`.
    #[serde(default)]
    pub openai_compat: Vec<OpenAiCompatEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiProviderConfig {
    pub api_key: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
}

/// A single OpenAI-compatible endpoint (Groq, DeepSeek, a LAN gateway, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiCompatEntry {
    /// Name used in logs.
    pub id: String,
    pub api_key: String,
    /// e.g. `"https://api.groq.com/openai"`.
    pub base_url: String,
    /// Defaults to `/v1/chat/completions`.
    pub chat_path: Option<String>,
    /// Overrides `fallback.model` for requests sent to this provider.
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,
    /// Local model name, e.g. `"llama3.1"`. Overrides `fallback.model`.
    pub model: Option<String>,
}

/// Words and product names the router recognises.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VocabularyConfig {
    /// Regex for a bare greeting. Matched against the whole normalized message.
    #[serde(default = "default_greeting")]
    pub greeting: String,
    #[serde(default = "default_brands")]
    pub brands: Vec<BrandConfig>,
    #[serde(default = "default_software")]
    pub software: Vec<SoftwareConfig>,
}

impl Default for VocabularyConfig {
    fn default() -> Self {
        Self {
            greeting: default_greeting(),
            brands: default_brands(),
            software: default_software(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrandConfig {
    /// Brand token as it appears in messages, e.g. `"TSC"`.
    pub name: String,
    /// Model codes users commonly send without the brand, e.g. `"TE200"`.
    #[serde(default)]
    pub bare_models: Vec<String>,
    #[serde(default)]
    pub links: BrandLinks,
}

/// Canned support links for one brand. A missing link sends the request to
/// the generative fallback instead.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BrandLinks {
    pub driver: Option<String>,
    pub troubleshooting: Option<String>,
    pub print_quality: Option<String>,
    pub calibration: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftwareConfig {
    /// Canonical product name stored in the session, e.g. `"BarTender"`.
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub install_link: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    Thanks,
    Driver,
    SoftwareInstall,
    Troubleshooting,
    PrintQuality,
    Calibration,
}

impl IntentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentKind::Thanks => "thanks",
            IntentKind::Driver => "driver",
            IntentKind::SoftwareInstall => "software_install",
            IntentKind::Troubleshooting => "troubleshooting",
            IntentKind::PrintQuality => "print_quality",
            IntentKind::Calibration => "calibration",
        }
    }
}

impl std::fmt::Display for IntentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentRuleConfig {
    pub kind: IntentKind,
    /// Regex matched (case-insensitively) against the normalized message.
    pub pattern: String,
    #[serde(default)]
    pub requires_model: bool,
}

impl IntentRuleConfig {
    pub fn new(kind: IntentKind, pattern: &str, requires_model: bool) -> Self {
        Self {
            kind,
            pattern: pattern.to_string(),
            requires_model,
        }
    }
}

/// Every fixed text a user can receive.
///
/// Templates understand `{model}`, `{software}` and `{link}` placeholders.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepliesConfig {
    pub model_first_gate: String,
    pub greeting: String,
    pub apology: String,
    pub transcription_apology: String,
    pub model_ack: String,
    pub software_ack: String,
    pub need_model: String,
    pub need_software: String,
    pub thanks: String,
    pub driver_link: String,
    pub troubleshooting_link: String,
    pub print_quality_link: String,
    pub calibration_link: String,
    pub software_install_link: String,
}

impl Default for RepliesConfig {
    fn default() -> Self {
        Self {
            model_first_gate: "Before I can help, please tell me your printer model (for example \"TSC TTP-247\") or the label software you use (for example \"BarTender\").".to_string(),
            greeting: "Hello! I'm the label printer support assistant. To get started, please tell me your printer model (for example \"TSC TTP-247\") or the label software you use.".to_string(),
            apology: "Sorry, I couldn't process your request right now. Please try again in a moment.".to_string(),
            transcription_apology: "Sorry, I couldn't understand that voice message. Could you type your question instead?".to_string(),
            model_ack: "Thanks! Got it. You're using: {model}. How can I assist you today?".to_string(),
            software_ack: "Thanks! Got it. You're using {software}. How can I assist you today?".to_string(),
            need_model: "To help with that I need your printer model first. Please send it, for example \"TSC TTP-247\".".to_string(),
            need_software: "Which label software are you using? For example BarTender, NiceLabel or ZebraDesigner.".to_string(),
            thanks: "You're welcome! Let me know if there's anything else I can help with.".to_string(),
            driver_link: "You can follow this tutorial to install the official Windows driver for your {model}: {link}".to_string(),
            troubleshooting_link: "Sorry about the trouble with your {model}. This guide covers paper jams, error lights and feeding problems: {link}".to_string(),
            print_quality_link: "You can refer to this guide to configure darkness and speed for your {model}: {link}".to_string(),
            calibration_link: "Here is how to calibrate the label sensor and set up the label size on your {model}: {link}".to_string(),
            software_install_link: "Sure! You can follow this tutorial to install {software}: {link}".to_string(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_retention_hours() -> u64 {
    DEFAULT_RETENTION_HOURS
}
fn default_sweep_interval_secs() -> u64 {
    DEFAULT_SWEEP_INTERVAL_SECS
}
fn default_fallback_timeout_secs() -> u64 {
    DEFAULT_FALLBACK_TIMEOUT_SECS
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_max_tokens() -> u32 {
    512
}
fn default_persona() -> String {
    "You are a friendly customer-support assistant for thermal label printers \
     and label design software. Answer briefly and practically, in the language \
     the customer writes in. Never invent download links; when unsure, point to \
     the manufacturer's official support website."
        .to_string()
}
fn default_openai_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_sessions_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.printdesk/sessions.db", home)
}
fn default_greeting() -> String {
    r"^(hi|hello|hey|hola|ola|oi|good (morning|afternoon|evening)|greetings)( there)?[\s!.,]*$"
        .to_string()
}

fn default_brands() -> Vec<BrandConfig> {
    let strings = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    vec![
        BrandConfig {
            name: "TSC".to_string(),
            bare_models: strings(&[
                "TE200", "TE210", "TE300", "TE310", "TX200", "TX300", "TX600", "T4000",
                "TTP-244", "TTP-247", "TDP-247",
            ]),
            links: BrandLinks {
                driver: Some("https://wa.me/p/7261706730612270/60102317781".to_string()),
                troubleshooting: Some("https://www.tscprinters.com/EN/support/support_download".to_string()),
                print_quality: Some("https://wa.me/p/8073532716014276/60102317781".to_string()),
                calibration: Some("https://www.tscprinters.com/EN/support/support_download".to_string()),
            },
        },
        BrandConfig {
            name: "Zebra".to_string(),
            bare_models: strings(&["ZD220", "ZD230", "ZD420", "ZD421", "GK420d", "GC420t", "ZT230", "ZT411"]),
            links: BrandLinks::default(),
        },
    ]
}

fn default_software() -> Vec<SoftwareConfig> {
    vec![
        SoftwareConfig {
            name: "BarTender".to_string(),
            aliases: vec!["bar tender".to_string()],
            install_link: Some("https://wa.me/p/25438061125807295/60102317781".to_string()),
        },
        SoftwareConfig {
            name: "NiceLabel".to_string(),
            aliases: vec!["nice label".to_string()],
            install_link: None,
        },
        SoftwareConfig {
            name: "ZebraDesigner".to_string(),
            aliases: vec!["zebra designer".to_string()],
            install_link: None,
        },
    ]
}

/// The shipped rule table. Order matters: the first matching rule wins.
pub fn default_intents() -> Vec<IntentRuleConfig> {
    vec![
        IntentRuleConfig::new(
            IntentKind::Thanks,
            r"^(thanks|thank you|thx|ty|many thanks|ok,? thanks)\b",
            false,
        ),
        IntentRuleConfig::new(IntentKind::Driver, r"\bdrivers?\b", true),
        IntentRuleConfig::new(
            IntentKind::SoftwareInstall,
            r"install.*\b(software|program|app|bar ?tender)\b|\b(software|program)\b.*\b(install|download|setup)\b",
            false,
        ),
        IntentRuleConfig::new(
            IntentKind::Troubleshooting,
            r"\bjam|\bstuck\b|\berrors?\b|blink|flashing|not (printing|feeding)|won'?t print|doesn'?t print|\bskip|paper out|\bribbon\b",
            true,
        ),
        IntentRuleConfig::new(
            IntentKind::PrintQuality,
            r"\bfaint\b|too light|light print|print.*not.*clear|not dark|darkness|\bpale\b|blurr|smudg",
            true,
        ),
        IntentRuleConfig::new(
            IntentKind::Calibration,
            r"calibrat|configur|\bset ?up\b|label size|\bgap\b|\bsensor\b|\bspeed\b",
            true,
        ),
    ]
}

impl PrintdeskConfig {
    /// Load config from a TOML file with PRINTDESK_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.printdesk/printdesk.toml
    ///
    /// Nested env keys use a double underscore, e.g.
    /// `PRINTDESK_SESSIONS__RETENTION_HOURS=24`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: Self = Self::figment(&path)
            .extract()
            .map_err(|e| PrintdeskError::Config(e.to_string()))?;
        config.retention()?;
        Ok(config)
    }

    fn figment(path: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("PRINTDESK_").split("__"))
    }

    /// Session retention window. Fails when `retention_hours` does not fit
    /// in a `chrono::Duration`.
    pub fn retention(&self) -> crate::error::Result<chrono::Duration> {
        let hours = self.sessions.retention_hours;
        i64::try_from(hours)
            .ok()
            .and_then(chrono::Duration::try_hours)
            .ok_or_else(|| {
                PrintdeskError::Config(format!("sessions.retention_hours = {hours} is out of range"))
            })
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.printdesk/printdesk.toml", home)
}
