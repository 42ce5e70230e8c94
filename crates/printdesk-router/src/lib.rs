pub mod dispatch;
pub mod error;
pub mod extract;
pub mod normalize;
pub mod resolver;
pub mod router;
pub mod rules;
pub mod transcribe;

pub use dispatch::{DispatchReport, Dispatcher};
pub use error::{RouterError, Result};
pub use extract::Vocabulary;
pub use resolver::{Decision, Resolver};
pub use router::SupportRouter;
pub use rules::{IntentRule, ReplyDirective, RuleTable, SessionField};
pub use transcribe::{TranscriptionError, Transcriber, UnsupportedTranscriber};
