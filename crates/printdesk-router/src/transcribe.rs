//! Audio transcription contract.
//!
//! Fetching and decoding audio is left to deployment-specific adapters; the
//! router only needs text back or a failure it can apologise for.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TranscriptionError {
    #[error("transcription not configured")]
    NotConfigured,

    #[error("transcription backend unavailable: {0}")]
    Unavailable(String),

    #[error("transcription produced no text")]
    Empty,
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    fn name(&self) -> &str;

    /// Resolve an opaque audio reference into text.
    async fn transcribe(&self, audio_ref: &str) -> Result<String, TranscriptionError>;
}

/// Used when no transcription backend is configured. Every voice message is
/// answered with the transcription apology.
pub struct UnsupportedTranscriber;

#[async_trait]
impl Transcriber for UnsupportedTranscriber {
    fn name(&self) -> &str {
        "none"
    }

    async fn transcribe(&self, _audio_ref: &str) -> Result<String, TranscriptionError> {
        Err(TranscriptionError::NotConfigured)
    }
}
