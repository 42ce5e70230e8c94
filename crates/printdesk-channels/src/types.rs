use serde::{Deserialize, Serialize};

use printdesk_core::SenderId;

/// A message handed over by an inbound delivery adapter.
///
/// Exactly one of `text` / `audio_ref` is expected to carry the content.
/// When both are present the audio reference wins, since the text of a
/// voice note envelope is usually a caption or empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Opaque, stable identity of the conversation partner. A missing id
    /// deserializes as blank so the message can be skipped individually.
    #[serde(default)]
    pub sender_id: SenderId,

    /// Plain text content, if this is a text message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Opaque reference to an audio clip, resolved by a transcriber.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_ref: Option<String>,
}

/// The effective content source of an [`InboundMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageContent<'a> {
    Text(&'a str),
    Audio(&'a str),
}

impl InboundMessage {
    pub fn text(sender_id: impl Into<SenderId>, text: impl Into<String>) -> Self {
        Self {
            sender_id: sender_id.into(),
            text: Some(text.into()),
            audio_ref: None,
        }
    }

    pub fn audio(sender_id: impl Into<SenderId>, audio_ref: impl Into<String>) -> Self {
        Self {
            sender_id: sender_id.into(),
            text: None,
            audio_ref: Some(audio_ref.into()),
        }
    }

    /// The content to route, or `None` when the message carries nothing
    /// usable (blank text and no audio reference).
    pub fn content(&self) -> Option<MessageContent<'_>> {
        if let Some(audio) = self.audio_ref.as_deref().filter(|a| !a.trim().is_empty()) {
            return Some(MessageContent::Audio(audio));
        }
        self.text
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .map(MessageContent::Text)
    }
}

/// A reply to be delivered to a sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Logical channel name (e.g. "console", "http").
    pub channel: String,

    /// Sender the reply is addressed to.
    pub recipient_id: SenderId,

    /// Reply text.
    pub content: String,
}
