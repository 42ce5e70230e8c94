use async_trait::async_trait;

use crate::{error::ChannelError, types::OutboundMessage};

/// Outbound delivery adapter.
///
/// Given a reply addressed to a sender, deliver it over the messaging
/// channel. Callers make exactly one attempt per reply; an implementation
/// that wants retries must do them itself.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Stable lowercase identifier for this channel (e.g. `"console"`).
    fn name(&self) -> &str;

    /// Deliver a single outbound message.
    ///
    /// This is `&self` so one adapter can serve many senders concurrently.
    async fn send(&self, msg: &OutboundMessage) -> Result<(), ChannelError>;
}
