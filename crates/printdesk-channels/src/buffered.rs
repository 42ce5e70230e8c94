use std::sync::Mutex;

use async_trait::async_trait;

use crate::{channel::Channel, error::ChannelError, types::OutboundMessage};

/// Collects replies in memory instead of delivering them.
///
/// Used by request/response transports that answer inline, and by tests.
pub struct BufferedChannel {
    name: String,
    sent: Mutex<Vec<OutboundMessage>>,
}

impl BufferedChannel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Take every reply collected so far, in delivery order.
    pub fn drain(&self) -> Vec<OutboundMessage> {
        match self.sent.lock() {
            Ok(mut sent) => std::mem::take(&mut *sent),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

#[async_trait]
impl Channel for BufferedChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, msg: &OutboundMessage) -> Result<(), ChannelError> {
        let mut sent = self.sent.lock().map_err(|_| ChannelError::Closed)?;
        sent.push(msg.clone());
        Ok(())
    }
}
