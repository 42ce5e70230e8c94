use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::{channel::Channel, error::ChannelError, types::OutboundMessage};

/// Writes replies to stdout, one block per reply.
pub struct ConsoleChannel {
    stdout: Mutex<tokio::io::Stdout>,
}

impl ConsoleChannel {
    pub fn new() -> Self {
        Self {
            stdout: Mutex::new(tokio::io::stdout()),
        }
    }
}

impl Default for ConsoleChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Channel for ConsoleChannel {
    fn name(&self) -> &str {
        "console"
    }

    async fn send(&self, msg: &OutboundMessage) -> Result<(), ChannelError> {
        let mut out = self.stdout.lock().await;
        out.write_all(format_reply(msg).as_bytes()).await?;
        out.flush().await?;
        Ok(())
    }
}

fn format_reply(msg: &OutboundMessage) -> String {
    format!("[{}] {}\n", msg.recipient_id, msg.content)
}
