//! `printdesk console`: a local REPL over the same dispatcher the HTTP API
//! uses. Each stdin line is one inbound text message.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use printdesk_channels::{ConsoleChannel, InboundMessage};
use printdesk_core::SenderId;
use printdesk_router::Dispatcher;

pub async fn run(dispatcher: Arc<Dispatcher>, sender: SenderId) -> anyhow::Result<()> {
    info!(sender = %sender, "console session started, type /quit to exit");
    let channel = ConsoleChannel::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line == "/quit" || line == "/exit" {
            break;
        }
        if line.is_empty() {
            continue;
        }
        let msg = InboundMessage::text(sender.clone(), line);
        dispatcher.dispatch(vec![msg], &channel).await;
    }
    Ok(())
}
