//! Per-sender ordered dispatch of inbound batches.
//!
//! Messages from one sender are routed strictly in arrival order, including
//! across concurrently delivered batches; different senders run in parallel.
//! Each message yields at most one delivery attempt.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use dashmap::DashMap;
use futures_util::future::join_all;
use futures_util::FutureExt;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use printdesk_channels::{Channel, InboundMessage, MessageContent, OutboundMessage};
use printdesk_core::SenderId;

use crate::router::SupportRouter;
use crate::transcribe::Transcriber;

/// Counters for one dispatched batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub skipped: usize,
    pub failed_deliveries: usize,
}

impl DispatchReport {
    fn merge(&mut self, other: DispatchReport) {
        self.delivered += other.delivered;
        self.skipped += other.skipped;
        self.failed_deliveries += other.failed_deliveries;
    }
}

pub struct Dispatcher {
    router: Arc<SupportRouter>,
    transcriber: Arc<dyn Transcriber>,
    lanes: DashMap<SenderId, Arc<Mutex<()>>>,
}

impl Dispatcher {
    pub fn new(router: Arc<SupportRouter>, transcriber: Arc<dyn Transcriber>) -> Self {
        Self {
            router,
            transcriber,
            lanes: DashMap::new(),
        }
    }

    /// Route and deliver a batch. Malformed messages are skipped.
    pub async fn dispatch(&self, batch: Vec<InboundMessage>, channel: &dyn Channel) -> DispatchReport {
        let mut report = DispatchReport::default();

        // group by sender, keeping first-seen sender order and per-sender order
        let mut order: Vec<SenderId> = Vec::new();
        let mut groups: HashMap<SenderId, Vec<InboundMessage>> = HashMap::new();
        for msg in batch {
            if msg.sender_id.is_blank() || msg.content().is_none() {
                error!(
                    sender = %msg.sender_id,
                    has_text = msg.text.is_some(),
                    has_audio = msg.audio_ref.is_some(),
                    "skipping malformed inbound message"
                );
                report.skipped += 1;
                continue;
            }
            let sender = msg.sender_id.clone();
            groups
                .entry(sender.clone())
                .or_insert_with(|| {
                    order.push(sender);
                    Vec::new()
                })
                .push(msg);
        }

        let lanes = order.into_iter().filter_map(|sender| {
            let messages = groups.remove(&sender)?;
            Some(self.run_lane(sender, messages, channel))
        });
        for lane in join_all(lanes).await {
            report.merge(lane);
        }

        info!(
            delivered = report.delivered,
            skipped = report.skipped,
            failed = report.failed_deliveries,
            "batch dispatched"
        );
        report
    }

    async fn run_lane(
        &self,
        sender: SenderId,
        messages: Vec<InboundMessage>,
        channel: &dyn Channel,
    ) -> DispatchReport {
        let lane = self
            .lanes
            .entry(sender.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let mut report = DispatchReport::default();
        {
            let _turn = lane.lock().await;
            for msg in &messages {
                let reply = self.reply_to(&sender, msg).await;
                let outbound = OutboundMessage {
                    channel: channel.name().to_string(),
                    recipient_id: sender.clone(),
                    content: reply,
                };
                match channel.send(&outbound).await {
                    Ok(()) => report.delivered += 1,
                    Err(e) => {
                        error!(sender = %sender, channel = %channel.name(), err = %e, "reply delivery failed");
                        report.failed_deliveries += 1;
                    }
                }
            }
        }

        drop(lane);
        self.lanes.remove_if(&sender, |_, lane| Arc::strong_count(lane) == 1);
        report
    }

    /// The reply for one well-formed message. Never fails: transcription
    /// errors and panics inside the router become apologies.
    async fn reply_to(&self, sender: &SenderId, msg: &InboundMessage) -> String {
        let replies = self.router.replies();
        let text = match msg.content() {
            Some(MessageContent::Text(text)) => text.to_string(),
            Some(MessageContent::Audio(audio_ref)) => {
                match self.transcriber.transcribe(audio_ref).await {
                    Ok(text) if !text.trim().is_empty() => text,
                    Ok(_) => {
                        warn!(sender = %sender, "transcription returned no text");
                        return replies.transcription_apology.clone();
                    }
                    Err(e) => {
                        error!(sender = %sender, transcriber = %self.transcriber.name(), err = %e, "transcription failed");
                        return replies.transcription_apology.clone();
                    }
                }
            }
            None => return replies.apology.clone(),
        };

        match AssertUnwindSafe(self.router.route(sender, &text))
            .catch_unwind()
            .await
        {
            Ok(reply) => reply,
            Err(_) => {
                error!(sender = %sender, "router panicked while handling message");
                replies.apology.clone()
            }
        }
    }

    /// Number of senders with an active lane.
    pub fn active_lanes(&self) -> usize {
        self.lanes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcribe::{TranscriptionError, UnsupportedTranscriber};
    use async_trait::async_trait;
    use chrono::Duration;
    use printdesk_agent::{
        BackendError, Completion, CompletionBackend, CompletionRequest, GenerativeFallback,
        Upstream,
    };
    use printdesk_channels::{BufferedChannel, ChannelError};
    use printdesk_core::config::{FallbackConfig, RepliesConfig};
    use printdesk_core::{ManualClock, PrintdeskConfig};
    use printdesk_sessions::MemorySessionStore;

    fn router_with(upstreams: Vec<Upstream>) -> Arc<SupportRouter> {
        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(MemorySessionStore::new(clock, Duration::hours(48)));
        let fallback = GenerativeFallback::new(upstreams, &FallbackConfig::default());
        Arc::new(SupportRouter::from_config(&PrintdeskConfig::default(), store, fallback).unwrap())
    }

    fn router() -> Arc<SupportRouter> {
        router_with(Vec::new())
    }

    /// Answers after a delay.
    struct Delayed(std::time::Duration);

    #[async_trait]
    impl CompletionBackend for Delayed {
        fn name(&self) -> &str {
            "delayed"
        }
        async fn complete(&self, req: &CompletionRequest) -> Result<Completion, BackendError> {
            tokio::time::sleep(self.0).await;
            Ok(Completion {
                text: "slow answer".to_string(),
                model: req.model.clone(),
                tokens_in: 0,
                tokens_out: 0,
            })
        }
    }

    struct Panicking;

    #[async_trait]
    impl CompletionBackend for Panicking {
        fn name(&self) -> &str {
            "panicking"
        }
        async fn complete(&self, _req: &CompletionRequest) -> Result<Completion, BackendError> {
            panic!("completion backend bug");
        }
    }

    fn replies_for(sent: &[OutboundMessage], sender: &str) -> Vec<String> {
        sent.iter()
            .filter(|m| m.recipient_id.as_str() == sender)
            .map(|m| m.content.clone())
            .collect()
    }

    struct FixedTranscriber(&'static str);

    #[async_trait]
    impl Transcriber for FixedTranscriber {
        fn name(&self) -> &str {
            "fixed"
        }
        async fn transcribe(&self, _audio_ref: &str) -> Result<String, TranscriptionError> {
            Ok(self.0.to_string())
        }
    }

    struct BrokenChannel;

    #[async_trait]
    impl Channel for BrokenChannel {
        fn name(&self) -> &str {
            "broken"
        }
        async fn send(&self, _msg: &OutboundMessage) -> Result<(), ChannelError> {
            Err(ChannelError::SendFailed("offline".into()))
        }
    }

    #[tokio::test]
    async fn malformed_messages_are_skipped() {
        let dispatcher = Dispatcher::new(router(), Arc::new(UnsupportedTranscriber));
        let channel = BufferedChannel::new("test");
        let batch = vec![
            InboundMessage::text("", "hello"),
            InboundMessage {
                sender_id: "A".into(),
                text: None,
                audio_ref: None,
            },
            InboundMessage::text("B", "hello"),
        ];

        let report = dispatcher.dispatch(batch, &channel).await;
        assert_eq!(report.skipped, 2);
        assert_eq!(report.delivered, 1);
        let sent = channel.drain();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient_id.as_str(), "B");
    }

    #[tokio::test]
    async fn same_sender_messages_keep_their_order() {
        let dispatcher = Dispatcher::new(router(), Arc::new(UnsupportedTranscriber));
        let channel = BufferedChannel::new("test");
        let batch = vec![
            InboundMessage::text("A", "TSC TTP-247"),
            InboundMessage::text("B", "labels keep jamming"),
            InboundMessage::text("A", "my labels keep jamming"),
        ];

        dispatcher.dispatch(batch, &channel).await;
        let replies = replies_for(&channel.drain(), "A");
        assert_eq!(replies.len(), 2);
        assert!(replies[0].contains("TSC TTP-247"));
        assert!(replies[1].contains("https://www.tscprinters.com/EN/support/support_download"));
        assert_eq!(dispatcher.active_lanes(), 0);
    }

    #[tokio::test]
    async fn audio_without_transcriber_gets_transcription_apology() {
        let dispatcher = Dispatcher::new(router(), Arc::new(UnsupportedTranscriber));
        let channel = BufferedChannel::new("test");
        dispatcher
            .dispatch(vec![InboundMessage::audio("A", "media/42")], &channel)
            .await;
        assert_eq!(channel.drain()[0].content, RepliesConfig::default().transcription_apology);
    }

    #[tokio::test]
    async fn transcribed_audio_is_routed_like_text() {
        let dispatcher = Dispatcher::new(router(), Arc::new(FixedTranscriber("my printer is a TSC TE200")));
        let channel = BufferedChannel::new("test");
        dispatcher
            .dispatch(vec![InboundMessage::audio("A", "media/42")], &channel)
            .await;
        assert!(channel.drain()[0].content.contains("TSC TE200"));
    }

    #[tokio::test]
    async fn delivery_failures_are_counted_not_retried() {
        let dispatcher = Dispatcher::new(router(), Arc::new(UnsupportedTranscriber));
        let report = dispatcher
            .dispatch(vec![InboundMessage::text("A", "hello")], &BrokenChannel)
            .await;
        assert_eq!(report.failed_deliveries, 1);
        assert_eq!(report.delivered, 0);
    }

    #[tokio::test]
    async fn concurrent_batches_for_one_sender_keep_arrival_order() {
        let upstream = Upstream::new(Box::new(Delayed(std::time::Duration::from_millis(150))), 0);
        let dispatcher = Dispatcher::new(router_with(vec![upstream]), Arc::new(UnsupportedTranscriber));
        let channel = BufferedChannel::new("test");

        let first = vec![
            InboundMessage::text("A", "TSC TE200"),
            InboundMessage::text("A", "does it work on mac?"),
        ];
        let second = vec![InboundMessage::text("A", "my labels keep jamming")];

        tokio::join!(dispatcher.dispatch(first, &channel), async {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            dispatcher.dispatch(second, &channel).await
        });

        let replies = replies_for(&channel.drain(), "A");
        assert_eq!(replies.len(), 3);
        assert!(replies[0].contains("TSC TE200"));
        assert_eq!(replies[1], "slow answer");
        assert!(replies[2].contains("https://www.tscprinters.com/EN/support/support_download"));
        assert_eq!(dispatcher.active_lanes(), 0);
    }

    #[tokio::test]
    async fn panic_is_confined_to_one_message() {
        let upstream = Upstream::new(Box::new(Panicking), 0);
        let dispatcher = Dispatcher::new(router_with(vec![upstream]), Arc::new(UnsupportedTranscriber));
        let channel = BufferedChannel::new("test");
        let batch = vec![
            InboundMessage::text("A", "TSC TE200"),
            InboundMessage::text("A", "does it work on mac?"),
            InboundMessage::text("B", "hello"),
            InboundMessage::text("A", "my labels keep jamming"),
        ];

        let report = dispatcher.dispatch(batch, &channel).await;
        assert_eq!(report.delivered, 4);

        let sent = channel.drain();
        let a = replies_for(&sent, "A");
        assert_eq!(a[1], RepliesConfig::default().apology);
        assert!(a[2].contains("https://www.tscprinters.com/EN/support/support_download"));
        assert_eq!(replies_for(&sent, "B"), vec![RepliesConfig::default().greeting]);

        // the lane is still usable afterwards
        dispatcher
            .dispatch(vec![InboundMessage::text("A", "labels jam again")], &channel)
            .await;
        assert!(channel.drain()[0].content.contains("tscprinters.com"));
    }
}
