use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info};

use printdesk_core::Clock;

use crate::store::SessionStore;

/// Background loop that evicts idle sessions on a fixed interval, so memory
/// stays bounded even for senders who never come back.
pub struct SessionSweeper {
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl SessionSweeper {
    pub fn new(store: Arc<dyn SessionStore>, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self {
            store,
            clock,
            interval,
        }
    }

    /// Run one sweep now. Returns the number of evicted sessions.
    pub fn sweep_once(&self) -> usize {
        match self.store.sweep(self.clock.now()) {
            Ok(0) => {
                debug!("session sweep: nothing to evict");
                0
            }
            Ok(n) => {
                info!(evicted = n, "session sweep evicted idle sessions");
                n
            }
            Err(e) => {
                error!("session sweep failed: {e}");
                0
            }
        }
    }

    /// Main loop. Sweeps every `interval` until `shutdown` broadcasts `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "session sweeper started");

        let mut interval = tokio::time::interval(self.interval);
        // the first tick completes immediately; skip it so startup does not sweep
        interval.tick().await;
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.sweep_once();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("session sweeper shutting down");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemorySessionStore;
    use printdesk_core::ManualClock;

    #[test]
    fn sweep_once_reports_evictions() {
        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(MemorySessionStore::new(clock.clone(), chrono::Duration::hours(48)));
        store.set_model(&"A".into(), "TSC TTP-247").unwrap();
        store.set_software(&"B".into(), "BarTender").unwrap();
        clock.advance(chrono::Duration::hours(49));

        let sweeper = SessionSweeper::new(store.clone(), clock, Duration::from_secs(3600));
        assert_eq!(sweeper.sweep_once(), 2);
        assert_eq!(store.len().unwrap(), 0);
    }

    #[tokio::test]
    async fn loop_sweeps_on_interval_and_stops_on_shutdown() {
        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(MemorySessionStore::new(clock.clone(), chrono::Duration::hours(48)));
        store.set_model(&"A".into(), "TSC TTP-247").unwrap();
        clock.advance(chrono::Duration::hours(50));

        let sweeper = SessionSweeper::new(store.clone(), clock, Duration::from_millis(10));
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(sweeper.run(rx));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.len().unwrap(), 0);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }
}
