use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, instrument};

use printdesk_core::{Clock, SenderId};

use crate::error::Result;
use crate::store::SessionStore;
use crate::types::SenderSession;

/// In-process session store.
///
/// Backed by a `DashMap`, whose shard locks give per-sender atomicity
/// without a global lock. State is lost on restart, which is acceptable for
/// a single-process deployment.
pub struct MemorySessionStore {
    sessions: DashMap<SenderId, SenderSession>,
    clock: Arc<dyn Clock>,
    retention: Duration,
}

impl MemorySessionStore {
    pub fn new(clock: Arc<dyn Clock>, retention: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            clock,
            retention,
        }
    }

    /// Apply `update` to the live session for `sender`, or to a fresh one
    /// built by `create` when there is none (or only an expired one).
    fn upsert(
        &self,
        sender: &SenderId,
        create: impl FnOnce(DateTime<Utc>) -> SenderSession,
        update: impl FnOnce(&mut SenderSession),
    ) -> SenderSession {
        let now = self.clock.now();
        match self.sessions.entry(sender.clone()) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_expired(now, self.retention) {
                    debug!(sender = %sender, "replacing expired session");
                    entry.insert(create(now));
                } else {
                    let session = entry.get_mut();
                    update(session);
                    session.last_touched = now;
                }
                entry.get().clone()
            }
            Entry::Vacant(entry) => entry.insert(create(now)).clone(),
        }
    }
}

impl SessionStore for MemorySessionStore {
    #[instrument(skip(self), fields(sender = %sender))]
    fn get(&self, sender: &SenderId) -> Result<Option<SenderSession>> {
        let now = self.clock.now();
        match self.sessions.entry(sender.clone()) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_expired(now, self.retention) {
                    debug!("evicting expired session on read");
                    entry.remove();
                    return Ok(None);
                }
                entry.get_mut().last_touched = now;
                Ok(Some(entry.get().clone()))
            }
            Entry::Vacant(_) => Ok(None),
        }
    }

    #[instrument(skip(self), fields(sender = %sender))]
    fn set_model(&self, sender: &SenderId, model: &str) -> Result<SenderSession> {
        Ok(self.upsert(
            sender,
            |now| SenderSession::with_model(sender.clone(), model, now),
            |s| s.printer_model = Some(model.to_string()),
        ))
    }

    #[instrument(skip(self), fields(sender = %sender))]
    fn set_software(&self, sender: &SenderId, software: &str) -> Result<SenderSession> {
        Ok(self.upsert(
            sender,
            |now| SenderSession::with_software(sender.clone(), software, now),
            |s| s.software_name = Some(software.to_string()),
        ))
    }

    fn touch(&self, sender: &SenderId) -> Result<bool> {
        Ok(self.get(sender)?.is_some())
    }

    fn sweep(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut removed = 0;
        self.sessions.retain(|_, session| {
            let keep = !session.is_expired(now, self.retention);
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }

    fn len(&self) -> Result<usize> {
        Ok(self.sessions.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use printdesk_core::ManualClock;

    fn store() -> (Arc<ManualClock>, MemorySessionStore) {
        let clock = Arc::new(ManualClock::default());
        let store = MemorySessionStore::new(clock.clone(), Duration::hours(48));
        (clock, store)
    }

    #[test]
    fn unknown_sender_has_no_session() {
        let (_, store) = store();
        assert!(store.get(&"nobody".into()).unwrap().is_none());
        assert_eq!(store.len().unwrap(), 0);
    }

    #[test]
    fn model_and_software_accumulate() {
        let (_, store) = store();
        let a: SenderId = "A".into();
        store.set_model(&a, "TSC TTP-247").unwrap();
        let session = store.set_software(&a, "BarTender").unwrap();
        assert_eq!(session.printer_model.as_deref(), Some("TSC TTP-247"));
        assert_eq!(session.software_name.as_deref(), Some("BarTender"));
    }

    #[test]
    fn session_expires_after_retention_window() {
        let (clock, store) = store();
        let a: SenderId = "A".into();
        store.set_model(&a, "TSC TTP-247").unwrap();

        clock.advance(Duration::hours(48) + Duration::seconds(1));
        assert!(store.get(&a).unwrap().is_none());
        // lazily evicted by the read
        assert_eq!(store.len().unwrap(), 0);
    }

    #[test]
    fn reads_slide_the_window() {
        let (clock, store) = store();
        let a: SenderId = "A".into();
        store.set_model(&a, "TSC TTP-247").unwrap();

        clock.advance(Duration::hours(40));
        assert!(store.get(&a).unwrap().is_some());
        clock.advance(Duration::hours(40));
        assert!(store.get(&a).unwrap().is_some());
    }

    #[test]
    fn writing_after_expiry_does_not_revive_old_fields() {
        let (clock, store) = store();
        let a: SenderId = "A".into();
        store.set_software(&a, "BarTender").unwrap();
        clock.advance(Duration::hours(49));

        let session = store.set_model(&a, "Zebra ZD421").unwrap();
        assert_eq!(session.printer_model.as_deref(), Some("Zebra ZD421"));
        assert!(session.software_name.is_none());
    }

    #[test]
    fn touch_never_creates_a_session() {
        let (_, store) = store();
        let a: SenderId = "A".into();
        assert!(!store.touch(&a).unwrap());
        assert_eq!(store.len().unwrap(), 0);

        store.set_model(&a, "TSC TE200").unwrap();
        assert!(store.touch(&a).unwrap());
    }

    #[test]
    fn sweep_removes_only_stale_sessions() {
        let (clock, store) = store();
        store.set_model(&"old".into(), "TSC TE200").unwrap();
        clock.advance(Duration::hours(30));
        store.set_model(&"fresh".into(), "TSC TX200").unwrap();
        clock.advance(Duration::hours(20));

        let removed = store.sweep(clock.now()).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.len().unwrap(), 1);
        assert!(store.get(&"fresh".into()).unwrap().is_some());
    }
}
