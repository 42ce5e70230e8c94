use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use printdesk_core::SenderId;

/// What the assistant remembers about one sender.
///
/// A session always carries at least one of `printer_model` or
/// `software_name`: stores never persist an empty session, so "no session"
/// and "nothing known" are the same state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderSession {
    pub sender_id: SenderId,
    /// Model string as the user wrote it, e.g. `"TSC TTP-247"`.
    pub printer_model: Option<String>,
    /// Canonical software name, e.g. `"BarTender"`.
    pub software_name: Option<String>,
    pub last_touched: DateTime<Utc>,
}

impl SenderSession {
    pub fn with_model(sender_id: SenderId, model: &str, now: DateTime<Utc>) -> Self {
        Self {
            sender_id,
            printer_model: Some(model.to_string()),
            software_name: None,
            last_touched: now,
        }
    }

    pub fn with_software(sender_id: SenderId, software: &str, now: DateTime<Utc>) -> Self {
        Self {
            sender_id,
            printer_model: None,
            software_name: Some(software.to_string()),
            last_touched: now,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.printer_model.is_none() && self.software_name.is_none()
    }

    /// True once the session has been idle for longer than `retention`.
    pub fn is_expired(&self, now: DateTime<Utc>, retention: Duration) -> bool {
        now - self.last_touched > retention
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_is_strictly_after_the_window() {
        let start = Utc::now();
        let session = SenderSession::with_model("a".into(), "TSC TTP-247", start);
        let window = Duration::hours(48);
        assert!(!session.is_expired(start + window, window));
        assert!(session.is_expired(start + window + Duration::milliseconds(1), window));
    }

    #[test]
    fn constructors_never_build_empty_sessions() {
        let now = Utc::now();
        assert!(!SenderSession::with_model("a".into(), "Zebra ZD421", now).is_empty());
        assert!(!SenderSession::with_software("a".into(), "BarTender", now).is_empty());
    }
}
