use chrono::{DateTime, Utc};

use printdesk_core::SenderId;

use crate::error::Result;
use crate::types::SenderSession;

/// Keyed per-sender state with a retention window.
///
/// Every operation is atomic for a single sender; there are no cross-sender
/// invariants, so implementations only need per-key locking.
///
/// Expired entries are invisible: `get` deletes them as it finds them and
/// the mutators start from a clean slate instead of reviving old fields.
pub trait SessionStore: Send + Sync {
    /// Return the live session for `sender`, refreshing `last_touched`.
    fn get(&self, sender: &SenderId) -> Result<Option<SenderSession>>;

    /// Create-or-update the printer model.
    fn set_model(&self, sender: &SenderId, model: &str) -> Result<SenderSession>;

    /// Create-or-update the software name.
    fn set_software(&self, sender: &SenderId, software: &str) -> Result<SenderSession>;

    /// Refresh `last_touched` on an existing live session.
    ///
    /// Returns `false` when there is nothing to touch; an empty session is
    /// never created.
    fn touch(&self, sender: &SenderId) -> Result<bool>;

    /// Delete every session idle for longer than the retention window as of
    /// `now`. Returns the number of sessions removed.
    fn sweep(&self, now: DateTime<Utc>) -> Result<usize>;

    /// Number of stored sessions, expired or not.
    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}
