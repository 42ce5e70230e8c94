use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, instrument};

use printdesk_core::{Clock, SenderId};

use crate::db::init_db;
use crate::error::{Result, SessionError};
use crate::store::SessionStore;
use crate::types::SenderSession;

/// Session store persisted in SQLite so remembered models survive restarts.
///
/// All statements for one operation run under the same connection lock,
/// which makes each read-modify-write atomic. Expiry is computed from
/// `last_touched_ms`; a row older than the retention window is treated as
/// absent and deleted when it is next seen.
pub struct SqliteSessionStore {
    db: Mutex<Connection>,
    clock: Arc<dyn Clock>,
    retention: Duration,
}

impl SqliteSessionStore {
    /// Wrap an open connection, creating the schema if needed.
    pub fn new(conn: Connection, clock: Arc<dyn Clock>, retention: Duration) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
            clock,
            retention,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|_| SessionError::LockPoisoned)
    }

    fn cutoff_ms(&self, now: DateTime<Utc>) -> i64 {
        (now - self.retention).timestamp_millis()
    }

    /// Upsert one column, dropping an expired row first so its other
    /// field is not carried over.
    fn set_field(&self, sender: &SenderId, column: Field, value: &str) -> Result<SenderSession> {
        let now = self.clock.now();
        let db = self.lock()?;
        db.execute(
            "DELETE FROM sender_sessions WHERE sender_id = ?1 AND last_touched_ms < ?2",
            rusqlite::params![sender.as_str(), self.cutoff_ms(now)],
        )?;
        let sql = match column {
            Field::Model => {
                "INSERT INTO sender_sessions (sender_id, printer_model, last_touched_ms)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(sender_id) DO UPDATE
                 SET printer_model = excluded.printer_model,
                     last_touched_ms = excluded.last_touched_ms"
            }
            Field::Software => {
                "INSERT INTO sender_sessions (sender_id, software_name, last_touched_ms)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(sender_id) DO UPDATE
                 SET software_name = excluded.software_name,
                     last_touched_ms = excluded.last_touched_ms"
            }
        };
        db.execute(
            sql,
            rusqlite::params![sender.as_str(), value, now.timestamp_millis()],
        )?;

        select_session(&db, sender)?.ok_or_else(|| {
            // the row was written under the same lock, so this only happens
            // if the database silently dropped it
            SessionError::Database(rusqlite::Error::QueryReturnedNoRows)
        })
    }
}

#[derive(Clone, Copy)]
enum Field {
    Model,
    Software,
}

impl SessionStore for SqliteSessionStore {
    #[instrument(skip(self), fields(sender = %sender))]
    fn get(&self, sender: &SenderId) -> Result<Option<SenderSession>> {
        let now = self.clock.now();
        let db = self.lock()?;
        let Some(mut session) = select_session(&db, sender)? else {
            return Ok(None);
        };

        if session.is_expired(now, self.retention) {
            debug!("evicting expired session on read");
            db.execute(
                "DELETE FROM sender_sessions WHERE sender_id = ?1",
                rusqlite::params![sender.as_str()],
            )?;
            return Ok(None);
        }

        db.execute(
            "UPDATE sender_sessions SET last_touched_ms = ?1 WHERE sender_id = ?2",
            rusqlite::params![now.timestamp_millis(), sender.as_str()],
        )?;
        session.last_touched = now;
        Ok(Some(session))
    }

    #[instrument(skip(self), fields(sender = %sender))]
    fn set_model(&self, sender: &SenderId, model: &str) -> Result<SenderSession> {
        self.set_field(sender, Field::Model, model)
    }

    #[instrument(skip(self), fields(sender = %sender))]
    fn set_software(&self, sender: &SenderId, software: &str) -> Result<SenderSession> {
        self.set_field(sender, Field::Software, software)
    }

    fn touch(&self, sender: &SenderId) -> Result<bool> {
        Ok(self.get(sender)?.is_some())
    }

    fn sweep(&self, now: DateTime<Utc>) -> Result<usize> {
        let db = self.lock()?;
        let removed = db.execute(
            "DELETE FROM sender_sessions WHERE last_touched_ms < ?1",
            rusqlite::params![self.cutoff_ms(now)],
        )?;
        Ok(removed)
    }

    fn len(&self) -> Result<usize> {
        let db = self.lock()?;
        let count: i64 = db.query_row("SELECT COUNT(*) FROM sender_sessions", [], |row| {
            row.get(0)
        })?;
        Ok(count as usize)
    }
}

fn select_session(db: &Connection, sender: &SenderId) -> Result<Option<SenderSession>> {
    let row = db
        .query_row(
            "SELECT printer_model, software_name, last_touched_ms
             FROM sender_sessions WHERE sender_id = ?1",
            rusqlite::params![sender.as_str()],
            |row| {
                Ok((
                    row.get::<_, Option<String>>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            },
        )
        .optional()?;

    let Some((printer_model, software_name, millis)) = row else {
        return Ok(None);
    };
    let last_touched =
        DateTime::<Utc>::from_timestamp_millis(millis).ok_or_else(|| {
            SessionError::InvalidTimestamp {
                sender: sender.to_string(),
                millis,
            }
        })?;

    Ok(Some(SenderSession {
        sender_id: sender.clone(),
        printer_model,
        software_name,
        last_touched,
    }))
}
