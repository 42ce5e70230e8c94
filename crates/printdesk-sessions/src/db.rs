use rusqlite::Connection;

use crate::error::Result;

/// Initialise the sender_sessions table and its expiry index.
///
/// Safe to call on every startup: uses `IF NOT EXISTS` throughout.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS sender_sessions (
            sender_id        TEXT PRIMARY KEY,
            printer_model    TEXT,
            software_name    TEXT,
            last_touched_ms  INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_sender_sessions_touched
            ON sender_sessions(last_touched_ms);",
    )?;
    Ok(())
}
