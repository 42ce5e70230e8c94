use thiserror::Error;

/// Errors that can occur during session store operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A SQLite operation failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A thread panicked while holding the store lock.
    #[error("session store lock poisoned")]
    LockPoisoned,

    /// A stored timestamp could not be converted back into a `DateTime`.
    #[error("invalid stored timestamp for {sender}: {millis}")]
    InvalidTimestamp { sender: String, millis: i64 },
}

pub type Result<T> = std::result::Result<T, SessionError>;
