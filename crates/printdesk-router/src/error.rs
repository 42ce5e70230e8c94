use thiserror::Error;

use printdesk_sessions::SessionError;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("session store error: {0}")]
    Session(#[from] SessionError),
}

pub type Result<T> = std::result::Result<T, RouterError>;

impl RouterError {
    pub(crate) fn pattern(pattern: &str, err: regex::Error) -> Self {
        RouterError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: err.to_string(),
        }
    }
}
