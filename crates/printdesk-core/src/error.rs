use thiserror::Error;

#[derive(Debug, Error)]
pub enum PrintdeskError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication failed: {0}")]
    AuthFailed(String),
}

impl PrintdeskError {
    /// Short error code string returned to HTTP API clients.
    pub fn code(&self) -> &'static str {
        match self {
            PrintdeskError::Config(_) => "CONFIG_ERROR",
            PrintdeskError::AuthFailed(_) => "AUTH_FAILED",
        }
    }
}

pub type Result<T> = std::result::Result<T, PrintdeskError>;
