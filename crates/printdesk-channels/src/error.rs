use thiserror::Error;

/// Errors that can occur while delivering a reply.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// A message could not be delivered to the remote endpoint.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// The channel has been shut down and accepts no more messages.
    #[error("Channel closed")]
    Closed,

    /// An operation exceeded its allowed time budget.
    #[error("Operation timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
