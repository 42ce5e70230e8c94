pub mod buffered;
pub mod channel;
pub mod console;
pub mod error;
pub mod types;

pub use buffered::BufferedChannel;
pub use channel::Channel;
pub use console::ConsoleChannel;
pub use error::ChannelError;
pub use types::{InboundMessage, MessageContent, OutboundMessage};
