pub mod clock;
pub mod config;
pub mod error;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::PrintdeskConfig;
pub use error::{PrintdeskError, Result};
pub use types::SenderId;
