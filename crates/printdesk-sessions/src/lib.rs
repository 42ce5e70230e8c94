pub mod db;
pub mod error;
pub mod memory;
pub mod sqlite;
pub mod store;
pub mod sweeper;
pub mod types;

pub use error::SessionError;
pub use memory::MemorySessionStore;
pub use sqlite::SqliteSessionStore;
pub use store::SessionStore;
pub use sweeper::SessionSweeper;
pub use types::SenderSession;
