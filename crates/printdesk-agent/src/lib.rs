pub mod fallback;
pub mod ollama;
pub mod openai;
pub mod provider;

pub use fallback::{FallbackError, GenerativeFallback, Upstream};
pub use provider::{BackendError, Completion, CompletionBackend, CompletionRequest};
