//! Embedding provider abstraction and backend implementations.
//!
//! Every backend implements [`EmbeddingProvider`]; [`AnyEmbedder`] selects one
//! of them at construction time so callers never depend on which is active.

pub mod any;
pub mod error;
pub mod http;
#[cfg(feature = "mock")]
pub mod mock;
pub mod ollama;
pub mod openai;
pub mod provider;
mod retry;

pub use any::AnyEmbedder;
pub use error::EmbedError;
pub use provider::EmbeddingProvider;
