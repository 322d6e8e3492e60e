//! Code-aware semantic indexing and retrieval.
//!
//! Source files are cut into overlapping windows (and optionally per-symbol
//! chunks), embedded through a cached provider, stored in a [`sift_store::VectorStore`]
//! and searched by cosine similarity. [`SemanticIndex`] is the entry point.

pub mod cache;
pub mod chunker;
pub mod config;
pub mod embedder;
pub mod engine;
pub mod error;
pub mod indexer;
pub mod languages;
pub mod query;
pub mod scanner;
pub mod watcher;

pub use engine::SemanticIndex;
pub use error::{IndexError, Result};
pub use indexer::{IndexReport, IndexStats};
pub use query::{SearchFilters, SearchQuery, SearchResponse, SearchResult};
