//! Chunk data model and interchangeable vector store backends.

pub mod error;
pub mod in_memory;
pub mod qdrant;
pub mod sqlite;
pub mod types;
pub mod vector_store;

pub use error::VectorStoreError;
pub use in_memory::InMemoryVectorStore;
pub use qdrant::QdrantVectorStore;
pub use sqlite::SqliteVectorStore;
pub use types::{
    ChunkKind, ChunkMetadata, CollectionSpec, IndexEntry, ScoredChunk, SemanticChunk,
    Significance, StoreStats,
};
pub use vector_store::{BoxFuture, VectorStore, cosine_similarity};
