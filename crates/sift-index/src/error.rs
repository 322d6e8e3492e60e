//! Error types for sift-index.

/// Errors that can occur while indexing or searching.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// IO error reading source files or the config file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("vector store error: {0}")]
    Store(#[from] sift_store::VectorStoreError),

    /// Embedding provider failure. Fatal on the query path.
    #[error("embedding error: {0}")]
    Embed(#[from] sift_embed::EmbedError),

    /// Directory traversal error.
    #[error("walk error: {0}")]
    Walk(#[from] ignore::Error),

    #[error("watcher error: {0}")]
    Watcher(#[from] notify::Error),

    /// Invalid configuration, rejected before any work starts.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias using `IndexError`.
pub type Result<T> = std::result::Result<T, IndexError>;
