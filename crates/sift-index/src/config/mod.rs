mod env;
mod types;


pub use types::*;

use std::path::Path;
use std::time::Duration;

use crate::cache::EmbeddingCache;
use crate::chunker::ChunkerConfig;
use crate::error::{IndexError, Result};
use crate::indexer::IndexerConfig;
use crate::scanner::ScanConfig;

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns `IndexError::Config` if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|e| {
                IndexError::Config(format!("failed to read {}: {e}", path.display()))
            })?;
            toml::from_str::<Self>(&content).map_err(|e| {
                IndexError::Config(format!("failed to parse {}: {e}", path.display()))
            })?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Reject settings that would fail later or silently corrupt an index.
    ///
    /// # Errors
    ///
    /// Returns `IndexError::Config` naming the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(IndexError::Config(msg.to_owned()));

        if self.embedding.model.trim().is_empty() {
            return invalid("embedding.model must not be empty");
        }
        if self.embedding.dimensions == 0 {
            return invalid("embedding.dimensions must be greater than 0");
        }
        if self.index.chunk_size == 0 {
            return invalid("index.chunk_size must be greater than 0");
        }
        if self.index.chunk_overlap >= self.index.chunk_size {
            return invalid("index.chunk_overlap must be smaller than index.chunk_size");
        }
        if self.index.batch_size == 0 {
            return invalid("index.batch_size must be greater than 0");
        }
        if self.index.concurrency == 0 {
            return invalid("index.concurrency must be greater than 0");
        }
        if self.search.max_results == 0 {
            return invalid("search.max_results must be greater than 0");
        }
        if !(-1.0..=1.0).contains(&self.search.min_similarity) {
            return invalid("search.min_similarity must be within [-1, 1]");
        }
        Ok(())
    }

    #[must_use]
    pub fn chunker_config(&self) -> ChunkerConfig {
        ChunkerConfig {
            chunk_size: self.index.chunk_size,
            chunk_overlap: self.index.chunk_overlap,
            structural: self.index.structural_chunks,
        }
    }

    #[must_use]
    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            extensions: self.index.supported_extensions.clone(),
            exclude: self.index.exclude_patterns.clone(),
            max_file_bytes: self.index.max_file_bytes,
        }
    }

    #[must_use]
    pub fn indexer_config(&self) -> IndexerConfig {
        IndexerConfig {
            chunker: self.chunker_config(),
            scan: self.scan_config(),
            batch_size: self.index.batch_size,
            concurrency: self.index.concurrency,
        }
    }

    #[must_use]
    pub fn embedding_cache(&self) -> EmbeddingCache {
        EmbeddingCache::new(
            Duration::from_secs(self.index.cache_ttl_secs),
            self.index.cache_capacity,
        )
    }

    #[must_use]
    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_secs(self.embedding.timeout_secs)
    }

    /// Store collection holding the chunks of `project`.
    #[must_use]
    pub fn collection_name(&self, project: &str) -> String {
        format!("{}{project}", self.store.collection_prefix)
    }
}
