use std::str::FromStr;

use super::Config;

/// Parse `SIFT_*` variable `key` into `T`, warning and returning `None` on a bad value.
fn parsed<T: FromStr>(key: &str) -> Option<T> {
    let v = std::env::var(key).ok()?;
    match v.parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!("ignoring invalid {key} value: {v}");
            None
        }
    }
}

/// Parse a lowercase serde enum from `key`.
fn parsed_enum<T: serde::de::DeserializeOwned>(key: &str) -> Option<T> {
    let v = std::env::var(key).ok()?;
    if let Ok(kind) = serde_json::from_value(serde_json::Value::String(v.to_lowercase())) {
        Some(kind)
    } else {
        tracing::warn!("ignoring invalid {key} value: {v}");
        None
    }
}

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_embedding();
        self.apply_env_overrides_store();
        self.apply_env_overrides_index();
    }

    fn apply_env_overrides_embedding(&mut self) {
        if let Some(kind) = parsed_enum("SIFT_EMBEDDING_PROVIDER") {
            self.embedding.provider = kind;
        }
        if let Ok(v) = std::env::var("SIFT_EMBEDDING_MODEL") {
            self.embedding.model = v;
        }
        if let Ok(v) = std::env::var("SIFT_EMBEDDING_BASE_URL") {
            self.embedding.base_url = v;
        }
        if let Ok(v) = std::env::var("SIFT_EMBEDDING_API_KEY") {
            self.embedding.api_key = Some(v);
        }
        if let Some(dims) = parsed("SIFT_EMBEDDING_DIMENSIONS") {
            self.embedding.dimensions = dims;
        }
        if let Some(secs) = parsed("SIFT_EMBEDDING_TIMEOUT") {
            self.embedding.timeout_secs = secs;
        }
    }

    fn apply_env_overrides_store(&mut self) {
        if let Some(backend) = parsed_enum("SIFT_STORE_BACKEND") {
            self.store.backend = backend;
        }
        if let Ok(v) = std::env::var("SIFT_SQLITE_PATH") {
            self.store.sqlite_path = v;
        }
        if let Ok(v) = std::env::var("SIFT_QDRANT_URL") {
            self.store.qdrant_url = v;
        }
    }

    fn apply_env_overrides_index(&mut self) {
        if let Some(size) = parsed("SIFT_INDEX_CHUNK_SIZE") {
            self.index.chunk_size = size;
        }
        if let Some(overlap) = parsed("SIFT_INDEX_CHUNK_OVERLAP") {
            self.index.chunk_overlap = overlap;
        }
        if let Some(batch) = parsed("SIFT_INDEX_BATCH_SIZE") {
            self.index.batch_size = batch;
        }
        if let Some(n) = parsed("SIFT_INDEX_CONCURRENCY") {
            self.index.concurrency = n;
        }
        if let Some(enabled) = parsed("SIFT_INDEX_STRUCTURAL") {
            self.index.structural_chunks = enabled;
        }
        if let Some(n) = parsed("SIFT_SEARCH_MAX_RESULTS") {
            self.search.max_results = n;
        }
        if let Some(threshold) = parsed("SIFT_SEARCH_MIN_SIMILARITY") {
            self.search.min_similarity = threshold;
        }
    }
}
