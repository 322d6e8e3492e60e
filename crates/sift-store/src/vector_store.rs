use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use crate::error::VectorStoreError;
use crate::types::{CollectionSpec, IndexEntry, ScoredChunk, StoreStats};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Persists `(chunk, vector)` pairs per collection and answers similarity queries.
///
/// A collection corresponds to one project. Operations on a collection that was
/// never created behave as on an empty one, except `upsert`, which requires
/// [`VectorStore::ensure_collection`] first.
pub trait VectorStore: Send + Sync {
    /// Create the collection or verify that its recorded model and dimension match `spec`.
    fn ensure_collection(
        &self,
        collection: &str,
        spec: &CollectionSpec,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>>;

    /// Insert or replace entries keyed by chunk id.
    fn upsert(
        &self,
        collection: &str,
        entries: Vec<IndexEntry>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>>;

    /// Entries with `similarity >= min_similarity`, best first, ties in insertion order.
    fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        max_results: usize,
        min_similarity: f32,
    ) -> BoxFuture<'_, Result<Vec<ScoredChunk>, VectorStoreError>>;

    /// Remove every chunk whose file path is in `paths`. Returns the number removed.
    fn delete_by_files(
        &self,
        collection: &str,
        paths: Vec<String>,
    ) -> BoxFuture<'_, Result<usize, VectorStoreError>>;

    /// Remove chunks of `path` whose file hash differs from `current_hash`, leaving the
    /// chunks of the current version in place. Returns the number removed.
    fn delete_superseded(
        &self,
        collection: &str,
        path: String,
        current_hash: String,
    ) -> BoxFuture<'_, Result<usize, VectorStoreError>>;

    fn indexed_files(&self, collection: &str) -> BoxFuture<'_, Result<Vec<String>, VectorStoreError>>;

    /// File path to the content hash of the file its stored chunks were cut from.
    fn file_hashes(
        &self,
        collection: &str,
    ) -> BoxFuture<'_, Result<HashMap<String, String>, VectorStoreError>>;

    fn stats(&self, collection: &str) -> BoxFuture<'_, Result<StoreStats, VectorStoreError>>;

    /// Drop all entries and the recorded model of the collection.
    fn clear(&self, collection: &str) -> BoxFuture<'_, Result<(), VectorStoreError>>;
}

/// `dot(a, b) / (|a| * |b|)`; 0.0 for a zero-magnitude input or mismatched lengths.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Reject entries that would corrupt ranking in a collection described by `spec`.
pub(crate) fn validate_entries(
    collection: &str,
    spec: &CollectionSpec,
    entries: &[IndexEntry],
) -> Result<(), VectorStoreError> {
    for entry in entries {
        if entry.model != spec.model {
            return Err(VectorStoreError::ModelMismatch {
                collection: collection.to_owned(),
                stored: spec.model.clone(),
                requested: entry.model.clone(),
            });
        }
        if entry.vector.len() != spec.dimensions {
            return Err(VectorStoreError::DimensionMismatch {
                expected: spec.dimensions,
                actual: entry.vector.len(),
            });
        }
        if entry.vector.iter().all(|v| *v == 0.0) {
            return Err(VectorStoreError::DegenerateVector(entry.chunk.id.clone()));
        }
    }
    Ok(())
}

/// Compare a stored collection spec against a requested one.
pub(crate) fn check_spec(
    collection: &str,
    stored: &CollectionSpec,
    requested: &CollectionSpec,
) -> Result<(), VectorStoreError> {
    if stored.model != requested.model {
        return Err(VectorStoreError::ModelMismatch {
            collection: collection.to_owned(),
            stored: stored.model.clone(),
            requested: requested.model.clone(),
        });
    }
    if stored.dimensions != requested.dimensions {
        return Err(VectorStoreError::DimensionMismatch {
            expected: stored.dimensions,
            actual: requested.dimensions,
        });
    }
    Ok(())
}

/// Sort by descending similarity; `sort_by` is stable so equal scores keep input order.
pub(crate) fn rank(scored: &mut Vec<ScoredChunk>, max_results: usize) {
    scored.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    scored.truncate(max_results);
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::types::{ChunkKind, ChunkMetadata, IndexEntry, SemanticChunk};

    pub fn entry(id: &str, file: &str, vector: Vec<f32>) -> IndexEntry {
        let chunk = SemanticChunk {
            id: id.into(),
            file_path: file.into(),
            content: format!("content of {id}"),
            start_line: 1,
            end_line: 1,
            chunk_index: 0,
            is_full_file: true,
            content_hash: format!("hash-{id}"),
            file_hash: format!("fhash-{file}"),
            kind: ChunkKind::File,
            metadata: ChunkMetadata::default(),
        };
        IndexEntry::new(chunk, vector, "test-model")
    }
}
