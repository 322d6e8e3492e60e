use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use crate::error::VectorStoreError;
use crate::types::{CollectionSpec, IndexEntry, ScoredChunk, StoreStats};
use crate::vector_store::{
    BoxFuture, VectorStore, check_spec, cosine_similarity, rank, validate_entries,
};

struct StoredEntry {
    /// Insertion sequence; kept across upserts of the same id.
    seq: u64,
    entry: IndexEntry,
}

struct InMemoryCollection {
    spec: CollectionSpec,
    entries: HashMap<String, StoredEntry>,
    next_seq: u64,
}

/// Process-local store; contents are lost when it is dropped.
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, InMemoryCollection>>,
}

impl InMemoryVectorStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryVectorStore").finish_non_exhaustive()
    }
}

fn poisoned(e: impl std::fmt::Display) -> VectorStoreError {
    VectorStoreError::Collection(format!("lock poisoned: {e}"))
}

impl VectorStore for InMemoryVectorStore {
    fn ensure_collection(
        &self,
        collection: &str,
        spec: &CollectionSpec,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        let spec = spec.clone();
        Box::pin(async move {
            let mut cols = self.collections.write().map_err(poisoned)?;
            if let Some(existing) = cols.get(&collection) {
                return check_spec(&collection, &existing.spec, &spec);
            }
            cols.insert(
                collection,
                InMemoryCollection {
                    spec,
                    entries: HashMap::new(),
                    next_seq: 0,
                },
            );
            Ok(())
        })
    }

    fn upsert(
        &self,
        collection: &str,
        entries: Vec<IndexEntry>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut cols = self.collections.write().map_err(poisoned)?;
            let col = cols.get_mut(&collection).ok_or_else(|| {
                VectorStoreError::Upsert(format!("collection {collection} not found"))
            })?;
            validate_entries(&collection, &col.spec, &entries)?;
            for entry in entries {
                let id = entry.chunk.id.clone();
                if let Some(existing) = col.entries.get_mut(&id) {
                    existing.entry = entry;
                } else {
                    let seq = col.next_seq;
                    col.next_seq += 1;
                    col.entries.insert(id, StoredEntry { seq, entry });
                }
            }
            Ok(())
        })
    }

    fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        max_results: usize,
        min_similarity: f32,
    ) -> BoxFuture<'_, Result<Vec<ScoredChunk>, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let cols = self.collections.read().map_err(poisoned)?;
            let Some(col) = cols.get(&collection) else {
                return Ok(Vec::new());
            };

            let mut ordered: Vec<&StoredEntry> = col.entries.values().collect();
            ordered.sort_by_key(|s| s.seq);

            let mut scored: Vec<ScoredChunk> = ordered
                .into_iter()
                .filter_map(|s| {
                    let similarity = cosine_similarity(&vector, &s.entry.vector);
                    (similarity >= min_similarity).then(|| ScoredChunk {
                        chunk_id: s.entry.chunk.id.clone(),
                        similarity,
                        chunk: s.entry.chunk.clone(),
                    })
                })
                .collect();
            rank(&mut scored, max_results);
            Ok(scored)
        })
    }

    fn delete_by_files(
        &self,
        collection: &str,
        paths: Vec<String>,
    ) -> BoxFuture<'_, Result<usize, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut cols = self.collections.write().map_err(poisoned)?;
            let Some(col) = cols.get_mut(&collection) else {
                return Ok(0);
            };
            let before = col.entries.len();
            col.entries
                .retain(|_, s| !paths.iter().any(|p| *p == s.entry.chunk.file_path));
            Ok(before - col.entries.len())
        })
    }

    fn delete_superseded(
        &self,
        collection: &str,
        path: String,
        current_hash: String,
    ) -> BoxFuture<'_, Result<usize, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut cols = self.collections.write().map_err(poisoned)?;
            let Some(col) = cols.get_mut(&collection) else {
                return Ok(0);
            };
            let before = col.entries.len();
            col.entries.retain(|_, s| {
                s.entry.chunk.file_path != path || s.entry.chunk.file_hash == current_hash
            });
            Ok(before - col.entries.len())
        })
    }

    fn indexed_files(
        &self,
        collection: &str,
    ) -> BoxFuture<'_, Result<Vec<String>, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let cols = self.collections.read().map_err(poisoned)?;
            let files: BTreeSet<String> = cols
                .get(&collection)
                .map(|col| {
                    col.entries
                        .values()
                        .map(|s| s.entry.chunk.file_path.clone())
                        .collect()
                })
                .unwrap_or_default();
            Ok(files.into_iter().collect())
        })
    }

    fn file_hashes(
        &self,
        collection: &str,
    ) -> BoxFuture<'_, Result<HashMap<String, String>, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let cols = self.collections.read().map_err(poisoned)?;
            Ok(cols
                .get(&collection)
                .map(|col| {
                    col.entries
                        .values()
                        .map(|s| {
                            (
                                s.entry.chunk.file_path.clone(),
                                s.entry.chunk.file_hash.clone(),
                            )
                        })
                        .collect()
                })
                .unwrap_or_default())
        })
    }

    fn stats(&self, collection: &str) -> BoxFuture<'_, Result<StoreStats, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let cols = self.collections.read().map_err(poisoned)?;
            let Some(col) = cols.get(&collection) else {
                return Ok(StoreStats::default());
            };
            let files: BTreeSet<&str> = col
                .entries
                .values()
                .map(|s| s.entry.chunk.file_path.as_str())
                .collect();
            Ok(StoreStats {
                total_vectors: col.entries.len(),
                total_files: files.len(),
                dimensions: col.spec.dimensions,
                model: Some(col.spec.model.clone()),
                last_indexed: col.entries.values().map(|s| s.entry.indexed_at).max(),
            })
        })
    }

    fn clear(&self, collection: &str) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut cols = self.collections.write().map_err(poisoned)?;
            cols.remove(&collection);
            Ok(())
        })
    }
}
