//! Qdrant backend. Similarity is Qdrant's native cosine distance; the chunk itself
//! travels in the point payload as JSON.

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use qdrant_client::Qdrant;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::vectors_config::Config as VectorsConfigKind;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder,
    DeletePointsBuilder, Distance, FieldType, Filter, PointId, PointStruct, ScrollPointsBuilder,
    SearchPointsBuilder, UpsertPointsBuilder, Value, VectorParamsBuilder,
};

use crate::error::VectorStoreError;
use crate::types::{CollectionSpec, IndexEntry, ScoredChunk, SemanticChunk, StoreStats};
use crate::vector_store::{BoxFuture, VectorStore, check_spec, rank, validate_entries};

const SCROLL_PAGE: u32 = 256;

pub struct QdrantVectorStore {
    client: Qdrant,
    /// Specs verified by `ensure_collection`, consulted on every upsert.
    specs: RwLock<HashMap<String, CollectionSpec>>,
}

impl std::fmt::Debug for QdrantVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantVectorStore").finish_non_exhaustive()
    }
}

/// Deterministic point id for a chunk id, so re-upserting replaces the same point.
#[must_use]
pub fn point_id(chunk_id: &str) -> String {
    uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_OID, chunk_id.as_bytes()).to_string()
}

fn payload_str<'a>(payload: &'a HashMap<String, Value>, key: &str) -> Option<&'a str> {
    match payload.get(key)?.kind.as_ref()? {
        Kind::StringValue(s) => Some(s.as_str()),
        _ => None,
    }
}

fn entry_payload(entry: &IndexEntry) -> Result<HashMap<String, Value>, VectorStoreError> {
    let chunk_json = serde_json::to_string(&entry.chunk)?;
    Ok(HashMap::from([
        ("chunk_id".to_owned(), Value::from(entry.chunk.id.clone())),
        (
            "file_path".to_owned(),
            Value::from(entry.chunk.file_path.clone()),
        ),
        (
            "file_hash".to_owned(),
            Value::from(entry.chunk.file_hash.clone()),
        ),
        ("model".to_owned(), Value::from(entry.model.clone())),
        (
            "indexed_at".to_owned(),
            Value::from(entry.indexed_at.to_rfc3339()),
        ),
        ("chunk".to_owned(), Value::from(chunk_json)),
    ]))
}

fn files_filter(paths: &[String]) -> Filter {
    Filter::should(
        paths
            .iter()
            .map(|p| Condition::matches("file_path", p.clone()))
            .collect::<Vec<_>>(),
    )
}

fn superseded_filter(path: String, current_hash: String) -> Filter {
    Filter {
        must: vec![Condition::matches("file_path", path)],
        must_not: vec![Condition::matches("file_hash", current_hash)],
        ..Filter::default()
    }
}

impl QdrantVectorStore {
    /// # Errors
    ///
    /// Returns an error if the Qdrant client cannot be created.
    pub fn new(url: &str) -> Result<Self, VectorStoreError> {
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| VectorStoreError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            specs: RwLock::new(HashMap::new()),
        })
    }

    async fn exists(&self, collection: &str) -> Result<bool, VectorStoreError> {
        self.client
            .collection_exists(collection)
            .await
            .map_err(|e| VectorStoreError::Connection(e.to_string()))
    }

    async fn vector_size(&self, collection: &str) -> Result<Option<usize>, VectorStoreError> {
        let info = self
            .client
            .collection_info(collection)
            .await
            .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
        let size = info
            .result
            .and_then(|r| r.config)
            .and_then(|c| c.params)
            .and_then(|p| p.vectors_config)
            .and_then(|v| v.config)
            .and_then(|c| match c {
                VectorsConfigKind::Params(p) => Some(p.size),
                VectorsConfigKind::ParamsMap(_) => None,
            });
        size.map(|s| usize::try_from(s).map_err(|e| VectorStoreError::Collection(e.to_string())))
            .transpose()
    }

    /// Payloads of every point in the collection, without vectors.
    async fn scroll_payloads(
        &self,
        collection: &str,
        limit: Option<u32>,
    ) -> Result<Vec<HashMap<String, Value>>, VectorStoreError> {
        let mut out = Vec::new();
        let mut offset: Option<PointId> = None;
        loop {
            let mut builder = ScrollPointsBuilder::new(collection)
                .with_payload(true)
                .with_vectors(false)
                .limit(limit.unwrap_or(SCROLL_PAGE));
            if let Some(off) = offset.take() {
                builder = builder.offset(off);
            }
            let response = self
                .client
                .scroll(builder)
                .await
                .map_err(|e| VectorStoreError::Search(e.to_string()))?;
            out.extend(response.result.into_iter().map(|p| p.payload));
            match response.next_page_offset {
                Some(next) if limit.is_none() => offset = Some(next),
                _ => break,
            }
        }
        Ok(out)
    }

    fn cached_spec(&self, collection: &str) -> Result<Option<CollectionSpec>, VectorStoreError> {
        let specs = self
            .specs
            .read()
            .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
        Ok(specs.get(collection).cloned())
    }

    fn remember_spec(
        &self,
        collection: &str,
        spec: Option<CollectionSpec>,
    ) -> Result<(), VectorStoreError> {
        let mut specs = self
            .specs
            .write()
            .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
        match spec {
            Some(s) => specs.insert(collection.to_owned(), s),
            None => specs.remove(collection),
        };
        Ok(())
    }
}

impl VectorStore for QdrantVectorStore {
    fn ensure_collection(
        &self,
        collection: &str,
        spec: &CollectionSpec,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        let spec = spec.clone();
        Box::pin(async move {
            if self.exists(&collection).await? {
                let dimensions = self
                    .vector_size(&collection)
                    .await?
                    .unwrap_or(spec.dimensions);
                let sample = self.scroll_payloads(&collection, Some(1)).await?;
                let model = sample
                    .first()
                    .and_then(|p| payload_str(p, "model"))
                    .map_or_else(|| spec.model.clone(), str::to_owned);
                check_spec(&collection, &CollectionSpec { model, dimensions }, &spec)?;
                return self.remember_spec(&collection, Some(spec));
            }

            let size = u64::try_from(spec.dimensions)
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&collection)
                        .vectors_config(VectorParamsBuilder::new(size, Distance::Cosine)),
                )
                .await
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            self.client
                .create_field_index(CreateFieldIndexCollectionBuilder::new(
                    &collection,
                    "file_path",
                    FieldType::Keyword,
                ))
                .await
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            tracing::debug!(
                collection = %collection,
                model = %spec.model,
                "qdrant collection created"
            );
            self.remember_spec(&collection, Some(spec))
        })
    }

    fn upsert(
        &self,
        collection: &str,
        entries: Vec<IndexEntry>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let spec = self.cached_spec(&collection)?.ok_or_else(|| {
                VectorStoreError::Upsert(format!("collection {collection} not ensured"))
            })?;
            validate_entries(&collection, &spec, &entries)?;
            if entries.is_empty() {
                return Ok(());
            }

            let points = entries
                .into_iter()
                .map(|e| {
                    let payload = entry_payload(&e)?;
                    Ok(PointStruct::new(point_id(&e.chunk.id), e.vector, payload))
                })
                .collect::<Result<Vec<_>, VectorStoreError>>()?;

            self.client
                .upsert_points(UpsertPointsBuilder::new(&collection, points).wait(true))
                .await
                .map_err(|e| VectorStoreError::Upsert(e.to_string()))?;
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
            if max_results == 0 || !self.exists(&collection).await? {
                return Ok(Vec::new());
            }
            let limit = u64::try_from(max_results).unwrap_or(u64::MAX);
            let response = self
                .client
                .search_points(
                    SearchPointsBuilder::new(&collection, vector, limit)
                        .with_payload(true)
                        .score_threshold(min_similarity),
                )
                .await
                .map_err(|e| VectorStoreError::Search(e.to_string()))?;

            let mut scored = Vec::with_capacity(response.result.len());
            for point in response.result {
                let Some(chunk_json) = payload_str(&point.payload, "chunk") else {
                    tracing::warn!(collection = %collection, "qdrant point without chunk payload");
                    continue;
                };
                let chunk: SemanticChunk = serde_json::from_str(chunk_json)?;
                scored.push(ScoredChunk {
                    chunk_id: chunk.id.clone(),
                    similarity: point.score,
                    chunk,
                });
            }
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
            if paths.is_empty() || !self.exists(&collection).await? {
                return Ok(0);
            }
            let filter = files_filter(&paths);
            let count = self
                .client
                .count(
                    CountPointsBuilder::new(&collection)
                        .filter(filter.clone())
                        .exact(true),
                )
                .await
                .map_err(|e| VectorStoreError::Delete(e.to_string()))?
                .result
                .map_or(0, |r| r.count);
            if count == 0 {
                return Ok(0);
            }
            self.client
                .delete_points(DeletePointsBuilder::new(&collection).points(filter).wait(true))
                .await
                .map_err(|e| VectorStoreError::Delete(e.to_string()))?;
            usize::try_from(count).map_err(|e| VectorStoreError::Delete(e.to_string()))
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
            if !self.exists(&collection).await? {
                return Ok(0);
            }
            let filter = superseded_filter(path, current_hash);
            let count = self
                .client
                .count(
                    CountPointsBuilder::new(&collection)
                        .filter(filter.clone())
                        .exact(true),
                )
                .await
                .map_err(|e| VectorStoreError::Delete(e.to_string()))?
                .result
                .map_or(0, |r| r.count);
            if count == 0 {
                return Ok(0);
            }
            self.client
                .delete_points(DeletePointsBuilder::new(&collection).points(filter).wait(true))
                .await
                .map_err(|e| VectorStoreError::Delete(e.to_string()))?;
            usize::try_from(count).map_err(|e| VectorStoreError::Delete(e.to_string()))
        })
    }

    fn indexed_files(
        &self,
        collection: &str,
    ) -> BoxFuture<'_, Result<Vec<String>, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            if !self.exists(&collection).await? {
                return Ok(Vec::new());
            }
            let files: BTreeSet<String> = self
                .scroll_payloads(&collection, None)
                .await?
                .iter()
                .filter_map(|p| payload_str(p, "file_path").map(str::to_owned))
                .collect();
            Ok(files.into_iter().collect())
        })
    }

    fn file_hashes(
        &self,
        collection: &str,
    ) -> BoxFuture<'_, Result<HashMap<String, String>, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            if !self.exists(&collection).await? {
                return Ok(HashMap::new());
            }
            Ok(self
                .scroll_payloads(&collection, None)
                .await?
                .iter()
                .filter_map(|p| {
                    Some((
                        payload_str(p, "file_path")?.to_owned(),
                        payload_str(p, "file_hash")?.to_owned(),
                    ))
                })
                .collect())
        })
    }

    fn stats(&self, collection: &str) -> BoxFuture<'_, Result<StoreStats, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            if !self.exists(&collection).await? {
                return Ok(StoreStats::default());
            }
            let total = self
                .client
                .count(CountPointsBuilder::new(&collection).exact(true))
                .await
                .map_err(|e| VectorStoreError::Search(e.to_string()))?
                .result
                .map_or(0, |r| r.count);
            let payloads = self.scroll_payloads(&collection, None).await?;
            let files: BTreeSet<&str> = payloads
                .iter()
                .filter_map(|p| payload_str(p, "file_path"))
                .collect();
            let last_indexed = payloads
                .iter()
                .filter_map(|p| payload_str(p, "indexed_at"))
                .filter_map(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc))
                .max();
            let model = payloads
                .iter()
                .find_map(|p| payload_str(p, "model"))
                .map(str::to_owned)
                .or_else(|| self.cached_spec(&collection).ok().flatten().map(|s| s.model));

            Ok(StoreStats {
                total_vectors: usize::try_from(total)
                    .map_err(|e| VectorStoreError::Serialization(e.to_string()))?,
                total_files: files.len(),
                dimensions: self.vector_size(&collection).await?.unwrap_or_default(),
                model,
                last_indexed,
            })
        })
    }

    fn clear(&self, collection: &str) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            if self.exists(&collection).await? {
                self.client
                    .delete_collection(&collection)
                    .await
                    .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            }
            self.remember_spec(&collection, None)
        })
    }
}
