//! Persistent store on `SQLite`. Vectors are little-endian `f32` blobs; similarity is
//! computed in process over the rows of one collection.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::error::VectorStoreError;
use crate::types::{CollectionSpec, IndexEntry, ScoredChunk, SemanticChunk, StoreStats};
use crate::vector_store::{
    BoxFuture, VectorStore, check_spec, cosine_similarity, rank, validate_entries,
};

#[derive(Debug, Clone)]
pub struct SqliteVectorStore {
    pool: SqlitePool,
}

impl SqliteVectorStore {
    /// Open (or create) the database at `path` and run migrations.
    ///
    /// `":memory:"` opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrations fail.
    pub async fn new(path: &str) -> Result<Self, VectorStoreError> {
        let (url, max_connections) = if path == ":memory:" {
            ("sqlite::memory:".to_string(), 1)
        } else {
            (format!("sqlite:{path}?mode=rwc"), 5)
        };

        let opts = SqliteConnectOptions::from_str(&url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        // An in-memory database lives only as long as its single connection.
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await
            .map_err(|e| VectorStoreError::Connection(e.to_string()))?;

        sqlx::migrate!().run(&pool).await?;

        Ok(Self { pool })
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn collection_spec(
        &self,
        collection: &str,
    ) -> Result<Option<CollectionSpec>, VectorStoreError> {
        let row: Option<(String, i64)> =
            sqlx::query_as("SELECT model, dimensions FROM collections WHERE name = ?")
                .bind(collection)
                .fetch_optional(&self.pool)
                .await?;
        row.map(|(model, dims)| {
            let dimensions = usize::try_from(dims)
                .map_err(|e| VectorStoreError::Serialization(e.to_string()))?;
            Ok(CollectionSpec { model, dimensions })
        })
        .transpose()
    }
}

pub(crate) fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub(crate) fn blob_to_vector(blob: &[u8]) -> Result<Vec<f32>, VectorStoreError> {
    if blob.len() % 4 != 0 {
        return Err(VectorStoreError::Serialization(format!(
            "vector blob length {} is not a multiple of 4",
            blob.len()
        )));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, VectorStoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| VectorStoreError::Serialization(format!("bad timestamp {s:?}: {e}")))
}

impl VectorStore for SqliteVectorStore {
    fn ensure_collection(
        &self,
        collection: &str,
        spec: &CollectionSpec,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        let spec = spec.clone();
        Box::pin(async move {
            if let Some(stored) = self.collection_spec(&collection).await? {
                return check_spec(&collection, &stored, &spec);
            }
            let dims = i64::try_from(spec.dimensions)
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            sqlx::query(
                "INSERT INTO collections (name, model, dimensions) VALUES (?, ?, ?) \
                 ON CONFLICT(name) DO NOTHING",
            )
            .bind(&collection)
            .bind(&spec.model)
            .bind(dims)
            .execute(&self.pool)
            .await?;
            tracing::debug!(
                collection = %collection,
                model = %spec.model,
                dimensions = spec.dimensions,
                "collection created"
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
            let spec = self.collection_spec(&collection).await?.ok_or_else(|| {
                VectorStoreError::Upsert(format!("collection {collection} not found"))
            })?;
            validate_entries(&collection, &spec, &entries)?;

            let mut tx = self.pool.begin().await?;
            for entry in &entries {
                let chunk_json = serde_json::to_string(&entry.chunk)?;
                sqlx::query(
                    "INSERT INTO chunks \
                     (collection, chunk_id, file_path, file_hash, chunk, vector, model, indexed_at) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
                     ON CONFLICT(collection, chunk_id) DO UPDATE SET \
                     file_path = excluded.file_path, file_hash = excluded.file_hash, \
                     chunk = excluded.chunk, vector = excluded.vector, \
                     model = excluded.model, indexed_at = excluded.indexed_at",
                )
                .bind(&collection)
                .bind(&entry.chunk.id)
                .bind(&entry.chunk.file_path)
                .bind(&entry.chunk.file_hash)
                .bind(chunk_json)
                .bind(vector_to_blob(&entry.vector))
                .bind(&entry.model)
                .bind(format_timestamp(entry.indexed_at))
                .execute(&mut *tx)
                .await
                .map_err(|e| VectorStoreError::Upsert(e.to_string()))?;
            }
            tx.commit().await?;
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
            let rows: Vec<(String, String, Vec<u8>)> = sqlx::query_as(
                "SELECT chunk_id, chunk, vector FROM chunks WHERE collection = ? ORDER BY seq",
            )
            .bind(&collection)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| VectorStoreError::Search(e.to_string()))?;

            let mut scored = Vec::new();
            for (chunk_id, chunk_json, blob) in rows {
                let similarity = cosine_similarity(&vector, &blob_to_vector(&blob)?);
                if similarity < min_similarity {
                    continue;
                }
                let chunk: SemanticChunk = serde_json::from_str(&chunk_json)?;
                scored.push(ScoredChunk {
                    chunk_id,
                    similarity,
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
            let mut tx = self.pool.begin().await?;
            let mut removed = 0u64;
            for path in &paths {
                let result =
                    sqlx::query("DELETE FROM chunks WHERE collection = ? AND file_path = ?")
                        .bind(&collection)
                        .bind(path)
                        .execute(&mut *tx)
                        .await
                        .map_err(|e| VectorStoreError::Delete(e.to_string()))?;
                removed += result.rows_affected();
            }
            tx.commit().await?;
            usize::try_from(removed).map_err(|e| VectorStoreError::Delete(e.to_string()))
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
            let result = sqlx::query(
                "DELETE FROM chunks WHERE collection = ? AND file_path = ? AND file_hash != ?",
            )
            .bind(&collection)
            .bind(&path)
            .bind(&current_hash)
            .execute(&self.pool)
            .await
            .map_err(|e| VectorStoreError::Delete(e.to_string()))?;
            usize::try_from(result.rows_affected())
                .map_err(|e| VectorStoreError::Delete(e.to_string()))
        })
    }

    fn indexed_files(
        &self,
        collection: &str,
    ) -> BoxFuture<'_, Result<Vec<String>, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let files: Vec<String> = sqlx::query_scalar(
                "SELECT DISTINCT file_path FROM chunks WHERE collection = ? ORDER BY file_path",
            )
            .bind(&collection)
            .fetch_all(&self.pool)
            .await?;
            Ok(files)
        })
    }

    fn file_hashes(
        &self,
        collection: &str,
    ) -> BoxFuture<'_, Result<HashMap<String, String>, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let rows: Vec<(String, String)> = sqlx::query_as(
                "SELECT file_path, file_hash FROM chunks WHERE collection = ? \
                 GROUP BY file_path, file_hash",
            )
            .bind(&collection)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows.into_iter().collect())
        })
    }

    fn stats(&self, collection: &str) -> BoxFuture<'_, Result<StoreStats, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let Some(spec) = self.collection_spec(&collection).await? else {
                return Ok(StoreStats::default());
            };
            let (vectors, files, last): (i64, i64, Option<String>) = sqlx::query_as(
                "SELECT COUNT(*), COUNT(DISTINCT file_path), MAX(indexed_at) \
                 FROM chunks WHERE collection = ?",
            )
            .bind(&collection)
            .fetch_one(&self.pool)
            .await?;
            let to_usize =
                |v: i64| usize::try_from(v).map_err(|e| VectorStoreError::Serialization(e.to_string()));
            Ok(StoreStats {
                total_vectors: to_usize(vectors)?,
                total_files: to_usize(files)?,
                dimensions: spec.dimensions,
                model: Some(spec.model),
                last_indexed: last.as_deref().map(parse_timestamp).transpose()?,
            })
        })
    }

    fn clear(&self, collection: &str) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            sqlx::query("DELETE FROM chunks WHERE collection = ?")
                .bind(&collection)
                .execute(&mut *tx)
                .await
                .map_err(|e| VectorStoreError::Delete(e.to_string()))?;
            sqlx::query("DELETE FROM collections WHERE name = ?")
                .bind(&collection)
                .execute(&mut *tx)
                .await
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            tx.commit().await?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_store::test_support::entry;

    async fn memory_store() -> SqliteVectorStore {
        let store = SqliteVectorStore::new(":memory:").await.unwrap();
        store
            .ensure_collection("p", &CollectionSpec::new("test-model", 3))
            .await
            .unwrap();
        store
    }

    #[test]
    fn blob_roundtrip_preserves_values() {
        let v = vec![0.25f32, -1.5, 3.0e-7];
        assert_eq!(blob_to_vector(&vector_to_blob(&v)).unwrap(), v);
    }

    #[test]
    fn blob_with_bad_length_rejected() {
        assert!(blob_to_vector(&[0, 1, 2]).is_err());
    }

    #[tokio::test]
    async fn wal_journal_mode_enabled_on_file_db() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.db");
        let store = SqliteVectorStore::new(path.to_str().unwrap()).await.unwrap();
        let mode: String = sqlx::query_scalar("PRAGMA journal_mode")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(mode, "wal");
    }

    #[tokio::test]
    async fn upsert_search_roundtrip() {
        let store = memory_store().await;
        store
            .upsert(
                "p",
                vec![
                    entry("a", "a.rs", vec![1.0, 0.0, 0.0]),
                    entry("b", "b.rs", vec![0.0, 1.0, 0.0]),
                ],
            )
            .await
            .unwrap();

        let results = store.search("p", vec![1.0, 0.1, 0.0], 10, 0.5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk_id, "a");
        assert_eq!(results[0].chunk.file_path, "a.rs");
    }

    #[tokio::test]
    async fn upsert_keeps_row_position_for_ties() {
        let store = memory_store().await;
        store
            .upsert(
                "p",
                vec![
                    entry("first", "a.rs", vec![1.0, 0.0, 0.0]),
                    entry("second", "b.rs", vec![1.0, 0.0, 0.0]),
                ],
            )
            .await
            .unwrap();
        store
            .upsert("p", vec![entry("first", "a.rs", vec![3.0, 0.0, 0.0])])
            .await
            .unwrap();

        let results = store.search("p", vec![1.0, 0.0, 0.0], 10, 0.0).await.unwrap();
        let ids: Vec<_> = results.iter().map(|r| r.chunk_id.as_str()).collect();
        assert_eq!(ids, ["first", "second"]);
        assert_eq!(store.stats("p").await.unwrap().total_vectors, 2);
    }

    #[tokio::test]
    async fn refuses_model_switch() {
        let store = memory_store().await;
        let err = store
            .ensure_collection("p", &CollectionSpec::new("other", 3))
            .await
            .unwrap_err();
        assert!(matches!(err, VectorStoreError::ModelMismatch { .. }));
    }

    #[tokio::test]
    async fn delete_and_stats() {
        let store = memory_store().await;
        store
            .upsert(
                "p",
                vec![
                    entry("a1", "a.rs", vec![1.0, 0.0, 0.0]),
                    entry("a2", "a.rs", vec![0.0, 1.0, 0.0]),
                    entry("b1", "b.rs", vec![0.0, 0.0, 1.0]),
                ],
            )
            .await
            .unwrap();

        let removed = store.delete_by_files("p", vec!["a.rs".into()]).await.unwrap();
        assert_eq!(removed, 2);

        let stats = store.stats("p").await.unwrap();
        assert_eq!(stats.total_vectors, 1);
        assert_eq!(stats.total_files, 1);
        assert!(stats.last_indexed.is_some());
        assert_eq!(store.indexed_files("p").await.unwrap(), vec!["b.rs"]);
        assert_eq!(
            store.file_hashes("p").await.unwrap().get("b.rs").map(String::as_str),
            Some("fhash-b.rs")
        );
    }

    #[tokio::test]
    async fn delete_superseded_keeps_current_version() {
        let store = memory_store().await;
        let mut newer = entry("a3", "a.rs", vec![1.0, 1.0, 0.0]);
        newer.chunk.file_hash = "fhash-a.rs-v2".into();
        store
            .upsert(
                "p",
                vec![
                    entry("a1", "a.rs", vec![1.0, 0.0, 0.0]),
                    entry("a2", "a.rs", vec![0.0, 1.0, 0.0]),
                    newer,
                    entry("b1", "b.rs", vec![0.0, 0.0, 1.0]),
                ],
            )
            .await
            .unwrap();

        let removed = store
            .delete_superseded("p", "a.rs".into(), "fhash-a.rs-v2".into())
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.stats("p").await.unwrap().total_vectors, 2);
        let hashes = store.file_hashes("p").await.unwrap();
        assert_eq!(hashes["a.rs"], "fhash-a.rs-v2");
        assert_eq!(hashes["b.rs"], "fhash-b.rs");
    }

    #[tokio::test]
    async fn collections_are_isolated() {
        let store = memory_store().await;
        store
            .ensure_collection("q", &CollectionSpec::new("test-model", 3))
            .await
            .unwrap();
        store
            .upsert("p", vec![entry("a", "a.rs", vec![1.0, 0.0, 0.0])])
            .await
            .unwrap();
        assert!(store.search("q", vec![1.0, 0.0, 0.0], 10, 0.0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn clear_empties_collection() {
        let store = memory_store().await;
        store
            .upsert("p", vec![entry("a", "a.rs", vec![1.0, 0.0, 0.0])])
            .await
            .unwrap();
        store.clear("p").await.unwrap();
        assert_eq!(store.stats("p").await.unwrap(), StoreStats::default());
        assert!(store.search("p", vec![1.0, 0.0, 0.0], 10, 0.0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.db");
        let path = path.to_str().unwrap();
        {
            let store = SqliteVectorStore::new(path).await.unwrap();
            store
                .ensure_collection("p", &CollectionSpec::new("test-model", 3))
                .await
                .unwrap();
            store
                .upsert("p", vec![entry("a", "a.rs", vec![1.0, 0.0, 0.0])])
                .await
                .unwrap();
            store.pool().close().await;
        }
        let store = SqliteVectorStore::new(path).await.unwrap();
        assert_eq!(store.stats("p").await.unwrap().total_vectors, 1);
    }
}
