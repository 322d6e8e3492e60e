//! Project indexing orchestrator: scan → chunk → embed → store.

use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use sift_embed::EmbeddingProvider;
use sift_store::{CollectionSpec, IndexEntry, StoreStats, VectorStore};
use tokio_util::sync::CancellationToken;

use crate::chunker::{ChunkerConfig, chunk_file, file_hash};
use crate::embedder::CachedEmbedder;
use crate::error::{IndexError, Result};
use crate::scanner::{PathFilter, ScanConfig, scan};

/// Prepended to the file hash stored with a file whose chunks were only partly embedded.
pub const PARTIAL_HASH_PREFIX: &str = "partial:";

/// Indexer configuration.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub chunker: ChunkerConfig,
    pub scan: ScanConfig,
    /// Files per batch. Batches run one after another.
    pub batch_size: usize,
    /// Files processed concurrently within a batch.
    pub concurrency: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            chunker: ChunkerConfig::default(),
            scan: ScanConfig::default(),
            batch_size: 50,
            concurrency: 4,
        }
    }
}

/// Summary of an indexing run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexReport {
    pub files_scanned: usize,
    pub files_indexed: usize,
    /// Stored file hash matched; nothing was re-embedded.
    pub files_unchanged: usize,
    pub files_skipped: usize,
    pub chunks_stored: usize,
    pub chunks_skipped: usize,
    pub chunks_removed: usize,
    /// One `"{file}: {reason}"` line per skipped file.
    pub errors: Vec<String>,
    /// The run stopped early between batches.
    pub cancelled: bool,
    pub duration_ms: u64,
}

/// Per-project counters exposed in search responses.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndexStats {
    pub total_files: usize,
    pub total_chunks: usize,
    pub last_updated: Option<DateTime<Utc>>,
}

impl From<StoreStats> for IndexStats {
    fn from(s: StoreStats) -> Self {
        Self {
            total_files: s.total_files,
            total_chunks: s.total_vectors,
            last_updated: s.last_indexed,
        }
    }
}

enum FileOutcome {
    Indexed {
        stored: usize,
        skipped: usize,
        removed: usize,
    },
    Unchanged,
    /// Every chunk failed to embed; previously stored chunks are kept.
    NotEmbedded { skipped: usize, reason: String },
}

impl IndexReport {
    fn record(&mut self, file: &str, outcome: Result<FileOutcome>) {
        match outcome {
            Ok(FileOutcome::Indexed {
                stored,
                skipped,
                removed,
            }) => {
                self.files_indexed += 1;
                self.chunks_stored += stored;
                self.chunks_skipped += skipped;
                self.chunks_removed += removed;
            }
            Ok(FileOutcome::Unchanged) => self.files_unchanged += 1,
            Ok(FileOutcome::NotEmbedded { skipped, reason }) => {
                tracing::warn!(file, skipped, "skipping file: {reason}");
                self.files_skipped += 1;
                self.chunks_skipped += skipped;
                self.errors.push(format!("{file}: {reason}"));
            }
            Err(e) => {
                tracing::warn!(file, "skipping file: {e}");
                self.files_skipped += 1;
                self.errors.push(format!("{file}: {e}"));
            }
        }
    }
}

/// Keeps one store collection per project in sync with a directory tree.
pub struct Indexer<P> {
    store: Arc<dyn VectorStore>,
    embedder: Arc<CachedEmbedder<P>>,
    config: IndexerConfig,
    stats: RwLock<HashMap<String, IndexStats>>,
}

impl<P: EmbeddingProvider> Indexer<P> {
    #[must_use]
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<CachedEmbedder<P>>,
        config: IndexerConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            config,
            stats: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    /// Index every eligible file under `root`, skipping files whose content is unchanged
    /// and dropping chunks of files that no longer exist.
    ///
    /// Cancellation is checked before each batch, so a batch that started always finishes.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be prepared (including a model or
    /// dimension mismatch), `root` cannot be walked, or the store fails outside
    /// per-file work. Per-file failures are reported in [`IndexReport::errors`].
    pub async fn initialize_project(
        &self,
        collection: &str,
        root: &Path,
        cancel: &CancellationToken,
    ) -> Result<IndexReport> {
        let start = Instant::now();
        let mut report = IndexReport::default();

        self.ensure_collection(collection).await?;
        let root = root.canonicalize()?;
        let files = scan(&root, &self.config.scan)?;
        report.files_scanned = files.len();
        tracing::info!(project = collection, files = files.len(), "indexing started");

        let current: HashSet<String> = files.iter().map(|p| relative_path(&root, p)).collect();
        self.index_paths(collection, &root, &files, cancel, &mut report)
            .await?;

        if !report.cancelled {
            let stale: Vec<String> = self
                .store
                .indexed_files(collection)
                .await?
                .into_iter()
                .filter(|f| !current.contains(f))
                .collect();
            if !stale.is_empty() {
                let removed = self.store.delete_by_files(collection, stale.clone()).await?;
                tracing::info!(
                    project = collection,
                    files = stale.len(),
                    chunks = removed,
                    "pruned deleted files"
                );
                report.chunks_removed += removed;
            }
        }

        let stats = self.refresh_stats(collection).await?;
        report.duration_ms = elapsed_ms(start);
        tracing::info!(
            project = collection,
            indexed = report.files_indexed,
            unchanged = report.files_unchanged,
            skipped = report.files_skipped,
            chunks = stats.total_chunks,
            elapsed_ms = report.duration_ms,
            cancelled = report.cancelled,
            "indexing finished"
        );
        Ok(report)
    }

    /// Re-index only `paths`. Relative paths are resolved against `root`. Paths that no
    /// longer exist, or that a full scan would skip, have their chunks removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be prepared or the store fails outside
    /// per-file work.
    pub async fn update_files(
        &self,
        collection: &str,
        root: &Path,
        paths: &[PathBuf],
    ) -> Result<IndexReport> {
        let start = Instant::now();
        let mut report = IndexReport::default();

        self.ensure_collection(collection).await?;
        let root = root.canonicalize()?;

        let filter = PathFilter::new(&root, &self.config.scan)?;
        let mut present = Vec::new();
        let mut vanished = Vec::new();
        for path in paths {
            let abs = absolute(&root, path);
            let abs = abs.canonicalize().unwrap_or(abs);
            if !abs.is_file() {
                vanished.push(relative_path(&root, &abs));
            } else if filter.accepts(&abs) {
                present.push(abs);
            } else {
                // A full scan would not yield it either, so it leaves the index.
                tracing::debug!(file = %abs.display(), "not indexable, dropping");
                vanished.push(relative_path(&root, &abs));
            }
        }
        report.files_scanned = present.len();

        if !vanished.is_empty() {
            report.chunks_removed += self.store.delete_by_files(collection, vanished).await?;
        }
        self.index_paths(
            collection,
            &root,
            &present,
            &CancellationToken::new(),
            &mut report,
        )
        .await?;

        self.refresh_stats(collection).await?;
        report.duration_ms = elapsed_ms(start);
        tracing::debug!(
            project = collection,
            files = paths.len(),
            chunks = report.chunks_stored,
            elapsed_ms = report.duration_ms,
            "files updated"
        );
        Ok(report)
    }

    /// Delete every chunk of `paths`. Returns the number of chunks removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn remove_files(
        &self,
        collection: &str,
        root: &Path,
        paths: &[PathBuf],
    ) -> Result<usize> {
        let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        let rels: Vec<String> = paths
            .iter()
            .map(|p| relative_path(&root, &absolute(&root, p)))
            .collect();
        let removed = self.store.delete_by_files(collection, rels).await?;
        self.refresh_stats(collection).await?;
        tracing::info!(
            project = collection,
            files = paths.len(),
            chunks = removed,
            "files removed"
        );
        Ok(removed)
    }

    /// Read statistics from the store and remember them for [`Indexer::cached_stats`].
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn refresh_stats(&self, collection: &str) -> Result<IndexStats> {
        let stats = IndexStats::from(self.store.stats(collection).await?);
        self.stats
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(collection.to_owned(), stats.clone());
        Ok(stats)
    }

    /// Statistics as of the last completed batch, without touching the store.
    #[must_use]
    pub fn cached_stats(&self, collection: &str) -> Option<IndexStats> {
        self.stats
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(collection)
            .cloned()
    }

    /// Drop every chunk of the project along with its recorded model.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn clear(&self, collection: &str) -> Result<()> {
        self.store.clear(collection).await?;
        self.stats
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(collection);
        tracing::info!(project = collection, "index cleared");
        Ok(())
    }

    async fn ensure_collection(&self, collection: &str) -> Result<()> {
        let spec = CollectionSpec::new(self.embedder.model(), self.embedder.dimensions());
        self.store.ensure_collection(collection, &spec).await?;
        Ok(())
    }

    async fn index_paths(
        &self,
        collection: &str,
        root: &Path,
        files: &[PathBuf],
        cancel: &CancellationToken,
        report: &mut IndexReport,
    ) -> Result<()> {
        if files.is_empty() {
            return Ok(());
        }
        let known = self.store.file_hashes(collection).await?;
        let total = files.len();
        let mut done = 0usize;

        for batch in files.chunks(self.config.batch_size.max(1)) {
            if cancel.is_cancelled() {
                tracing::info!(
                    project = collection,
                    progress = format_args!("{done}/{total}"),
                    "indexing cancelled"
                );
                report.cancelled = true;
                break;
            }

            let jobs: Vec<_> = batch
                .iter()
                .map(|abs| {
                    let rel = relative_path(root, abs);
                    let previous = known.get(&rel).cloned();
                    self.process_file(collection, abs, rel, previous)
                })
                .collect();
            let outcomes: Vec<(String, Result<FileOutcome>)> = stream::iter(jobs)
                .buffer_unordered(self.config.concurrency.max(1))
                .collect()
                .await;

            for (rel, outcome) in outcomes {
                report.record(&rel, outcome);
            }
            done += batch.len();

            let stats = self.refresh_stats(collection).await?;
            tracing::info!(
                project = collection,
                progress = format_args!("{done}/{total}"),
                chunks = stats.total_chunks,
                "batch indexed"
            );
        }
        Ok(())
    }

    async fn process_file(
        &self,
        collection: &str,
        abs: &Path,
        rel: String,
        previous_hash: Option<String>,
    ) -> (String, Result<FileOutcome>) {
        let outcome = self
            .index_file(collection, abs, &rel, previous_hash.as_deref())
            .await;
        (rel, outcome)
    }

    async fn index_file(
        &self,
        collection: &str,
        abs: &Path,
        rel: &str,
        previous_hash: Option<&str>,
    ) -> Result<FileOutcome> {
        let content = tokio::fs::read_to_string(abs).await?;
        let hash = file_hash(&content);
        if previous_hash == Some(hash.as_str()) {
            tracing::debug!(file = rel, "unchanged");
            return Ok(FileOutcome::Unchanged);
        }

        let chunks = chunk_file(rel, &content, &hash, &self.config.chunker);
        let vectors = self.embedder.embed_chunks(&chunks).await;

        let model = self.embedder.model();
        let mut entries = Vec::with_capacity(chunks.len());
        let mut skipped = 0usize;
        let mut last_error = None;
        for (chunk, vector) in chunks.into_iter().zip(vectors) {
            match vector {
                Ok(vector) => entries.push(IndexEntry::new(chunk, vector, model)),
                Err(e) => {
                    tracing::warn!(file = rel, chunk = chunk.chunk_index, "embedding failed: {e}");
                    skipped += 1;
                    last_error = Some(e);
                }
            }
        }

        if entries.is_empty() && skipped > 0 {
            let reason = last_error.map_or_else(String::new, |e| format!("embedding failed: {e}"));
            return Ok(FileOutcome::NotEmbedded { skipped, reason });
        }

        // A partly embedded file must not look unchanged on the next run.
        let stored_hash = if skipped > 0 {
            format!("{PARTIAL_HASH_PREFIX}{hash}")
        } else {
            hash
        };
        for entry in &mut entries {
            entry.chunk.file_hash.clone_from(&stored_hash);
        }

        let stored = entries.len();
        if !entries.is_empty() {
            self.store.upsert(collection, entries).await?;
        }
        let removed = if previous_hash.is_some() {
            self.store
                .delete_superseded(collection, rel.to_owned(), stored_hash)
                .await?
        } else {
            0
        };
        tracing::debug!(file = rel, chunks = stored, skipped, removed, "indexed");
        Ok(FileOutcome::Indexed {
            stored,
            skipped,
            removed,
        })
    }
}

fn absolute(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Store key for a file: its path below `root`, `/`-separated.
#[must_use]
pub fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis().try_into().unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use sift_embed::EmbedError;
    use sift_embed::mock::MockEmbedder;
    use sift_store::InMemoryVectorStore;

    use super::*;
    use crate::cache::EmbeddingCache;

    const PROJECT: &str = "proj";

    struct Fixture {
        dir: tempfile::TempDir,
        mock: MockEmbedder,
        store: Arc<InMemoryVectorStore>,
        indexer: Indexer<MockEmbedder>,
    }

    fn indexer_over<P: EmbeddingProvider>(
        store: &Arc<InMemoryVectorStore>,
        provider: P,
        config: IndexerConfig,
    ) -> Indexer<P> {
        let embedder = Arc::new(CachedEmbedder::new(
            Arc::new(provider),
            Arc::new(EmbeddingCache::default()),
            Duration::from_secs(5),
        ));
        Indexer::new(store.clone(), embedder, config)
    }

    fn fixture(mock: MockEmbedder, config: IndexerConfig) -> Fixture {
        let store = Arc::new(InMemoryVectorStore::new());
        let indexer = indexer_over(&store, mock.clone(), config);
        Fixture {
            dir: tempfile::tempdir().unwrap(),
            mock,
            store,
            indexer,
        }
    }

    impl Fixture {
        fn write(&self, rel: &str, content: &str) {
            let path = self.dir.path().join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }

        async fn init(&self) -> IndexReport {
            self.indexer
                .initialize_project(PROJECT, self.dir.path(), &CancellationToken::new())
                .await
                .unwrap()
        }

        async fn stats(&self) -> StoreStats {
            self.store.stats(PROJECT).await.unwrap()
        }
    }

    #[tokio::test]
    async fn indexes_all_files() {
        let f = fixture(MockEmbedder::new(32), IndexerConfig::default());
        f.write("src/a.rs", "fn alpha() {}");
        f.write("src/b.py", "def beta(): pass");
        f.write("notes.bin", "ignored");

        let report = f.init().await;
        assert_eq!(report.files_scanned, 2);
        assert_eq!(report.files_indexed, 2);
        assert_eq!(report.chunks_stored, 2);
        assert!(report.errors.is_empty());
        assert!(!report.cancelled);

        let mut files = f.store.indexed_files(PROJECT).await.unwrap();
        files.sort();
        assert_eq!(files, ["src/a.rs", "src/b.py"]);
        let cached = f.indexer.cached_stats(PROJECT).unwrap();
        assert_eq!(cached.total_files, 2);
        assert_eq!(cached.total_chunks, 2);
        assert!(cached.last_updated.is_some());
    }

    #[tokio::test]
    async fn second_run_skips_unchanged_files() {
        let f = fixture(MockEmbedder::new(32), IndexerConfig::default());
        f.write("a.rs", &"let x = 1;\n".repeat(200));
        f.init().await;
        let before = f.stats().await.total_vectors;
        let texts = f.mock.texts_embedded();

        let report = f.init().await;
        assert_eq!(report.files_unchanged, 1);
        assert_eq!(report.files_indexed, 0);
        assert_eq!(f.stats().await.total_vectors, before);
        assert_eq!(f.mock.texts_embedded(), texts);
    }

    #[tokio::test]
    async fn shrinking_file_leaves_no_orphans() {
        let f = fixture(MockEmbedder::new(32), IndexerConfig::default());
        f.write("a.rs", &"fn long_line() {}\n".repeat(200));
        f.init().await;
        assert!(f.stats().await.total_vectors > 1);

        f.write("a.rs", "fn short() {}");
        let report = f.init().await;
        assert_eq!(report.files_indexed, 1);
        assert!(report.chunks_removed > 1);
        assert_eq!(f.stats().await.total_vectors, 1);
    }

    #[tokio::test]
    async fn deleted_files_are_pruned() {
        let f = fixture(MockEmbedder::new(32), IndexerConfig::default());
        f.write("a.rs", "fn a() {}");
        f.write("b.rs", "fn b() {}");
        f.init().await;

        std::fs::remove_file(f.dir.path().join("b.rs")).unwrap();
        let report = f.init().await;
        assert_eq!(report.chunks_removed, 1);
        assert_eq!(f.store.indexed_files(PROJECT).await.unwrap(), ["a.rs"]);
    }

    #[tokio::test]
    async fn embedding_failure_skips_only_that_file() {
        let f = fixture(
            MockEmbedder::new(32).failing_on("BROKEN"),
            IndexerConfig::default(),
        );
        f.write("good.rs", "fn good() {}");
        f.write("bad.rs", "fn BROKEN() {}");

        let report = f.init().await;
        assert_eq!(report.files_indexed, 1);
        assert_eq!(report.files_skipped, 1);
        assert_eq!(report.chunks_skipped, 1);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("bad.rs:"));
        assert_eq!(f.stats().await.total_files, 1);
    }

    #[tokio::test]
    async fn unreadable_file_is_skipped() {
        let f = fixture(MockEmbedder::new(32), IndexerConfig::default());
        f.write("ok.rs", "fn ok() {}");
        std::fs::write(f.dir.path().join("latin1.rs"), [0x66, 0x6e, 0xff, 0xfe]).unwrap();

        let report = f.init().await;
        assert_eq!(report.files_indexed, 1);
        assert_eq!(report.files_skipped, 1);
        assert!(report.errors[0].starts_with("latin1.rs:"));
    }

    #[tokio::test]
    async fn cancelled_before_first_batch() {
        let f = fixture(MockEmbedder::new(32), IndexerConfig::default());
        f.write("a.rs", "fn a() {}");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = f
            .indexer
            .initialize_project(PROJECT, f.dir.path(), &cancel)
            .await
            .unwrap();
        assert!(report.cancelled);
        assert_eq!(report.files_indexed, 0);
        assert_eq!(f.stats().await.total_vectors, 0);
    }

    /// Cancels the run the first time it is asked for a vector.
    struct CancelOnFirstCall {
        inner: MockEmbedder,
        cancel: CancellationToken,
    }

    impl EmbeddingProvider for CancelOnFirstCall {
        async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, EmbedError> {
            self.cancel.cancel();
            self.inner.embed(text).await
        }

        async fn embed_batch(
            &self,
            texts: &[String],
        ) -> std::result::Result<Vec<Vec<f32>>, EmbedError> {
            self.cancel.cancel();
            self.inner.embed_batch(texts).await
        }

        fn model(&self) -> &str {
            self.inner.model()
        }

        fn dimensions(&self) -> usize {
            self.inner.dimensions()
        }

        fn name(&self) -> &str {
            "cancel-on-first-call"
        }
    }

    #[tokio::test]
    async fn cancelled_mid_run_keeps_finished_batch_only() {
        let cancel = CancellationToken::new();
        let store = Arc::new(InMemoryVectorStore::new());
        let provider = CancelOnFirstCall {
            inner: MockEmbedder::new(32),
            cancel: cancel.clone(),
        };
        let config = IndexerConfig {
            batch_size: 2,
            concurrency: 1,
            ..IndexerConfig::default()
        };
        let indexer = indexer_over(&store, provider, config);
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            let path = dir.path().join(format!("f{i}.rs"));
            std::fs::write(path, format!("fn f{i}() {{}}")).unwrap();
        }

        let report = indexer
            .initialize_project(PROJECT, dir.path(), &cancel)
            .await
            .unwrap();
        assert!(report.cancelled);
        assert_eq!(report.files_scanned, 5);
        assert_eq!(report.files_indexed, 2);
        assert_eq!(report.chunks_stored, 2);

        let mut files = store.indexed_files(PROJECT).await.unwrap();
        files.sort();
        assert_eq!(files, ["f0.rs", "f1.rs"]);
        assert_eq!(indexer.cached_stats(PROJECT).unwrap().total_files, 2);
    }

    #[tokio::test]
    async fn partly_embedded_file_is_completed_on_next_run() {
        let f = fixture(
            MockEmbedder::new(32).failing_on("FLAKY"),
            IndexerConfig::default(),
        );
        // Two windows; only the second contains the marker.
        let content = format!("{}fn FLAKY() {{}}\n", "let x = 1;\n".repeat(110));
        f.write("a.rs", &content);

        let first = f.init().await;
        assert_eq!(first.chunks_stored, 1);
        assert_eq!(first.chunks_skipped, 1);
        let stored = f.store.file_hashes(PROJECT).await.unwrap();
        assert!(stored["a.rs"].starts_with(PARTIAL_HASH_PREFIX));

        let healthy = indexer_over(&f.store, MockEmbedder::new(32), IndexerConfig::default());
        let second = healthy
            .initialize_project(PROJECT, f.dir.path(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(second.files_unchanged, 0);
        assert_eq!(second.files_indexed, 1);
        assert_eq!(second.chunks_stored, 2);
        assert_eq!(f.stats().await.total_vectors, 2);
        assert_eq!(
            f.store.file_hashes(PROJECT).await.unwrap()["a.rs"],
            file_hash(&content)
        );

        let third = healthy
            .initialize_project(PROJECT, f.dir.path(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(third.files_unchanged, 1);
        assert_eq!(f.stats().await.total_vectors, 2);
    }

    #[tokio::test]
    async fn changed_file_keeps_old_chunks_until_new_ones_are_stored() {
        let f = fixture(MockEmbedder::new(32), IndexerConfig::default());
        f.write("a.rs", "fn old_version() {}");
        f.init().await;

        f.mock.set_failing(true);
        f.write("a.rs", "fn new_version() {}");
        let report = f.init().await;
        assert_eq!(report.files_skipped, 1);
        assert_eq!(f.stats().await.total_vectors, 1);

        f.mock.set_failing(false);
        let report = f.init().await;
        assert_eq!(report.files_indexed, 1);
        assert_eq!(report.chunks_removed, 1);
        assert_eq!(f.stats().await.total_vectors, 1);
        assert_eq!(
            f.store.file_hashes(PROJECT).await.unwrap()["a.rs"],
            file_hash("fn new_version() {}")
        );
    }

    #[tokio::test]
    async fn small_batches_process_every_file() {
        let config = IndexerConfig {
            batch_size: 2,
            concurrency: 2,
            ..IndexerConfig::default()
        };
        let f = fixture(MockEmbedder::new(32), config);
        for i in 0..5 {
            f.write(&format!("f{i}.rs"), &format!("fn f{i}() {{}}"));
        }
        let report = f.init().await;
        assert_eq!(report.files_indexed, 5);
        assert_eq!(f.stats().await.total_files, 5);
    }

    #[tokio::test]
    async fn update_touches_only_named_files() {
        let f = fixture(MockEmbedder::new(32), IndexerConfig::default());
        f.write("a.rs", "fn a() {}");
        f.write("b.rs", "fn b() {}");
        f.init().await;
        let hashes_before = f.store.file_hashes(PROJECT).await.unwrap();

        f.write("a.rs", "fn a_changed() {}");
        f.write("b.rs", "fn b_changed() {}");
        let report = f
            .indexer
            .update_files(PROJECT, f.dir.path(), &[PathBuf::from("a.rs")])
            .await
            .unwrap();
        assert_eq!(report.files_indexed, 1);

        let hashes_after = f.store.file_hashes(PROJECT).await.unwrap();
        assert_ne!(hashes_before["a.rs"], hashes_after["a.rs"]);
        assert_eq!(hashes_before["b.rs"], hashes_after["b.rs"]);
        assert_eq!(f.stats().await.total_vectors, 2);
    }

    #[tokio::test]
    async fn update_of_missing_file_removes_it() {
        let f = fixture(MockEmbedder::new(32), IndexerConfig::default());
        f.write("a.rs", "fn a() {}");
        f.init().await;
        std::fs::remove_file(f.dir.path().join("a.rs")).unwrap();

        let report = f
            .indexer
            .update_files(PROJECT, f.dir.path(), &[f.dir.path().join("a.rs")])
            .await
            .unwrap();
        assert_eq!(report.chunks_removed, 1);
        assert_eq!(f.stats().await.total_vectors, 0);
    }

    #[tokio::test]
    async fn update_applies_scan_rules() {
        let config = IndexerConfig {
            scan: ScanConfig {
                exclude: vec!["*.gen.rs".into(), "vendor".into()],
                max_file_bytes: 64,
                ..ScanConfig::default()
            },
            ..IndexerConfig::default()
        };
        let f = fixture(MockEmbedder::new(32), config);
        f.write(".gitignore", "build/\n");
        f.write("a.rs", "fn a() {}");
        f.init().await;
        f.write("notes.bin", "binary");
        f.write("schema.gen.rs", "fn generated() {}");
        f.write("vendor/dep.rs", "fn dep() {}");
        f.write("build/out.rs", "fn out() {}");
        f.write("big.rs", &"x".repeat(100));

        let paths: Vec<PathBuf> = [
            "notes.bin",
            "schema.gen.rs",
            "vendor/dep.rs",
            "build/out.rs",
            "big.rs",
        ]
        .into_iter()
        .map(PathBuf::from)
        .collect();
        let report = f
            .indexer
            .update_files(PROJECT, f.dir.path(), &paths)
            .await
            .unwrap();
        assert_eq!(report.files_scanned, 0);
        assert_eq!(report.files_indexed, 0);
        assert_eq!(f.mock.texts_embedded(), 1);
        assert_eq!(f.store.indexed_files(PROJECT).await.unwrap(), ["a.rs"]);
    }

    #[tokio::test]
    async fn update_drops_file_that_became_excluded() {
        let f = fixture(MockEmbedder::new(32), IndexerConfig::default());
        f.write("a.rs", "fn a() {}");
        f.write("b.rs", "fn b() {}");
        f.init().await;

        f.write(".gitignore", "b.rs\n");
        let report = f
            .indexer
            .update_files(PROJECT, f.dir.path(), &[PathBuf::from("b.rs")])
            .await
            .unwrap();
        assert_eq!(report.chunks_removed, 1);
        assert_eq!(f.store.indexed_files(PROJECT).await.unwrap(), ["a.rs"]);
    }

    #[tokio::test]
    async fn remove_files_deletes_exactly_those_chunks() {
        let f = fixture(MockEmbedder::new(32), IndexerConfig::default());
        f.write("a.rs", "fn a() {}");
        f.write("b.rs", &"fn b() {}\n".repeat(300));
        f.init().await;
        let b_chunks = f.stats().await.total_vectors - 1;

        let removed = f
            .indexer
            .remove_files(PROJECT, f.dir.path(), &[PathBuf::from("b.rs")])
            .await
            .unwrap();
        assert_eq!(removed, b_chunks);
        assert_eq!(f.store.indexed_files(PROJECT).await.unwrap(), ["a.rs"]);
        assert_eq!(f.indexer.cached_stats(PROJECT).unwrap().total_chunks, 1);
    }

    #[tokio::test]
    async fn model_mismatch_is_rejected_before_work() {
        let f = fixture(MockEmbedder::new(32), IndexerConfig::default());
        f.store
            .ensure_collection(PROJECT, &CollectionSpec::new("other-model", 32))
            .await
            .unwrap();
        f.write("a.rs", "fn a() {}");

        let err = f
            .indexer
            .initialize_project(PROJECT, f.dir.path(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::Store(_)));
        assert_eq!(f.mock.requests(), 0);
    }

    #[tokio::test]
    async fn clear_forgets_stats() {
        let f = fixture(MockEmbedder::new(32), IndexerConfig::default());
        f.write("a.rs", "fn a() {}");
        f.init().await;
        f.indexer.clear(PROJECT).await.unwrap();
        assert!(f.indexer.cached_stats(PROJECT).is_none());
        assert_eq!(f.stats().await.total_vectors, 0);
    }

    #[test]
    fn relative_path_uses_forward_slashes() {
        let root = Path::new("/work/proj");
        assert_eq!(
            relative_path(root, Path::new("/work/proj/src/lib.rs")),
            "src/lib.rs"
        );
        assert_eq!(relative_path(root, Path::new("src/main.rs")), "src/main.rs");
    }

    #[test]
    fn stats_from_store_stats() {
        let stats = IndexStats::from(StoreStats {
            total_vectors: 7,
            total_files: 3,
            dimensions: 4,
            model: Some("m".into()),
            last_indexed: None,
        });
        assert_eq!(stats.total_chunks, 7);
        assert_eq!(stats.total_files, 3);
    }
}
