use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify_debouncer_mini::{DebouncedEventKind, new_debouncer};
use sift_embed::EmbeddingProvider;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::indexer::Indexer;
use crate::scanner::PathFilter;

/// Keeps a project's index in sync with file changes under its root.
///
/// Changed files are re-indexed; files that disappeared have their chunks removed.
/// Dropping the watcher stops it.
pub struct IndexWatcher {
    handle: tokio::task::JoinHandle<()>,
}

impl IndexWatcher {
    /// # Errors
    ///
    /// Returns an error if the filesystem watcher cannot be initialized.
    pub fn start<P: EmbeddingProvider + 'static>(
        collection: &str,
        root: &Path,
        indexer: Arc<Indexer<P>>,
    ) -> Result<Self> {
        let root = root.canonicalize()?;
        let filter = PathFilter::new(&root, &indexer.config().scan)?;
        let (notify_tx, mut notify_rx) = mpsc::channel::<Vec<PathBuf>>(64);

        let mut debouncer = new_debouncer(
            Duration::from_secs(1),
            move |events: std::result::Result<Vec<notify_debouncer_mini::DebouncedEvent>, notify::Error>| {
                let events = match events {
                    Ok(events) => events,
                    Err(e) => {
                        tracing::warn!("index watcher error: {e}");
                        return;
                    }
                };

                let paths: HashSet<PathBuf> = events
                    .into_iter()
                    .filter(|e| e.kind == DebouncedEventKind::Any)
                    .filter(|e| filter.accepts(&e.path))
                    .map(|e| e.path)
                    .collect();

                if !paths.is_empty() {
                    let _ = notify_tx.blocking_send(paths.into_iter().collect());
                }
            },
        )?;

        debouncer
            .watcher()
            .watch(&root, notify::RecursiveMode::Recursive)?;

        let collection = collection.to_owned();
        let handle = tokio::spawn(async move {
            let _debouncer = debouncer;
            while let Some(paths) = notify_rx.recv().await {
                let (present, gone): (Vec<PathBuf>, Vec<PathBuf>) =
                    paths.into_iter().partition(|p| p.is_file());
                if !present.is_empty() {
                    match indexer.update_files(&collection, &root, &present).await {
                        Ok(report) => tracing::debug!(
                            project = %collection,
                            files = present.len(),
                            chunks = report.chunks_stored,
                            "reindexed changed files"
                        ),
                        Err(e) => tracing::warn!(project = %collection, "reindex failed: {e}"),
                    }
                }
                if !gone.is_empty()
                    && let Err(e) = indexer.remove_files(&collection, &root, &gone).await
                {
                    tracing::warn!(project = %collection, "removal failed: {e}");
                }
            }
        });

        Ok(Self { handle })
    }
}

impl Drop for IndexWatcher {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
