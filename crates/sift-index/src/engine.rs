//! Facade wiring the indexer and query processor over one store and one provider.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sift_embed::EmbeddingProvider;
use sift_store::VectorStore;
use tokio_util::sync::CancellationToken;

use crate::cache::CacheStats;
use crate::config::Config;
use crate::embedder::CachedEmbedder;
use crate::error::{IndexError, Result};
use crate::indexer::{IndexReport, IndexStats, Indexer};
use crate::query::{QueryProcessor, SearchQuery, SearchResponse};
use crate::watcher::IndexWatcher;

pub const DEFAULT_PROJECT: &str = "default";

/// Semantic index over any number of projects, each kept in its own store collection.
pub struct SemanticIndex<P> {
    indexer: Arc<Indexer<P>>,
    query: QueryProcessor<P>,
    embedder: Arc<CachedEmbedder<P>>,
    config: Config,
    default_project: String,
}

impl<P: EmbeddingProvider> SemanticIndex<P> {
    /// # Errors
    ///
    /// Returns `IndexError::Config` if the configuration is invalid or does not describe
    /// the model and dimension `provider` actually produces.
    pub fn new(provider: P, store: Arc<dyn VectorStore>, config: Config) -> Result<Self> {
        config.validate()?;
        if provider.model() != config.embedding.model {
            return Err(IndexError::Config(format!(
                "embedding.model is {} but the {} provider serves {}",
                config.embedding.model,
                provider.name(),
                provider.model()
            )));
        }
        if provider.dimensions() != config.embedding.dimensions {
            return Err(IndexError::Config(format!(
                "embedding.dimensions is {} but {} returns {}-dimensional vectors",
                config.embedding.dimensions,
                provider.model(),
                provider.dimensions()
            )));
        }

        let embedder = Arc::new(CachedEmbedder::new(
            Arc::new(provider),
            Arc::new(config.embedding_cache()),
            config.embedding_timeout(),
        ));
        let indexer = Arc::new(Indexer::new(
            Arc::clone(&store),
            Arc::clone(&embedder),
            config.indexer_config(),
        ));
        let query = QueryProcessor::new(store, Arc::clone(&embedder), config.search.clone());

        Ok(Self {
            indexer,
            query,
            embedder,
            config,
            default_project: DEFAULT_PROJECT.to_owned(),
        })
    }

    /// Project searched when a query names none.
    #[must_use]
    pub fn with_default_project(mut self, project: impl Into<String>) -> Self {
        self.default_project = project.into();
        self
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.embedder.cache().stats()
    }

    /// # Errors
    ///
    /// See [`Indexer::initialize_project`].
    pub async fn initialize_project(&self, project: &str, root: &Path) -> Result<IndexReport> {
        self.initialize_project_with_cancel(project, root, &CancellationToken::new())
            .await
    }

    /// Like [`SemanticIndex::initialize_project`], stopping between batches once `cancel` fires.
    ///
    /// # Errors
    ///
    /// See [`Indexer::initialize_project`].
    pub async fn initialize_project_with_cancel(
        &self,
        project: &str,
        root: &Path,
        cancel: &CancellationToken,
    ) -> Result<IndexReport> {
        let collection = self.config.collection_name(project);
        self.indexer
            .initialize_project(&collection, root, cancel)
            .await
    }

    /// # Errors
    ///
    /// See [`Indexer::update_files`].
    pub async fn update_files(
        &self,
        project: &str,
        root: &Path,
        paths: &[PathBuf],
    ) -> Result<IndexReport> {
        let collection = self.config.collection_name(project);
        self.indexer.update_files(&collection, root, paths).await
    }

    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn remove_files(&self, project: &str, root: &Path, paths: &[PathBuf]) -> Result<usize> {
        let collection = self.config.collection_name(project);
        self.indexer.remove_files(&collection, root, paths).await
    }

    /// # Errors
    ///
    /// See [`QueryProcessor::search`].
    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResponse> {
        let project = query.project.as_deref().unwrap_or(&self.default_project);
        let collection = self.config.collection_name(project);
        self.query.search(&collection, query).await
    }

    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn stats(&self, project: &str) -> Result<IndexStats> {
        let collection = self.config.collection_name(project);
        self.indexer.refresh_stats(&collection).await
    }

    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn clear_index(&self, project: &str) -> Result<()> {
        let collection = self.config.collection_name(project);
        self.indexer.clear(&collection).await
    }
}

impl<P: EmbeddingProvider + 'static> SemanticIndex<P> {
    /// Re-index files under `root` as they change, until the returned watcher is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the filesystem watcher cannot be initialized.
    pub fn watch(&self, project: &str, root: &Path) -> Result<IndexWatcher> {
        let collection = self.config.collection_name(project);
        IndexWatcher::start(&collection, root, Arc::clone(&self.indexer))
    }
}
