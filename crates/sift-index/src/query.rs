//! Query pipeline: embed → vector search → filter → rank → highlight.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use sift_embed::EmbeddingProvider;
use sift_store::{ChunkKind, SemanticChunk, Significance, VectorStore};

use crate::config::SearchConfig;
use crate::embedder::CachedEmbedder;
use crate::error::{IndexError, Result};
use crate::indexer::IndexStats;

/// Candidates fetched per requested result when post-filters are active.
const FILTER_OVERFETCH: usize = 4;
const MAX_HIGHLIGHTS: usize = 3;
const MAX_HIGHLIGHT_CHARS: usize = 200;

/// Optional result filters, combined with logical AND.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    /// Language id as stored in chunk metadata, compared case-insensitively.
    pub language: Option<String>,
    pub kind: Option<ChunkKind>,
    /// Substring of the chunk's file path.
    pub path_contains: Option<String>,
    /// Keep chunks at or above this significance.
    pub min_significance: Option<Significance>,
}

impl SearchFilters {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.language.is_none()
            && self.kind.is_none()
            && self.path_contains.is_none()
            && self.min_significance.is_none()
    }

    #[must_use]
    pub fn matches(&self, chunk: &SemanticChunk) -> bool {
        if let Some(lang) = &self.language
            && !chunk.metadata.language.eq_ignore_ascii_case(lang)
        {
            return false;
        }
        if let Some(kind) = self.kind
            && chunk.kind != kind
        {
            return false;
        }
        if let Some(fragment) = &self.path_contains
            && !chunk.file_path.contains(fragment.as_str())
        {
            return false;
        }
        if let Some(min) = self.min_significance
            && chunk.metadata.significance < min
        {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub text: String,
    /// Project to search; the index default when absent.
    pub project: Option<String>,
    pub max_results: Option<usize>,
    pub min_similarity: Option<f32>,
    #[serde(default)]
    pub filters: SearchFilters,
}

impl SearchQuery {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            project: None,
            max_results: None,
            min_similarity: None,
            filters: SearchFilters::default(),
        }
    }

    #[must_use]
    pub fn in_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    #[must_use]
    pub fn with_max_results(mut self, n: usize) -> Self {
        self.max_results = Some(n);
        self
    }

    #[must_use]
    pub fn with_min_similarity(mut self, threshold: f32) -> Self {
        self.min_similarity = Some(threshold);
        self
    }

    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.filters.language = Some(language.into());
        self
    }

    #[must_use]
    pub fn with_kind(mut self, kind: ChunkKind) -> Self {
        self.filters.kind = Some(kind);
        self
    }

    #[must_use]
    pub fn with_path_containing(mut self, fragment: impl Into<String>) -> Self {
        self.filters.path_contains = Some(fragment.into());
        self
    }

    #[must_use]
    pub fn with_min_significance(mut self, significance: Significance) -> Self {
        self.filters.min_significance = Some(significance);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub chunk: SemanticChunk,
    pub similarity: f32,
    /// 1-based position in the response.
    pub rank: usize,
    pub highlights: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchResult>,
    /// Number of results after filtering.
    pub total_results: usize,
    pub elapsed_ms: u64,
    pub stats: IndexStats,
}

/// Read-only search over one store. Never mutates the index.
pub struct QueryProcessor<P> {
    store: Arc<dyn VectorStore>,
    embedder: Arc<CachedEmbedder<P>>,
    defaults: SearchConfig,
}

impl<P: EmbeddingProvider> QueryProcessor<P> {
    #[must_use]
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<CachedEmbedder<P>>,
        defaults: SearchConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            defaults,
        }
    }

    /// Run `query` against `collection`.
    ///
    /// An empty collection yields an empty response, not an error.
    ///
    /// # Errors
    ///
    /// Returns `IndexError::Embed` if the query cannot be embedded (no fallback vector is
    /// ever substituted), `IndexError::Store` if the search fails, and `IndexError::Other`
    /// for blank query text.
    pub async fn search(&self, collection: &str, query: &SearchQuery) -> Result<SearchResponse> {
        let start = Instant::now();
        if query.text.trim().is_empty() {
            return Err(IndexError::Other("search query is empty".into()));
        }

        let vector = self.embedder.embed_query(&query.text).await.map_err(|e| {
            tracing::warn!(project = collection, "query embedding failed: {e}");
            IndexError::Embed(e)
        })?;

        let max_results = query.max_results.unwrap_or(self.defaults.max_results);
        let min_similarity = query.min_similarity.unwrap_or(self.defaults.min_similarity);
        let fetch = if query.filters.is_empty() {
            max_results
        } else {
            max_results.saturating_mul(FILTER_OVERFETCH)
        };

        let candidates = self
            .store
            .search(collection, vector, fetch, min_similarity)
            .await?;
        let fetched = candidates.len();

        let keywords = keywords(&query.text);
        let results: Vec<SearchResult> = candidates
            .into_iter()
            .filter(|c| query.filters.matches(&c.chunk))
            .take(max_results)
            .enumerate()
            .map(|(i, c)| SearchResult {
                highlights: highlights(&c.chunk.content, &keywords),
                similarity: c.similarity,
                rank: i + 1,
                chunk: c.chunk,
            })
            .collect();

        let stats = IndexStats::from(self.store.stats(collection).await?);
        let elapsed_ms = start.elapsed().as_millis().try_into().unwrap_or(u64::MAX);
        tracing::debug!(
            project = collection,
            fetched,
            results = results.len(),
            elapsed_ms,
            "search finished"
        );

        Ok(SearchResponse {
            query: query.text.clone(),
            total_results: results.len(),
            results,
            elapsed_ms,
            stats,
        })
    }
}

/// Lower-cased query words of at least two characters, punctuation trimmed, deduplicated.
#[must_use]
pub fn keywords(text: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for word in text.split_whitespace() {
        let word = word
            .trim_matches(|c: char| !c.is_alphanumeric() && c != '_')
            .to_lowercase();
        if word.chars().count() >= 2 && !out.contains(&word) {
            out.push(word);
        }
    }
    out
}

/// Up to three distinct sentences of `content` that mention a keyword, case-insensitively.
#[must_use]
pub fn highlights(content: &str, keywords: &[String]) -> Vec<String> {
    if keywords.is_empty() {
        return Vec::new();
    }
    let mut out: Vec<String> = Vec::new();
    for sentence in content.split(['.', '!', '?', '\n']) {
        let sentence = sentence.trim();
        if sentence.is_empty() {
            continue;
        }
        let lower = sentence.to_lowercase();
        if !keywords.iter().any(|k| lower.contains(k.as_str())) {
            continue;
        }
        let clipped: String = sentence.chars().take(MAX_HIGHLIGHT_CHARS).collect();
        if !out.contains(&clipped) {
            out.push(clipped);
            if out.len() == MAX_HIGHLIGHTS {
                break;
            }
        }
    }
    out
}
