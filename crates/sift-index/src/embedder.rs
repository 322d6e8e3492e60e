//! Provider adapter: content-hash caching, per-call timeouts and failure isolation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use sift_embed::provider::{validate_batch, validate_vector};
use sift_embed::{EmbedError, EmbeddingProvider};
use sift_store::SemanticChunk;

use crate::cache::EmbeddingCache;

/// Texts that missed the cache, deduplicated by content hash.
struct Pending<'a> {
    content_hash: &'a str,
    text: &'a str,
    slots: Vec<usize>,
}

pub struct CachedEmbedder<P> {
    provider: Arc<P>,
    cache: Arc<EmbeddingCache>,
    timeout: Duration,
}

impl<P: EmbeddingProvider> CachedEmbedder<P> {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    #[must_use]
    pub fn new(provider: Arc<P>, cache: Arc<EmbeddingCache>, timeout: Duration) -> Self {
        Self {
            provider,
            cache,
            timeout,
        }
    }

    #[must_use]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    #[must_use]
    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }

    #[must_use]
    pub fn model(&self) -> &str {
        self.provider.model()
    }

    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.provider.dimensions()
    }

    /// One result per chunk, in input order.
    ///
    /// Cache hits never reach the provider. Misses are sent in a single batch; if the
    /// batch fails, each text is retried on its own so one bad chunk only fails itself.
    pub async fn embed_chunks(&self, chunks: &[SemanticChunk]) -> Vec<Result<Vec<f32>, EmbedError>> {
        let model = self.provider.model();
        let mut results: Vec<Option<Result<Vec<f32>, EmbedError>>> =
            std::iter::repeat_with(|| None).take(chunks.len()).collect();

        let mut pending: Vec<Pending<'_>> = Vec::new();
        let mut positions: HashMap<&str, usize> = HashMap::new();
        for (slot, chunk) in chunks.iter().enumerate() {
            if let Some(vector) = self.cache.get(model, &chunk.content_hash) {
                results[slot] = Some(Ok(vector));
                continue;
            }
            if let Some(&pos) = positions.get(chunk.content_hash.as_str()) {
                pending[pos].slots.push(slot);
            } else {
                positions.insert(&chunk.content_hash, pending.len());
                pending.push(Pending {
                    content_hash: &chunk.content_hash,
                    text: &chunk.content,
                    slots: vec![slot],
                });
            }
        }

        if !pending.is_empty() {
            let texts: Vec<String> = pending.iter().map(|p| p.text.to_owned()).collect();
            match self.embed_texts(&texts).await {
                Ok(vectors) => {
                    for (item, vector) in pending.iter().zip(vectors) {
                        self.cache.insert(model, item.content_hash, vector.clone());
                        fill(&mut results, &item.slots, Ok(vector));
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        items = texts.len(),
                        "batch embedding failed, retrying items individually"
                    );
                    for item in &pending {
                        let outcome = self.embed_one(item.text).await;
                        if let Ok(vector) = &outcome {
                            self.cache.insert(model, item.content_hash, vector.clone());
                        }
                        fill(&mut results, &item.slots, outcome);
                    }
                }
            }
        }

        results
            .into_iter()
            .map(|r| r.unwrap_or_else(|| Err(EmbedError::Other("chunk was not embedded".into()))))
            .collect()
    }

    /// Embed search text. Never cached; every failure reaches the caller.
    ///
    /// # Errors
    ///
    /// Returns the provider error, `Timeout`, or a validation error.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        self.embed_one(text).await
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let vectors = tokio::time::timeout(self.timeout, self.provider.embed_batch(texts))
            .await
            .map_err(|_| EmbedError::Timeout(self.timeout))??;
        validate_batch(
            self.provider.name(),
            &vectors,
            texts.len(),
            self.provider.dimensions(),
        )?;
        Ok(vectors)
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let vector = tokio::time::timeout(self.timeout, self.provider.embed(text))
            .await
            .map_err(|_| EmbedError::Timeout(self.timeout))??;
        validate_vector(&vector, self.provider.dimensions())?;
        Ok(vector)
    }
}

/// Store `outcome` in every slot that shares the same content. Errors are not `Clone`,
/// so duplicates of a failed text get a copy of its message.
fn fill(
    results: &mut [Option<Result<Vec<f32>, EmbedError>>],
    slots: &[usize],
    outcome: Result<Vec<f32>, EmbedError>,
) {
    let Some((&last, rest)) = slots.split_last() else {
        return;
    };
    for &slot in rest {
        results[slot] = Some(match &outcome {
            Ok(v) => Ok(v.clone()),
            Err(e) => Err(EmbedError::Other(e.to_string())),
        });
    }
    results[last] = Some(outcome);
}
