//! Test-only deterministic embedding backend.
//!
//! Vectors are a hashed bag of lower-cased words, so texts that share words score
//! a positive cosine similarity and unrelated texts score close to zero.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::{EmbedError, Result};
use crate::provider::EmbeddingProvider;

#[derive(Debug, Clone)]
pub struct MockEmbedder {
    dimensions: usize,
    model: String,
    /// Any text containing this marker fails to embed.
    pub fail_marker: Option<String>,
    /// Milliseconds to sleep before answering.
    pub delay_ms: u64,
    failing: Arc<AtomicBool>,
    texts_embedded: Arc<AtomicUsize>,
    requests: Arc<AtomicUsize>,
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new(64)
    }
}

impl MockEmbedder {
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
            model: "mock-embed".into(),
            fail_marker: None,
            delay_ms: 0,
            failing: Arc::new(AtomicBool::new(false)),
            texts_embedded: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    #[must_use]
    pub fn failing_on(mut self, marker: impl Into<String>) -> Self {
        self.fail_marker = Some(marker.into());
        self
    }

    #[must_use]
    pub fn with_delay(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    /// Make every subsequent call fail. Shared across clones.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of texts sent to this backend so far. Shared across clones.
    #[must_use]
    pub fn texts_embedded(&self) -> usize {
        self.texts_embedded.load(Ordering::SeqCst)
    }

    /// Number of `embed`/`embed_batch` calls so far. Shared across clones.
    #[must_use]
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimensions];
        let mut any = false;
        for word in text
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|w| !w.is_empty())
        {
            let h = fnv1a(&word.to_lowercase());
            #[allow(clippy::cast_possible_truncation)]
            let bucket = (h % self.dimensions as u64) as usize;
            v[bucket] += 1.0;
            any = true;
        }
        if !any {
            v[self.dimensions - 1] = 1.0;
        }
        v
    }

    fn check(&self, text: &str) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(EmbedError::Other("mock provider unavailable".into()));
        }
        if let Some(marker) = &self.fail_marker
            && text.contains(marker.as_str())
        {
            return Err(EmbedError::Other(format!(
                "mock provider refused text containing {marker:?}"
            )));
        }
        Ok(())
    }

    async fn pause(&self) {
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
    }
}

impl EmbeddingProvider for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.check(text)?;
        self.texts_embedded.fetch_add(1, Ordering::SeqCst);
        Ok(self.vector_for(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        for text in texts {
            self.check(text)?;
        }
        self.texts_embedded.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "mock"
    }
}

fn fnv1a(s: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in s.bytes() {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deterministic_vectors() {
        let m = MockEmbedder::new(32);
        let a = m.embed("fn parse_config").await.unwrap();
        let b = m.embed("fn parse_config").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[tokio::test]
    async fn never_returns_zero_vector() {
        let m = MockEmbedder::new(8);
        let v = m.embed("   ...   ").await.unwrap();
        assert!(v.iter().any(|x| *x != 0.0));
    }

    #[tokio::test]
    async fn marker_fails_batch() {
        let m = MockEmbedder::new(8).failing_on("POISON");
        let result = m.embed_batch(&["ok".into(), "POISON here".into()]).await;
        assert!(result.is_err());
        assert!(m.embed("ok").await.is_ok());
    }

    #[tokio::test]
    async fn failing_flag_shared_across_clones() {
        let m = MockEmbedder::new(8);
        let clone = m.clone();
        m.set_failing(true);
        assert!(clone.embed("anything").await.is_err());
        m.set_failing(false);
        assert!(clone.embed("anything").await.is_ok());
    }

    #[tokio::test]
    async fn counters_track_calls() {
        let m = MockEmbedder::new(8);
        m.embed("a").await.unwrap();
        m.embed_batch(&["b".into(), "c".into()]).await.unwrap();
        assert_eq!(m.requests(), 2);
        assert_eq!(m.texts_embedded(), 3);
    }
}
