use crate::error::{EmbedError, Result};

/// A backend that turns text into fixed-dimension vectors.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable, times out, or returns an invalid vector.
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>>> + Send;

    /// Embed several texts in one request. The output order matches `texts`.
    ///
    /// # Errors
    ///
    /// Returns an error if any part of the batch fails; callers that need per-item
    /// isolation retry the items individually.
    fn embed_batch(&self, texts: &[String]) -> impl Future<Output = Result<Vec<Vec<f32>>>> + Send;

    /// Name of the embedding model. Vectors from different models are never mixed in one store.
    fn model(&self) -> &str;

    /// Length of every vector this provider returns.
    fn dimensions(&self) -> usize;

    fn name(&self) -> &str;
}

/// Check a returned vector against the expected dimension and reject all-zero output.
///
/// # Errors
///
/// Returns `DimensionMismatch` or `DegenerateVector`.
pub fn validate_vector(vector: &[f32], expected: usize) -> Result<()> {
    if vector.len() != expected {
        return Err(EmbedError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    if vector.iter().all(|v| *v == 0.0) {
        return Err(EmbedError::DegenerateVector);
    }
    Ok(())
}

/// Validate a whole batch, including the count of returned vectors.
///
/// # Errors
///
/// Returns `CountMismatch` if the provider dropped or added vectors, otherwise the first
/// per-vector validation failure.
pub fn validate_batch(
    provider: &str,
    vectors: &[Vec<f32>],
    requested: usize,
    expected_dim: usize,
) -> Result<()> {
    if vectors.len() != requested {
        return Err(EmbedError::CountMismatch {
            provider: provider.to_owned(),
            requested,
            returned: vectors.len(),
        });
    }
    vectors
        .iter()
        .try_for_each(|v| validate_vector(v, expected_dim))
}
