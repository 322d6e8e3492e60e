use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("rate limited")]
    RateLimited,

    #[error("embedding request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("empty response from {provider}")]
    EmptyResponse { provider: String },

    #[error("{provider} returned {returned} embeddings for {requested} inputs")]
    CountMismatch {
        provider: String,
        requested: usize,
        returned: usize,
    },

    #[error("expected {expected}-dimensional embedding, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("provider returned a zero-magnitude embedding")]
    DegenerateVector,

    #[error("embedding provider {0} is not available in this build")]
    Unsupported(String),

    #[error("{provider} request failed (status {status})")]
    Status { provider: String, status: u16 },

    #[error("{0}")]
    Other(String),
}

impl EmbedError {
    /// Whether retrying the same request later could succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) | Self::RateLimited | Self::Timeout(_) => true,
            Self::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, EmbedError>;
