use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse importance label derived from structural keyword density.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Significance {
    #[default]
    Low,
    Medium,
    High,
}

impl Significance {
    /// `>= 5` keyword matches is high, `>= 2` medium, otherwise low.
    #[must_use]
    pub fn from_keyword_count(count: usize) -> Self {
        match count {
            c if c >= 5 => Self::High,
            c if c >= 2 => Self::Medium,
            _ => Self::Low,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Significance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Significance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unknown significance: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    /// The whole file fits in one chunk.
    File,
    /// One sliding window over a larger file.
    Window,
    Function,
    Class,
}

impl ChunkKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Window => "window",
            Self::Function => "function",
            Self::Class => "class",
        }
    }
}

impl fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File),
            "window" => Ok(Self::Window),
            "function" => Ok(Self::Function),
            "class" => Ok(Self::Class),
            other => Err(format!("unknown chunk kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub language: String,
    /// Length of the chunk content in characters.
    pub size: usize,
    #[serde(default)]
    pub functions: Vec<String>,
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub imports: Vec<String>,
    #[serde(default)]
    pub exports: Vec<String>,
    pub significance: Significance,
}

/// A contiguous, addressable fragment of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemanticChunk {
    pub id: String,
    pub file_path: String,
    pub content: String,
    /// 1-based, inclusive.
    pub start_line: usize,
    /// 1-based, inclusive.
    pub end_line: usize,
    pub chunk_index: usize,
    pub is_full_file: bool,
    pub content_hash: String,
    /// Hash of the whole file the chunk was cut from, prefixed with `partial:` when some
    /// of that file's chunks could not be embedded.
    pub file_hash: String,
    pub kind: ChunkKind,
    pub metadata: ChunkMetadata,
}

/// A chunk together with its vector, as persisted by a [`crate::VectorStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub chunk: SemanticChunk,
    pub vector: Vec<f32>,
    pub model: String,
    pub dimensions: usize,
    pub indexed_at: DateTime<Utc>,
}

impl IndexEntry {
    #[must_use]
    pub fn new(chunk: SemanticChunk, vector: Vec<f32>, model: impl Into<String>) -> Self {
        let dimensions = vector.len();
        Self {
            chunk,
            vector,
            model: model.into(),
            dimensions,
            indexed_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk_id: String,
    pub similarity: f32,
    pub chunk: SemanticChunk,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_vectors: usize,
    pub total_files: usize,
    pub dimensions: usize,
    pub model: Option<String>,
    pub last_indexed: Option<DateTime<Utc>>,
}

/// Model and dimensionality every vector in a collection must share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSpec {
    pub model: String,
    pub dimensions: usize,
}

impl CollectionSpec {
    #[must_use]
    pub fn new(model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            model: model.into(),
            dimensions,
        }
    }
}
