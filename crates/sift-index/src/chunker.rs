//! Windowed chunking with optional structural (function/class) chunks.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use sift_store::{ChunkKind, ChunkMetadata, SemanticChunk, Significance};

use crate::languages::{Lang, detect_language};

static KEYWORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:class|function|fn|def|interface|export|struct|trait|impl|enum|module|type)\b")
        .expect("static keyword regex must compile")
});

/// Chunker configuration.
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Window size in characters (default: 1000).
    pub chunk_size: usize,
    /// Characters shared by consecutive windows (default: 200).
    pub chunk_overlap: usize,
    /// Also emit function and class bodies as chunks.
    pub structural: bool,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            structural: false,
        }
    }
}

impl ChunkerConfig {
    fn step(&self) -> usize {
        self.chunk_size.saturating_sub(self.chunk_overlap).max(1)
    }
}

/// blake3 hex digest of a whole file.
#[must_use]
pub fn file_hash(content: &str) -> String {
    blake3::hash(content.as_bytes()).to_hex().to_string()
}

/// Stable chunk identity: the same path, index and file hash always give the same id.
#[must_use]
pub fn chunk_id(file_path: &str, chunk_index: usize, file_hash: &str) -> String {
    let digest = blake3::hash(format!("{file_path}\0{chunk_index}\0{file_hash}").as_bytes());
    digest.to_hex()[..32].to_string()
}

/// Split `content` into chunks. Windowed chunks come first, in file order; structural
/// chunks (when enabled) follow with continuing indices.
#[must_use]
pub fn chunk_file(
    file_path: &str,
    content: &str,
    file_hash: &str,
    config: &ChunkerConfig,
) -> Vec<SemanticChunk> {
    if content.is_empty() {
        return Vec::new();
    }

    let lang = detect_language(Path::new(file_path));
    let text = TextIndex::new(content);
    let ctx = ChunkCtx {
        file_path,
        file_hash,
        lang,
        text: &text,
    };

    let char_len = text.char_len();
    let mut chunks = Vec::new();

    if char_len <= config.chunk_size {
        chunks.push(ctx.make_chunk(0, content.len(), 0, true, ChunkKind::File));
    } else {
        let step = config.step();
        let mut start = 0;
        loop {
            let end = (start + config.chunk_size).min(char_len);
            let index = chunks.len();
            chunks.push(ctx.make_chunk(
                text.byte_at(start),
                text.byte_at(end),
                index,
                false,
                ChunkKind::Window,
            ));
            if end == char_len {
                break;
            }
            start += step;
        }
    }

    if config.structural {
        for (start, end, kind) in structural_spans(content, lang) {
            let index = chunks.len();
            chunks.push(ctx.make_chunk(start, end, index, false, kind));
        }
    }

    chunks
}

/// Character and line lookup over one file.
struct TextIndex<'a> {
    content: &'a str,
    /// Byte offset of every char, plus `content.len()` at the end.
    char_bytes: Vec<usize>,
    /// Byte offsets of every `\n`.
    newlines: Vec<usize>,
}

impl<'a> TextIndex<'a> {
    fn new(content: &'a str) -> Self {
        let mut char_bytes: Vec<usize> = content.char_indices().map(|(i, _)| i).collect();
        char_bytes.push(content.len());
        let newlines = content
            .bytes()
            .enumerate()
            .filter(|(_, b)| *b == b'\n')
            .map(|(i, _)| i)
            .collect();
        Self {
            content,
            char_bytes,
            newlines,
        }
    }

    fn char_len(&self) -> usize {
        self.char_bytes.len() - 1
    }

    fn byte_at(&self, char_idx: usize) -> usize {
        self.char_bytes[char_idx]
    }

    /// 1-based line containing the byte at `offset`.
    fn line_at(&self, offset: usize) -> usize {
        self.newlines.partition_point(|&n| n < offset) + 1
    }
}

struct ChunkCtx<'a> {
    file_path: &'a str,
    file_hash: &'a str,
    lang: Lang,
    text: &'a TextIndex<'a>,
}

impl ChunkCtx<'_> {
    fn make_chunk(
        &self,
        start: usize,
        end: usize,
        chunk_index: usize,
        is_full_file: bool,
        kind: ChunkKind,
    ) -> SemanticChunk {
        let content = &self.text.content[start..end];
        let last = end.saturating_sub(1).max(start);
        SemanticChunk {
            id: chunk_id(self.file_path, chunk_index, self.file_hash),
            file_path: self.file_path.to_owned(),
            content: content.to_owned(),
            start_line: self.text.line_at(start),
            end_line: self.text.line_at(last),
            chunk_index,
            is_full_file,
            content_hash: blake3::hash(content.as_bytes()).to_hex().to_string(),
            file_hash: self.file_hash.to_owned(),
            kind,
            metadata: metadata(content, self.lang),
        }
    }
}

fn metadata(content: &str, lang: Lang) -> ChunkMetadata {
    let symbols = lang.patterns().extract(content);
    ChunkMetadata {
        language: lang.id().to_owned(),
        size: content.chars().count(),
        functions: symbols.functions,
        classes: symbols.classes,
        imports: symbols.imports,
        exports: symbols.exports,
        significance: significance(content),
    }
}

/// Significance from the number of whole-word structural keywords in `content`.
#[must_use]
pub fn significance(content: &str) -> Significance {
    Significance::from_keyword_count(KEYWORDS.find_iter(content).count())
}

/// Byte spans of function and class bodies, ordered by start offset.
fn structural_spans(content: &str, lang: Lang) -> Vec<(usize, usize, ChunkKind)> {
    if !lang.uses_braces() && !lang.uses_indentation() {
        return Vec::new();
    }
    let patterns = lang.patterns();
    let groups = [
        (&patterns.functions, ChunkKind::Function),
        (&patterns.classes, ChunkKind::Class),
    ];

    let mut spans: Vec<(usize, usize, ChunkKind)> = Vec::new();
    for (regexes, kind) in groups {
        for re in regexes {
            for m in re.find_iter(content) {
                let start = line_start(content, m.start());
                let end = if lang.uses_indentation() {
                    indented_block_end(content, start)
                } else {
                    brace_block_end(content, m.start(), lang)
                };
                let Some(end) = end else { continue };
                if spans.iter().any(|(s, _, _)| *s == start) {
                    continue;
                }
                spans.push((start, end, kind));
            }
        }
    }
    spans.sort_by_key(|(start, _, _)| *start);
    spans
}

fn line_start(content: &str, offset: usize) -> usize {
    content[..offset].rfind('\n').map_or(0, |i| i + 1)
}

/// End (exclusive) of the `{ .. }` body that follows a signature at `from`.
/// `None` for declarations without a body or unbalanced braces.
fn brace_block_end(content: &str, from: usize, lang: Lang) -> Option<usize> {
    let bytes = content.as_bytes();
    // Parens and brackets; a `;` or `{` inside them belongs to the signature.
    let mut nesting = 0usize;
    let mut i = from;
    let open = loop {
        match *bytes.get(i)? {
            b'(' | b'[' => nesting += 1,
            b')' | b']' => nesting = nesting.saturating_sub(1),
            b';' if nesting == 0 => return None,
            b'{' if nesting == 0 => break i,
            _ => {}
        }
        i += 1;
    };

    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'`' => i = quoted_end(bytes, i),
            b'\'' if lang == Lang::Rust => i = char_literal_end(bytes, i),
            b'\'' => i = quoted_end(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                i = bytes[i..]
                    .iter()
                    .position(|b| *b == b'\n')
                    .map_or(bytes.len(), |p| i + p);
            }
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Offset of the quote closing the literal opened at `start`; `bytes.len()` if unterminated.
fn quoted_end(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 1,
            b if b == quote => return i,
            _ => {}
        }
        i += 1;
    }
    bytes.len()
}

/// Closing offset of a Rust char literal at `start`, or `start` itself for a lifetime.
fn char_literal_end(bytes: &[u8], start: usize) -> usize {
    match (bytes.get(start + 1), bytes.get(start + 2)) {
        (Some(b'\\'), Some(_)) => bytes[start + 3..]
            .iter()
            .position(|b| *b == b'\'')
            .map_or(start, |p| start + 3 + p),
        (Some(_), Some(b'\'')) => start + 2,
        _ => start,
    }
}

/// End (exclusive) of an indentation-delimited block whose header line starts at `start`.
fn indented_block_end(content: &str, start: usize) -> Option<usize> {
    let header_end = content[start..].find('\n').map(|i| start + i)?;
    let indent = indent_width(&content[start..header_end]);

    let mut end = header_end;
    let mut pos = header_end + 1;
    while pos < content.len() {
        let line_end = content[pos..].find('\n').map_or(content.len(), |i| pos + i);
        let line = &content[pos..line_end];
        if !line.trim().is_empty() {
            if indent_width(line) <= indent {
                break;
            }
            end = line_end;
        }
        pos = line_end + 1;
    }
    (end > header_end).then_some(end)
}

fn indent_width(line: &str) -> usize {
    line.chars()
        .take_while(|c| *c == ' ' || *c == '\t')
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum()
}
