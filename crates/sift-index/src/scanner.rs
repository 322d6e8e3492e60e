//! Project file enumeration.

use std::path::{Component, Path, PathBuf};

use ignore::WalkBuilder;
use ignore::gitignore::Gitignore;
use ignore::overrides::{Override, OverrideBuilder};

use crate::error::{IndexError, Result};

#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Accepted extensions, with or without the leading dot.
    pub extensions: Vec<String>,
    /// Directory or file names (globs allowed) excluded at any depth.
    pub exclude: Vec<String>,
    /// Larger files are skipped.
    pub max_file_bytes: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            exclude: default_excludes(),
            max_file_bytes: 1_048_576,
        }
    }
}

#[must_use]
pub fn default_extensions() -> Vec<String> {
    [
        "rs", "py", "js", "jsx", "ts", "tsx", "go", "java", "c", "h", "cpp", "hpp", "cs", "rb",
        "php", "swift", "kt", "md", "json", "toml", "yaml", "yml", "sh",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

#[must_use]
pub fn default_excludes() -> Vec<String> {
    [
        "node_modules",
        "target",
        "dist",
        "build",
        ".git",
        "vendor",
        "__pycache__",
        "coverage",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Every indexable file under `root`, sorted. Hidden entries and `.gitignore`d paths are skipped.
///
/// # Errors
///
/// Returns an error if `root` is not a directory or an exclude pattern is not a valid glob.
pub fn scan(root: &Path, config: &ScanConfig) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(IndexError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("not a directory: {}", root.display()),
        )));
    }

    let overrides = exclude_overrides(root, config)?;

    let mut files: Vec<PathBuf> = WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .require_git(false)
        .overrides(overrides)
        .build()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("walk error: {e}");
                None
            }
        })
        .filter(|e| e.file_type().is_some_and(|ft| ft.is_file()))
        .filter(|e| has_allowed_extension(e.path(), &config.extensions))
        .filter(|e| {
            e.metadata()
                .is_ok_and(|m| m.len() <= config.max_file_bytes)
        })
        .map(ignore::DirEntry::into_path)
        .collect();

    files.sort();
    Ok(files)
}

fn exclude_overrides(root: &Path, config: &ScanConfig) -> Result<Override> {
    let mut overrides = OverrideBuilder::new(root);
    for pattern in &config.exclude {
        overrides.add(&format!("!{pattern}"))?;
    }
    Ok(overrides.build()?)
}

/// Ignore files honored in every directory, as during a walk.
const IGNORE_FILES: [&str; 2] = [".gitignore", ".ignore"];

/// The rules of [`scan`] applied to single paths, for watcher events and explicit updates.
pub struct PathFilter {
    root: PathBuf,
    config: ScanConfig,
    overrides: Override,
}

impl PathFilter {
    /// # Errors
    ///
    /// Returns an error if an exclude pattern is not a valid glob.
    pub fn new(root: &Path, config: &ScanConfig) -> Result<Self> {
        Ok(Self {
            root: root.to_path_buf(),
            config: config.clone(),
            overrides: exclude_overrides(root, config)?,
        })
    }

    /// Whether [`scan`] would yield `path`. The size limit only applies to files that
    /// still exist, so a deleted path stays eligible for removal.
    #[must_use]
    pub fn accepts(&self, path: &Path) -> bool {
        let Ok(relative) = path.strip_prefix(&self.root) else {
            return false;
        };
        if !has_allowed_extension(path, &self.config.extensions) {
            return false;
        }

        let components: Vec<Component<'_>> = relative.components().collect();
        let mut current = self.root.clone();
        for (i, component) in components.iter().enumerate() {
            let Component::Normal(name) = component else {
                return false;
            };
            if name.to_string_lossy().starts_with('.') || ignored_in(&current, path) {
                return false;
            }
            current.push(name);
            let is_dir = i + 1 < components.len();
            if self.overrides.matched(&current, is_dir).is_ignore() {
                return false;
            }
        }

        path.metadata().map_or(true, |m| m.len() <= self.config.max_file_bytes)
    }
}

/// Whether an ignore file in `dir` excludes `path`, which lies below `dir`.
fn ignored_in(dir: &Path, path: &Path) -> bool {
    IGNORE_FILES.iter().any(|name| {
        let file = dir.join(name);
        if !file.is_file() {
            return false;
        }
        let (matcher, err) = Gitignore::new(&file);
        if let Some(e) = err {
            tracing::warn!(file = %file.display(), "ignore file partly invalid: {e}");
        }
        matcher.matched_path_or_any_parents(path, false).is_ignore()
    })
}

fn has_allowed_extension(path: &Path, extensions: &[String]) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    extensions
        .iter()
        .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(ext))
}
