//! Language detection and per-language signature patterns.
//!
//! The patterns are line-oriented regexes, not a parser. They are good enough to
//! name the functions, classes, imports and exports a chunk mentions.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Go,
    Java,
    C,
    Cpp,
    CSharp,
    Ruby,
    Php,
    Swift,
    Kotlin,
    Markdown,
    Json,
    Toml,
    Yaml,
    Shell,
    Unknown,
}

impl Lang {
    /// Identifier stored in chunk metadata and matched by search filters.
    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Self::Rust => "rust",
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Go => "go",
            Self::Java => "java",
            Self::C => "c",
            Self::Cpp => "cpp",
            Self::CSharp => "csharp",
            Self::Ruby => "ruby",
            Self::Php => "php",
            Self::Swift => "swift",
            Self::Kotlin => "kotlin",
            Self::Markdown => "markdown",
            Self::Json => "json",
            Self::Toml => "toml",
            Self::Yaml => "yaml",
            Self::Shell => "shell",
            Self::Unknown => "unknown",
        }
    }

    /// Block bodies are delimited by `{` and `}`.
    #[must_use]
    pub fn uses_braces(self) -> bool {
        matches!(
            self,
            Self::Rust
                | Self::JavaScript
                | Self::TypeScript
                | Self::Go
                | Self::Java
                | Self::C
                | Self::Cpp
                | Self::CSharp
                | Self::Php
                | Self::Swift
                | Self::Kotlin
                | Self::Shell
        )
    }

    /// Block bodies are delimited by indentation.
    #[must_use]
    pub fn uses_indentation(self) -> bool {
        self == Self::Python
    }

    #[must_use]
    pub fn patterns(self) -> &'static LangPatterns {
        match self {
            Self::Rust => &RUST,
            Self::Python => &PYTHON,
            Self::JavaScript => &JAVASCRIPT,
            Self::TypeScript => &TYPESCRIPT,
            Self::Go => &GO,
            Self::Java | Self::Kotlin | Self::CSharp => &JVM_LIKE,
            Self::C | Self::Cpp => &C_LIKE,
            Self::Ruby => &RUBY,
            Self::Php => &PHP,
            Self::Swift => &SWIFT,
            Self::Shell => &SHELL,
            Self::Markdown | Self::Json | Self::Toml | Self::Yaml => &DATA,
            Self::Unknown => &GENERIC,
        }
    }
}

impl std::fmt::Display for Lang {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Detect language from file extension. Unrecognized extensions map to [`Lang::Unknown`].
#[must_use]
pub fn detect_language(path: &Path) -> Lang {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return Lang::Unknown;
    };
    match ext.to_ascii_lowercase().as_str() {
        "rs" => Lang::Rust,
        "py" | "pyi" => Lang::Python,
        "js" | "jsx" | "mjs" | "cjs" => Lang::JavaScript,
        "ts" | "tsx" | "mts" | "cts" => Lang::TypeScript,
        "go" => Lang::Go,
        "java" => Lang::Java,
        "c" | "h" => Lang::C,
        "cc" | "cpp" | "cxx" | "hpp" | "hh" | "hxx" => Lang::Cpp,
        "cs" => Lang::CSharp,
        "rb" => Lang::Ruby,
        "php" => Lang::Php,
        "swift" => Lang::Swift,
        "kt" | "kts" => Lang::Kotlin,
        "md" | "markdown" => Lang::Markdown,
        "json" | "jsonc" => Lang::Json,
        "toml" => Lang::Toml,
        "yml" | "yaml" => Lang::Yaml,
        "sh" | "bash" | "zsh" => Lang::Shell,
        _ => Lang::Unknown,
    }
}

/// Signature regexes for one language. Every regex captures the symbol as `name`.
#[derive(Debug)]
pub struct LangPatterns {
    pub functions: Vec<Regex>,
    pub classes: Vec<Regex>,
    pub imports: Vec<Regex>,
    pub exports: Vec<Regex>,
}

/// Names extracted from a piece of source text.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Symbols {
    pub functions: Vec<String>,
    pub classes: Vec<String>,
    pub imports: Vec<String>,
    pub exports: Vec<String>,
}

impl LangPatterns {
    fn new(functions: &[&str], classes: &[&str], imports: &[&str], exports: &[&str]) -> Self {
        Self {
            functions: compile(functions),
            classes: compile(classes),
            imports: compile(imports),
            exports: compile(exports),
        }
    }

    #[must_use]
    pub fn extract(&self, text: &str) -> Symbols {
        Symbols {
            functions: capture_names(&self.functions, text),
            classes: capture_names(&self.classes, text),
            imports: capture_names(&self.imports, text),
            exports: capture_names(&self.exports, text),
        }
    }
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("static signature regex must compile"))
        .collect()
}

/// Distinct `name` captures in order of first appearance.
fn capture_names(regexes: &[Regex], text: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for re in regexes {
        for caps in re.captures_iter(text) {
            if let Some(m) = caps.name("name") {
                let name = m.as_str().trim();
                if !name.is_empty() && !out.iter().any(|n| n == name) {
                    out.push(name.to_owned());
                }
            }
        }
    }
    out
}

static RUST: LazyLock<LangPatterns> = LazyLock::new(|| {
    LangPatterns::new(
        &[
            r#"(?m)^[ \t]*(?:pub(?:\([^)]*\))?[ \t]+)?(?:const[ \t]+)?(?:async[ \t]+)?(?:unsafe[ \t]+)?(?:extern[ \t]+"[^"]*"[ \t]+)?fn[ \t]+(?P<name>[A-Za-z_][A-Za-z0-9_]*)"#,
        ],
        &[
            r"(?m)^[ \t]*(?:pub(?:\([^)]*\))?[ \t]+)?(?:struct|enum|trait|union)[ \t]+(?P<name>[A-Za-z_][A-Za-z0-9_]*)",
            r"(?m)^[ \t]*impl(?:<[^>]*>)?[ \t]+(?:[A-Za-z_][A-Za-z0-9_:<>, ]*[ \t]+for[ \t]+)?(?P<name>[A-Za-z_][A-Za-z0-9_]*)",
        ],
        &[r"(?m)^[ \t]*(?:pub[ \t]+)?use[ \t]+(?P<name>[^;]+);"],
        &[
            r"(?m)^[ \t]*pub[ \t]+(?:async[ \t]+)?(?:fn|struct|enum|trait|mod|const|static|type)[ \t]+(?P<name>[A-Za-z_][A-Za-z0-9_]*)",
        ],
    )
});

static PYTHON: LazyLock<LangPatterns> = LazyLock::new(|| {
    LangPatterns::new(
        &[r"(?m)^[ \t]*(?:async[ \t]+)?def[ \t]+(?P<name>[A-Za-z_]\w*)"],
        &[r"(?m)^[ \t]*class[ \t]+(?P<name>[A-Za-z_]\w*)"],
        &[r"(?m)^[ \t]*(?:from|import)[ \t]+(?P<name>[A-Za-z_][\w.]*)"],
        &[r#"(?m)^__all__[ \t]*=[ \t]*\[[ \t]*["'](?P<name>\w+)["']"#],
    )
});

const JS_FUNCTIONS: [&str; 2] = [
    r"(?m)^[ \t]*(?:export[ \t]+)?(?:default[ \t]+)?(?:async[ \t]+)?function[ \t]*\*?[ \t]*(?P<name>[A-Za-z_$][\w$]*)",
    r"(?m)^[ \t]*(?:export[ \t]+)?(?:const|let|var)[ \t]+(?P<name>[A-Za-z_$][\w$]*)[ \t]*=[ \t]*(?:async[ \t]+)?(?:\([^)]*\)|[A-Za-z_$][\w$]*)[ \t]*=>",
];
const JS_IMPORTS: [&str; 2] = [
    r#"(?m)^[ \t]*import[ \t][^'"]*['"](?P<name>[^'"]+)['"]"#,
    r#"require\([ \t]*['"](?P<name>[^'"]+)['"][ \t]*\)"#,
];
const JS_EXPORTS: [&str; 2] = [
    r"(?m)^[ \t]*export[ \t]+(?:default[ \t]+)?(?:async[ \t]+)?(?:function|class|const|let|var|interface|type|enum)[ \t]*\*?[ \t]*(?P<name>[A-Za-z_$][\w$]*)",
    r"(?m)^[ \t]*(?:module\.)?exports\.(?P<name>[A-Za-z_$][\w$]*)[ \t]*=",
];

static JAVASCRIPT: LazyLock<LangPatterns> = LazyLock::new(|| {
    LangPatterns::new(
        &JS_FUNCTIONS,
        &[r"(?m)^[ \t]*(?:export[ \t]+)?(?:default[ \t]+)?class[ \t]+(?P<name>[A-Za-z_$][\w$]*)"],
        &JS_IMPORTS,
        &JS_EXPORTS,
    )
});

static TYPESCRIPT: LazyLock<LangPatterns> = LazyLock::new(|| {
    LangPatterns::new(
        &JS_FUNCTIONS,
        &[
            r"(?m)^[ \t]*(?:export[ \t]+)?(?:default[ \t]+)?(?:abstract[ \t]+)?(?:class|interface|enum)[ \t]+(?P<name>[A-Za-z_$][\w$]*)",
            r"(?m)^[ \t]*(?:export[ \t]+)?type[ \t]+(?P<name>[A-Za-z_$][\w$]*)[ \t]*(?:<[^>]*>)?[ \t]*=",
        ],
        &JS_IMPORTS,
        &JS_EXPORTS,
    )
});

static GO: LazyLock<LangPatterns> = LazyLock::new(|| {
    LangPatterns::new(
        &[r"(?m)^func[ \t]+(?:\([^)]*\)[ \t]*)?(?P<name>[A-Za-z_]\w*)"],
        &[r"(?m)^type[ \t]+(?P<name>[A-Za-z_]\w*)[ \t]+(?:struct|interface)"],
        &[r#"(?m)^[ \t]*(?:import[ \t]+)?(?:[A-Za-z_]\w*[ \t]+)?"(?P<name>[^"]+)"$"#],
        &[r"(?m)^(?:func|type|var|const)[ \t]+(?:\([^)]*\)[ \t]*)?(?P<name>[A-Z]\w*)"],
    )
});

static JVM_LIKE: LazyLock<LangPatterns> = LazyLock::new(|| {
    LangPatterns::new(
        &[
            r"(?m)^[ \t]*(?:(?:public|private|protected|internal|static|final|abstract|override|async|virtual|suspend|open)[ \t]+)*(?:fun[ \t]+(?:<[^>]*>[ \t]*)?|[\w<>\[\],.?]+[ \t]+)(?P<name>[A-Za-z_]\w*)[ \t]*\([^;{]*\)[^;{]*\{",
        ],
        &[
            r"(?m)^[ \t]*(?:(?:public|private|protected|internal|static|final|abstract|sealed|data|open|partial)[ \t]+)*(?:class|interface|enum|record|object|struct)[ \t]+(?P<name>[A-Za-z_]\w*)",
        ],
        &[r"(?m)^[ \t]*(?:import|using)[ \t]+(?:static[ \t]+)?(?P<name>[\w.*]+)"],
        &[
            r"(?m)^[ \t]*public[ \t]+(?:(?:static|final|abstract|sealed|partial)[ \t]+)*(?:class|interface|enum|record|struct)[ \t]+(?P<name>[A-Za-z_]\w*)",
        ],
    )
});

static C_LIKE: LazyLock<LangPatterns> = LazyLock::new(|| {
    LangPatterns::new(
        &[
            r"(?m)^(?:(?:static|inline|extern|virtual|const|unsigned|signed)[ \t]+)*[A-Za-z_][\w:<>*& \t]*?[ \t*&]+(?P<name>[A-Za-z_][\w:~]*)[ \t]*\([^;{]*\)[ \t]*(?:const[ \t]*)?\{",
        ],
        &[r"(?m)^[ \t]*(?:typedef[ \t]+)?(?:class|struct|union|enum)[ \t]+(?P<name>[A-Za-z_]\w*)[^;]*$"],
        &[r#"(?m)^[ \t]*#[ \t]*include[ \t]*[<"](?P<name>[^>"]+)[>"]"#],
        &[],
    )
});

static RUBY: LazyLock<LangPatterns> = LazyLock::new(|| {
    LangPatterns::new(
        &[r"(?m)^[ \t]*def[ \t]+(?:self\.)?(?P<name>[A-Za-z_]\w*[?!=]?)"],
        &[r"(?m)^[ \t]*(?:class|module)[ \t]+(?P<name>[A-Z][\w:]*)"],
        &[r#"(?m)^[ \t]*require(?:_relative)?[ \t]+['"](?P<name>[^'"]+)['"]"#],
        &[],
    )
});

static PHP: LazyLock<LangPatterns> = LazyLock::new(|| {
    LangPatterns::new(
        &[r"(?m)^[ \t]*(?:(?:public|private|protected|static|abstract|final)[ \t]+)*function[ \t]+&?(?P<name>[A-Za-z_]\w*)"],
        &[r"(?m)^[ \t]*(?:(?:abstract|final)[ \t]+)?(?:class|interface|trait|enum)[ \t]+(?P<name>[A-Za-z_]\w*)"],
        &[r"(?m)^[ \t]*(?:use|require_once|include_once|require|include)[ \t]+(?P<name>[\w\\]+)"],
        &[],
    )
});

static SWIFT: LazyLock<LangPatterns> = LazyLock::new(|| {
    LangPatterns::new(
        &[r"(?m)^[ \t]*(?:(?:public|private|internal|fileprivate|open|static|override|mutating|final)[ \t]+)*func[ \t]+(?P<name>[A-Za-z_]\w*)"],
        &[r"(?m)^[ \t]*(?:(?:public|private|internal|fileprivate|open|final)[ \t]+)*(?:class|struct|protocol|enum|extension|actor)[ \t]+(?P<name>[A-Za-z_]\w*)"],
        &[r"(?m)^[ \t]*import[ \t]+(?P<name>\w+)"],
        &[r"(?m)^[ \t]*(?:public|open)[ \t]+(?:final[ \t]+)?(?:func|class|struct|protocol|enum)[ \t]+(?P<name>[A-Za-z_]\w*)"],
    )
});

static SHELL: LazyLock<LangPatterns> = LazyLock::new(|| {
    LangPatterns::new(
        &[
            r"(?m)^[ \t]*function[ \t]+(?P<name>[A-Za-z_][\w-]*)",
            r"(?m)^[ \t]*(?P<name>[A-Za-z_][\w-]*)[ \t]*\(\)[ \t]*\{",
        ],
        &[],
        &[r"(?m)^[ \t]*(?:source|\.)[ \t]+(?P<name>\S+)"],
        &[r"(?m)^[ \t]*export[ \t]+(?P<name>[A-Za-z_]\w*)="],
    )
});

static DATA: LazyLock<LangPatterns> = LazyLock::new(|| LangPatterns::new(&[], &[], &[], &[]));

static GENERIC: LazyLock<LangPatterns> = LazyLock::new(|| {
    LangPatterns::new(
        &[r"(?m)^[ \t]*(?:export[ \t]+)?(?:function|def|fn|func|sub|proc)[ \t]+(?P<name>[A-Za-z_]\w*)"],
        &[r"(?m)^[ \t]*(?:export[ \t]+)?(?:class|struct|interface|module|trait)[ \t]+(?P<name>[A-Za-z_]\w*)"],
        &[r#"(?m)^[ \t]*(?:import|use|require|include|using)[ \t]+['"<]?(?P<name>[\w./:-]+)"#],
        &[r"(?m)^[ \t]*export[ \t]+(?:\w+[ \t]+)?(?P<name>[A-Za-z_]\w*)"],
    )
});
