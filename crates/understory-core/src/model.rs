//! Core data structures for the relationship graph

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Supported languages for syntax-aware extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    Python,
    JavaScript,
    Other,
}

impl Language {
    /// Detect language from file extension.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("py") | Some("pyi") => Language::Python,
            Some("js") | Some("jsx") | Some("mjs") | Some("cjs") => Language::JavaScript,
            _ => Language::Other,
        }
    }

    /// Whether relationships can be extracted from files of this language.
    pub fn is_supported(self) -> bool {
        !matches!(self, Language::Other)
    }
}

/// What kind of relationship an edge represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    Import,
    Call,
    Inheritance,
}

impl RelationshipKind {
    /// Ranking weight used when ordering context: import > call > inheritance.
    pub fn weight(self) -> u8 {
        match self {
            RelationshipKind::Import => 3,
            RelationshipKind::Call => 2,
            RelationshipKind::Inheritance => 1,
        }
    }
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RelationshipKind::Import => "import",
            RelationshipKind::Call => "call",
            RelationshipKind::Inheritance => "inheritance",
        };
        f.write_str(s)
    }
}

/// Where a relationship points.
///
/// Names that could not be mapped to a file keep their symbolic form instead
/// of carrying a missing path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Target {
    Resolved(PathBuf),
    Unresolved(String),
}

impl Target {
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Target::Resolved(path) => Some(path),
            Target::Unresolved(_) => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Target::Resolved(_))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Resolved(path) => write!(f, "{}", path.display()),
            Target::Unresolved(symbol) => write!(f, "?{symbol}"),
        }
    }
}

/// A directed, typed edge from a source file to a file or an unresolved symbol.
///
/// Identity is `(source, target, kind, line)`; the same import repeated on two
/// lines is two relationships.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Relationship {
    pub source: PathBuf,
    pub target: Target,
    pub kind: RelationshipKind,
    /// 1-based line where the relationship is expressed.
    pub line: u32,
}

impl Relationship {
    pub fn new(source: impl Into<PathBuf>, target: Target, kind: RelationshipKind, line: u32) -> Self {
        Relationship {
            source: source.into(),
            target,
            kind,
            line,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.target.is_resolved()
    }

    /// The resolved target file, if any.
    pub fn target_file(&self) -> Option<&Path> {
        self.target.as_path()
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -{}-> {}",
            self.source.display(),
            self.line,
            self.kind,
            self.target
        )
    }
}
