//! Bounded relationship extraction
//!
//! [`Extractor::extract`] parses one file and walks its syntax tree under two
//! limits: a maximum depth and a wall-clock deadline shared by parsing and
//! walking. Hitting either aborts the whole file; no partial relationship list
//! is ever returned.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Serialize;
use tree_sitter::{Node, Tree};
use understory_core::{Bound, EngineConfig, Language, Relationship, RelationshipKind, Target};

use crate::languages::get_extractor;
use crate::parser_pool::{FileType, ParseRequest, ParserPool, create_parser_pool};
use crate::resolver::ModuleResolver;

/// Why extraction produced nothing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    #[error("extraction bounded: {0}")]
    Bounded(Bound),
    #[error("parser failure: {0}")]
    Parser(String),
}

/// Per-file safety limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionLimits {
    pub max_depth: usize,
    pub timeout: Duration,
}

impl ExtractionLimits {
    pub fn from_config(config: &EngineConfig) -> Self {
        ExtractionLimits {
            max_depth: config.max_traversal_depth,
            timeout: Duration::from_millis(config.extraction_timeout_ms),
        }
    }
}

/// How relationships that differ only by line are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Same target on different lines stays distinct.
    #[default]
    KeepDistinctLines,
    /// Keep only the first line for each `(source, target, kind)`.
    CollapseLines,
}

/// Depth and deadline accounting for one tree walk.
#[derive(Debug)]
pub struct WalkGuard {
    max_depth: usize,
    deadline: Instant,
    timeout_ms: u64,
    visited: u64,
}

impl WalkGuard {
    /// Deadline is measured from `started`, so time spent parsing counts.
    pub fn new(limits: &ExtractionLimits, started: Instant) -> Self {
        WalkGuard {
            max_depth: limits.max_depth,
            deadline: started + limits.timeout,
            timeout_ms: limits.timeout.as_millis() as u64,
            visited: 0,
        }
    }

    /// Check the limits before visiting a node at `depth`.
    pub fn check(&mut self, depth: usize) -> Result<(), Bound> {
        if depth > self.max_depth {
            return Err(Bound::Depth {
                max_depth: self.max_depth,
            });
        }
        self.visited += 1;
        // Clock reads are amortized over batches of nodes.
        if self.visited % 256 == 0 && Instant::now() >= self.deadline {
            return Err(Bound::Timeout {
                timeout_ms: self.timeout_ms,
            });
        }
        Ok(())
    }

    /// Deadline-only check, used while resolving collected names.
    pub fn check_deadline(&self) -> Result<(), Bound> {
        if Instant::now() >= self.deadline {
            return Err(Bound::Timeout {
                timeout_ms: self.timeout_ms,
            });
        }
        Ok(())
    }

    pub fn visited(&self) -> u64 {
        self.visited
    }
}

/// Pre-order walk over `root` with an explicit cursor, so pathological nesting
/// costs no native stack.
pub fn walk<'t>(
    root: Node<'t>,
    guard: &mut WalkGuard,
    mut visit: impl FnMut(Node<'t>),
) -> Result<(), Bound> {
    let mut cursor = root.walk();
    let mut depth = 0usize;
    loop {
        guard.check(depth)?;
        visit(cursor.node());

        if cursor.goto_first_child() {
            depth += 1;
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return Ok(());
            }
            depth -= 1;
        }
    }
}

/// 1-based line of a node.
pub(crate) fn line_of(node: Node<'_>) -> u32 {
    node.start_position().row as u32 + 1
}

/// Counters describing how targets were resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionStats {
    pub resolved: usize,
    pub builtin: usize,
    pub unresolved: usize,
    /// Calls to names defined in the same file; these produce no relationship.
    pub intra_file_calls: usize,
    pub nodes_visited: u64,
}

/// Relationships extracted from one file, in source order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub relationships: Vec<Relationship>,
    pub stats: ExtractionStats,
}

/// Inputs shared by every language extractor.
pub struct ExtractContext<'a> {
    pub path: &'a Path,
    pub source: &'a [u8],
    pub resolver: &'a ModuleResolver,
}

impl ExtractContext<'_> {
    pub fn text(&self, node: Node<'_>) -> &str {
        node.utf8_text(self.source).unwrap_or("")
    }
}

/// Language-specific relationship extraction over a parsed tree.
pub trait LanguageExtractor: Send + Sync {
    fn file_type(&self) -> FileType;

    fn extract(
        &self,
        tree: &Tree,
        ctx: &ExtractContext<'_>,
        guard: &mut WalkGuard,
    ) -> Result<Extraction, Bound>;
}

/// Entry point: parse one file and return its bounded relationship set.
#[derive(Clone)]
pub struct Extractor {
    pool: ParserPool,
    duplicates: DuplicatePolicy,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(create_parser_pool())
    }
}

impl Extractor {
    pub fn new(pool: ParserPool) -> Self {
        Extractor {
            pool,
            duplicates: DuplicatePolicy::default(),
        }
    }

    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicates = policy;
        self
    }

    pub fn extract(
        &self,
        path: &Path,
        content: &str,
        limits: &ExtractionLimits,
        resolver: &ModuleResolver,
    ) -> Result<Extraction, ExtractError> {
        let Some(extractor) = get_extractor(Language::from_path(path)) else {
            return Ok(Extraction::default());
        };

        let started = Instant::now();
        let parsed = self.pool.parse_blocking(ParseRequest {
            file_type: extractor.file_type(),
            content: content.to_string(),
            path: path.to_path_buf(),
            timeout: limits.timeout,
        })?;

        let mut guard = WalkGuard::new(limits, started);
        let ctx = ExtractContext {
            path,
            source: parsed.content.as_bytes(),
            resolver,
        };
        let mut extraction = extractor
            .extract(&parsed.tree, &ctx, &mut guard)
            .map_err(ExtractError::Bounded)?;

        extraction.relationships = dedupe(extraction.relationships, self.duplicates);
        extraction.stats.nodes_visited = guard.visited();

        tracing::debug!(
            path = %path.display(),
            relationships = extraction.relationships.len(),
            resolved = extraction.stats.resolved,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Extracted relationships"
        );
        Ok(extraction)
    }
}

/// Collapse identical relationships, keeping first occurrence order, then
/// order by line.
pub fn dedupe(relationships: Vec<Relationship>, policy: DuplicatePolicy) -> Vec<Relationship> {
    let mut seen: HashSet<(PathBuf, Target, RelationshipKind, u32)> = HashSet::new();
    let mut out: Vec<Relationship> = relationships
        .into_iter()
        .filter(|r| {
            let line = match policy {
                DuplicatePolicy::KeepDistinctLines => r.line,
                DuplicatePolicy::CollapseLines => 0,
            };
            seen.insert((r.source.clone(), r.target.clone(), r.kind, line))
        })
        .collect();
    out.sort_by_key(|r| r.line);
    out
}
