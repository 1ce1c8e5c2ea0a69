//! Context prioritization for a focal file
//!
//! The related set is every file the focal file depends on plus every file
//! that depends on it. Fragments are ordered by strongest relationship kind,
//! then by how recently the related file was accessed, then by how often.
//! Nothing is dropped; token counts are reported, not enforced.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::Serialize;
use understory_core::{RelationshipGraph, RelationshipKind};

use crate::cache::WorkingMemory;
use crate::tokens::count_tokens;

/// How a related file is connected to the focal file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// The focal file depends on it.
    Dependency,
    /// It depends on the focal file.
    Dependent,
    Both,
}

impl Direction {
    fn merge(self, other: Direction) -> Direction {
        if self == other { self } else { Direction::Both }
    }
}

/// One related file offered as context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextFragment {
    pub path: PathBuf,
    pub direction: Direction,
    /// Kinds of relationship linking the two files, strongest first.
    pub kinds: Vec<RelationshipKind>,
    /// Source lines of those relationships, in whichever file declares them.
    pub lines: Vec<u32>,
    /// Leading lines of the related file if it is resident in the cache.
    pub excerpt: Option<String>,
    pub tokens: Option<usize>,
    #[serde(skip)]
    weight: u8,
    #[serde(skip)]
    last_accessed: u64,
    #[serde(skip)]
    access_count: u64,
}

/// Ordered context for a focal file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextBundle {
    pub focal: PathBuf,
    pub fragments: Vec<ContextFragment>,
    /// Sum of the known fragment token counts.
    pub total_tokens: usize,
}

impl ContextBundle {
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn paths(&self) -> Vec<&Path> {
        self.fragments.iter().map(|f| f.path.as_path()).collect()
    }
}

#[derive(Default)]
struct Link {
    direction: Option<Direction>,
    kinds: BTreeSet<Reverse<(u8, RelationshipKind)>>,
    lines: BTreeSet<u32>,
}

impl Link {
    fn add(&mut self, direction: Direction, kind: RelationshipKind, line: u32) {
        self.direction = Some(match self.direction {
            Some(d) => d.merge(direction),
            None => direction,
        });
        self.kinds.insert(Reverse((kind.weight(), kind)));
        self.lines.insert(line);
    }
}

/// Assemble the context bundle for `focal` from the graph and the cache.
///
/// Related files rejected by `permitted` are left out entirely, excerpt and
/// path alike.
pub fn prioritize(
    graph: &RelationshipGraph,
    cache: &WorkingMemory,
    focal: &Path,
    excerpt_lines: usize,
    permitted: impl Fn(&Path) -> bool,
) -> ContextBundle {
    let mut links: BTreeMap<PathBuf, Link> = BTreeMap::new();

    for rel in graph.relationships_from(focal) {
        if let Some(target) = rel.target_file().filter(|t| *t != focal) {
            links
                .entry(target.to_path_buf())
                .or_default()
                .add(Direction::Dependency, rel.kind, rel.line);
        }
    }
    for dependent in graph.dependents_of(focal) {
        if dependent == focal {
            continue;
        }
        let link = links.entry(dependent.clone()).or_default();
        for rel in graph.relationships_from(&dependent) {
            if rel.target_file() == Some(focal) {
                link.add(Direction::Dependent, rel.kind, rel.line);
            }
        }
    }

    let mut fragments: Vec<ContextFragment> = links
        .into_iter()
        .filter_map(|(path, link)| {
            if !permitted(&path) {
                tracing::debug!(path = %path.display(), "Related file not permitted, left out");
                return None;
            }
            let direction = link.direction?;
            let kinds: Vec<RelationshipKind> = link.kinds.iter().map(|Reverse((_, k))| *k).collect();
            let weight = kinds.first().map_or(0, |k| k.weight());
            let access = cache.access_record(&path);
            let excerpt = cache.excerpt(&path, excerpt_lines);
            let tokens = excerpt.as_deref().and_then(count_tokens);
            Some(ContextFragment {
                path,
                direction,
                kinds,
                lines: link.lines.into_iter().collect(),
                excerpt,
                tokens,
                weight,
                last_accessed: access.last_accessed,
                access_count: access.count,
            })
        })
        .collect();

    fragments.sort_by(|a, b| {
        b.weight
            .cmp(&a.weight)
            .then(b.last_accessed.cmp(&a.last_accessed))
            .then(b.access_count.cmp(&a.access_count))
            .then_with(|| a.path.cmp(&b.path))
    });

    let total_tokens = fragments.iter().filter_map(|f| f.tokens).sum();
    tracing::debug!(
        focal = %focal.display(),
        fragments = fragments.len(),
        total_tokens,
        "Assembled context"
    );

    ContextBundle {
        focal: focal.to_path_buf(),
        fragments,
        total_tokens,
    }
}
