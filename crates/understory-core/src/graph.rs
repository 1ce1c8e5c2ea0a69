//! Relationship graph with forward and reverse file indices

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::model::Relationship;

/// In-memory relationship store.
///
/// `dependencies` and `dependents` are derived from the same relationship set
/// and are only ever changed together inside [`RelationshipGraph::replace_file`]
/// or [`RelationshipGraph::remove_file`].
#[derive(Default)]
pub struct RelationshipGraph {
    /// Each file's current outgoing relationships, in extraction order.
    outgoing: HashMap<PathBuf, Vec<Relationship>>,
    dependencies: HashMap<PathBuf, HashSet<PathBuf>>,
    dependents: HashMap<PathBuf, HashSet<PathBuf>>,
    generation: u64,
}

impl std::fmt::Debug for RelationshipGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationshipGraph")
            .field("file_count", &self.outgoing.len())
            .field("relationship_count", &self.relationship_count())
            .field("generation", &self.generation)
            .finish()
    }
}

/// Serializable export of the graph, for inspection only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub version: String,
    pub relationships: Vec<Relationship>,
}

impl RelationshipGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every outgoing relationship of `file` with `relationships`.
    ///
    /// All validation and allocation happens before the first map is touched,
    /// so on error the graph is exactly as it was.
    pub fn replace_file(
        &mut self,
        file: &Path,
        relationships: Vec<Relationship>,
    ) -> Result<(), EngineError> {
        if let Some(stray) = relationships.iter().find(|r| r.source != file) {
            return Err(EngineError::GraphUpdateFailed {
                path: file.to_path_buf(),
                reason: format!(
                    "relationship sourced from {} submitted for {}",
                    stray.source.display(),
                    file.display()
                ),
            });
        }

        let new_targets: HashSet<PathBuf> = relationships
            .iter()
            .filter_map(|r| r.target_file().map(Path::to_path_buf))
            .collect();

        let fresh_dependents = new_targets
            .iter()
            .filter(|t| !self.dependents.contains_key(*t))
            .count();
        let reserve = |e: std::collections::TryReserveError| EngineError::GraphUpdateFailed {
            path: file.to_path_buf(),
            reason: e.to_string(),
        };
        self.outgoing.try_reserve(1).map_err(reserve)?;
        self.dependencies.try_reserve(1).map_err(reserve)?;
        self.dependents.try_reserve(fresh_dependents).map_err(reserve)?;

        self.detach(file);

        for target in &new_targets {
            self.dependents
                .entry(target.clone())
                .or_default()
                .insert(file.to_path_buf());
        }
        if !new_targets.is_empty() {
            self.dependencies.insert(file.to_path_buf(), new_targets);
        }
        self.outgoing.insert(file.to_path_buf(), relationships);
        self.generation += 1;

        tracing::debug!(
            file = %file.display(),
            dependencies = self.dependencies.get(file).map_or(0, HashSet::len),
            "Replaced file relationships"
        );
        Ok(())
    }

    /// Drop every outgoing relationship of `file`. Incoming edges from other
    /// files stay, since they belong to those files.
    pub fn remove_file(&mut self, file: &Path) -> bool {
        let known = self.outgoing.contains_key(file);
        if known {
            self.detach(file);
            self.generation += 1;
        }
        known
    }

    /// Remove `file`'s outgoing entries from all three maps.
    fn detach(&mut self, file: &Path) {
        self.outgoing.remove(file);
        if let Some(old_targets) = self.dependencies.remove(file) {
            for target in old_targets {
                if let Some(set) = self.dependents.get_mut(&target) {
                    set.remove(file);
                    if set.is_empty() {
                        self.dependents.remove(&target);
                    }
                }
            }
        }
    }

    /// Files `file` points at.
    pub fn dependencies_of(&self, file: &Path) -> HashSet<PathBuf> {
        self.dependencies.get(file).cloned().unwrap_or_default()
    }

    /// Files pointing at `file`.
    pub fn dependents_of(&self, file: &Path) -> HashSet<PathBuf> {
        self.dependents.get(file).cloned().unwrap_or_default()
    }

    /// Current outgoing relationships of `file`, in extraction order.
    pub fn relationships_from(&self, file: &Path) -> &[Relationship] {
        self.outgoing.get(file).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether `file` has been ingested at least once.
    pub fn contains_file(&self, file: &Path) -> bool {
        self.outgoing.contains_key(file)
    }

    pub fn file_count(&self) -> usize {
        self.outgoing.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.outgoing.values().map(Vec::len).sum()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.outgoing.clear();
        self.dependencies.clear();
        self.dependents.clear();
        self.generation += 1;
    }

    /// Export all relationships, sorted by source file then extraction order.
    pub fn snapshot(&self) -> GraphSnapshot {
        let mut files: Vec<&PathBuf> = self.outgoing.keys().collect();
        files.sort();
        let relationships = files
            .into_iter()
            .flat_map(|f| self.outgoing[f].iter().cloned())
            .collect();
        GraphSnapshot {
            version: format!("{}+g{}", env!("CARGO_PKG_VERSION"), self.generation),
            relationships,
        }
    }

    /// Verify that the two indices are exact inverses and agree with the
    /// stored relationships. Returns a description of the first violation.
    pub fn check_consistency(&self) -> Result<(), String> {
        for (source, targets) in &self.dependencies {
            for target in targets {
                let back = self
                    .dependents
                    .get(target)
                    .is_some_and(|s| s.contains(source));
                if !back {
                    return Err(format!(
                        "{} -> {} has no reverse entry",
                        source.display(),
                        target.display()
                    ));
                }
            }
        }
        for (target, sources) in &self.dependents {
            for source in sources {
                let forward = self
                    .dependencies
                    .get(source)
                    .is_some_and(|s| s.contains(target));
                if !forward {
                    return Err(format!(
                        "{} <- {} has no forward entry",
                        target.display(),
                        source.display()
                    ));
                }
            }
        }
        for (source, relationships) in &self.outgoing {
            let derived: HashSet<&Path> =
                relationships.iter().filter_map(Relationship::target_file).collect();
            let indexed: HashSet<&Path> = self
                .dependencies
                .get(source)
                .map(|s| s.iter().map(PathBuf::as_path).collect())
                .unwrap_or_default();
            if derived != indexed {
                return Err(format!(
                    "dependencies of {} disagree with its relationships",
                    source.display()
                ));
            }
        }
        Ok(())
    }
}
