//! Path authorization: symlink resolution, root containment, sensitive files

use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use crate::error::{DenyReason, EngineError};

/// Resolves and authorizes paths against a canonical project root.
#[derive(Debug, Clone)]
pub struct PathValidator {
    root: PathBuf,
    sensitive: GlobSet,
}

impl PathValidator {
    /// Build a validator. The root is canonicalized once here.
    pub fn new(root: &Path, sensitive_patterns: &[String]) -> Result<Self, EngineError> {
        let root = std::fs::canonicalize(root).map_err(|e| {
            EngineError::InvalidConfig(format!(
                "cannot canonicalize project root {}: {}",
                root.display(),
                e
            ))
        })?;
        if !root.is_dir() {
            return Err(EngineError::InvalidConfig(format!(
                "project root {} is not a directory",
                root.display()
            )));
        }

        let mut builder = GlobSetBuilder::new();
        for pattern in sensitive_patterns {
            let glob = GlobBuilder::new(pattern)
                .literal_separator(true)
                .build()
                .map_err(|e| {
                    EngineError::InvalidConfig(format!("bad sensitive pattern {pattern:?}: {e}"))
                })?;
            builder.add(glob);
        }
        let sensitive = builder
            .build()
            .map_err(|e| EngineError::InvalidConfig(e.to_string()))?;

        Ok(PathValidator { root, sensitive })
    }

    /// The canonical project root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `path` to its canonical form and authorize it.
    ///
    /// Relative paths are taken relative to the project root. Every check runs
    /// on the fully resolved path, so a link is never judged by where it sits.
    pub fn authorize(&self, path: &Path) -> Result<PathBuf, EngineError> {
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };

        let canonical = match std::fs::canonicalize(&joined) {
            Ok(canonical) => canonical,
            Err(source) => {
                let escapes = dangling_link_target(&joined).filter(|t| !t.starts_with(&self.root));
                if let Some(target) = escapes {
                    tracing::warn!(
                        requested = %joined.display(),
                        target = %target.display(),
                        "Dangling link points outside project root"
                    );
                    return Err(EngineError::AccessDenied {
                        path: joined,
                        reason: DenyReason::OutsideRoot,
                    });
                }
                return Err(EngineError::CacheIoFailure {
                    path: joined,
                    source,
                });
            }
        };

        if !canonical.starts_with(&self.root) {
            tracing::warn!(
                requested = %joined.display(),
                resolved = %canonical.display(),
                "Path escapes project root"
            );
            return Err(EngineError::AccessDenied {
                path: joined,
                reason: DenyReason::OutsideRoot,
            });
        }

        if self.is_sensitive(&canonical) || self.is_sensitive(&joined) {
            tracing::warn!(path = %joined.display(), "Sensitive path refused");
            return Err(EngineError::AccessDenied {
                path: joined,
                reason: DenyReason::Sensitive,
            });
        }

        Ok(canonical)
    }

    /// Whether an already canonical path may be read or handed out as context.
    pub fn permits(&self, canonical: &Path) -> bool {
        canonical.starts_with(&self.root) && !self.is_sensitive(canonical)
    }

    /// Check a path against the sensitive patterns. Paths under the root are
    /// matched relative to it, so the root's own location never matters.
    pub fn is_sensitive(&self, path: &Path) -> bool {
        match path.strip_prefix(&self.root) {
            Ok(rel) => self.sensitive.is_match(rel),
            Err(_) => self.sensitive.is_match(path),
        }
    }
}

/// Where a symlink that cannot be canonicalized points, keyed like any other
/// missing file. `None` if `path` is not a symlink.
fn dangling_link_target(path: &Path) -> Option<PathBuf> {
    let meta = std::fs::symlink_metadata(path).ok()?;
    if !meta.file_type().is_symlink() {
        return None;
    }
    let target = std::fs::read_link(path).ok()?;
    let target = match path.parent() {
        Some(parent) if target.is_relative() => parent.join(target),
        _ => target,
    };
    Some(canonical_key(&target))
}

/// Key a path the way the cache and graph do. A file that no longer exists is
/// keyed through its canonical parent directory.
pub fn canonical_key(path: &Path) -> PathBuf {
    if let Ok(canonical) = std::fs::canonicalize(path) {
        return canonical;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => std::fs::canonicalize(parent)
            .map(|p| p.join(name))
            .unwrap_or_else(|_| path.to_path_buf()),
        _ => path.to_path_buf(),
    }
}
