//! The session: one lock over graph and cache, plus the lock-free event log

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use understory_core::{
    Bound, ConfigOptions, EngineConfig, EngineError, GraphSnapshot, Language, PathValidator,
    RelationshipGraph,
};
use understory_indexer::{ExtractError, ExtractionLimits, Extractor, ModuleResolver};

use crate::cache::{CacheStats, WorkingMemory};
use crate::events::{FileEventLog, Timestamp};
use crate::prioritizer::{ContextBundle, prioritize};

/// Why a read came back with less than full context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "notice", rename_all = "snake_case")]
pub enum Notice {
    /// Extraction hit a limit. The graph keeps the file's previous
    /// relationships and the next access extracts again.
    ParseBounded { bound: Bound },
    /// The parser itself failed; handled like a bounded extraction.
    ExtractionFailed { reason: String },
    /// The content is larger than the whole cache and was not kept.
    NotCached { size_bytes: usize },
}

/// Result of reading one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadOutcome {
    pub path: PathBuf,
    pub content: String,
    pub from_cache: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<Notice>,
}

/// A read together with the context assembled for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextualRead {
    #[serde(flatten)]
    pub read: ReadOutcome,
    pub injected_context: ContextBundle,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub project_root: PathBuf,
    pub cache: CacheStats,
    pub graph_files: usize,
    pub relationships: usize,
    pub graph_generation: u64,
    pub file_events: usize,
}

/// Outcome counts from [`Session::index_project`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub files: usize,
    pub extracted: usize,
    pub bounded: usize,
    pub failed: usize,
}

/// Everything that must change together.
struct SessionState {
    config: EngineConfig,
    validator: PathValidator,
    resolver: ModuleResolver,
    limits: ExtractionLimits,
    graph: RelationshipGraph,
    cache: WorkingMemory,
}

impl SessionState {
    fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let (validator, resolver) = build_resolution(&config)?;
        let mut config = config;
        config.project_root = validator.root().to_path_buf();
        Ok(SessionState {
            limits: ExtractionLimits::from_config(&config),
            cache: WorkingMemory::new(config.max_cache_bytes),
            graph: RelationshipGraph::new(),
            validator,
            resolver,
            config,
        })
    }
}

fn build_resolution(config: &EngineConfig) -> Result<(PathValidator, ModuleResolver), EngineError> {
    let validator = PathValidator::new(&config.project_root, &config.sensitive_patterns)?;
    let package_roots: Vec<PathBuf> = config
        .package_roots
        .iter()
        .map(|r| {
            if r.is_absolute() {
                r.clone()
            } else {
                validator.root().join(r)
            }
        })
        .collect();
    let resolver = ModuleResolver::new(validator.root(), &package_roots);
    Ok((validator, resolver))
}

/// One analysis session.
///
/// The graph, the cache contents and the cache's read timestamps sit behind a
/// single mutex and only change together. File events go to a separate
/// [`FileEventLog`] that the watcher writes without taking that lock.
pub struct Session {
    state: Mutex<SessionState>,
    events: Arc<FileEventLog>,
    extractor: Extractor,
}

impl Session {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        Self::with_extractor(config, Extractor::default())
    }

    pub fn with_extractor(config: EngineConfig, extractor: Extractor) -> Result<Self, EngineError> {
        let state = SessionState::new(config)?;
        tracing::info!(root = %state.validator.root().display(), "Session started");
        Ok(Session {
            state: Mutex::new(state),
            events: Arc::new(FileEventLog::new()),
            extractor,
        })
    }

    /// Shared handle for the file watcher.
    pub fn event_log(&self) -> Arc<FileEventLog> {
        Arc::clone(&self.events)
    }

    pub fn root(&self) -> PathBuf {
        self.state.lock().validator.root().to_path_buf()
    }

    pub fn config(&self) -> EngineConfig {
        self.state.lock().config.clone()
    }

    /// Return the file's content, from the cache when it is fresh.
    ///
    /// A missing or stale entry triggers a refresh. Bounded extraction is
    /// downgraded to a [`Notice`]; denial and read failures are errors.
    pub fn read(&self, path: &Path) -> Result<ReadOutcome, EngineError> {
        let mut state = self.state.lock();
        self.read_locked(&mut state, path)
    }

    /// [`Session::read`] plus the context bundle, both under one lock so the
    /// context reflects exactly the graph the read produced.
    pub fn read_with_context(&self, path: &Path) -> Result<ContextualRead, EngineError> {
        let mut state = self.state.lock();
        let read = self.read_locked(&mut state, path)?;
        let injected_context = prioritize(
            &state.graph,
            &state.cache,
            &read.path,
            state.config.excerpt_lines,
            |p| state.validator.permits(p),
        );
        Ok(ContextualRead {
            read,
            injected_context,
        })
    }

    /// Re-extract unconditionally. Unlike [`Session::read`], a bounded
    /// extraction is reported as [`EngineError::ParseBounded`].
    pub fn refresh(&self, path: &Path) -> Result<ReadOutcome, EngineError> {
        let mut state = self.state.lock();
        let canonical = state.validator.authorize(path)?;
        let outcome = self.refresh_locked(&mut state, canonical)?;
        match outcome.notice {
            Some(Notice::ParseBounded { bound }) => Err(EngineError::ParseBounded {
                path: outcome.path,
                bound,
            }),
            _ => Ok(outcome),
        }
    }

    pub fn context_for(&self, path: &Path) -> Result<ContextBundle, EngineError> {
        let state = self.state.lock();
        let canonical = state.validator.authorize(path)?;
        Ok(prioritize(
            &state.graph,
            &state.cache,
            &canonical,
            state.config.excerpt_lines,
            |p| state.validator.permits(p),
        ))
    }

    /// Files `path` depends on, sorted.
    pub fn dependencies_of(&self, path: &Path) -> Result<Vec<PathBuf>, EngineError> {
        let state = self.state.lock();
        let canonical = state.validator.authorize(path)?;
        let mut files: Vec<PathBuf> = state.graph.dependencies_of(&canonical).into_iter().collect();
        files.sort();
        Ok(files)
    }

    /// Files that depend on `path`, sorted.
    pub fn dependents_of(&self, path: &Path) -> Result<Vec<PathBuf>, EngineError> {
        let state = self.state.lock();
        let canonical = state.validator.authorize(path)?;
        let mut files: Vec<PathBuf> = state.graph.dependents_of(&canonical).into_iter().collect();
        files.sort();
        Ok(files)
    }

    /// Record a modification event. Never takes the session lock.
    pub fn on_file_event(&self, path: &Path, at: Timestamp) {
        self.events.record(path, at);
    }

    /// Apply configuration changes. Everything is validated before anything
    /// changes. A new project root discards the graph and the cache.
    pub fn configure(&self, options: &ConfigOptions) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        let mut next = state.config.with_options(options)?;
        let (validator, resolver) = build_resolution(&next)?;
        next.project_root = validator.root().to_path_buf();

        let root_changed = validator.root() != state.validator.root();
        let packages_changed = next.package_roots != state.config.package_roots;
        let sensitive_changed = next.sensitive_patterns != state.config.sensitive_patterns;

        if root_changed {
            tracing::info!(
                from = %state.validator.root().display(),
                to = %validator.root().display(),
                "Project root changed, discarding graph and cache"
            );
            state.graph.clear();
            state.cache.clear();
        } else if packages_changed {
            let dropped = state.cache.invalidate_all();
            tracing::debug!(dropped, "Package roots changed, cached files will re-extract");
        } else if sensitive_changed {
            let dropped = state.cache.invalidate_where(|p| !validator.permits(p));
            tracing::debug!(dropped, "Sensitive patterns changed, dropped newly sensitive files");
        }

        let evicted = state.cache.set_max_bytes(next.max_cache_bytes);
        if evicted > 0 {
            tracing::debug!(evicted, max_bytes = next.max_cache_bytes, "Cache bound lowered");
        }

        state.limits = ExtractionLimits::from_config(&next);
        state.validator = validator;
        state.resolver = resolver;
        state.config = next;
        Ok(())
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        self.state.lock().graph.snapshot()
    }

    pub fn stats(&self) -> SessionStats {
        let state = self.state.lock();
        SessionStats {
            project_root: state.validator.root().to_path_buf(),
            cache: state.cache.stats(),
            graph_files: state.graph.file_count(),
            relationships: state.graph.relationship_count(),
            graph_generation: state.graph.generation(),
            file_events: self.events.len(),
        }
    }

    /// Read every supported source file under the root, honoring ignore
    /// files, so the graph is warm before the first request.
    pub fn index_project(&self) -> IndexReport {
        let root = self.root();
        let mut report = IndexReport::default();

        for entry in ignore::WalkBuilder::new(&root).build() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Walk error: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|t| t.is_file())
                || !Language::from_path(entry.path()).is_supported()
            {
                continue;
            }

            report.files += 1;
            match self.read(entry.path()) {
                Ok(ReadOutcome {
                    notice: Some(Notice::ParseBounded { .. } | Notice::ExtractionFailed { .. }),
                    ..
                }) => report.bounded += 1,
                Ok(_) => report.extracted += 1,
                Err(e) => {
                    tracing::debug!(path = %entry.path().display(), "Skipped: {}", e);
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            files = report.files,
            extracted = report.extracted,
            bounded = report.bounded,
            failed = report.failed,
            "Indexed project"
        );
        report
    }

    fn read_locked(&self, state: &mut SessionState, path: &Path) -> Result<ReadOutcome, EngineError> {
        let canonical = state.validator.authorize(path)?;
        let event = self.events.get(&canonical);
        if let Some(content) = state.cache.lookup(&canonical, event) {
            return Ok(ReadOutcome {
                path: canonical,
                content,
                from_cache: true,
                notice: None,
            });
        }
        self.refresh_locked(state, canonical)
    }

    /// Read, extract, replace the file's relationships, then cache. The
    /// caller holds the lock for the whole sequence.
    fn refresh_locked(
        &self,
        state: &mut SessionState,
        path: PathBuf,
    ) -> Result<ReadOutcome, EngineError> {
        // Taken before the read so a write racing with it is seen next time.
        let read_at = Utc::now();
        let bytes = std::fs::read(&path).map_err(|source| EngineError::CacheIoFailure {
            path: path.clone(),
            source,
        })?;
        let content = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        };

        let extraction = match self
            .extractor
            .extract(&path, &content, &state.limits, &state.resolver)
        {
            Ok(extraction) => extraction,
            Err(e) => {
                state.cache.invalidate(&path);
                let notice = match e {
                    ExtractError::Bounded(bound) => {
                        tracing::warn!(path = %path.display(), %bound, "Extraction bounded, serving without relationships");
                        Notice::ParseBounded { bound }
                    }
                    ExtractError::Parser(reason) => {
                        tracing::warn!(path = %path.display(), %reason, "Extraction failed, serving without relationships");
                        Notice::ExtractionFailed { reason }
                    }
                };
                return Ok(ReadOutcome {
                    path,
                    content,
                    from_cache: false,
                    notice: Some(notice),
                });
            }
        };

        let count = extraction.relationships.len();
        state.graph.replace_file(&path, extraction.relationships)?;
        debug_assert!(state.graph.check_consistency().is_ok());

        let size_bytes = content.len();
        let cached = state.cache.store(&path, content.clone(), read_at);
        tracing::debug!(
            path = %path.display(),
            relationships = count,
            resolved = extraction.stats.resolved,
            size_bytes,
            "Refreshed"
        );

        Ok(ReadOutcome {
            path,
            content,
            from_cache: false,
            notice: (!cached).then_some(Notice::NotCached { size_bytes }),
        })
    }
}
