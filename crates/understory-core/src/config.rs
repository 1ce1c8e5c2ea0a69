//! Engine configuration

use std::path::{Path, PathBuf};

use globset::Glob;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Config file looked up at the project root.
pub const CONFIG_FILE: &str = "understory.toml";

/// Default upper bound on resident cache content.
pub const DEFAULT_MAX_CACHE_BYTES: usize = 8 * 1024 * 1024;

/// Default per-file extraction budget.
pub const DEFAULT_EXTRACTION_TIMEOUT_MS: u64 = 2_000;

/// Default syntax tree depth limit.
pub const DEFAULT_MAX_TRAVERSAL_DEPTH: usize = 256;

/// Default number of lines included in a context excerpt.
pub const DEFAULT_EXCERPT_LINES: usize = 60;

/// Credential files, private keys and environment files.
pub const DEFAULT_SENSITIVE_PATTERNS: &[&str] = &[
    "**/.env",
    "**/.env.*",
    "**/*.pem",
    "**/*.key",
    "**/*.p12",
    "**/*.pfx",
    "**/id_rsa*",
    "**/id_ed25519*",
    "**/id_ecdsa*",
    "**/credentials*",
    "**/.netrc",
    "**/.ssh/**",
    "**/.aws/**",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory every authorized path must live under.
    pub project_root: PathBuf,
    /// Globs that are refused regardless of location.
    pub sensitive_patterns: Vec<String>,
    pub max_cache_bytes: usize,
    pub extraction_timeout_ms: u64,
    pub max_traversal_depth: usize,
    /// Declared third-party package roots consulted during import resolution.
    pub package_roots: Vec<PathBuf>,
    pub excerpt_lines: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            project_root: PathBuf::from("."),
            sensitive_patterns: DEFAULT_SENSITIVE_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            max_cache_bytes: DEFAULT_MAX_CACHE_BYTES,
            extraction_timeout_ms: DEFAULT_EXTRACTION_TIMEOUT_MS,
            max_traversal_depth: DEFAULT_MAX_TRAVERSAL_DEPTH,
            package_roots: Vec::new(),
            excerpt_lines: DEFAULT_EXCERPT_LINES,
        }
    }
}

impl EngineConfig {
    /// Default configuration rooted at `root`.
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        EngineConfig {
            project_root: root.into(),
            ..EngineConfig::default()
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self, EngineError> {
        let config: EngineConfig =
            toml::from_str(s).map_err(|e| EngineError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `understory.toml` from `root` if present, otherwise defaults.
    ///
    /// A relative `project_root` in the file is taken relative to `root`.
    pub fn load(root: &Path) -> Result<Self, EngineError> {
        let path = root.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(EngineConfig::for_root(root));
        }

        let raw = std::fs::read_to_string(&path).map_err(|e| {
            EngineError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        let mut config = EngineConfig::from_toml_str(&raw)?;
        if config.project_root.is_relative() {
            config.project_root = root.join(&config.project_root);
        }
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.max_cache_bytes == 0 {
            return Err(EngineError::InvalidConfig(
                "max_cache_bytes must be greater than zero".to_string(),
            ));
        }
        if self.extraction_timeout_ms == 0 {
            return Err(EngineError::InvalidConfig(
                "extraction_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_traversal_depth == 0 {
            return Err(EngineError::InvalidConfig(
                "max_traversal_depth must be greater than zero".to_string(),
            ));
        }
        for pattern in &self.sensitive_patterns {
            Glob::new(pattern).map_err(|e| {
                EngineError::InvalidConfig(format!("bad sensitive pattern {pattern:?}: {e}"))
            })?;
        }
        Ok(())
    }

    /// Return a copy with `options` applied. `self` is untouched if the result
    /// fails validation.
    pub fn with_options(&self, options: &ConfigOptions) -> Result<Self, EngineError> {
        let mut next = self.clone();
        if let Some(root) = &options.project_root {
            next.project_root = root.clone();
        }
        if let Some(patterns) = &options.sensitive_patterns {
            next.sensitive_patterns = patterns.clone();
        }
        if let Some(bytes) = options.max_cache_bytes {
            next.max_cache_bytes = bytes;
        }
        if let Some(ms) = options.extraction_timeout_ms {
            next.extraction_timeout_ms = ms;
        }
        if let Some(depth) = options.max_traversal_depth {
            next.max_traversal_depth = depth;
        }
        if let Some(roots) = &options.package_roots {
            next.package_roots = roots.clone();
        }
        next.validate()?;
        Ok(next)
    }
}

/// Partial update accepted by `configure`. Unset fields keep their value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigOptions {
    pub project_root: Option<PathBuf>,
    pub sensitive_patterns: Option<Vec<String>>,
    pub max_cache_bytes: Option<usize>,
    pub extraction_timeout_ms: Option<u64>,
    pub max_traversal_depth: Option<usize>,
    pub package_roots: Option<Vec<PathBuf>>,
}
