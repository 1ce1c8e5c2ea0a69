//! Module resolution for import statements

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use understory_core::Target;

/// Outcome of resolving one module name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A source file under the project root or a declared package root.
    File(PathBuf),
    /// A standard-library or runtime built-in module.
    Builtin(String),
    Unresolved(String),
}

impl Resolution {
    pub fn is_file(&self) -> bool {
        matches!(self, Resolution::File(_))
    }

    /// Graph target for this resolution. Non-file outcomes keep `symbol`.
    pub fn to_target(&self, symbol: &str) -> Target {
        match self {
            Resolution::File(path) => Target::Resolved(path.clone()),
            Resolution::Builtin(_) | Resolution::Unresolved(_) => {
                Target::Unresolved(symbol.to_string())
            }
        }
    }
}

/// Top-level standard library modules.
const PYTHON_STDLIB: &[&str] = &[
    "__future__", "abc", "argparse", "array", "ast", "asyncio", "base64", "bisect",
    "builtins", "calendar", "collections", "concurrent", "contextlib", "contextvars", "copy",
    "csv", "ctypes", "dataclasses", "datetime", "decimal", "difflib", "email", "enum", "errno",
    "fnmatch", "fractions", "functools", "gc", "getpass", "glob", "gzip", "hashlib", "heapq",
    "hmac", "html", "http", "importlib", "inspect", "io", "ipaddress", "itertools", "json",
    "logging", "math", "mimetypes", "multiprocessing", "numbers", "operator", "os", "pathlib",
    "pickle", "platform", "pprint", "queue", "random", "re", "secrets", "select", "shlex",
    "shutil", "signal", "socket", "sqlite3", "ssl", "stat", "statistics", "string", "struct",
    "subprocess", "sys", "tempfile", "textwrap", "threading", "time", "timeit", "tomllib",
    "traceback", "types", "typing", "unittest", "urllib", "uuid", "warnings", "weakref", "xml",
    "zipfile", "zlib",
];

/// Node.js core modules.
const NODE_BUILTINS: &[&str] = &[
    "assert", "buffer", "child_process", "cluster", "crypto", "dgram", "dns", "events", "fs",
    "http", "http2", "https", "net", "os", "path", "perf_hooks", "process", "querystring",
    "readline", "stream", "string_decoder", "timers", "tls", "tty", "url", "util", "v8", "vm",
    "worker_threads", "zlib",
];

const JS_EXTENSIONS: &[&str] = &["js", "mjs", "cjs", "jsx", "json"];

#[derive(Deserialize)]
struct PackageManifest {
    main: Option<String>,
}

/// Maps import names to files.
#[derive(Debug, Clone)]
pub struct ModuleResolver {
    project_root: PathBuf,
    package_roots: Vec<PathBuf>,
}

impl ModuleResolver {
    /// `project_root` must already be canonical. Package roots are
    /// canonicalized here; ones that do not exist are dropped.
    pub fn new(project_root: impl Into<PathBuf>, package_roots: &[PathBuf]) -> Self {
        let package_roots = package_roots
            .iter()
            .filter_map(|root| match std::fs::canonicalize(root) {
                Ok(canonical) => Some(canonical),
                Err(e) => {
                    tracing::warn!(root = %root.display(), "Ignoring package root: {}", e);
                    None
                }
            })
            .collect();
        ModuleResolver {
            project_root: project_root.into(),
            package_roots,
        }
    }

    // ── Python ──────────────────────────────────────────

    /// Resolve a Python module name as imported from `importer`.
    ///
    /// `level` is the number of leading dots of a relative import. Lookup
    /// order for absolute names: the importer's directory, each enclosing
    /// directory up to the project root's parent, declared package roots,
    /// the standard library.
    pub fn resolve_python(&self, importer: &Path, level: usize, dotted: &str) -> Resolution {
        let segments: Vec<&str> = dotted.split('.').filter(|s| !s.is_empty()).collect();
        let Some(dir) = importer.parent() else {
            return Resolution::Unresolved(dotted.to_string());
        };

        if level > 0 {
            let base = dir.ancestors().nth(level - 1);
            if let Some(found) = base.and_then(|b| self.python_in_project(b, &segments)) {
                return Resolution::File(found);
            }
            if segments.is_empty() {
                return Resolution::Unresolved(".".repeat(level));
            }
        }
        if segments.is_empty() {
            return Resolution::Unresolved(dotted.to_string());
        }

        for base in self.python_search_bases(dir) {
            if let Some(found) = self.python_in_project(base, &segments) {
                return Resolution::File(found);
            }
        }

        for root in &self.package_roots {
            if let Some(found) = python_candidate(root, &segments).filter(|c| c.starts_with(root)) {
                return Resolution::File(found);
            }
        }

        if PYTHON_STDLIB.contains(&segments[0]) {
            return Resolution::Builtin(dotted.to_string());
        }
        Resolution::Unresolved(dotted.to_string())
    }

    /// The importer's directory, then its ancestors while they stay inside the
    /// project root, then the root's parent (so the root directory itself can
    /// be imported by name).
    fn python_search_bases<'p>(&self, dir: &'p Path) -> Vec<&'p Path> {
        let root_parent = self.project_root.parent();
        let mut bases = Vec::new();
        for base in dir.ancestors() {
            if base.starts_with(&self.project_root) {
                bases.push(base);
            } else {
                if Some(base) == root_parent {
                    bases.push(base);
                }
                break;
            }
        }
        bases
    }

    fn python_in_project(&self, base: &Path, segments: &[&str]) -> Option<PathBuf> {
        python_candidate(base, segments).filter(|c| c.starts_with(&self.project_root))
    }

    // ── JavaScript ──────────────────────────────────────

    /// Resolve a JavaScript module specifier as imported from `importer`.
    pub fn resolve_js(&self, importer: &Path, specifier: &str) -> Resolution {
        if specifier.starts_with("./") || specifier.starts_with("../") {
            let Some(dir) = importer.parent() else {
                return Resolution::Unresolved(specifier.to_string());
            };
            return match js_candidate(&dir.join(specifier), true) {
                Some(found) if found.starts_with(&self.project_root) => Resolution::File(found),
                _ => Resolution::Unresolved(specifier.to_string()),
            };
        }

        if let Some(name) = specifier.strip_prefix("node:") {
            return Resolution::Builtin(name.to_string());
        }

        for root in &self.package_roots {
            if let Some(found) = js_candidate(&root.join(specifier), true) {
                if found.starts_with(root) {
                    return Resolution::File(found);
                }
            }
        }

        let first = specifier.split('/').next().unwrap_or(specifier);
        if NODE_BUILTINS.contains(&first) {
            return Resolution::Builtin(specifier.to_string());
        }
        Resolution::Unresolved(specifier.to_string())
    }
}

/// `base/a/b/__init__.py` if it exists, else `base/a/b.py`. With no segments,
/// `base/__init__.py`.
fn python_candidate(base: &Path, segments: &[&str]) -> Option<PathBuf> {
    let Some((last, parents)) = segments.split_last() else {
        return existing(base.join("__init__.py"));
    };

    let mut dir = base.to_path_buf();
    dir.extend(parents);
    let package = dir.join(last).join("__init__.py");
    if let Some(found) = existing(package) {
        return Some(found);
    }
    existing(dir.join(format!("{last}.py")))
}

/// Node-style lookup: exact file, known extensions, then a directory's
/// `package.json` main entry or `index.*`.
fn js_candidate(base: &Path, follow_manifest: bool) -> Option<PathBuf> {
    if base.is_file() {
        return existing(base.to_path_buf());
    }
    for ext in JS_EXTENSIONS {
        let mut with_ext = OsString::from(base.as_os_str());
        with_ext.push(".");
        with_ext.push(ext);
        if let Some(found) = existing(PathBuf::from(with_ext)) {
            return Some(found);
        }
    }
    if !base.is_dir() {
        return None;
    }
    if follow_manifest {
        if let Some(main) = manifest_main(base) {
            if let Some(found) = js_candidate(&base.join(main), false) {
                return Some(found);
            }
        }
    }
    JS_EXTENSIONS
        .iter()
        .find_map(|ext| existing(base.join(format!("index.{ext}"))))
}

fn manifest_main(dir: &Path) -> Option<String> {
    let raw = std::fs::read_to_string(dir.join("package.json")).ok()?;
    match serde_json::from_str::<PackageManifest>(&raw) {
        Ok(manifest) => manifest.main,
        Err(e) => {
            tracing::debug!(dir = %dir.display(), "Unreadable package.json: {}", e);
            None
        }
    }
}

/// Canonical form of `path` if it is an existing file.
fn existing(path: PathBuf) -> Option<PathBuf> {
    if path.is_file() {
        std::fs::canonicalize(&path).ok()
    } else {
        None
    }
}
