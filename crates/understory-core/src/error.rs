//! Error taxonomy and the classified boundary response

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

/// Why a path was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// The canonical path is not a descendant of the canonical project root.
    OutsideRoot,
    /// The path matches a configured sensitive pattern.
    Sensitive,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::OutsideRoot => f.write_str("outside project root"),
            DenyReason::Sensitive => f.write_str("matches a sensitive pattern"),
        }
    }
}

/// Which extraction limit was hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "limit", rename_all = "snake_case")]
pub enum Bound {
    Depth { max_depth: usize },
    Timeout { timeout_ms: u64 },
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bound::Depth { max_depth } => write!(f, "traversal depth exceeded {max_depth}"),
            Bound::Timeout { timeout_ms } => write!(f, "extraction exceeded {timeout_ms}ms"),
        }
    }
}

/// Errors produced by the context engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("access denied for {}: {reason}", path.display())]
    AccessDenied { path: PathBuf, reason: DenyReason },

    #[error("extraction bounded for {}: {bound}", path.display())]
    ParseBounded { path: PathBuf, bound: Bound },

    #[error("graph update failed for {}: {reason}", path.display())]
    GraphUpdateFailed { path: PathBuf, reason: String },

    #[error("failed to read {}", path.display())]
    CacheIoFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Coarse classification reported across the transport boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    AccessDenied,
    ParseBounded,
    GraphUpdateFailed,
    CacheIoFailure,
    InvalidConfig,
}

impl EngineError {
    pub fn class(&self) -> ErrorClass {
        match self {
            EngineError::AccessDenied { .. } => ErrorClass::AccessDenied,
            EngineError::ParseBounded { .. } => ErrorClass::ParseBounded,
            EngineError::GraphUpdateFailed { .. } => ErrorClass::GraphUpdateFailed,
            EngineError::CacheIoFailure { .. } => ErrorClass::CacheIoFailure,
            EngineError::InvalidConfig(_) => ErrorClass::InvalidConfig,
        }
    }

    /// Whether the condition threatens session integrity and warrants a rebuild.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::GraphUpdateFailed { .. })
    }
}

/// Structured result handed to the transport layer.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response<T> {
    Ok { value: T },
    Error { class: ErrorClass, message: String },
}

impl<T> Response<T> {
    pub fn from_result(result: Result<T, EngineError>) -> Self {
        match result {
            Ok(value) => Response::Ok { value },
            Err(e) => Response::Error {
                class: e.class(),
                message: e.to_string(),
            },
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Response::Ok { .. })
    }
}
