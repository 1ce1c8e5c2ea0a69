//! Understory Core — relationship model, graph indices, path authorization

pub mod config;
pub mod error;
pub mod graph;
pub mod model;
pub mod paths;

#[cfg(test)]
mod tests;

pub use config::{ConfigOptions, EngineConfig, CONFIG_FILE};
pub use error::{Bound, DenyReason, EngineError, ErrorClass, Response};
pub use graph::{GraphSnapshot, RelationshipGraph};
pub use model::{Language, Relationship, RelationshipKind, Target};
pub use paths::{PathValidator, canonical_key};
