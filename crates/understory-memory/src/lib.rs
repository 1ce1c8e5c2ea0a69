//! Understory Memory — working-memory cache, context prioritization, sessions

pub mod cache;
pub mod events;
pub mod prioritizer;
pub mod session;
pub mod tokens;


pub use cache::{AccessRecord, CacheStats, WorkingMemory};
pub use events::{FileEventLog, Timestamp};
pub use prioritizer::{ContextBundle, ContextFragment, Direction, prioritize};
pub use session::{ContextualRead, IndexReport, Notice, ReadOutcome, Session, SessionStats};
pub use tokens::count_tokens;
