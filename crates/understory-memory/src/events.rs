//! File event timestamps written by the watcher

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use understory_core::canonical_key;

pub type Timestamp = DateTime<Utc>;

/// Latest modification event seen for each file.
///
/// Written only by the file watcher and read by the cache's staleness check.
/// It lives outside the session lock, so recording an event never waits on a
/// refresh.
#[derive(Debug, Default)]
pub struct FileEventLog {
    events: DashMap<PathBuf, Timestamp>,
}

impl FileEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event for `path`. An older timestamp never replaces a newer
    /// one, so out-of-order delivery cannot hide a modification.
    pub fn record(&self, path: &Path, at: Timestamp) {
        let key = canonical_key(path);
        tracing::debug!(path = %key.display(), at = %at, "File event");
        self.events
            .entry(key)
            .and_modify(|ts| {
                if at > *ts {
                    *ts = at;
                }
            })
            .or_insert(at);
    }

    /// Latest event for an already-canonical path.
    pub fn get(&self, path: &Path) -> Option<Timestamp> {
        self.events.get(path).map(|ts| *ts)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&self) {
        self.events.clear();
    }
}
