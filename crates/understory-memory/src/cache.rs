//! Working memory: size-bounded file content with access tracking

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::events::Timestamp;

/// Access bookkeeping for one file. Kept apart from content so recency and
/// frequency survive eviction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AccessRecord {
    /// Logical clock value of the most recent access.
    pub last_accessed: u64,
    pub count: u64,
}

#[derive(Debug)]
struct CacheEntry {
    content: String,
    size_bytes: usize,
}

/// Cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Misses caused by a newer file event rather than absence.
    pub stale: u64,
    pub refreshes: u64,
    pub evictions: u64,
    /// Stores refused because the content alone exceeds the bound.
    pub oversized: u64,
    pub entries: usize,
    pub resident_bytes: usize,
    pub max_bytes: usize,
}

/// Per-file content cache bounded by total encoded size.
#[derive(Debug)]
pub struct WorkingMemory {
    entries: HashMap<PathBuf, CacheEntry>,
    last_read: HashMap<PathBuf, Timestamp>,
    access: HashMap<PathBuf, AccessRecord>,
    max_bytes: usize,
    resident_bytes: usize,
    clock: u64,
    stats: CacheStats,
}

impl WorkingMemory {
    pub fn new(max_bytes: usize) -> Self {
        WorkingMemory {
            entries: HashMap::new(),
            last_read: HashMap::new(),
            access: HashMap::new(),
            max_bytes,
            resident_bytes: 0,
            clock: 0,
            stats: CacheStats::default(),
        }
    }

    /// Whether `event` is newer than the last successful read of `path`.
    /// No event means not stale.
    pub fn is_stale(&self, path: &Path, event: Option<Timestamp>) -> bool {
        match (event, self.last_read.get(path)) {
            (Some(event), Some(read)) => event > *read,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    /// Cached content for `path` unless it is absent or stale. A hit counts
    /// as an access.
    pub fn lookup(&mut self, path: &Path, event: Option<Timestamp>) -> Option<String> {
        if !self.entries.contains_key(path) {
            self.stats.misses += 1;
            return None;
        }
        if self.is_stale(path, event) {
            self.stats.misses += 1;
            self.stats.stale += 1;
            return None;
        }
        self.touch(path);
        self.stats.hits += 1;
        self.entries.get(path).map(|e| e.content.clone())
    }

    /// Store freshly read content. `read_at` must be captured before the file
    /// was read. Returns false when the content is larger than the whole bound
    /// and was not kept.
    ///
    /// Before admitting, least-recently-accessed entries are evicted while the
    /// resident total exceeds the bound, so the newest entry may overshoot it.
    pub fn store(&mut self, path: &Path, content: String, read_at: Timestamp) -> bool {
        self.stats.refreshes += 1;
        self.remove_entry(path);
        self.last_read.insert(path.to_path_buf(), read_at);
        self.touch(path);

        let size_bytes = content.len();
        if size_bytes > self.max_bytes {
            self.stats.oversized += 1;
            tracing::debug!(
                path = %path.display(),
                size_bytes,
                max_bytes = self.max_bytes,
                "Content larger than cache bound, not cached"
            );
            return false;
        }

        self.evict_while_over(self.max_bytes);
        self.resident_bytes += size_bytes;
        self.entries
            .insert(path.to_path_buf(), CacheEntry { content, size_bytes });
        true
    }

    /// Drop the content for `path`, forcing the next access to refresh.
    pub fn invalidate(&mut self, path: &Path) -> bool {
        self.remove_entry(path)
    }

    /// Drop all content, keeping read timestamps and access history.
    pub fn invalidate_all(&mut self) -> usize {
        let dropped = self.entries.len();
        self.entries.clear();
        self.resident_bytes = 0;
        dropped
    }

    /// Drop the content of every entry whose path matches `pred`.
    pub fn invalidate_where(&mut self, mut pred: impl FnMut(&Path) -> bool) -> usize {
        let doomed: Vec<PathBuf> = self.entries.keys().filter(|p| pred(p)).cloned().collect();
        for path in &doomed {
            self.remove_entry(path);
        }
        doomed.len()
    }

    /// Change the bound. Lowering it evicts until the resident total fits.
    pub fn set_max_bytes(&mut self, max_bytes: usize) -> usize {
        self.max_bytes = max_bytes;
        self.evict_while_over(max_bytes)
    }

    /// First `lines` lines of resident content, without counting an access.
    pub fn excerpt(&self, path: &Path, lines: usize) -> Option<String> {
        let entry = self.entries.get(path)?;
        let mut excerpt: String = entry
            .content
            .split_inclusive('\n')
            .take(lines)
            .collect();
        if excerpt.ends_with('\n') {
            excerpt.pop();
        }
        Some(excerpt)
    }

    pub fn access_record(&self, path: &Path) -> AccessRecord {
        self.access.get(path).copied().unwrap_or_default()
    }

    pub fn last_read(&self, path: &Path) -> Option<Timestamp> {
        self.last_read.get(path).copied()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn resident_bytes(&self) -> usize {
        self.resident_bytes
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            resident_bytes: self.resident_bytes,
            max_bytes: self.max_bytes,
            ..self.stats
        }
    }

    /// Forget everything, including read timestamps and access history.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.last_read.clear();
        self.access.clear();
        self.resident_bytes = 0;
    }

    fn touch(&mut self, path: &Path) {
        self.clock += 1;
        let record = self.access.entry(path.to_path_buf()).or_default();
        record.last_accessed = self.clock;
        record.count += 1;
    }

    fn remove_entry(&mut self, path: &Path) -> bool {
        match self.entries.remove(path) {
            Some(entry) => {
                self.resident_bytes -= entry.size_bytes;
                true
            }
            None => false,
        }
    }

    fn evict_while_over(&mut self, limit: usize) -> usize {
        let mut evicted = 0;
        while self.resident_bytes > limit {
            let victim = self
                .entries
                .keys()
                .min_by_key(|p| (self.access_record(p).last_accessed, (*p).clone()))
                .cloned();
            let Some(victim) = victim else {
                break;
            };
            self.remove_entry(&victim);
            self.stats.evictions += 1;
            evicted += 1;
            tracing::debug!(path = %victim.display(), resident_bytes = self.resident_bytes, "Evicted");
        }
        evicted
    }
}
