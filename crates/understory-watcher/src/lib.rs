//! Understory Watcher — filesystem notifications as cache staleness events

pub mod watcher;

pub use watcher::{FileWatcher, WatchEvent, WatcherService};
