//! Thread-safe parser pool for tree-sitter parsers
//!
//! Each worker thread owns one `Parser` and serves requests from a shared
//! channel. Requests carry their own wall-clock budget: the worker hands it to
//! tree-sitter and the caller stops waiting once it has elapsed, so a stuck
//! parse can never hold the calling request past the deadline.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tree_sitter::{Language, Parser};
use understory_core::Bound;

use crate::extractor::ExtractError;

/// Grammars the pool can load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Python,
    JavaScript,
}

impl FileType {
    /// Get the tree-sitter language for this file type
    pub fn get_language(&self) -> Language {
        match self {
            FileType::Python => tree_sitter_python::LANGUAGE.into(),
            FileType::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
        }
    }
}

/// A parsing request sent to the parser pool
#[derive(Debug)]
pub struct ParseRequest {
    pub file_type: FileType,
    pub content: String,
    pub path: PathBuf,
    pub timeout: Duration,
}

/// Result of a parsing operation
#[derive(Debug)]
pub struct ParseResult {
    pub tree: tree_sitter::Tree,
    pub path: PathBuf,
    pub content: String,
}

struct WorkerRequest {
    request: ParseRequest,
    response_sender: mpsc::Sender<Result<ParseResult, ExtractError>>,
}

/// Thread-safe parser pool
#[derive(Clone)]
pub struct ParserPool {
    sender: mpsc::Sender<WorkerRequest>,
}

impl ParserPool {
    /// Create a new parser pool with the specified number of worker threads
    pub fn new(num_workers: usize) -> Self {
        let (sender, receiver) = mpsc::channel::<WorkerRequest>();
        let receiver = Arc::new(Mutex::new(receiver));

        for i in 0..num_workers.max(1) {
            let receiver = Arc::clone(&receiver);
            let spawned = std::thread::Builder::new()
                .name(format!("understory-parser-{i}"))
                .spawn(move || Self::worker_thread(i, receiver));
            if let Err(e) = spawned {
                tracing::error!("Failed to spawn parser worker {}: {}", i, e);
            }
        }

        Self { sender }
    }

    fn worker_thread(worker_id: usize, receiver: Arc<Mutex<mpsc::Receiver<WorkerRequest>>>) {
        tracing::debug!("Parser worker {} started", worker_id);

        let mut parser = Parser::new();

        loop {
            let next = receiver.lock().recv();
            let WorkerRequest {
                request,
                response_sender,
            } = match next {
                Ok(req) => req,
                Err(_) => {
                    tracing::debug!("Parser worker {} shutting down", worker_id);
                    break;
                }
            };

            let result = Self::parse_one(&mut parser, request);
            if response_sender.send(result).is_err() {
                tracing::debug!("Caller stopped waiting for parse result");
            }
        }
    }

    fn parse_one(parser: &mut Parser, request: ParseRequest) -> Result<ParseResult, ExtractError> {
        let language = request.file_type.get_language();
        parser
            .set_language(&language)
            .map_err(|e| ExtractError::Parser(format!("failed to set language: {e}")))?;

        parser.set_timeout_micros(request.timeout.as_micros().max(1) as u64);
        let tree = parser.parse(&request.content, None);
        parser.reset();

        match tree {
            Some(tree) => Ok(ParseResult {
                tree,
                path: request.path,
                content: request.content,
            }),
            None => Err(ExtractError::Bounded(Bound::Timeout {
                timeout_ms: request.timeout.as_millis() as u64,
            })),
        }
    }

    /// Parse content, blocking until the result arrives or `request.timeout`
    /// has elapsed since the call.
    pub fn parse_blocking(&self, request: ParseRequest) -> Result<ParseResult, ExtractError> {
        let started = Instant::now();
        let timeout = request.timeout;
        let (response_sender, response_receiver) = mpsc::channel();

        self.sender
            .send(WorkerRequest {
                request,
                response_sender,
            })
            .map_err(|_| ExtractError::Parser("parser pool is shut down".to_string()))?;

        let remaining = timeout.saturating_sub(started.elapsed());
        match response_receiver.recv_timeout(remaining) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(ExtractError::Bounded(Bound::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            })),
            Err(RecvTimeoutError::Disconnected) => {
                Err(ExtractError::Parser("parser worker died".to_string()))
            }
        }
    }
}

/// Convenience function to create a parser pool with default settings
pub fn create_parser_pool() -> ParserPool {
    // Use number of CPU cores as default worker count, but at least 2
    let num_workers = std::thread::available_parallelism()
        .map(|n| n.get().max(2))
        .unwrap_or(2);

    ParserPool::new(num_workers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_python() {
        let pool = ParserPool::new(1);
        let request = ParseRequest {
            file_type: FileType::Python,
            content: "def main():\n    print('hi')\n".to_string(),
            path: PathBuf::from("main.py"),
            timeout: Duration::from_secs(5),
        };

        let result = pool.parse_blocking(request).unwrap();
        assert_eq!(result.tree.root_node().kind(), "module");
    }

    #[test]
    fn test_parse_javascript() {
        let pool = ParserPool::new(1);
        let request = ParseRequest {
            file_type: FileType::JavaScript,
            content: "class A extends B { m() { console.log(1); } }".to_string(),
            path: PathBuf::from("a.js"),
            timeout: Duration::from_secs(5),
        };

        let result = pool.parse_blocking(request).unwrap();
        assert_eq!(result.tree.root_node().kind(), "program");
    }
}
