//! Integration tests for Understory
//!
//! These tests drive the binary and the session end to end over real project
//! trees.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use chrono::Utc;
use tempfile::TempDir;
use understory_core::{ConfigOptions, EngineConfig, ErrorClass, Response, Target};
use understory_memory::{Direction, Session};
use understory_watcher::{WatchEvent, WatcherService};

fn project(files: &[(&str, &str)]) -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("shop");
    for (rel, content) in files {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }
    std::fs::create_dir_all(&root).unwrap();
    let root = std::fs::canonicalize(&root).unwrap();
    (dir, root)
}

fn shop() -> (TempDir, PathBuf) {
    project(&[
        ("shop/__init__.py", ""),
        ("shop/models.py", "class Item:\n    pass\n"),
        (
            "shop/cart.py",
            "from .models import Item\n\nclass Cart(Item):\n    pass\n\ndef total(items):\n    return sum(items)\n",
        ),
        ("main.py", "from shop import cart\n\ncart.total([])\n"),
        ("web/api.js", "const { fetchCart } = require('./client');\nfetchCart();\n"),
        ("web/client.js", "export function fetchCart() {}\n"),
        (".env", "TOKEN=secret\n"),
    ])
}

fn understory(root: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_understory"));
    cmd.arg("--root").arg(root).env("RUST_LOG", "off");
    cmd
}

fn run_json(cmd: &mut Command) -> serde_json::Value {
    let output = cmd.output().expect("failed to run understory");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout is not JSON")
}

#[test]
fn test_cli_help() {
    let output = Command::new(env!("CARGO_BIN_EXE_understory"))
        .arg("--help")
        .output()
        .unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("understory"));
    assert!(stdout.contains("watch"));
}

#[test]
fn test_cli_read_injects_context() {
    let (_dir, root) = shop();
    let json = run_json(understory(&root).args(["read", "shop/cart.py"]));

    assert_eq!(json["status"], "ok");
    let value = &json["value"];
    assert_eq!(value["from_cache"], false);
    assert!(value["content"].as_str().unwrap().starts_with("from .models"));

    let fragments = value["injected_context"]["fragments"].as_array().unwrap();
    assert_eq!(fragments.len(), 1);
    assert_eq!(
        fragments[0]["path"].as_str().unwrap(),
        root.join("shop/models.py").to_str().unwrap()
    );
    assert_eq!(fragments[0]["direction"], "dependency");
    assert_eq!(fragments[0]["kinds"], serde_json::json!(["import", "inheritance"]));
}

#[test]
fn test_cli_read_sensitive_is_classified() {
    let (_dir, root) = shop();
    let json = run_json(understory(&root).args(["read", ".env"]));
    assert_eq!(json["status"], "error");
    assert_eq!(json["class"], "access_denied");
    assert!(!json.to_string().contains("TOKEN=secret"));
}

#[test]
fn test_cli_graph_snapshot() {
    let (_dir, root) = shop();
    let json = run_json(understory(&root).arg("graph"));

    assert!(json["version"].as_str().unwrap().contains("+g"));
    let relationships = json["relationships"].as_array().unwrap();
    let main = root.join("main.py");
    let from_main: Vec<_> = relationships
        .iter()
        .filter(|r| r["source"].as_str() == main.to_str())
        .collect();
    assert_eq!(from_main.len(), 2);
    assert!(from_main.iter().all(|r| r["target"]["type"] == "resolved"));
}

#[test]
fn test_cli_config_file_and_overrides() {
    let (dir, root) = shop();
    let config = dir.path().join("custom.toml");
    std::fs::write(&config, "max_traversal_depth = 3\n").unwrap();

    let json = run_json(
        understory(&root)
            .arg("--config")
            .arg(&config)
            .args(["read", "main.py"]),
    );
    assert_eq!(json["value"]["notice"]["notice"], "parse_bounded");

    let json = run_json(
        understory(&root)
            .arg("--config")
            .arg(&config)
            .args(["--max-depth", "64", "read", "main.py"]),
    );
    assert!(json["value"].get("notice").is_none());
}

#[test]
fn test_cli_watch_serves_stdin() {
    let (_dir, root) = shop();
    let mut child = understory(&root)
        .arg("watch")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .unwrap();

    {
        let mut stdin = child.stdin.take().unwrap();
        writeln!(stdin, "main.py").unwrap();
        writeln!(stdin, "../escape.py").unwrap();
    }
    let output = child.wait_with_output().unwrap();
    assert!(output.status.success());

    let lines: Vec<serde_json::Value> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["status"], "ok");
    // Indexed before serving, so the read is a cache hit.
    assert_eq!(lines[0]["value"]["from_cache"], true);
    assert_eq!(lines[1]["status"], "error");
}

#[test]
fn test_session_edit_cycle() {
    let (_dir, root) = shop();
    let session = Arc::new(Session::new(EngineConfig::for_root(&root)).unwrap());
    let service = WatcherService::new(Arc::clone(&session)).unwrap();

    let report = session.index_project();
    assert_eq!(report.files, 6);
    assert_eq!(
        session.dependents_of(Path::new("shop/cart.py")).unwrap(),
        vec![root.join("main.py")]
    );

    // main.py drops its dependency on the cart.
    std::fs::write(root.join("main.py"), "import json\n").unwrap();
    service.record(&WatchEvent::Modified(root.join("main.py")));
    // The graph is only updated by the next read.
    assert_eq!(session.dependents_of(Path::new("shop/cart.py")).unwrap().len(), 1);

    let read = session.read_with_context(Path::new("main.py")).unwrap();
    assert!(!read.read.from_cache);
    assert!(read.injected_context.is_empty());
    assert!(session.dependents_of(Path::new("shop/cart.py")).unwrap().is_empty());

    let snapshot = session.snapshot();
    let main_targets: Vec<&Target> = snapshot
        .relationships
        .iter()
        .filter(|r| r.source == root.join("main.py"))
        .map(|r| &r.target)
        .collect();
    assert_eq!(main_targets, vec![&Target::Unresolved("json".into())]);
}

#[test]
fn test_session_javascript_context() {
    let (_dir, root) = shop();
    let session = Session::new(EngineConfig::for_root(&root)).unwrap();
    session.read(Path::new("web/api.js")).unwrap();

    let context = session.context_for(Path::new("web/client.js")).unwrap();
    assert_eq!(context.paths(), vec![root.join("web/api.js")]);
    assert_eq!(context.fragments[0].direction, Direction::Dependent);
    assert_eq!(context.fragments[0].lines, vec![1, 2]);
}

#[test]
fn test_session_configure_and_responses() {
    let (_dir, root) = shop();
    let session = Session::new(EngineConfig::for_root(&root)).unwrap();

    session
        .configure(&ConfigOptions {
            sensitive_patterns: Some(vec!["**/models.py".into()]),
            ..Default::default()
        })
        .unwrap();
    let denied = Response::from_result(session.read(Path::new("shop/models.py")));
    assert!(matches!(
        denied,
        Response::Error {
            class: ErrorClass::AccessDenied,
            ..
        }
    ));
    // .env is no longer in the pattern set.
    assert!(session.read(Path::new(".env")).is_ok());

    session.on_file_event(&root.join("main.py"), Utc::now());
    assert_eq!(session.stats().file_events, 1);
}
