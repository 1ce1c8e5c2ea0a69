//! Unit tests for understory-core

use crate::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn rel(source: &str, target: Target, kind: RelationshipKind, line: u32) -> Relationship {
    Relationship::new(source, target, kind, line)
}

fn file(p: &str) -> Target {
    Target::Resolved(PathBuf::from(p))
}

fn set(items: &[&str]) -> std::collections::HashSet<PathBuf> {
    items.iter().map(PathBuf::from).collect()
}

// ── Graph ───────────────────────────────────────────────

#[test]
fn test_replace_file_updates_both_indices() {
    let mut graph = RelationshipGraph::new();
    graph
        .replace_file(
            Path::new("a.py"),
            vec![
                rel("a.py", file("b.py"), RelationshipKind::Import, 1),
                rel("a.py", file("c.py"), RelationshipKind::Call, 4),
                rel("a.py", Target::Unresolved("print".into()), RelationshipKind::Call, 5),
            ],
        )
        .unwrap();

    assert_eq!(graph.dependencies_of(Path::new("a.py")), set(&["b.py", "c.py"]));
    assert_eq!(graph.dependents_of(Path::new("b.py")), set(&["a.py"]));
    assert_eq!(graph.dependents_of(Path::new("c.py")), set(&["a.py"]));
    assert_eq!(graph.relationship_count(), 3);
    graph.check_consistency().unwrap();
}

#[test]
fn test_replace_file_drops_stale_relationships() {
    let mut graph = RelationshipGraph::new();
    graph
        .replace_file(
            Path::new("a.py"),
            vec![rel("a.py", file("b.py"), RelationshipKind::Import, 1)],
        )
        .unwrap();
    graph
        .replace_file(
            Path::new("a.py"),
            vec![rel("a.py", file("c.py"), RelationshipKind::Import, 1)],
        )
        .unwrap();

    assert_eq!(graph.dependencies_of(Path::new("a.py")), set(&["c.py"]));
    assert!(graph.dependents_of(Path::new("b.py")).is_empty());
    assert_eq!(graph.dependents_of(Path::new("c.py")), set(&["a.py"]));
    graph.check_consistency().unwrap();
}

#[test]
fn test_shared_target_survives_one_dependent_leaving() {
    let mut graph = RelationshipGraph::new();
    for src in ["a.py", "b.py"] {
        graph
            .replace_file(
                Path::new(src),
                vec![rel(src, file("util.py"), RelationshipKind::Import, 1)],
            )
            .unwrap();
    }
    graph.replace_file(Path::new("a.py"), Vec::new()).unwrap();

    assert_eq!(graph.dependents_of(Path::new("util.py")), set(&["b.py"]));
    assert!(graph.contains_file(Path::new("a.py")));
    graph.check_consistency().unwrap();
}

#[test]
fn test_duplicate_lines_are_distinct_relationships() {
    let mut graph = RelationshipGraph::new();
    graph
        .replace_file(
            Path::new("a.py"),
            vec![
                rel("a.py", file("b.py"), RelationshipKind::Import, 1),
                rel("a.py", file("b.py"), RelationshipKind::Import, 7),
            ],
        )
        .unwrap();

    assert_eq!(graph.relationships_from(Path::new("a.py")).len(), 2);
    assert_eq!(graph.dependencies_of(Path::new("a.py")).len(), 1);
}

#[test]
fn test_foreign_source_rejected_without_mutation() {
    let mut graph = RelationshipGraph::new();
    graph
        .replace_file(
            Path::new("a.py"),
            vec![rel("a.py", file("b.py"), RelationshipKind::Import, 1)],
        )
        .unwrap();
    let before = graph.snapshot();

    let err = graph
        .replace_file(
            Path::new("a.py"),
            vec![
                rel("a.py", file("c.py"), RelationshipKind::Import, 1),
                rel("z.py", file("c.py"), RelationshipKind::Import, 2),
            ],
        )
        .unwrap_err();

    assert_eq!(err.class(), ErrorClass::GraphUpdateFailed);
    assert_eq!(graph.snapshot(), before);
    assert_eq!(graph.dependencies_of(Path::new("a.py")), set(&["b.py"]));
}

#[test]
fn test_remove_file_keeps_incoming_edges() {
    let mut graph = RelationshipGraph::new();
    graph
        .replace_file(
            Path::new("a.py"),
            vec![rel("a.py", file("b.py"), RelationshipKind::Import, 1)],
        )
        .unwrap();
    graph
        .replace_file(
            Path::new("b.py"),
            vec![rel("b.py", file("c.py"), RelationshipKind::Import, 1)],
        )
        .unwrap();

    assert!(graph.remove_file(Path::new("b.py")));
    assert!(!graph.remove_file(Path::new("b.py")));
    assert_eq!(graph.dependents_of(Path::new("b.py")), set(&["a.py"]));
    assert!(graph.dependents_of(Path::new("c.py")).is_empty());
    graph.check_consistency().unwrap();
}

#[test]
fn test_snapshot_rendering() {
    let mut graph = RelationshipGraph::new();
    graph
        .replace_file(
            Path::new("b.py"),
            vec![rel("b.py", file("c.py"), RelationshipKind::Inheritance, 3)],
        )
        .unwrap();
    graph
        .replace_file(
            Path::new("a.py"),
            vec![
                rel("a.py", file("b.py"), RelationshipKind::Import, 1),
                rel("a.py", Target::Unresolved("len".into()), RelationshipKind::Call, 2),
            ],
        )
        .unwrap();

    let snapshot = graph.snapshot();
    assert!(snapshot.version.ends_with("+g2"));
    let rendered: Vec<String> = snapshot.relationships.iter().map(|r| r.to_string()).collect();
    insta::assert_snapshot!(rendered.join("\n"), @r"
    a.py:1 -import-> b.py
    a.py:2 -call-> ?len
    b.py:3 -inheritance-> c.py
    ");

    let json = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(json["relationships"][0]["kind"], "import");
    assert_eq!(json["relationships"][1]["target"]["type"], "unresolved");
}

// ── Config ──────────────────────────────────────────────

#[test]
fn test_config_partial_toml_keeps_defaults() {
    let config = EngineConfig::from_toml_str(
        r#"
        max_cache_bytes = 1000
        package_roots = ["/opt/site-packages"]
        "#,
    )
    .unwrap();
    assert_eq!(config.max_cache_bytes, 1000);
    assert_eq!(config.package_roots, vec![PathBuf::from("/opt/site-packages")]);
    assert_eq!(config.max_traversal_depth, config::DEFAULT_MAX_TRAVERSAL_DEPTH);
    assert!(config.sensitive_patterns.iter().any(|p| p == "**/.env"));
}

#[test]
fn test_config_rejects_zero_limits() {
    let err = EngineConfig::from_toml_str("extraction_timeout_ms = 0").unwrap_err();
    assert_eq!(err.class(), ErrorClass::InvalidConfig);

    let base = EngineConfig::default();
    let bad = ConfigOptions {
        max_traversal_depth: Some(0),
        ..Default::default()
    };
    assert!(base.with_options(&bad).is_err());

    let bad_glob = ConfigOptions {
        sensitive_patterns: Some(vec!["a[".to_string()]),
        ..Default::default()
    };
    assert!(base.with_options(&bad_glob).is_err());
}

#[test]
fn test_config_load_from_root() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join(CONFIG_FILE),
        "max_traversal_depth = 64\nproject_root = \"src\"\n",
    )
    .unwrap();

    let config = EngineConfig::load(dir.path()).unwrap();
    assert_eq!(config.max_traversal_depth, 64);
    assert_eq!(config.project_root, dir.path().join("src"));

    let empty = TempDir::new().unwrap();
    let config = EngineConfig::load(empty.path()).unwrap();
    assert_eq!(config.project_root, empty.path());
}

// ── Path validation ─────────────────────────────────────

fn validator(root: &Path) -> PathValidator {
    PathValidator::new(root, &EngineConfig::default().sensitive_patterns).unwrap()
}

#[test]
fn test_authorize_relative_and_absolute() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join("pkg")).unwrap();
    std::fs::write(dir.path().join("pkg/mod.py"), "x = 1\n").unwrap();
    let v = validator(dir.path());

    let canonical = v.authorize(Path::new("pkg/mod.py")).unwrap();
    assert_eq!(canonical, v.root().join("pkg/mod.py"));
    assert_eq!(v.authorize(&dir.path().join("pkg/../pkg/mod.py")).unwrap(), canonical);
}

#[test]
fn test_authorize_rejects_traversal_outside_root() {
    let outer = TempDir::new().unwrap();
    let root = outer.path().join("proj");
    std::fs::create_dir(&root).unwrap();
    std::fs::write(outer.path().join("secret.py"), "token = 1\n").unwrap();
    let v = validator(&root);

    let err = v.authorize(Path::new("../secret.py")).unwrap_err();
    assert!(matches!(
        err,
        EngineError::AccessDenied { reason: DenyReason::OutsideRoot, .. }
    ));
}

#[test]
fn test_authorize_rejects_sensitive_files() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(".env"), "KEY=1\n").unwrap();
    std::fs::create_dir(dir.path().join("keys")).unwrap();
    std::fs::write(dir.path().join("keys/server.pem"), "-----").unwrap();
    let v = validator(dir.path());

    for p in [".env", "keys/server.pem"] {
        let err = v.authorize(Path::new(p)).unwrap_err();
        assert!(
            matches!(err, EngineError::AccessDenied { reason: DenyReason::Sensitive, .. }),
            "{p} should be refused"
        );
    }
}

#[test]
fn test_authorize_missing_file_is_io_failure() {
    let dir = TempDir::new().unwrap();
    let v = validator(dir.path());
    let err = v.authorize(Path::new("nope.py")).unwrap_err();
    assert_eq!(err.class(), ErrorClass::CacheIoFailure);
}

#[cfg(unix)]
#[test]
fn test_symlink_escaping_root_is_denied() {
    let outer = TempDir::new().unwrap();
    let root = outer.path().join("proj");
    std::fs::create_dir(&root).unwrap();
    std::fs::write(outer.path().join("outside.py"), "x = 1\n").unwrap();
    std::os::unix::fs::symlink(outer.path().join("outside.py"), root.join("inside.py")).unwrap();
    let v = validator(&root);

    let err = v.authorize(Path::new("inside.py")).unwrap_err();
    assert!(matches!(
        err,
        EngineError::AccessDenied { reason: DenyReason::OutsideRoot, .. }
    ));
}

#[cfg(unix)]
#[test]
fn test_dangling_symlink_escaping_root_is_denied() {
    let outer = TempDir::new().unwrap();
    let root = outer.path().join("proj");
    std::fs::create_dir(&root).unwrap();
    std::os::unix::fs::symlink(outer.path().join("gone.py"), root.join("away.py")).unwrap();
    std::os::unix::fs::symlink("missing.py", root.join("near.py")).unwrap();
    let v = validator(&root);

    let err = v.authorize(Path::new("away.py")).unwrap_err();
    assert!(matches!(
        err,
        EngineError::AccessDenied { reason: DenyReason::OutsideRoot, .. }
    ));
    // A dangling link that stays inside the root is just missing.
    let err = v.authorize(Path::new("near.py")).unwrap_err();
    assert_eq!(err.class(), ErrorClass::CacheIoFailure);
}

#[cfg(unix)]
#[test]
fn test_symlink_into_sensitive_file_is_denied() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(".env"), "KEY=1\n").unwrap();
    std::os::unix::fs::symlink(dir.path().join(".env"), dir.path().join("settings.py")).unwrap();
    let v = validator(dir.path());

    let err = v.authorize(Path::new("settings.py")).unwrap_err();
    assert!(matches!(
        err,
        EngineError::AccessDenied { reason: DenyReason::Sensitive, .. }
    ));
}

#[cfg(unix)]
#[test]
fn test_symlink_inside_root_resolves_to_target() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("real.py"), "x = 1\n").unwrap();
    std::os::unix::fs::symlink(dir.path().join("real.py"), dir.path().join("alias.py")).unwrap();
    let v = validator(dir.path());

    assert_eq!(
        v.authorize(Path::new("alias.py")).unwrap(),
        v.root().join("real.py")
    );
}

#[test]
fn test_response_classifies_errors() {
    let ok: Response<u32> = Response::from_result(Ok(3));
    assert!(ok.is_ok());

    let err: Response<u32> = Response::from_result(Err(EngineError::AccessDenied {
        path: PathBuf::from("/etc/passwd"),
        reason: DenyReason::OutsideRoot,
    }));
    let json = serde_json::to_value(&err).unwrap();
    assert_eq!(json["status"], "error");
    assert_eq!(json["class"], "access_denied");
}
