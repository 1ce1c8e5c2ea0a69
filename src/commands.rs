//! CLI command implementations

use anyhow::Context;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use understory_core::{ConfigOptions, EngineConfig, EngineError, Response};
use understory_memory::Session;
use understory_watcher::WatcherService;

/// Configuration from `config_file` (or `understory.toml` under `root`),
/// then command-line overrides.
pub fn load_config(
    root: &Path,
    config_file: Option<&Path>,
    overrides: &ConfigOptions,
) -> anyhow::Result<EngineConfig> {
    let config = match config_file {
        Some(file) => {
            let raw = std::fs::read_to_string(file)
                .with_context(|| format!("reading {}", file.display()))?;
            let mut config = EngineConfig::from_toml_str(&raw)?;
            config.project_root = if config.project_root.is_relative() {
                root.join(&config.project_root)
            } else {
                config.project_root
            };
            config
        }
        None => EngineConfig::load(root)?,
    };
    Ok(config.with_options(overrides)?)
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn read(config: EngineConfig, path: PathBuf) -> anyhow::Result<()> {
    let session = Session::new(config)?;
    let response = Response::from_result(session.read_with_context(&path));
    print_json(&response)
}

pub fn index(config: EngineConfig) -> anyhow::Result<()> {
    let session = Session::new(config)?;
    let report = session.index_project();
    print_json(&serde_json::json!({
        "report": report,
        "stats": session.stats(),
    }))
}

pub fn graph(config: EngineConfig) -> anyhow::Result<()> {
    let session = Session::new(config)?;
    session.index_project();
    print_json(&session.snapshot())
}

/// Index, start the watcher, then answer one read per stdin line with a
/// single-line JSON response.
pub async fn watch(config: EngineConfig) -> anyhow::Result<()> {
    let session = Arc::new(Session::new(config)?);
    {
        let session = Arc::clone(&session);
        tokio::task::spawn_blocking(move || session.index_project())
            .await
            .context("indexing task panicked")?;
    }

    let mut service = WatcherService::new(Arc::clone(&session))?;
    service.start_watching()?;
    tokio::spawn(async move {
        if let Err(e) = service.run().await {
            tracing::error!("File watcher error: {}", e);
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let path = PathBuf::from(line.trim());
        if path.as_os_str().is_empty() {
            continue;
        }
        let session = Arc::clone(&session);
        let result = tokio::task::spawn_blocking(move || session.read_with_context(&path))
            .await
            .context("read task panicked")?;
        let fatal = result.as_ref().err().is_some_and(EngineError::is_fatal);
        println!("{}", serde_json::to_string(&Response::from_result(result))?);
        if fatal {
            anyhow::bail!("graph state can no longer be trusted; restart to rebuild");
        }
    }

    tracing::info!("Input closed, stopping");
    Ok(())
}
