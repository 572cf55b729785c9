//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `label` - Copy ledger categories onto a bank statement
//! - `categorize` - Predict categories with the embedding + classifier pipeline
//! - `serve` - Web server command
//! - `check` - Model readiness check
//!
//! Shared utilities (config loading, input path resolution) live here.

pub mod categorize;
pub mod check;
pub mod label;
pub mod serve;

// Re-export command functions for main.rs
pub use categorize::*;
pub use check::*;
pub use label::*;
pub use serve::*;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tally_core::{Config, ModelState};
use tracing::debug;

/// Load config and log where it came from
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = Config::load(path).context("Failed to load config")?;
    match &config.source {
        Some(source) => debug!("Using config {}", source.display()),
        None => debug!("Using built-in config"),
    }
    Ok(config)
}

/// Directories relative inputs are looked up in, in order: the working
/// directory, the executable's directory and its parent
fn search_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        dirs.push(cwd);
    }
    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        let parent = exe_dir.parent().map(Path::to_path_buf);
        dirs.push(exe_dir);
        dirs.extend(parent);
    }
    dirs
}

/// Resolve an input file, trying each search directory for relative paths
pub fn resolve_input(path: &Path) -> tally_core::Result<PathBuf> {
    resolve_input_in(path, &search_dirs())
}

/// Resolve an input file against explicit search directories
///
/// Absolute paths are returned as-is when they exist. Otherwise the error
/// lists every location that was tried.
pub fn resolve_input_in(path: &Path, dirs: &[PathBuf]) -> tally_core::Result<PathBuf> {
    let candidates: Vec<PathBuf> = if path.is_absolute() {
        vec![path.to_path_buf()]
    } else {
        dirs.iter().map(|dir| dir.join(path)).collect()
    };

    candidates
        .iter()
        .find(|candidate| candidate.is_file())
        .cloned()
        .ok_or_else(|| tally_core::Error::FileNotFound {
            path: path.to_path_buf(),
            tried: candidates,
        })
}

/// Resolve an output path against the working directory and create its parent
pub fn prepare_output(path: &Path) -> Result<PathBuf> {
    let resolved = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .context("Failed to read working directory")?
            .join(path)
    };
    if let Some(parent) = resolved.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(resolved)
}

/// Load model artifacts, resolving relative artifact paths like other inputs
pub fn load_models(config: &Config) -> Result<ModelState> {
    let mut config = config.clone();
    config.classifier.model_path = resolve_input(&config.classifier.model_path)?;
    config.classifier.categories_path = resolve_input(&config.classifier.categories_path)?;
    ModelState::load(&config).context("Failed to load models")
}
