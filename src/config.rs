use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::cli::Cli;

const APP_DIR: &str = "bazel-source-finder";

pub fn resolve_workspace(cli: &Cli) -> Result<PathBuf> {
    let root = match cli.workspace.clone() {
        Some(p) => p,
        None => std::env::current_dir().context("Failed to resolve current directory")?,
    };
    std::path::absolute(&root)
        .with_context(|| format!("Failed to resolve workspace path: {}", root.display()))
}

pub fn resolve_temp_dir(cli: &Cli) -> PathBuf {
    if let Some(p) = cli.temp_dir.clone() {
        return p;
    }
    default_temp_dir()
}

pub fn default_temp_dir() -> PathBuf {
    match dirs::cache_dir() {
        Some(base) => base.join(APP_DIR).join("tmp"),
        None => std::env::temp_dir().join(APP_DIR),
    }
}
