// ABOUTME: Where herald keeps its config file and rotated logs
// ABOUTME: XDG locations via `directories`, with HERALD_DATA_DIR overriding the data root

use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::PathBuf;

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "herald", "herald")
}

/// Data root: $HERALD_DATA_DIR, else ~/.local/share/herald, else ./data
pub fn data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("HERALD_DATA_DIR").filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    project_dirs()
        .map(|p| p.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("./data"))
}

pub fn log_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Log directory, created if missing
pub fn ensure_log_dir() -> Result<PathBuf> {
    let dir = log_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    Ok(dir)
}

/// ~/.config/herald/config.toml, or ./config.toml without a home directory
pub fn config_file() -> PathBuf {
    project_dirs()
        .map(|p| p.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
        .join("config.toml")
}
