use anyhow::Result;
use std::path::PathBuf;

const APP_DIR: &str = "recall";
const DB_FILE: &str = "recall.db";
const CONFIG_FILE: &str = "config.toml";
const LOGS_DIR: &str = "logs";

/// Environment variable to override the data directory.
const RECALL_DIR_ENV: &str = "RECALL_DIR";

/// Resolve the data directory.
/// Priority: RECALL_DIR env var > <data_dir>/recall
pub fn resolve_data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(RECALL_DIR_ENV)
        && !dir.trim().is_empty()
    {
        return Ok(PathBuf::from(dir));
    }
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .map(|d| d.join(APP_DIR))
        .ok_or_else(|| anyhow::anyhow!("Failed to determine data directory"))
}

/// Ensure the data directory exists and return its path.
pub fn ensure_data_dir() -> Result<PathBuf> {
    let dir = resolve_data_dir()?;
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Default database path: <data_dir>/recall/recall.db
pub fn database_path() -> Result<PathBuf> {
    Ok(resolve_data_dir()?.join(DB_FILE))
}

/// Config file: <config_dir>/recall/config.toml
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join(CONFIG_FILE)
}

/// Logs directory, created on demand.
pub fn logs_dir() -> Result<PathBuf> {
    let dir = resolve_data_dir()?.join(LOGS_DIR);
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
