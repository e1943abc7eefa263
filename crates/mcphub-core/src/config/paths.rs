//! Config path resolution helpers.

use std::path::{Path, PathBuf};

pub const SETTINGS_FILE: &str = "mcphub.toml";
pub const STORE_FILE: &str = "store.json";
pub const TOKEN_FILE: &str = "oauth-tokens.json";

/// `<config_dir>/mcphub`
pub fn app_config_dir() -> anyhow::Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
        .join("mcphub"))
}

pub fn home_dir() -> anyhow::Result<PathBuf> {
    dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))
}

pub fn settings_path(config_dir: &Path) -> PathBuf {
    config_dir.join(SETTINGS_FILE)
}

pub fn store_path(config_dir: &Path) -> PathBuf {
    config_dir.join(STORE_FILE)
}

pub fn token_path(config_dir: &Path) -> PathBuf {
    config_dir.join(TOKEN_FILE)
}
