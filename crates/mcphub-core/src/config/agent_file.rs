//! Direct edits of an agent's own configuration file.
//!
//! Used only as the last step of a remove, when none of the agent's CLI
//! scopes removed the server. The file is read, the named entry under the
//! server table is deleted if present, and the file is written back.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;

/// On-disk format of an agent configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
}

/// A server table inside an agent configuration file, e.g. `mcpServers` in
/// `~/.claude.json` or `mcp_servers` in `~/.codex/config.toml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfigFile {
    pub path: PathBuf,
    pub format: ConfigFormat,
    pub table: Vec<String>,
}

impl AgentConfigFile {
    pub fn json(path: impl Into<PathBuf>, table: &[&str]) -> Self {
        Self::new(path, ConfigFormat::Json, table)
    }

    pub fn toml(path: impl Into<PathBuf>, table: &[&str]) -> Self {
        Self::new(path, ConfigFormat::Toml, table)
    }

    fn new(path: impl Into<PathBuf>, format: ConfigFormat, table: &[&str]) -> Self {
        Self {
            path: path.into(),
            format,
            table: table.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Delete `name` from the server table. Returns whether anything was
    /// removed; a missing file or table counts as nothing to remove.
    pub fn remove_entry(&self, name: &str) -> Result<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        let table: Vec<&str> = self.table.iter().map(String::as_str).collect();
        match self.format {
            ConfigFormat::Json => remove_json_entry(&self.path, &table, name),
            ConfigFormat::Toml => remove_toml_entry(&self.path, &table, name),
        }
    }
}

fn remove_json_entry(path: &Path, table: &[&str], name: &str) -> Result<bool> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let mut root: Value = serde_json::from_slice(&bytes)
        .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?;

    let mut current = &mut root;
    for segment in table {
        match current.get_mut(*segment) {
            Some(next) => current = next,
            None => return Ok(false),
        }
    }
    let removed = match current.as_object_mut() {
        Some(servers) => servers.remove(name).is_some(),
        None => anyhow::bail!("Expected '{}' to be an object", table.join(".")),
    };
    if removed {
        let bytes = serde_json::to_vec_pretty(&root).context("Failed to serialize JSON config")?;
        std::fs::write(path, bytes)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    Ok(removed)
}

fn remove_toml_entry(path: &Path, table: &[&str], name: &str) -> Result<bool> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let mut root: toml::Table = content
        .parse()
        .with_context(|| format!("Failed to parse TOML config: {}", path.display()))?;

    let mut current = &mut root;
    for segment in table {
        match current.get_mut(*segment) {
            Some(toml::Value::Table(next)) => current = next,
            Some(_) => anyhow::bail!("Expected '{}' to be a table", segment),
            None => return Ok(false),
        }
    }
    let removed = current.remove(name).is_some();
    if removed {
        let content = toml::to_string_pretty(&root).context("Failed to serialize TOML config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    Ok(removed)
}
