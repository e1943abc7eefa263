//! Key-value application store used by the local agent.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use serde_json::{Map, Value};

/// Generic get/set store for application state.
pub trait ConfigStore: Send + Sync {
    fn get(&self, key: &str) -> anyhow::Result<Option<Value>>;
    fn set(&self, key: &str, value: Value) -> anyhow::Result<()>;
}

/// JSON file store (`<config_dir>/mcphub/store.json`). Writes replace the
/// whole file; the mutex keeps concurrent writers in one process ordered.
#[derive(Debug)]
pub struct FileConfigStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileConfigStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> anyhow::Result<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let bytes = std::fs::read(&self.path)
            .with_context(|| format!("Failed to read store: {}", self.path.display()))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Map::new());
        }
        match serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse store: {}", self.path.display()))?
        {
            Value::Object(map) => Ok(map),
            _ => anyhow::bail!("Expected JSON object at root: {}", self.path.display()),
        }
    }
}

impl ConfigStore for FileConfigStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<Value>> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("config store lock poisoned"))?;
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: Value) -> anyhow::Result<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("config store lock poisoned"))?;
        let mut root = self.load()?;
        root.insert(key.to_string(), value);

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create store directory: {}", parent.display())
            })?;
        }
        let bytes = serde_json::to_vec_pretty(&root).context("Failed to serialize store")?;
        std::fs::write(&self.path, bytes)
            .with_context(|| format!("Failed to write store: {}", self.path.display()))?;
        Ok(())
    }
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    values: Mutex<BTreeMap<String, Value>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigStore for MemoryConfigStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<Value>> {
        let values = self
            .values
            .lock()
            .map_err(|_| anyhow::anyhow!("config store lock poisoned"))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> anyhow::Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| anyhow::anyhow!("config store lock poisoned"))?;
        values.insert(key.to_string(), value);
        Ok(())
    }
}
