//! JSON-file token store (`<config_dir>/mcphub/oauth-tokens.json`).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use chrono::{TimeDelta, Utc};

use super::{StoredCredentials, TokenStore};

/// Tokens expiring within this window are treated as already expired.
pub const EXPIRY_SKEW: TimeDelta = TimeDelta::minutes(5);

type TokenMap = BTreeMap<String, StoredCredentials>;

#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileTokenStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn with_tokens<T>(
        &self,
        f: impl FnOnce(&mut TokenMap) -> anyhow::Result<(T, bool)>,
    ) -> anyhow::Result<T> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("token store lock poisoned"))?;
        let mut tokens = self.load()?;
        let (value, dirty) = f(&mut tokens)?;
        if dirty {
            self.save(&tokens)?;
        }
        Ok(value)
    }

    fn load(&self) -> anyhow::Result<TokenMap> {
        if !self.path.exists() {
            return Ok(TokenMap::new());
        }
        let bytes = std::fs::read(&self.path)
            .with_context(|| format!("Failed to read token file: {}", self.path.display()))?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse token file: {}", self.path.display()))
    }

    fn save(&self, tokens: &TokenMap) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create token directory: {}", parent.display())
            })?;
        }
        let bytes = serde_json::to_vec_pretty(tokens).context("Failed to serialize tokens")?;
        std::fs::write(&self.path, bytes)
            .with_context(|| format!("Failed to write token file: {}", self.path.display()))
    }
}

impl TokenStore for FileTokenStore {
    fn get_credentials(&self, server_name: &str) -> anyhow::Result<Option<StoredCredentials>> {
        self.with_tokens(|tokens| Ok((tokens.get(server_name).cloned(), false)))
    }

    fn save_credentials(
        &self,
        server_name: &str,
        credentials: StoredCredentials,
    ) -> anyhow::Result<()> {
        self.with_tokens(|tokens| {
            tokens.insert(server_name.to_string(), credentials);
            Ok(((), true))
        })
    }

    fn delete_credentials(&self, server_name: &str) -> anyhow::Result<()> {
        self.with_tokens(|tokens| {
            let removed = tokens.remove(server_name).is_some();
            Ok(((), removed))
        })
    }

    fn list_servers(&self) -> anyhow::Result<Vec<String>> {
        self.with_tokens(|tokens| Ok((tokens.keys().cloned().collect(), false)))
    }

    fn is_token_expired(&self, credentials: &StoredCredentials) -> bool {
        credentials
            .expires_at
            .is_some_and(|expires_at| expires_at - EXPIRY_SKEW <= Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn credentials(expires_in: Option<TimeDelta>) -> StoredCredentials {
        StoredCredentials {
            access_token: "token".to_string(),
            refresh_token: None,
            token_type: Some("Bearer".to_string()),
            expires_at: expires_in.map(|delta| Utc::now() + delta),
        }
    }

    #[test]
    fn credentials_persist_across_instances() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("tokens.json");

        FileTokenStore::new(path.clone())
            .save_credentials("notion", credentials(None))
            .unwrap();

        let store = FileTokenStore::new(path);
        assert_eq!(store.list_servers().unwrap(), vec!["notion"]);
        assert!(store.get_credentials("notion").unwrap().is_some());
        assert!(store.get_credentials("linear").unwrap().is_none());
    }

    #[test]
    fn delete_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let store = FileTokenStore::new(temp.path().join("tokens.json"));
        store.save_credentials("notion", credentials(None)).unwrap();

        store.delete_credentials("notion").unwrap();
        store.delete_credentials("notion").unwrap();
        assert!(store.list_servers().unwrap().is_empty());
    }

    #[test]
    fn expiry_includes_skew() {
        let temp = TempDir::new().unwrap();
        let store = FileTokenStore::new(temp.path().join("tokens.json"));

        assert!(!store.is_token_expired(&credentials(None)));
        assert!(!store.is_token_expired(&credentials(Some(TimeDelta::hours(1)))));
        assert!(store.is_token_expired(&credentials(Some(TimeDelta::minutes(2)))));
        assert!(store.is_token_expired(&credentials(Some(TimeDelta::minutes(-1)))));
    }
}
