//! Key/value settings persistence.
//!
//! Settings are small JSON documents (the thumbnail manifest, saved filter
//! selections) keyed by a dotted name like `thumbnails.manifest`.

use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use librarian_storage::BackendHandle;
use librarian_storage::error::ErrorKind as StorageErrorKind;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};

#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Stored value, or `None` if the key was never set.
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    async fn set(&self, key: &str, value: Value) -> Result<()>;
}

/// Settings held in memory for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemorySettings {
    values: RwLock<HashMap<String, Value>>,
}
impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettingsStore for MemorySettings {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.values.read().unwrap_or_else(PoisonError::into_inner).get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.values.write().unwrap_or_else(PoisonError::into_inner).insert(key.to_string(), value);
        Ok(())
    }
}

/// Settings stored as one JSON file per key on a storage backend.
pub struct BackendSettings {
    backend: BackendHandle,
    directory: PathBuf,
}

impl BackendSettings {
    pub fn new(backend: BackendHandle, directory: impl Into<PathBuf>) -> Self {
        Self { backend, directory: directory.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
            && !key.starts_with('.');
        if !valid {
            exn::bail!(ErrorKind::Malformed(format!("invalid setting key '{key}'")));
        }
        Ok(self.directory.join(format!("{key}.json")))
    }
}

#[async_trait]
impl SettingsStore for BackendSettings {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let path = self.path_for(key)?;
        let data = match self.backend.read(&path).await {
            Ok(data) => data,
            Err(err) if matches!(&*err, StorageErrorKind::NotFound(_)) => return Ok(None),
            Err(err) => return Err(err).or_raise(|| ErrorKind::Storage(key.to_string())),
        };
        let value = serde_json::from_slice(&data).or_raise(|| ErrorKind::Malformed(key.to_string()))?;
        Ok(Some(value))
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let path = self.path_for(key)?;
        let data = serde_json::to_vec_pretty(&value).or_raise(|| ErrorKind::Malformed(key.to_string()))?;
        match self.backend.write(&path, &data).await {
            Ok(location) => {
                tracing::trace!(key, backend = self.backend.name(), path = %location.display(), "Stored setting");
                Ok(())
            },
            Err(err) if err.is_refusal() => Err(err).or_raise(|| ErrorKind::PermissionDenied(key.to_string())),
            Err(err) => Err(err).or_raise(|| ErrorKind::Storage(key.to_string())),
        }
    }
}
