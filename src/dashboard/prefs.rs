//! Key/value storage for dashboard preferences.
//!
//! Preferences are small strings set by the dashboard (`theme`, `sort`) that should survive a
//! restart. [`MemoryPreferences`] keeps them for the life of the process, [`FilePreferences`]
//! also writes them to a JSON object on disk.

use crate::error::Error;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

#[allow(clippy::module_name_repetitions)]
pub type DynPreferenceStore = Arc<RwLock<dyn PreferenceStore + Send + Sync>>;

#[async_trait::async_trait]
pub trait PreferenceStore {
    fn get(&self, key: &str) -> Option<String>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set(&mut self, key: &str, value: String) -> Result<(), Error>;
}

#[derive(Debug, Default, Clone)]
pub struct MemoryPreferences {
    values: BTreeMap<String, String>,
}

#[async_trait::async_trait]
impl PreferenceStore for MemoryPreferences {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    async fn set(&mut self, key: &str, value: String) -> Result<(), Error> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct FilePreferences {
    store: MemoryPreferences,
    path: PathBuf,
}

impl FilePreferences {
    /// Load preferences from `path`. A missing or unreadable file starts empty; it is only
    /// written on the next [`set`][PreferenceStore::set].
    pub async fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let values = match tokio::fs::read(&path).await {
            Ok(contents) => serde_json::from_slice(&contents).unwrap_or_else(|err| {
                tracing::warn!("ignoring corrupt preferences in {}: {err}", path.display());
                BTreeMap::new()
            }),
            Err(err) if err.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => {
                tracing::warn!("error reading preferences {}: {err}", path.display());
                BTreeMap::new()
            }
        };
        Self {
            store: MemoryPreferences { values },
            path,
        }
    }

    async fn save(&self) -> Result<(), Error> {
        let data = serde_json::to_string_pretty(&self.store.values)?;
        let mut output_file = File::create(&self.path).await?;
        output_file.write_all(data.as_bytes()).await?;
        output_file.flush().await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl PreferenceStore for FilePreferences {
    fn get(&self, key: &str) -> Option<String> {
        self.store.get(key)
    }

    async fn set(&mut self, key: &str, value: String) -> Result<(), Error> {
        self.store.set(key, value).await?;
        self.save().await
    }
}
