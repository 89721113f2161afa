//! A JSON file-backed implementation of the [`StateStore`][super::StateStore] trait.
//!
//! Wraps a [`InMemoryStateStore`][super::memory::InMemoryStateStore] instance, writing its
//! state to a JSON file on disk that is reloaded across restarts.
use crate::error::Error;
use crate::state_store::memory::InMemoryStateStore;
use crate::state_store::{AppState, StateStore};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// A file-backed state store. Each [`persist`][StateStore::persist] rewrites a JSON file on
/// disk with the current state.
#[derive(Default, Debug, Clone)]
#[allow(clippy::module_name_repetitions)]
pub struct FileStateStore {
    store: InMemoryStateStore,
    path: PathBuf,
}

impl FileStateStore {
    /// Save the state as JSON to the store's configured path, or return an Error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidJSON`] if the state can't be serialized to JSON.
    ///
    /// Returns [`Error::IO`] if the serialized state can't be written to the backing file path.
    pub async fn save(&self) -> Result<(), Error> {
        let data = serde_json::to_string_pretty(self.store.state())?;
        let mut output_file = File::create(&self.path).await?;
        output_file.write_all(data.as_bytes()).await?;
        output_file.flush().await?;
        Ok(())
    }

    /// Load a [`FileStateStore`] from the JSON state located at the given path.
    ///
    /// A missing file is created with an empty state. A file that isn't valid state JSON is
    /// logged and left untouched, and the store starts from an empty state; the file is only
    /// overwritten by the next [`save`][FileStateStore::save].
    ///
    /// # Errors
    ///
    /// Returns [`Error::IO`] if the path can't be opened, read or created.
    pub async fn try_from_file(p: impl AsRef<Path>) -> Result<Self, Error> {
        let p = p.as_ref();
        let contents = match File::open(p).await {
            Ok(mut f) => {
                let mut buf = vec![];
                f.read_to_end(&mut buf).await?;
                buf
            }
            Err(err) => match err.kind() {
                ErrorKind::NotFound => {
                    tracing::info!("state file not found at {}, starting fresh", p.display());
                    Self::write_empty_state(File::create(p).await?).await?
                }
                _ => return Err(Error::IO(err)),
            },
        };

        let state = match serde_json::from_slice::<AppState>(&contents) {
            Ok(state) => {
                tracing::info!("loaded previous state from {}", p.display());
                state
            }
            Err(err) => {
                tracing::error!("error loading state file {}: {err}. Starting fresh.", p.display());
                AppState::default()
            }
        };

        Ok(Self {
            store: InMemoryStateStore::new(state),
            path: p.to_path_buf(),
        })
    }

    async fn write_empty_state(mut f: File) -> io::Result<Vec<u8>> {
        let default_data = serde_json::to_string_pretty(&AppState::default())?;
        let default_bytes = default_data.as_bytes();
        f.write_all(default_bytes).await?;
        f.flush().await?;
        Ok(default_bytes.to_vec())
    }
}

#[async_trait::async_trait]
impl StateStore for FileStateStore {
    fn state(&self) -> &AppState {
        self.store.state()
    }

    fn state_mut(&mut self) -> &mut AppState {
        self.store.state_mut()
    }

    async fn persist(&self) -> Result<(), Error> {
        self.save().await
    }
}
