//! Persisted application state.
//!
//! Tracks the last observed public IP, when it was checked, and per-domain observations: the
//! `A` record last seen at the DNS provider, when it was last checked or updated, and the
//! certificate expiry and last renewal.
//!
//! Two implementations are provided, [`memory::InMemoryStateStore`] and
//! [`file::FileStateStore`]. The former is not durable across restarts. The latter writes its
//! state to disk whenever it is persisted and loads it again on startup.

use crate::error::Error;
use std::sync::Arc;
use tokio::sync::RwLock;

pub mod file;
pub mod memory;
mod model;

#[allow(clippy::module_name_repetitions)]
pub use file::FileStateStore;
#[allow(clippy::module_name_repetitions)]
pub use memory::InMemoryStateStore;
pub use model::{AppState, DomainState};

/// `DynStateStore` is a type alias for a [`StateStore`] that can be used by multiple read/write
/// consumers that coordinate through an [`Arc`] and a [`RwLock`] wrapping the [`StateStore`].
#[allow(clippy::module_name_repetitions)]
pub type DynStateStore = Arc<RwLock<dyn StateStore + Send + Sync>>;

/// An async trait describing durable storage of the [`AppState`].
#[async_trait::async_trait]
pub trait StateStore {
    /// The current state.
    fn state(&self) -> &AppState;

    /// The current state, for modification. Changes are not durable until
    /// [`persist`][StateStore::persist] is called.
    fn state_mut(&mut self) -> &mut AppState;

    /// Make the current state durable.
    async fn persist(&self) -> Result<(), Error>;
}
