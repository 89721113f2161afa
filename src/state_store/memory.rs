use crate::error::Error;
use crate::state_store::{AppState, StateStore};

#[derive(Default, Debug, Clone)]
pub struct InMemoryStateStore {
    state: AppState,
}

impl InMemoryStateStore {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

#[async_trait::async_trait]
impl StateStore for InMemoryStateStore {
    fn state(&self) -> &AppState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut AppState {
        &mut self.state
    }

    async fn persist(&self) -> Result<(), Error> {
        Ok(())
    }
}
