//! Application state management

use std::sync::Arc;

use crate::config::Config;
use crate::queue::QueueStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    queue: QueueStore,
}

impl AppState {
    pub fn new(config: Config, queue: QueueStore) -> Self {
        Self {
            inner: Arc::new(AppStateInner { config, queue }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the queue store
    pub fn queue(&self) -> &QueueStore {
        &self.inner.queue
    }
}
