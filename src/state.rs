//! Application state management

use std::sync::Arc;

use crate::config::Config;
use crate::storage::MultipartStore;
use crate::upload::{SessionRegistry, UploadOrchestrator};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    orchestrator: Arc<UploadOrchestrator>,
}

impl AppState {
    /// Create a new application state around the given store
    pub fn new(config: Config, store: Arc<dyn MultipartStore>) -> Self {
        let orchestrator = UploadOrchestrator::new(
            SessionRegistry::new(),
            store,
            config.upload.completion_policy,
        );

        Self {
            inner: Arc::new(AppStateInner {
                config,
                orchestrator: Arc::new(orchestrator),
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the upload orchestrator
    pub fn orchestrator(&self) -> &Arc<UploadOrchestrator> {
        &self.inner.orchestrator
    }
}
