//! Application state shared across handlers.

use keel_core::config::AppConfig;
use keel_metadata::MetadataStore;
use std::sync::Arc;

/// Application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Metadata store. All shared state lives here; handlers hold no caches.
    pub metadata: Arc<dyn MetadataStore>,
}

impl AppState {
    /// Create a new application state.
    pub fn new(config: AppConfig, metadata: Arc<dyn MetadataStore>) -> Self {
        if !config.server.metrics_enabled {
            tracing::info!("Metrics endpoint disabled");
        }
        Self {
            config: Arc::new(config),
            metadata,
        }
    }

    /// Maximum accepted JSON request body in bytes.
    pub fn max_body_size(&self) -> usize {
        self.config.server.max_body_size
    }
}
