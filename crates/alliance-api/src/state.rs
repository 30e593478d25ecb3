//! Application state for API handlers

use std::sync::Arc;

use alliance_core::DirectoryRepository;
use alliance_identity::{ClientRegistry, ProviderRegistry};
use alliance_sync::ReconciliationEngine;

/// Shared service handles, cheap to clone per request
#[derive(Clone)]
pub struct AppState {
    pub providers: Arc<ProviderRegistry>,
    pub clients: Arc<ClientRegistry>,
    pub engine: Arc<ReconciliationEngine>,
    pub directory: Arc<dyn DirectoryRepository>,
}

impl AppState {
    pub fn new(
        providers: Arc<ProviderRegistry>,
        clients: Arc<ClientRegistry>,
        engine: Arc<ReconciliationEngine>,
        directory: Arc<dyn DirectoryRepository>,
    ) -> Self {
        Self {
            providers,
            clients,
            engine,
            directory,
        }
    }
}
