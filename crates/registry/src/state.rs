use std::sync::Arc;

use crate::core::Registry;
use crate::metrics::RegistryMetrics;

/// Shared application state passed to all registry API handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub metrics: Arc<RegistryMetrics>,
}
