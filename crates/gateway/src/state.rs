use std::sync::Arc;

use aegis_domain::config::Config;
use aegis_domain::OutputCommand;

use crate::metrics::GatewayMetrics;
use crate::processors::ProcessorSet;
use crate::queue::{BoundedQueue, IoQueue};
use crate::senders::SenderSet;

/// Shared application state passed to all gateway API handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub queue: Arc<IoQueue>,
    /// Execution reports awaiting the controller result stream.
    pub reports: Arc<BoundedQueue<OutputCommand>>,
    pub processors: Arc<ProcessorSet>,
    pub senders: Arc<SenderSet>,
    pub metrics: Arc<GatewayMetrics>,
}
