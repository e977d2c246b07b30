//! Service lifecycle: publish this process into the registry on start,
//! heartbeat on an interval, and deregister on shutdown — before local
//! work is cancelled, so readers see the service disappear while its
//! ports are still open.

pub mod client;

pub use client::RegistryClient;

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use aegis_domain::config::LifecycleConfig;
use aegis_domain::{Result, ServiceRecord};

/// Handle owning this process's registration.
///
/// Heartbeats are plain re-registers: the registry clamps `last_seen` on
/// every upsert, which is exactly the refresh we need.
pub struct Lifecycle {
    client: Option<RegistryClient>,
    record: ServiceRecord,
    config: LifecycleConfig,
    /// Cancelling this token tears down local work; `shutdown` triggers it
    /// only after deregistration completed (or its grace expired).
    cancel: CancellationToken,
    heartbeat_cancel: CancellationToken,
}

impl Lifecycle {
    pub fn new(config: LifecycleConfig, record: ServiceRecord, cancel: CancellationToken) -> Result<Self> {
        let client = if config.enabled {
            Some(RegistryClient::new(config.registry_url.clone())?)
        } else {
            None
        };
        Ok(Self {
            client,
            record,
            config,
            cancel,
            heartbeat_cancel: CancellationToken::new(),
        })
    }

    pub fn enabled(&self) -> bool {
        self.client.is_some()
    }

    /// Register and spawn the heartbeat loop. A failed initial register is
    /// logged, not fatal — the heartbeat keeps retrying, so a registry
    /// that comes up late still learns about this process.
    pub async fn start(&self) {
        let Some(client) = &self.client else {
            tracing::info!("service registry disabled; skipping registration");
            return;
        };

        match client.register(&self.record).await {
            Ok(()) => tracing::info!(
                service_id = %self.record.id,
                registry = %self.config.registry_url,
                "registered with service registry"
            ),
            Err(e) => tracing::warn!(
                service_id = %self.record.id,
                error = %e,
                "initial registration failed; heartbeat will retry"
            ),
        }

        let client = client.clone();
        let record = self.record.clone();
        let interval = Duration::from_secs(self.config.heartbeat_secs.max(1));
        let cancel = self.heartbeat_cancel.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // immediate first tick is the register above
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = client.register(&record).await {
                            tracing::warn!(service_id = %record.id, error = %e, "heartbeat failed");
                        }
                    }
                    _ = cancel.cancelled() => return,
                }
            }
        });
    }

    /// Deregister, then cancel local work. Deregistration gets the
    /// configured grace period; local loops get the same before the
    /// process should force-close handles.
    pub async fn shutdown(&self) {
        self.heartbeat_cancel.cancel();

        if let Some(client) = &self.client {
            let grace = Duration::from_secs(self.config.shutdown_grace_secs.max(1));
            match tokio::time::timeout(grace, client.deregister(&self.record.id)).await {
                Ok(Ok(())) => {
                    tracing::info!(service_id = %self.record.id, "deregistered from service registry")
                }
                Ok(Err(e)) => {
                    tracing::warn!(service_id = %self.record.id, error = %e, "deregister failed")
                }
                Err(_) => {
                    tracing::warn!(service_id = %self.record.id, "deregister timed out")
                }
            }
        }

        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}
