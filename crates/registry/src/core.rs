//! Authoritative registry state: in-memory map + storage + read cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use aegis_domain::config::RegistryConfig;
use aegis_domain::{Error, HealthStatus, Result, ServiceRecord};

use crate::cache::LruTtlCache;
use crate::metrics::RegistryMetrics;
use crate::storage::Storage;

/// Cache key for the full listing.
const ALL_SERVICES_KEY: &str = "all_services";

fn record_cache_key(id: &str) -> String {
    format!("service:{id}")
}

/// What the read cache stores. `Miss` is a short-lived negative entry that
/// absorbs lookup stampedes for ids that do not exist.
#[derive(Clone)]
pub enum CachedValue {
    Record(ServiceRecord),
    Listing(HashMap<String, ServiceRecord>),
    Miss,
}

/// The service directory. Writes go through storage first — in-memory
/// state only advances after the backend confirms.
pub struct Registry {
    services: RwLock<HashMap<String, ServiceRecord>>,
    storage: Arc<dyn Storage>,
    cache: LruTtlCache<CachedValue>,
    config: RegistryConfig,
    metrics: Arc<RegistryMetrics>,
}

impl Registry {
    /// Seed the in-memory map from storage and return the ready registry.
    /// The cache starts cold; it fills on first reads.
    pub async fn start(
        storage: Arc<dyn Storage>,
        config: RegistryConfig,
        metrics: Arc<RegistryMetrics>,
    ) -> Result<Arc<Self>> {
        let seeded = storage.load_all().await?;
        tracing::info!(services = seeded.len(), "registry state loaded");
        metrics.services.set(seeded.len() as i64);

        let cache = LruTtlCache::new(
            config.cache_capacity,
            Duration::from_secs(config.cache_ttl_secs),
        );

        Ok(Arc::new(Self {
            services: RwLock::new(seeded),
            storage,
            cache,
            config,
            metrics,
        }))
    }

    /// Upsert a record. `last_seen` is clamped to now and health reset to
    /// passing; a storage failure fails the whole operation and leaves the
    /// in-memory map untouched.
    pub async fn register(&self, mut record: ServiceRecord) -> Result<()> {
        let issues = record.validate();
        if !issues.is_empty() {
            let joined = issues
                .iter()
                .map(|i| format!("{}: {}", i.field, i.message))
                .collect::<Vec<_>>()
                .join(", ");
            return Err(Error::Validation(joined));
        }

        record.last_seen = Utc::now();
        record.health = HealthStatus::Passing;

        let started = Instant::now();
        match self.storage.save(&record).await {
            Ok(()) => {
                let id = record.id.clone();
                {
                    let mut services = self.services.write();
                    services.insert(id.clone(), record);
                    self.metrics.services.set(services.len() as i64);
                }
                self.invalidate(&id);
                self.metrics.observe("register", "ok", started.elapsed());
                tracing::info!(service_id = %id, "service registered");
                Ok(())
            }
            Err(e) => {
                self.metrics.observe("register", "storage_error", started.elapsed());
                tracing::error!(service_id = %record.id, error = %e, "register failed in storage");
                Err(e)
            }
        }
    }

    /// Remove a record. `NotFound` propagates to the caller.
    pub async fn deregister(&self, id: &str) -> Result<()> {
        let started = Instant::now();
        match self.storage.delete(id).await {
            Ok(()) => {
                {
                    let mut services = self.services.write();
                    services.remove(id);
                    self.metrics.services.set(services.len() as i64);
                }
                self.invalidate(id);
                self.metrics.observe("deregister", "ok", started.elapsed());
                tracing::info!(service_id = %id, "service deregistered");
                Ok(())
            }
            Err(e @ Error::NotFound(_)) => {
                self.metrics.observe("deregister", "not_found", started.elapsed());
                Err(e)
            }
            Err(e) => {
                self.metrics.observe("deregister", "storage_error", started.elapsed());
                tracing::error!(service_id = %id, error = %e, "deregister failed in storage");
                Err(e)
            }
        }
    }

    /// Full snapshot, cache-first.
    pub fn list(&self) -> HashMap<String, ServiceRecord> {
        if let Some(CachedValue::Listing(listing)) = self.cache.get(ALL_SERVICES_KEY) {
            self.metrics.cache_hits.inc();
            return listing;
        }
        self.metrics.cache_misses.inc();

        let snapshot = self.services.read().clone();
        self.cache
            .set(ALL_SERVICES_KEY, CachedValue::Listing(snapshot.clone()));
        snapshot
    }

    /// Single-record lookup, cache-first. Negative results are cached for
    /// a short burst window.
    pub fn get(&self, id: &str) -> Result<ServiceRecord> {
        match self.cache.get(&record_cache_key(id)) {
            Some(CachedValue::Record(record)) => {
                self.metrics.cache_hits.inc();
                return Ok(record);
            }
            Some(CachedValue::Miss) => {
                self.metrics.cache_hits.inc();
                return Err(Error::NotFound(format!("service {id}")));
            }
            _ => self.metrics.cache_misses.inc(),
        }

        let found = self.services.read().get(id).cloned();
        match found {
            Some(record) => {
                self.cache
                    .set(record_cache_key(id), CachedValue::Record(record.clone()));
                Ok(record)
            }
            None => {
                self.cache.set_with_ttl(
                    record_cache_key(id),
                    CachedValue::Miss,
                    Duration::from_secs(self.config.negative_ttl_secs),
                );
                Err(Error::NotFound(format!("service {id}")))
            }
        }
    }

    pub fn len(&self) -> usize {
        self.services.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.read().is_empty()
    }

    fn invalidate(&self, id: &str) {
        self.cache.delete(&record_cache_key(id));
        self.cache.delete(ALL_SERVICES_KEY);
    }

    // ── Health reaper ──────────────────────────────────────────────

    /// Mark stale records critical. Records are never deleted here; only
    /// external deregistration removes them.
    pub async fn reap_stale(&self) {
        let now = Utc::now();
        let deadline = self.config.staleness_deadline_secs as i64;

        // Snapshot candidates without holding the lock across storage I/O.
        let stale: Vec<ServiceRecord> = {
            let services = self.services.read();
            services
                .values()
                .filter(|r| r.health != HealthStatus::Critical && r.is_stale(now, deadline))
                .cloned()
                .collect()
        };

        for mut record in stale {
            record.health = HealthStatus::Critical;
            match self.storage.save(&record).await {
                Ok(()) => {
                    let id = record.id.clone();
                    {
                        let mut services = self.services.write();
                        // Re-register may have raced us; only persist the
                        // transition if the record is still stale.
                        if let Some(current) = services.get_mut(&id) {
                            if current.is_stale(now, deadline) {
                                current.health = HealthStatus::Critical;
                            }
                        }
                    }
                    self.invalidate(&id);
                    self.metrics.reaper_transitions.inc();
                    tracing::warn!(service_id = %id, "service marked critical (stale)");
                }
                Err(e) => {
                    tracing::warn!(service_id = %record.id, error = %e, "reaper persist failed");
                }
            }
        }
    }

    /// Run the reaper until cancelled.
    pub async fn run_reaper(self: Arc<Self>, cancel: CancellationToken) {
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.reaper_interval_secs.max(1)));
        loop {
            tokio::select! {
                _ = interval.tick() => self.reap_stale().await,
                _ = cancel.cancelled() => {
                    tracing::debug!("health reaper stopped");
                    return;
                }
            }
        }
    }

    /// Storage reachability for the health endpoint.
    pub async fn storage_healthy(&self) -> bool {
        self.storage.ping().await.is_ok()
    }
}
