//! Service registry: durable, cached, health-monitored directory of live
//! service endpoints with a Consul-compatible HTTP surface.
//!
//! The authoritative state is an in-memory map. Durability is delegated to
//! a [`storage::Storage`] backend (Redis in production, a JSON file or
//! plain memory otherwise); reads are accelerated by a bounded LRU cache
//! with per-entry TTL. Writes always hit storage first — the backend is
//! the linearization point.

pub mod api;
pub mod cache;
pub mod core;
pub mod metrics;
pub mod state;
pub mod storage;

pub use crate::core::Registry;
pub use cache::LruTtlCache;
pub use storage::{FileStorage, MemoryStorage, RedisStorage, Storage};
