//! Durable key→value storage for service records.
//!
//! The trait is intentionally narrow so the registry can run against Redis
//! in production and a local JSON file (or plain memory) everywhere else.
//! `save` must be durable before it returns; `load_all` is a point-in-time
//! snapshot. No cross-record transactions exist or are needed.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::AsyncCommands;

use aegis_domain::config::StorageConfig;
use aegis_domain::{Error, Result, ServiceRecord};

/// Storage key prefix for service records.
pub const KEY_PREFIX: &str = "service:";

fn record_key(id: &str) -> String {
    format!("{KEY_PREFIX}{id}")
}

#[async_trait]
pub trait Storage: Send + Sync {
    /// Write-through save; durable before returning `Ok`.
    async fn save(&self, record: &ServiceRecord) -> Result<()>;
    /// Remove by id. `Error::NotFound` when the id is absent.
    async fn delete(&self, id: &str) -> Result<()>;
    /// Point-in-time snapshot of every stored record.
    async fn load_all(&self) -> Result<HashMap<String, ServiceRecord>>;
    /// Cheap reachability probe.
    async fn ping(&self) -> Result<()>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Redis backend
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Redis-backed storage. One key per record (`service:{id}`), JSON values.
pub struct RedisStorage {
    conn: redis::aio::MultiplexedConnection,
    ping_timeout: Duration,
}

impl RedisStorage {
    pub async fn connect(config: &StorageConfig) -> Result<Self> {
        let url = match &config.redis_password {
            Some(password) => format!(
                "redis://:{password}@{}/{}",
                config.redis_addr, config.redis_db
            ),
            None => format!("redis://{}/{}", config.redis_addr, config.redis_db),
        };
        let client =
            redis::Client::open(url).map_err(|e| Error::Storage(format!("redis client: {e}")))?;
        let conn = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| Error::Storage(format!("redis connect {}: {e}", config.redis_addr)))?;
        tracing::info!(addr = %config.redis_addr, db = config.redis_db, "redis storage connected");
        Ok(Self {
            conn,
            ping_timeout: Duration::from_secs(config.ping_timeout_secs),
        })
    }
}

#[async_trait]
impl Storage for RedisStorage {
    async fn save(&self, record: &ServiceRecord) -> Result<()> {
        let payload = serde_json::to_string(record)?;
        let mut conn = self.conn.clone();
        let _: () = conn
            .set(record_key(&record.id), payload)
            .await
            .map_err(|e| Error::Storage(format!("redis SET: {e}")))?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn
            .del(record_key(id))
            .await
            .map_err(|e| Error::Storage(format!("redis DEL: {e}")))?;
        if removed == 0 {
            return Err(Error::NotFound(format!("service {id}")));
        }
        Ok(())
    }

    async fn load_all(&self) -> Result<HashMap<String, ServiceRecord>> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn
            .keys(format!("{KEY_PREFIX}*"))
            .await
            .map_err(|e| Error::Storage(format!("redis KEYS: {e}")))?;
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let values: Vec<Option<String>> = conn
            .mget(&keys)
            .await
            .map_err(|e| Error::Storage(format!("redis MGET: {e}")))?;

        let mut records = HashMap::with_capacity(values.len());
        for (key, value) in keys.iter().zip(values) {
            let Some(raw) = value else { continue };
            match serde_json::from_str::<ServiceRecord>(&raw) {
                Ok(record) => {
                    records.insert(record.id.clone(), record);
                }
                Err(e) => {
                    // A corrupt record must not block startup.
                    tracing::warn!(key = %key, error = %e, "skipping undecodable record");
                }
            }
        }
        Ok(records)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let fut = async {
            let pong: String = redis::cmd("PING")
                .query_async(&mut conn)
                .await
                .map_err(|e| Error::Storage(format!("redis PING: {e}")))?;
            if pong == "PONG" {
                Ok(())
            } else {
                Err(Error::Storage(format!("unexpected PING reply: {pong}")))
            }
        };
        tokio::time::timeout(self.ping_timeout, fut)
            .await
            .map_err(|_| Error::Storage("redis PING timed out".into()))?
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// File backend
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// JSON-file storage for single-node deployments. The whole record set is
/// rewritten through a temp file + rename on every mutation, so a crash
/// mid-write never leaves a torn file behind.
pub struct FileStorage {
    path: PathBuf,
    records: Mutex<HashMap<String, ServiceRecord>>,
}

impl FileStorage {
    pub fn open(data_dir: &std::path::Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let path = data_dir.join("services.json");
        let records = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            HashMap::new()
        };
        tracing::info!(path = %path.display(), records = records.len(), "file storage opened");
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    /// Serialize `records` and atomically replace the backing file.
    fn persist(&self, records: &HashMap<String, ServiceRecord>) -> Result<()> {
        let dir = self
            .path
            .parent()
            .ok_or_else(|| Error::Storage("storage path has no parent".into()))?;
        let payload = serde_json::to_vec_pretty(records)?;
        let tmp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| Error::Storage(format!("temp file: {e}")))?;
        std::io::Write::write_all(&mut tmp.as_file(), &payload)
            .map_err(|e| Error::Storage(format!("write: {e}")))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| Error::Storage(format!("fsync: {e}")))?;
        tmp.persist(&self.path)
            .map_err(|e| Error::Storage(format!("rename: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn save(&self, record: &ServiceRecord) -> Result<()> {
        let mut records = self.records.lock();
        records.insert(record.id.clone(), record.clone());
        self.persist(&records)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut records = self.records.lock();
        if records.remove(id).is_none() {
            return Err(Error::NotFound(format!("service {id}")));
        }
        self.persist(&records)
    }

    async fn load_all(&self) -> Result<HashMap<String, ServiceRecord>> {
        Ok(self.records.lock().clone())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Memory backend
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Volatile storage for tests and throwaway deployments. The failure
/// switch lets tests exercise the storage-error paths without a broken
/// Redis at hand.
#[derive(Default)]
pub struct MemoryStorage {
    records: Mutex<HashMap<String, ServiceRecord>>,
    unreachable: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with a storage error.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(Error::Storage("storage unreachable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn save(&self, record: &ServiceRecord) -> Result<()> {
        self.check()?;
        self.records
            .lock()
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.check()?;
        if self.records.lock().remove(id).is_none() {
            return Err(Error::NotFound(format!("service {id}")));
        }
        Ok(())
    }

    async fn load_all(&self) -> Result<HashMap<String, ServiceRecord>> {
        self.check()?;
        Ok(self.records.lock().clone())
    }

    async fn ping(&self) -> Result<()> {
        self.check()
    }
}
