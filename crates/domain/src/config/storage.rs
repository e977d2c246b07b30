use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Durable storage backend
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Redis,
    File,
    Memory,
}

impl std::str::FromStr for StorageBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "redis" => Ok(StorageBackend::Redis),
            "file" => Ok(StorageBackend::File),
            "memory" => Ok(StorageBackend::Memory),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "d_backend")]
    pub backend: StorageBackend,
    #[serde(default = "d_redis_addr")]
    pub redis_addr: String,
    #[serde(default)]
    pub redis_password: Option<String>,
    #[serde(default)]
    pub redis_db: i64,
    /// Directory for the file backend.
    #[serde(default = "d_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "d_3")]
    pub ping_timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: d_backend(),
            redis_addr: d_redis_addr(),
            redis_password: None,
            redis_db: 0,
            data_dir: d_data_dir(),
            ping_timeout_secs: d_3(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_backend() -> StorageBackend {
    StorageBackend::Redis
}
fn d_redis_addr() -> String {
    "localhost:6379".into()
}
fn d_data_dir() -> PathBuf {
    "./data".into()
}
fn d_3() -> u64 {
    3
}
