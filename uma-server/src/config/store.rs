use serde::Deserialize;

/// Specifies which entry store implementation backs tickets, RPTs, scopes and resources
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StoreKind {
    #[default]
    InMemory,
    Redis,
}

/// Configuration for the persistence subsystem
#[derive(Debug, Deserialize, Clone, Default)]
pub struct StoreConfig {
    /// Store type: "in-memory" (default) or "redis"
    #[serde(default)]
    pub kind: StoreKind,

    /// In-memory store specific configuration
    #[serde(default)]
    pub memory: InMemoryStoreConfig,

    /// Redis store specific configuration
    #[serde(default)]
    pub redis: RedisStoreConfig,
}

/// In-memory store configuration options
#[derive(Debug, Deserialize, Clone)]
pub struct InMemoryStoreConfig {
    /// Maximum capacity in MiB (default: 128 MiB)
    #[serde(default = "default_memory_capacity")]
    pub capacity_mib: usize,
}

impl Default for InMemoryStoreConfig {
    fn default() -> Self {
        Self {
            capacity_mib: default_memory_capacity(),
        }
    }
}

/// Redis store configuration options
#[derive(Debug, Deserialize, Clone)]
pub struct RedisStoreConfig {
    /// Redis connection string
    #[serde(default)]
    pub url: String,

    /// Upper bound on the number of rows fetched or deleted per round trip
    #[serde(default = "default_scan_chunk_size")]
    pub scan_chunk_size: usize,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            scan_chunk_size: default_scan_chunk_size(),
        }
    }
}

fn default_memory_capacity() -> usize {
    128
}

fn default_scan_chunk_size() -> usize {
    100
}
