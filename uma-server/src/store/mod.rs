use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

pub mod key;
pub mod memory;
pub mod redis;

pub use key::{EntryKey, EntryKind, Filter};

/// Errors that can occur during store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to serialize entry: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Failed to parse entry {0}: {1}")]
    Deserialization(String, String),
    #[error("Redis error: {0}")]
    Redis(String),
    #[error("Concurrent modification of {0}, retries exhausted")]
    Conflict(String),
    #[error("Store capacity exceeded, refusing to write {0}")]
    CapacityExceeded(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<::redis::RedisError> for StoreError {
    fn from(err: ::redis::RedisError) -> Self {
        Self::Redis(err.to_string())
    }
}

/// A persisted entry together with its storage key and write version
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub key: EntryKey,
    pub version: u64,
    pub value: T,
}

/// Entry store trait defining the persistence contract shared by all backends.
///
/// Lookups return `Ok(None)`/empty results for absent entries and `Err` only
/// when the backend itself failed, so callers can tell the two apart.
/// Expiry is recorded with each entry but never enforced on reads; expired
/// entries disappear only through [`EntryStore::remove_expired`].
#[async_trait::async_trait]
pub trait EntryStore: Send + Sync {
    /// Store an entry, replacing any previous entry at the same key
    async fn persist<T: Serialize + Send + Sync>(
        &self,
        key: &EntryKey,
        value: &T,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;

    /// Store an entry only if no entry exists at the key.
    /// Returns `false` when another writer got there first.
    async fn persist_if_absent<T: Serialize + Send + Sync>(
        &self,
        key: &EntryKey,
        value: &T,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<bool, StoreError>;

    /// Retrieve an entry by its full key
    async fn find<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &EntryKey,
    ) -> Result<Option<Versioned<T>>, StoreError>;

    /// Retrieve every entry of a kind carrying the given id, whatever its owner.
    /// More than one result means the id uniqueness invariant was violated.
    async fn find_by_id<T: DeserializeOwned + Send + Sync>(
        &self,
        kind: EntryKind,
        id: &str,
    ) -> Result<Vec<Versioned<T>>, StoreError>;

    /// Retrieve all entries matching a filter
    async fn find_many<T: DeserializeOwned + Send + Sync>(
        &self,
        filter: &Filter,
    ) -> Result<Vec<Versioned<T>>, StoreError>;

    /// Apply `update` to the stored entry and write it back without losing
    /// concurrent merges. Returns `Ok(None)` when the entry doesn't exist.
    async fn merge<T, F>(&self, key: &EntryKey, update: F) -> Result<Option<Versioned<T>>, StoreError>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: Fn(&mut T) + Send + Sync;

    /// Delete an entry. Returns `true` if it existed.
    async fn remove(&self, key: &EntryKey) -> Result<bool, StoreError>;

    /// Delete every entry of a kind whose expiry is at or before `now`
    async fn remove_expired(&self, kind: EntryKind, now: DateTime<Utc>) -> Result<usize, StoreError>;

    /// Checks connectivity to the backend
    async fn health_check(&self) -> Result<(), String>;
}

/// Store implementation that provides a uniform interface regardless of backend.
///
/// The concrete backend is chosen once at startup from the configuration and
/// shared by every component afterwards.
#[derive(Clone)]
pub enum Store {
    /// Process-local store using Moka, not durable
    InMemory(memory::InMemoryStore),
    /// Shared Redis store for multi-node deployments
    Redis(redis::RedisStore),
}

#[async_trait::async_trait]
impl EntryStore for Store {
    async fn persist<T: Serialize + Send + Sync>(
        &self,
        key: &EntryKey,
        value: &T,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        match self {
            Self::InMemory(store) => store.persist(key, value, expires_at).await,
            Self::Redis(store) => store.persist(key, value, expires_at).await,
        }
    }

    async fn persist_if_absent<T: Serialize + Send + Sync>(
        &self,
        key: &EntryKey,
        value: &T,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<bool, StoreError> {
        match self {
            Self::InMemory(store) => store.persist_if_absent(key, value, expires_at).await,
            Self::Redis(store) => store.persist_if_absent(key, value, expires_at).await,
        }
    }

    async fn find<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &EntryKey,
    ) -> Result<Option<Versioned<T>>, StoreError> {
        match self {
            Self::InMemory(store) => store.find(key).await,
            Self::Redis(store) => store.find(key).await,
        }
    }

    async fn find_by_id<T: DeserializeOwned + Send + Sync>(
        &self,
        kind: EntryKind,
        id: &str,
    ) -> Result<Vec<Versioned<T>>, StoreError> {
        match self {
            Self::InMemory(store) => store.find_by_id(kind, id).await,
            Self::Redis(store) => store.find_by_id(kind, id).await,
        }
    }

    async fn find_many<T: DeserializeOwned + Send + Sync>(
        &self,
        filter: &Filter,
    ) -> Result<Vec<Versioned<T>>, StoreError> {
        match self {
            Self::InMemory(store) => store.find_many(filter).await,
            Self::Redis(store) => store.find_many(filter).await,
        }
    }

    async fn merge<T, F>(&self, key: &EntryKey, update: F) -> Result<Option<Versioned<T>>, StoreError>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: Fn(&mut T) + Send + Sync,
    {
        match self {
            Self::InMemory(store) => store.merge(key, update).await,
            Self::Redis(store) => store.merge(key, update).await,
        }
    }

    async fn remove(&self, key: &EntryKey) -> Result<bool, StoreError> {
        match self {
            Self::InMemory(store) => store.remove(key).await,
            Self::Redis(store) => store.remove(key).await,
        }
    }

    async fn remove_expired(&self, kind: EntryKind, now: DateTime<Utc>) -> Result<usize, StoreError> {
        match self {
            Self::InMemory(store) => store.remove_expired(kind, now).await,
            Self::Redis(store) => store.remove_expired(kind, now).await,
        }
    }

    async fn health_check(&self) -> Result<(), String> {
        match self {
            Self::InMemory(store) => store.health_check().await,
            Self::Redis(store) => store.health_check().await,
        }
    }
}

/// Factory function to create the configured store backend.
pub async fn create_store(config: &crate::config::UmaConfig) -> Result<Store, StoreError> {
    match config.store.kind {
        crate::config::StoreKind::InMemory => {
            let store = memory::InMemoryStore::new(config.store.memory.capacity_mib)
                .map_err(StoreError::Config)?;
            Ok(Store::InMemory(store))
        }
        crate::config::StoreKind::Redis => {
            if config.store.redis.url.is_empty() {
                return Err(StoreError::Config(
                    "Redis URL is required for Redis store".to_string(),
                ));
            }
            let store =
                redis::RedisStore::new(&config.store.redis.url, config.store.redis.scan_chunk_size)
                    .await
                    .map_err(StoreError::Config)?;
            Ok(Store::Redis(store))
        }
    }
}
