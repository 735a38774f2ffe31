use super::{EntryKey, EntryKind, EntryStore, Filter, StoreError, Versioned};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use moka::future::Cache as MokaCache;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-path locks are dropped once nobody touched them for this long
const LOCK_IDLE_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Clone)]
struct MemoryEntry {
    key: EntryKey,
    version: u64,
    expires_at: Option<DateTime<Utc>>,
    data: Arc<str>,
}

impl MemoryEntry {
    fn decode<T: DeserializeOwned>(&self) -> Result<Versioned<T>, StoreError> {
        let value = serde_json::from_str(&self.data)
            .map_err(|e| StoreError::Deserialization(self.key.path(), e.to_string()))?;
        Ok(Versioned {
            key: self.key.clone(),
            version: self.version,
            value,
        })
    }
}

/// Process-local store. Entries are never evicted; writes that would exceed
/// the byte budget fail with [`StoreError::CapacityExceeded`] instead.
#[derive(Clone)]
pub struct InMemoryStore {
    /// Entries keyed by storage path, unbounded
    entries: MokaCache<String, MemoryEntry>,
    capacity_bytes: u64,
    /// Serialized bytes currently held in `entries`
    used_bytes: Arc<AtomicU64>,
    /// Storage paths of owner-scoped entries keyed by `kind/id`
    ids: MokaCache<String, HashSet<String>>,
    /// Owner branches created so far
    branches: MokaCache<String, ()>,
    locks: MokaCache<String, Arc<Mutex<()>>>,
}

impl InMemoryStore {
    /// Initialize a new in-memory store instance
    pub fn new(capacity_mib: usize) -> Result<Self, String> {
        let max_capacity_bytes = capacity_mib
            .checked_mul(1024 * 1024)
            .and_then(|bytes| u64::try_from(bytes).ok())
            .ok_or_else(|| format!("Capacity overflow: {capacity_mib} MiB"))?;

        Ok(Self {
            entries: MokaCache::builder().build(),
            capacity_bytes: max_capacity_bytes,
            used_bytes: Arc::new(AtomicU64::new(0)),
            ids: MokaCache::builder().build(),
            branches: MokaCache::builder().build(),
            locks: MokaCache::builder()
                .time_to_idle(LOCK_IDLE_TIMEOUT)
                .build(),
        })
    }

    /// Exclusive critical section for one storage path
    async fn lock(&self, path: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .get_with(path.to_string(), async { Arc::new(Mutex::new(())) })
            .await;
        lock.lock_owned().await
    }

    /// Accounts for replacing `old` bytes at `path` with `new` bytes.
    /// Growth beyond the budget is refused; shrinking always succeeds.
    fn reserve(&self, path: &str, old: usize, new: usize) -> Result<(), StoreError> {
        let (old, new) = (old as u64, new as u64);
        self.used_bytes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                let next = used.saturating_sub(old) + new;
                (new <= old || next <= self.capacity_bytes).then_some(next)
            })
            .map(|_| ())
            .map_err(|used| {
                warn!(
                    "Refusing to store {} ({} bytes), {} of {} bytes in use",
                    path, new, used, self.capacity_bytes
                );
                StoreError::CapacityExceeded(path.to_string())
            })
    }

    fn release(&self, bytes: usize) {
        let bytes = bytes as u64;
        let _ = self
            .used_bytes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                Some(used.saturating_sub(bytes))
            });
    }

    async fn index(&self, key: &EntryKey) {
        let Some(branch) = key.branch() else {
            return;
        };
        if self.branches.entry(branch.clone()).or_insert(()).await.is_fresh() {
            info!("Created storage branch {}", branch);
        }

        let id_path = key.id_path();
        let _guard = self.lock(&format!("#ids/{id_path}")).await;
        let mut paths = self.ids.get(&id_path).await.unwrap_or_default();
        paths.insert(key.path());
        self.ids.insert(id_path, paths).await;
    }

    async fn unindex(&self, key: &EntryKey) {
        if !key.kind.is_owner_scoped() {
            return;
        }
        let id_path = key.id_path();
        let _guard = self.lock(&format!("#ids/{id_path}")).await;
        if let Some(mut paths) = self.ids.get(&id_path).await {
            paths.remove(&key.path());
            if paths.is_empty() {
                self.ids.invalidate(&id_path).await;
            } else {
                self.ids.insert(id_path, paths).await;
            }
        }
    }

    async fn write(
        &self,
        key: &EntryKey,
        version: u64,
        data: String,
        expires_at: Option<DateTime<Utc>>,
    ) {
        let entry = MemoryEntry {
            key: key.clone(),
            version,
            expires_at,
            data: data.into(),
        };
        self.entries.insert(key.path(), entry).await;
    }
}

#[async_trait]
impl EntryStore for InMemoryStore {
    async fn persist<T: Serialize + Send + Sync>(
        &self,
        key: &EntryKey,
        value: &T,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let data = serde_json::to_string(value)?;
        let path = key.path();
        {
            let _guard = self.lock(&path).await;
            let previous = self.entries.get(&path).await;
            let old_len = previous.as_ref().map_or(0, |entry| entry.data.len());
            self.reserve(&path, old_len, data.len())?;
            let version = previous.map_or(1, |entry| entry.version + 1);
            self.write(key, version, data, expires_at).await;
        }
        self.index(key).await;
        Ok(())
    }

    async fn persist_if_absent<T: Serialize + Send + Sync>(
        &self,
        key: &EntryKey,
        value: &T,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<bool, StoreError> {
        let data = serde_json::to_string(value)?;
        let path = key.path();
        {
            let _guard = self.lock(&path).await;
            if self.entries.contains_key(&path) {
                return Ok(false);
            }
            self.reserve(&path, 0, data.len())?;
            self.write(key, 1, data, expires_at).await;
        }
        self.index(key).await;
        Ok(true)
    }

    async fn find<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &EntryKey,
    ) -> Result<Option<Versioned<T>>, StoreError> {
        self.entries
            .get(&key.path())
            .await
            .map(|entry| entry.decode())
            .transpose()
    }

    async fn find_by_id<T: DeserializeOwned + Send + Sync>(
        &self,
        kind: EntryKind,
        id: &str,
    ) -> Result<Vec<Versioned<T>>, StoreError> {
        if !kind.is_owner_scoped() {
            let found = self.find(&EntryKey::new(kind, id)).await?;
            return Ok(found.into_iter().collect());
        }

        let paths = self
            .ids
            .get(&format!("{kind}/{id}"))
            .await
            .unwrap_or_default();
        let mut found = Vec::with_capacity(paths.len());
        for path in paths {
            if let Some(entry) = self.entries.get(&path).await {
                found.push(entry.decode()?);
            }
        }
        Ok(found)
    }

    async fn find_many<T: DeserializeOwned + Send + Sync>(
        &self,
        filter: &Filter,
    ) -> Result<Vec<Versioned<T>>, StoreError> {
        self.entries
            .iter()
            .filter(|(_, entry)| filter.matches(&entry.key))
            .map(|(_, entry)| entry.decode())
            .collect()
    }

    async fn merge<T, F>(&self, key: &EntryKey, update: F) -> Result<Option<Versioned<T>>, StoreError>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: Fn(&mut T) + Send + Sync,
    {
        let path = key.path();
        let _guard = self.lock(&path).await;

        let Some(entry) = self.entries.get(&path).await else {
            return Ok(None);
        };
        let mut current: Versioned<T> = entry.decode()?;
        update(&mut current.value);

        let data = serde_json::to_string(&current.value)?;
        self.reserve(&path, entry.data.len(), data.len())?;
        current.version = entry.version + 1;
        self.write(key, current.version, data, entry.expires_at).await;
        Ok(Some(current))
    }

    async fn remove(&self, key: &EntryKey) -> Result<bool, StoreError> {
        let removed = {
            let _guard = self.lock(&key.path()).await;
            match self.entries.remove(&key.path()).await {
                Some(entry) => {
                    self.release(entry.data.len());
                    true
                }
                None => false,
            }
        };
        if removed {
            self.unindex(key).await;
        }
        Ok(removed)
    }

    async fn remove_expired(&self, kind: EntryKind, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let expired: Vec<EntryKey> = self
            .entries
            .iter()
            .filter(|(_, entry)| {
                entry.key.kind == kind && entry.expires_at.is_some_and(|expires_at| expires_at <= now)
            })
            .map(|(_, entry)| entry.key)
            .collect();

        let mut removed = 0;
        for key in expired {
            if self.remove(&key).await? {
                removed += 1;
            }
        }
        debug!("Removed {} expired {} entries from memory", removed, kind);
        Ok(removed)
    }

    async fn health_check(&self) -> Result<(), String> {
        Ok(())
    }
}
