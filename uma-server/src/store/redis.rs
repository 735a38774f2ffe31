use super::{EntryKey, EntryKind, EntryStore, Filter, StoreError, Versioned};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use redis::{aio::ConnectionManager, AsyncCommands, Client, Script};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeSet;

const KEY_PREFIX: &str = "uma";

/// How many times a merge re-reads the entry after losing a version race
const MAX_MERGE_ATTEMPTS: usize = 8;

/// Overwrites the data and bumps the version of an entry
const PERSIST_SCRIPT: &str = r#"
local version = redis.call('HINCRBY', KEYS[1], 'version', 1)
redis.call('HSET', KEYS[1], 'data', ARGV[1])
return version
"#;

/// Creates an entry unless one already exists
const CREATE_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return 0
end
redis.call('HSET', KEYS[1], 'version', 1, 'data', ARGV[1])
return 1
"#;

/// Writes an entry only if its version is still the one the caller read
const COMPARE_AND_SET_SCRIPT: &str = r#"
if redis.call('HGET', KEYS[1], 'version') ~= ARGV[1] then
    return 0
end
redis.call('HSET', KEYS[1], 'version', ARGV[2], 'data', ARGV[3])
return 1
"#;

fn record_key(key: &EntryKey) -> String {
    format!("{KEY_PREFIX}:{}", key.path())
}

fn record_key_for_path(path: &str) -> String {
    format!("{KEY_PREFIX}:{path}")
}

fn index_key(kind: EntryKind) -> String {
    format!("{KEY_PREFIX}:_index:{kind}")
}

fn ids_key(id_path: &str) -> String {
    format!("{KEY_PREFIX}:_ids:{id_path}")
}

fn owner_key(branch: &str) -> String {
    format!("{KEY_PREFIX}:_owner:{branch}")
}

fn branches_key(kind: EntryKind) -> String {
    format!("{KEY_PREFIX}:_branches:{kind}")
}

fn expiry_key(kind: EntryKind) -> String {
    format!("{KEY_PREFIX}:_expiry:{kind}")
}

fn decode<T: DeserializeOwned>(
    key: EntryKey,
    version: u64,
    data: &str,
) -> Result<Versioned<T>, StoreError> {
    let value = serde_json::from_str(data)
        .map_err(|e| StoreError::Deserialization(key.path(), e.to_string()))?;
    Ok(Versioned {
        key,
        version,
        value,
    })
}

#[derive(Clone)]
pub struct RedisStore {
    _client: Client,
    conn_manager: ConnectionManager,
    chunk_size: usize,
    persist_script: Script,
    create_script: Script,
    compare_and_set_script: Script,
}

impl RedisStore {
    /// Initialize a new Redis store instance
    pub async fn new(redis_url: &str, chunk_size: usize) -> Result<Self, String> {
        let client = match Client::open(redis_url) {
            Ok(client) => client,
            Err(err) => {
                return Err(format!("Failed to connect to Redis: {}", err));
            }
        };

        let conn_manager = match ConnectionManager::new(client.clone()).await {
            Ok(manager) => manager,
            Err(err) => {
                return Err(format!(
                    "Failed to create Redis connection manager: {}",
                    err
                ));
            }
        };

        // Test the connection to ensure it's working
        let mut conn = conn_manager.clone();
        if let Err(err) = redis::cmd("PING").query_async::<String>(&mut conn).await {
            return Err(format!("Failed to ping Redis: {}", err));
        }

        Ok(Self {
            _client: client,
            conn_manager,
            chunk_size: chunk_size.max(1),
            persist_script: Script::new(PERSIST_SCRIPT),
            create_script: Script::new(CREATE_SCRIPT),
            compare_and_set_script: Script::new(COMPARE_AND_SET_SCRIPT),
        })
    }

    /// Registers a freshly written entry in the kind, id, owner and expiry indexes
    async fn index(
        &self,
        key: &EntryKey,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn_manager.clone();
        let path = key.path();

        let mut pipe = redis::pipe();
        pipe.atomic().sadd(index_key(key.kind), &path).ignore();
        if let Some(expires_at) = expires_at {
            pipe.zadd(expiry_key(key.kind), &path, expires_at.timestamp_millis())
                .ignore();
        } else {
            pipe.zrem(expiry_key(key.kind), &path).ignore();
        }

        if let (Some(owner), Some(branch)) = (key.owner.as_deref(), key.branch()) {
            let created: i64 = conn.sadd(branches_key(key.kind), owner).await?;
            if created == 1 {
                info!("Created storage branch {}", branch);
            }
            pipe.sadd(ids_key(&key.id_path()), &path)
                .ignore()
                .sadd(owner_key(&branch), &path)
                .ignore();
        }

        pipe.query_async::<()>(&mut conn).await?;
        Ok(())
    }

    /// Loads entries by storage path, a bounded chunk per round trip.
    /// Paths whose entry vanished in the meantime are skipped.
    async fn load<T: DeserializeOwned>(
        &self,
        paths: Vec<String>,
    ) -> Result<Vec<Versioned<T>>, StoreError> {
        let mut conn = self.conn_manager.clone();
        let mut found = Vec::with_capacity(paths.len());

        for chunk in paths.chunks(self.chunk_size) {
            let mut pipe = redis::pipe();
            for path in chunk {
                pipe.cmd("HMGET")
                    .arg(record_key_for_path(path))
                    .arg("version")
                    .arg("data");
            }
            let rows: Vec<(Option<u64>, Option<String>)> = pipe.query_async(&mut conn).await?;

            for (path, row) in chunk.iter().zip(rows) {
                let Some(key) = EntryKey::parse(path) else {
                    warn!("Skipping unparsable storage path {}", path);
                    continue;
                };
                if let (Some(version), Some(data)) = row {
                    found.push(decode(key, version, &data)?);
                }
            }
        }
        Ok(found)
    }

    /// Walks a set with SSCAN so no single reply exceeds the chunk size
    async fn scan_set(&self, set_key: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn_manager.clone();
        let mut members = BTreeSet::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SSCAN")
                .arg(set_key)
                .arg(cursor)
                .arg("COUNT")
                .arg(self.chunk_size)
                .query_async(&mut conn)
                .await?;
            members.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(members.into_iter().collect())
    }
}

#[async_trait]
impl EntryStore for RedisStore {
    async fn persist<T: Serialize + Send + Sync>(
        &self,
        key: &EntryKey,
        value: &T,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let data = serde_json::to_string(value)?;
        let mut conn = self.conn_manager.clone();

        let result: Result<u64, _> = self
            .persist_script
            .key(record_key(key))
            .arg(&data)
            .invoke_async(&mut conn)
            .await;
        if let Err(err) = result {
            error!("Redis error while persisting {}: {}", key, err);
            return Err(err.into());
        }

        self.index(key, expires_at).await
    }

    async fn persist_if_absent<T: Serialize + Send + Sync>(
        &self,
        key: &EntryKey,
        value: &T,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<bool, StoreError> {
        let data = serde_json::to_string(value)?;
        let mut conn = self.conn_manager.clone();

        let created: i64 = match self
            .create_script
            .key(record_key(key))
            .arg(&data)
            .invoke_async(&mut conn)
            .await
        {
            Ok(created) => created,
            Err(err) => {
                error!("Redis error while creating {}: {}", key, err);
                return Err(err.into());
            }
        };
        if created == 0 {
            return Ok(false);
        }

        self.index(key, expires_at).await?;
        Ok(true)
    }

    async fn find<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &EntryKey,
    ) -> Result<Option<Versioned<T>>, StoreError> {
        let mut conn = self.conn_manager.clone();

        let row: (Option<u64>, Option<String>) = match redis::cmd("HMGET")
            .arg(record_key(key))
            .arg("version")
            .arg("data")
            .query_async(&mut conn)
            .await
        {
            Ok(row) => row,
            Err(err) => {
                error!("Redis error while reading {}: {}", key, err);
                return Err(err.into());
            }
        };

        match row {
            (Some(version), Some(data)) => decode(key.clone(), version, &data).map(Some),
            _ => Ok(None),
        }
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

        let mut conn = self.conn_manager.clone();
        let paths: Vec<String> = conn.smembers(ids_key(&format!("{kind}/{id}"))).await?;
        self.load(paths).await
    }

    async fn find_many<T: DeserializeOwned + Send + Sync>(
        &self,
        filter: &Filter,
    ) -> Result<Vec<Versioned<T>>, StoreError> {
        let paths = match &filter.owner {
            Some(owner) => self.scan_set(&owner_key(&format!("{}/{owner}", filter.kind))).await?,
            None => self.scan_set(&index_key(filter.kind)).await?,
        };
        let found = self.load(paths).await?;
        Ok(found
            .into_iter()
            .filter(|entry| filter.matches(&entry.key))
            .collect())
    }

    async fn merge<T, F>(&self, key: &EntryKey, update: F) -> Result<Option<Versioned<T>>, StoreError>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: Fn(&mut T) + Send + Sync,
    {
        let mut conn = self.conn_manager.clone();

        for attempt in 1..=MAX_MERGE_ATTEMPTS {
            let Some(mut current) = self.find::<T>(key).await? else {
                return Ok(None);
            };
            update(&mut current.value);
            let data = serde_json::to_string(&current.value)?;

            let swapped: i64 = self
                .compare_and_set_script
                .key(record_key(key))
                .arg(current.version)
                .arg(current.version + 1)
                .arg(&data)
                .invoke_async(&mut conn)
                .await?;
            if swapped == 1 {
                current.version += 1;
                return Ok(Some(current));
            }
            debug!(
                "Version conflict while merging {} (attempt {}), retrying",
                key, attempt
            );
        }

        error!(
            "Giving up merging {} after {} version conflicts",
            key, MAX_MERGE_ATTEMPTS
        );
        Err(StoreError::Conflict(key.path()))
    }

    async fn remove(&self, key: &EntryKey) -> Result<bool, StoreError> {
        let mut conn = self.conn_manager.clone();
        let path = key.path();

        let mut pipe = redis::pipe();
        pipe.atomic()
            .del(record_key(key))
            .srem(index_key(key.kind), &path)
            .ignore()
            .zrem(expiry_key(key.kind), &path)
            .ignore();
        if let Some(branch) = key.branch() {
            pipe.srem(ids_key(&key.id_path()), &path)
                .ignore()
                .srem(owner_key(&branch), &path)
                .ignore();
        }

        match pipe.query_async::<(i64,)>(&mut conn).await {
            Ok((deleted,)) => Ok(deleted > 0),
            Err(err) => {
                error!("Redis error while deleting {}: {}", key, err);
                Err(err.into())
            }
        }
    }

    async fn remove_expired(&self, kind: EntryKind, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut conn = self.conn_manager.clone();
        let mut removed = 0;

        loop {
            let paths: Vec<String> = redis::cmd("ZRANGEBYSCORE")
                .arg(expiry_key(kind))
                .arg("-inf")
                .arg(now.timestamp_millis())
                .arg("LIMIT")
                .arg(0)
                .arg(self.chunk_size)
                .query_async(&mut conn)
                .await?;
            if paths.is_empty() {
                break;
            }

            let mut pipe = redis::pipe();
            pipe.atomic();
            for path in &paths {
                pipe.zrem(expiry_key(kind), path).ignore();
                let Some(key) = EntryKey::parse(path) else {
                    warn!("Dropping unparsable storage path {} from expiry index", path);
                    continue;
                };
                pipe.del(record_key(&key))
                    .srem(index_key(kind), path)
                    .ignore();
                if let Some(branch) = key.branch() {
                    pipe.srem(ids_key(&key.id_path()), path)
                        .ignore()
                        .srem(owner_key(&branch), path)
                        .ignore();
                }
            }
            let deleted: Vec<i64> = pipe.query_async(&mut conn).await?;
            removed += deleted.iter().filter(|count| **count > 0).count();

            if paths.len() < self.chunk_size {
                break;
            }
        }

        debug!("Removed {} expired {} entries from Redis", removed, kind);
        Ok(removed)
    }

    async fn health_check(&self) -> Result<(), String> {
        let mut conn = self.conn_manager.clone();
        match redis::cmd("PING").query_async::<String>(&mut conn).await {
            Ok(_) => Ok(()),
            Err(err) => Err(format!("Redis health check failed: {}", err)),
        }
    }
}
