//! Versioned TTL cache for client-side reads
//!
//! Entries are stored as `{data, cacheVersion, expiresAt}` JSON. An entry is
//! served only when its version matches the running code and it has not
//! expired; anything else is deleted on sight. Bumping the version is the
//! only way to invalidate every client at once.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::storage::{CacheStorage, Clock};
use crate::config::CacheConfig;
use crate::error::SheetResult;

/// Prefix of every storage key owned by the cache
pub const CACHE_PREFIX: &str = "course_sheets:";
const SLOT_INDEX_KEY: &str = "course_sheets:__slots__";

/// Persisted entry shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<T> {
    pub data: T,
    pub cache_version: String,
    /// Epoch milliseconds
    pub expires_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Slot {
    key: String,
    stored_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMiss {
    Absent,
    Expired,
    VersionMismatch,
    Corrupt,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup<T> {
    Hit(T),
    Miss(CacheMiss),
}

impl<T> CacheLookup<T> {
    pub fn hit(self) -> Option<T> {
        match self {
            CacheLookup::Hit(data) => Some(data),
            CacheLookup::Miss(_) => None,
        }
    }

    pub fn is_hit(&self) -> bool {
        matches!(self, CacheLookup::Hit(_))
    }
}

/// Cached entities
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Course(String),
    Enrollments(String),
    CourseList,
    Custom(String),
}

impl CacheKey {
    pub fn storage_key(&self) -> String {
        match self {
            CacheKey::Course(id) => format!("{}course:{}", CACHE_PREFIX, id),
            CacheKey::Enrollments(user_id) => format!("{}enrollments:{}", CACHE_PREFIX, user_id),
            CacheKey::CourseList => format!("{}courses", CACHE_PREFIX),
            CacheKey::Custom(name) => format!("{}{}", CACHE_PREFIX, name),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub version: String,
    pub max_slots: usize,
    pub default_ttl: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self::from(&CacheConfig::default())
    }
}

impl From<&CacheConfig> for CacheSettings {
    fn from(config: &CacheConfig) -> Self {
        Self {
            version: config.version.clone(),
            max_slots: config.max_slots.max(1),
            default_ttl: Duration::from_secs(config.default_ttl_secs),
        }
    }
}

pub struct BrowserCache {
    storage: Arc<dyn CacheStorage>,
    clock: Arc<dyn Clock>,
    settings: CacheSettings,
}

impl BrowserCache {
    pub fn new(
        storage: Arc<dyn CacheStorage>,
        clock: Arc<dyn Clock>,
        settings: CacheSettings,
    ) -> Self {
        Self {
            storage,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> CacheLookup<T> {
        let storage_key = key.storage_key();
        let Some(raw) = self.storage.get_item(&storage_key) else {
            return CacheLookup::Miss(CacheMiss::Absent);
        };

        let entry: CacheEntry<serde_json::Value> = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(_) => return self.discard(&storage_key, CacheMiss::Corrupt),
        };

        if entry.cache_version != self.settings.version {
            return self.discard(&storage_key, CacheMiss::VersionMismatch);
        }
        if self.clock.now_ms() >= entry.expires_at {
            return self.discard(&storage_key, CacheMiss::Expired);
        }

        match serde_json::from_value(entry.data) {
            Ok(data) => CacheLookup::Hit(data),
            Err(_) => self.discard(&storage_key, CacheMiss::Corrupt),
        }
    }

    /// Store `data` for `ttl`, then evict the oldest slots past the limit.
    ///
    /// Returns the storage keys that were evicted.
    pub fn put<T: Serialize>(
        &self,
        key: &CacheKey,
        data: &T,
        ttl: Duration,
    ) -> SheetResult<Vec<String>> {
        let now = self.clock.now_ms();
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let entry = CacheEntry {
            data,
            cache_version: self.settings.version.clone(),
            expires_at: now.saturating_add(ttl_ms),
        };
        let storage_key = key.storage_key();
        self.storage
            .set_item(&storage_key, serde_json::to_string(&entry)?);

        let mut slots = self.load_slots();
        slots.retain(|s| s.key != storage_key);
        slots.push(Slot {
            key: storage_key,
            stored_at: now,
        });
        let evicted = self.evict(&mut slots);
        self.save_slots(&slots);
        Ok(evicted)
    }

    pub fn put_default<T: Serialize>(&self, key: &CacheKey, data: &T) -> SheetResult<Vec<String>> {
        self.put(key, data, self.settings.default_ttl)
    }

    /// Unconditional delete; call after any mutation that may stale `key`
    pub fn invalidate(&self, key: &CacheKey) {
        let storage_key = key.storage_key();
        self.remove(&storage_key);
    }

    /// Remove every entry owned by the cache
    pub fn clear(&self) {
        for key in self.storage.keys() {
            if key.starts_with(CACHE_PREFIX) {
                self.storage.remove_item(&key);
            }
        }
    }

    pub fn slot_count(&self) -> usize {
        self.load_slots().len()
    }

    /// Serve from cache, or load through `fetch` and cache the result
    pub async fn get_or_fetch<T, F, Fut>(
        &self,
        key: &CacheKey,
        ttl: Duration,
        fetch: F,
    ) -> SheetResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = SheetResult<T>>,
    {
        if let CacheLookup::Hit(data) = self.get(key) {
            return Ok(data);
        }
        let data = fetch().await?;
        self.put(key, &data, ttl)?;
        Ok(data)
    }

    fn discard<T>(&self, storage_key: &str, reason: CacheMiss) -> CacheLookup<T> {
        debug!(key = storage_key, ?reason, "discarding cache entry");
        self.remove(storage_key);
        CacheLookup::Miss(reason)
    }

    fn remove(&self, storage_key: &str) {
        self.storage.remove_item(storage_key);
        let mut slots = self.load_slots();
        let before = slots.len();
        slots.retain(|s| s.key != storage_key);
        if slots.len() != before {
            self.save_slots(&slots);
        }
    }

    fn evict(&self, slots: &mut Vec<Slot>) -> Vec<String> {
        let mut evicted = Vec::new();
        while slots.len() > self.settings.max_slots {
            // min_by_key keeps the first minimum, so insertion order breaks ties
            let Some((position, _)) = slots
                .iter()
                .enumerate()
                .min_by_key(|(_, s)| s.stored_at)
            else {
                break;
            };
            let slot = slots.remove(position);
            self.storage.remove_item(&slot.key);
            evicted.push(slot.key);
        }
        if !evicted.is_empty() {
            debug!(?evicted, "evicted cache slots");
        }
        evicted
    }

    fn load_slots(&self) -> Vec<Slot> {
        self.storage
            .get_item(SLOT_INDEX_KEY)
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default()
    }

    fn save_slots(&self, slots: &[Slot]) {
        match serde_json::to_string(slots) {
            Ok(raw) => self.storage.set_item(SLOT_INDEX_KEY, raw),
            Err(_) => self.storage.remove_item(SLOT_INDEX_KEY),
        }
    }
}
