//! Read-through cache of remote data, kept in the `cache` collection
//!
//! Entries are versioned: every overwrite of a key bumps its version. Reads
//! through [`OfflineCache::get_cached_data`] honour the configured TTL,
//! while [`OfflineCache::get_cached_entry`] returns the entry as stored.
//!
//! Any non-empty string is a valid key. Keys that would not pass as a record
//! id (long query URLs, padded or multi-line keys) are stored under the hex
//! SHA-256 of the key; the entry itself keeps the original key.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use ledgersync_core::config::CacheConfig;
use ledgersync_core::domain::{CacheEntry, Collection, Record, RecordId, RecordPayload};
use ledgersync_core::ports::ILocalStore;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

pub struct OfflineCache {
    store: Arc<dyn ILocalStore>,
    ttl: Option<Duration>,
}

impl OfflineCache {
    /// `ttl` of `None` keeps entries forever
    pub fn new(store: Arc<dyn ILocalStore>, ttl: Option<Duration>) -> Self {
        Self { store, ttl }
    }

    pub fn from_config(store: Arc<dyn ILocalStore>, config: &CacheConfig) -> Self {
        Self::new(store, config.ttl())
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Stores `value` under `key`, replacing any previous entry
    pub async fn cache_data(&self, key: &str, value: Value) -> Result<CacheEntry> {
        let id = cache_record_id(key)?;

        let entry = match self.get_cached_entry(key).await? {
            Some(previous) => previous.superseded_by(value),
            None => CacheEntry::new(key, value),
        };

        let record = Record {
            id,
            payload: RecordPayload::Cached(entry.clone()),
        };
        self.store
            .put(Collection::Cache, &[record])
            .await
            .with_context(|| format!("Failed to cache '{key}'"))?;

        debug!(key, version = entry.version, "Cached remote data");
        Ok(entry)
    }

    /// The cached value, or `None` if absent or older than the TTL
    pub async fn get_cached_data(&self, key: &str) -> Result<Option<Value>> {
        let Some(entry) = self.get_cached_entry(key).await? else {
            return Ok(None);
        };

        if let Some(ttl) = self.ttl {
            let age = entry.age(Utc::now()).to_std().unwrap_or_default();
            if age > ttl {
                debug!(key, age_secs = age.as_secs(), "Cache entry is stale");
                return Ok(None);
            }
        }
        Ok(Some(entry.value))
    }

    /// The stored entry regardless of age
    pub async fn get_cached_entry(&self, key: &str) -> Result<Option<CacheEntry>> {
        // Keys that can never be stored are simply absent.
        let Ok(id) = cache_record_id(key) else {
            return Ok(None);
        };

        let record = self
            .store
            .get(Collection::Cache, &id)
            .await
            .with_context(|| format!("Failed to read cache entry '{key}'"))?;

        match record.map(|r| r.payload) {
            Some(RecordPayload::Cached(entry)) if entry.key == key => Ok(Some(entry)),
            Some(RecordPayload::Cached(entry)) => {
                debug!(key, stored_key = %entry.key, "Cache id shared with another key");
                Ok(None)
            }
            Some(other) => {
                warn!(key, collection = %other.collection(), "Unexpected payload in cache");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Removes every cached entry
    pub async fn clear_cache(&self) -> Result<()> {
        self.store
            .clear(Collection::Cache)
            .await
            .context("Failed to clear cache")?;
        info!("Cache cleared");
        Ok(())
    }
}

/// Record id under which `key` is stored
fn cache_record_id(key: &str) -> Result<RecordId> {
    if key.is_empty() {
        bail!("Cache key cannot be empty");
    }
    if let Ok(id) = RecordId::new(key) {
        return Ok(id);
    }
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    Ok(RecordId::new(format!("sha256:{:x}", hasher.finalize()))?)
}
