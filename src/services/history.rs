//! Recent-history list and its summary side-table.
//!
//! Layout in the key-value store:
//! - `recent_history:list`: JSON array of `{locationKey, displayName}`,
//!   most recent first, at most [`MAX_RECENT`] long, unique by key.
//! - `recent_history:summaries`: JSON object `locationKey → summary`.
//!
//! Summaries carry no timestamp and are never expired or removed, not even
//! when their location falls off the list. A recent-history row can
//! therefore still show conditions after the cache entry behind them has
//! gone stale.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::db::store::{KvStore, StoreError};
use crate::helpers::normalize_location_key;

/// Maximum number of locations kept in the recency list.
pub const MAX_RECENT: usize = 5;

const LIST_KEY: &str = "recent_history:list";
const SUMMARIES_KEY: &str = "recent_history:summaries";

/// One location in the recency list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentHistoryEntry {
    pub location_key: String,
    pub display_name: String,
}

/// Last-known conditions for a location, shown without re-fetching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentConditionSummary {
    pub display_name: String,
    pub temperature_celsius: f64,
    pub condition_description: String,
}

/// A recency-list row joined with its summary, if one was ever recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct RecentLocation {
    pub location_key: String,
    pub display_name: String,
    pub last_summary: Option<RecentConditionSummary>,
}

type Summaries = BTreeMap<String, RecentConditionSummary>;

/// Owns the `recent_history:` namespace.
pub struct RecentHistory<S> {
    store: Arc<S>,
    /// Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl<S: KvStore> RecentHistory<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    /// Decode the JSON stored under `key`. Missing, unreadable or corrupt
    /// values all fall back to the type's default.
    async fn load<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        let raw = match self.store.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return T::default(),
            Err(e) => {
                tracing::warn!("History: store read failed for '{}': {}", key, e);
                return T::default();
            }
        };

        serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!("History: corrupt value under '{}' treated as empty: {}", key, e);
            T::default()
        })
    }

    async fn save<T: Serialize>(&self, key: &str, value: &T) {
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!("History: failed to encode '{}': {}", key, e);
                return;
            }
        };
        if let Err(e) = self.store.set(key, &json).await {
            tracing::warn!("History: store write failed for '{}': {}", key, e);
        }
    }

    /// Record a successful lookup: move the location to the front of the
    /// list (dropping any entry with the same key), cap the list at
    /// [`MAX_RECENT`], and overwrite its summary.
    pub async fn record_success(
        &self,
        location_key: &str,
        display_name: &str,
        summary: RecentConditionSummary,
    ) {
        let _guard = self.write_lock.lock().await;
        let location_key = normalize_location_key(location_key);

        let mut list: Vec<RecentHistoryEntry> = self.load(LIST_KEY).await;
        list.retain(|e| normalize_location_key(&e.location_key) != location_key);
        list.insert(
            0,
            RecentHistoryEntry {
                location_key: location_key.clone(),
                display_name: display_name.to_string(),
            },
        );
        list.truncate(MAX_RECENT);

        let mut summaries: Summaries = self.load(SUMMARIES_KEY).await;
        summaries.insert(location_key.clone(), summary);

        self.save(LIST_KEY, &list).await;
        self.save(SUMMARIES_KEY, &summaries).await;

        tracing::debug!(
            "History: '{}' moved to front ({} entries)",
            location_key,
            list.len()
        );
    }

    /// Snapshot of the recency list, most recent first.
    pub async fn list_recent(&self) -> Vec<RecentHistoryEntry> {
        self.load(LIST_KEY).await
    }

    /// Recency list joined with the summary side-table.
    pub async fn list_recent_with_summaries(&self) -> Vec<RecentLocation> {
        let list = self.list_recent().await;
        let mut summaries: Summaries = self.load(SUMMARIES_KEY).await;

        list.into_iter()
            .map(|entry| RecentLocation {
                last_summary: summaries.remove(&entry.location_key),
                location_key: entry.location_key,
                display_name: entry.display_name,
            })
            .collect()
    }

    /// Whether a list has ever been persisted (an empty list counts).
    pub async fn is_initialized(&self) -> Result<bool, StoreError> {
        Ok(self.store.get(LIST_KEY).await?.is_some())
    }

    /// Persist `names` as the initial list, in the given order, deduplicated
    /// by key and capped at [`MAX_RECENT`].
    pub async fn seed(&self, names: &[String]) -> Vec<RecentHistoryEntry> {
        let _guard = self.write_lock.lock().await;

        let mut list: Vec<RecentHistoryEntry> = Vec::with_capacity(MAX_RECENT);
        for name in names {
            let location_key = normalize_location_key(name);
            if location_key.is_empty() || list.iter().any(|e| e.location_key == location_key) {
                continue;
            }
            list.push(RecentHistoryEntry {
                location_key,
                display_name: name.trim().to_string(),
            });
        }
        list.truncate(MAX_RECENT);

        self.save(LIST_KEY, &list).await;
        list
    }
}
