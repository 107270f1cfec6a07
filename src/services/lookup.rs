//! Lookup orchestration.
//!
//! The single entry point the view layer calls with free-text input:
//!
//! 1. Trim; blank input fails with [`LookupError::EmptyInput`] before any
//!    cache or network access.
//! 2. Normalize to a location key (case-fold).
//! 3. Serve a fresh cache entry if there is one.
//! 4. Otherwise fetch with the trimmed, case-preserved input and write the
//!    stamped result to the cache. Not-found and other fetch failures end the
//!    lookup without touching cache or history.
//! 5. Record the success in the recent-history list and return the record.
//!
//! There is no per-key in-flight deduplication: two overlapping lookups for
//! the same missing or stale key both fetch, and whichever finishes last
//! wins in both the cache and the history list.

use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::db::store::KvStore;
use crate::helpers::normalize_location_key;
use crate::services::cache::{CacheManager, WeatherRecord, FRESHNESS_WINDOW};
use crate::services::history::{
    RecentConditionSummary, RecentHistory, RecentHistoryEntry, RecentLocation,
};
use crate::services::openweather::{FetchError, WeatherFetcher};
use crate::services::pruner::{spawn_pruner, PrunerHandle, SharedPrunerState};

/// Locations seeded into the recent-history list on first-ever startup.
pub const DEFAULT_LOCATIONS: [&str; 5] = ["London", "New York", "Tokyo", "Paris", "Sydney"];

/// Construction-time settings for [`LookupService`].
#[derive(Debug, Clone)]
pub struct LookupConfig {
    /// Age at which a cached record stops being served.
    pub freshness_window: Duration,
    /// Period of the background pruning sweep.
    pub prune_interval: Duration,
    /// Bootstrap list for an empty store, most recent first.
    pub default_locations: Vec<String>,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            freshness_window: FRESHNESS_WINDOW,
            prune_interval: FRESHNESS_WINDOW,
            default_locations: DEFAULT_LOCATIONS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// User-facing lookup failures. Every variant is terminal; nothing retries.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LookupError {
    #[error("Please enter a city name")]
    EmptyInput,

    #[error("City not found")]
    NotFound,

    #[error("Failed to fetch weather data")]
    FetchFailed { reason: String },
}

/// Where a successful lookup's record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupSource {
    Cache,
    Provider,
}

/// Coordinates the cache, the fetch collaborator and the recent-history list.
pub struct LookupService<S, F> {
    cache: CacheManager<S>,
    history: RecentHistory<S>,
    fetcher: F,
    config: LookupConfig,
}

impl<S: KvStore, F: WeatherFetcher> LookupService<S, F> {
    pub fn new(store: Arc<S>, fetcher: F, clock: Arc<dyn Clock>, config: LookupConfig) -> Self {
        Self {
            cache: CacheManager::new(store.clone(), clock, config.freshness_window),
            history: RecentHistory::new(store),
            fetcher,
            config,
        }
    }

    pub fn config(&self) -> &LookupConfig {
        &self.config
    }

    /// Look up current conditions for free-text `raw_input`.
    pub async fn lookup(&self, raw_input: &str) -> Result<WeatherRecord, LookupError> {
        self.resolve(raw_input).await.map(|(record, _)| record)
    }

    /// Same as [`lookup`](Self::lookup), also reporting whether the record was
    /// served from the cache.
    pub async fn resolve(
        &self,
        raw_input: &str,
    ) -> Result<(WeatherRecord, LookupSource), LookupError> {
        let input = raw_input.trim();
        if input.is_empty() {
            return Err(LookupError::EmptyInput);
        }

        let location_key = normalize_location_key(input);

        let (record, source) = match self.cache.get(&location_key).await {
            Some(record) => {
                tracing::debug!("Lookup: cache hit for '{}'", location_key);
                (record, LookupSource::Cache)
            }
            None => {
                tracing::debug!("Lookup: cache miss for '{}', fetching", location_key);
                let fetched = self.fetcher.fetch(input).await.map_err(|e| match e {
                    FetchError::NotFound => {
                        tracing::info!("Lookup: '{}' not found by provider", input);
                        LookupError::NotFound
                    }
                    FetchError::Failed(reason) => LookupError::FetchFailed { reason },
                })?;
                (
                    self.cache.put(&location_key, fetched).await,
                    LookupSource::Provider,
                )
            }
        };

        let summary = RecentConditionSummary {
            display_name: record.display_name.clone(),
            temperature_celsius: record.temperature_celsius,
            condition_description: record.condition_description.clone(),
        };
        self.history
            .record_success(&location_key, &record.display_name, summary)
            .await;

        Ok((record, source))
    }

    /// Recency list, most recent first.
    pub async fn list_recent(&self) -> Vec<RecentHistoryEntry> {
        self.history.list_recent().await
    }

    /// Recency list with each location's last-known conditions.
    pub async fn list_recent_with_summaries(&self) -> Vec<RecentLocation> {
        self.history.list_recent_with_summaries().await
    }

    /// First-ever startup: seed the recent-history list with the default
    /// locations and look each one up so their summaries are populated.
    ///
    /// Does nothing if a list has already been persisted, even an empty one.
    /// Returns the number of default locations successfully looked up.
    pub async fn bootstrap_recent_history(&self) -> usize {
        match self.history.is_initialized().await {
            Ok(true) => {
                tracing::debug!("Bootstrap: recent history already present, skipping");
                return 0;
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!("Bootstrap: could not read recent history, skipping: {}", e);
                return 0;
            }
        }

        let seeded = self.history.seed(&self.config.default_locations).await;
        tracing::info!("Bootstrap: seeded {} default locations", seeded.len());

        // Oldest first, so each lookup's move-to-front leaves the default order intact.
        let mut succeeded = 0;
        for entry in seeded.iter().rev() {
            match self.lookup(&entry.display_name).await {
                Ok(_) => succeeded += 1,
                Err(e) => {
                    tracing::warn!(
                        "Bootstrap: lookup for '{}' failed: {:?}",
                        entry.display_name,
                        e
                    );
                }
            }
        }

        succeeded
    }

    /// Start the background pruning task for this service's cache.
    pub fn start_pruner(&self, state: SharedPrunerState) -> PrunerHandle {
        spawn_pruner(self.cache.clone(), self.config.prune_interval, state)
    }
}
