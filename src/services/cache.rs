//! Weather record cache.
//!
//! Records live in the key-value store under `weather_cache:<locationKey>`
//! as camelCase JSON. A record is served while its age is below the
//! freshness window; once it reaches the window it is treated as absent
//! and later physically removed by [`CacheManager::prune_expired`].

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::clock::Clock;
use crate::db::store::KvStore;
use crate::services::openweather::FetchedWeather;

/// Key namespace owned by the cache.
pub const CACHE_KEY_PREFIX: &str = "weather_cache:";

/// Default age at which a cached record stops being served (10 minutes).
pub const FRESHNESS_WINDOW: Duration = Duration::from_secs(600);

/// Last fetched conditions for one location.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherRecord {
    pub location_key: String,
    pub display_name: String,
    pub country_code: String,
    pub temperature_celsius: f64,
    pub condition_description: String,
    pub fetched_at_epoch_millis: i64,
}

/// Persisted form. The location key is carried by the store key itself.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredWeather {
    display_name: String,
    country_code: String,
    temperature_celsius: f64,
    condition_description: String,
    fetched_at_epoch_millis: i64,
}

impl StoredWeather {
    fn into_record(self, location_key: &str) -> WeatherRecord {
        WeatherRecord {
            location_key: location_key.to_string(),
            display_name: self.display_name,
            country_code: self.country_code,
            temperature_celsius: self.temperature_celsius,
            condition_description: self.condition_description,
            fetched_at_epoch_millis: self.fetched_at_epoch_millis,
        }
    }
}

impl From<&WeatherRecord> for StoredWeather {
    fn from(r: &WeatherRecord) -> Self {
        Self {
            display_name: r.display_name.clone(),
            country_code: r.country_code.clone(),
            temperature_celsius: r.temperature_celsius,
            condition_description: r.condition_description.clone(),
            fetched_at_epoch_millis: r.fetched_at_epoch_millis,
        }
    }
}

/// Outcome of one pruning sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub scanned: usize,
    pub removed_expired: usize,
    pub removed_corrupt: usize,
}

impl PruneReport {
    pub fn removed(&self) -> usize {
        self.removed_expired + self.removed_corrupt
    }
}

fn cache_key(location_key: &str) -> String {
    format!("{}{}", CACHE_KEY_PREFIX, location_key)
}

/// Owns the `weather_cache:` namespace and its freshness policy.
///
/// Clones share one write lock, so `put` and `prune_expired` never
/// interleave their read-compare-write steps.
pub struct CacheManager<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    freshness_window_ms: i64,
    write_lock: Arc<Mutex<()>>,
}

impl<S> Clone for CacheManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            clock: self.clock.clone(),
            freshness_window_ms: self.freshness_window_ms,
            write_lock: self.write_lock.clone(),
        }
    }
}

impl<S: KvStore> CacheManager<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, freshness_window: Duration) -> Self {
        Self {
            store,
            clock,
            freshness_window_ms: i64::try_from(freshness_window.as_millis()).unwrap_or(i64::MAX),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// A record is stale once its age reaches the window (the boundary itself is stale).
    fn is_stale(&self, fetched_at_epoch_millis: i64, now: i64) -> bool {
        now.saturating_sub(fetched_at_epoch_millis) >= self.freshness_window_ms
    }

    /// Read and decode the stored record, whatever its age.
    ///
    /// Missing, unreadable and corrupt entries all come back as `None`.
    async fn load(&self, location_key: &str) -> Option<WeatherRecord> {
        let key = cache_key(location_key);
        let raw = match self.store.get(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Cache: store read failed for '{}': {}", key, e);
                return None;
            }
        };

        match serde_json::from_str::<StoredWeather>(&raw) {
            Ok(stored) => Some(stored.into_record(location_key)),
            Err(e) => {
                tracing::warn!("Cache: corrupt entry '{}' treated as a miss: {}", key, e);
                None
            }
        }
    }

    /// Fresh record for `location_key`, or `None` on miss, stale or corrupt.
    pub async fn get(&self, location_key: &str) -> Option<WeatherRecord> {
        let record = self.load(location_key).await?;
        let now = self.clock.now_millis();

        if self.is_stale(record.fetched_at_epoch_millis, now) {
            tracing::debug!(
                "Cache: stale entry for '{}' (age {}ms)",
                location_key,
                now - record.fetched_at_epoch_millis
            );
            return None;
        }

        Some(record)
    }

    /// Stamp `weather` with the current time and store it under `location_key`.
    ///
    /// A stored record is never replaced by an older one: if the existing
    /// entry carries a later timestamp it is kept and returned instead.
    /// Store write failures are logged; the stamped record is still returned.
    pub async fn put(&self, location_key: &str, weather: FetchedWeather) -> WeatherRecord {
        // Stamp under the lock so the later writer always carries the later time.
        let _guard = self.write_lock.lock().await;
        let record = WeatherRecord {
            location_key: location_key.to_string(),
            display_name: weather.display_name,
            country_code: weather.country_code,
            temperature_celsius: weather.temperature_celsius,
            condition_description: weather.condition_description,
            fetched_at_epoch_millis: self.clock.now_millis(),
        };

        if let Some(existing) = self.load(location_key).await {
            if existing.fetched_at_epoch_millis > record.fetched_at_epoch_millis {
                tracing::debug!(
                    "Cache: kept newer entry for '{}' ({} > {})",
                    location_key,
                    existing.fetched_at_epoch_millis,
                    record.fetched_at_epoch_millis
                );
                return existing;
            }
        }

        let key = cache_key(location_key);
        match serde_json::to_string(&StoredWeather::from(&record)) {
            Ok(json) => {
                if let Err(e) = self.store.set(&key, &json).await {
                    tracing::warn!("Cache: store write failed for '{}': {}", key, e);
                }
            }
            Err(e) => {
                tracing::warn!("Cache: failed to encode entry '{}': {}", key, e);
            }
        }

        record
    }

    /// Delete every stale record, plus any entry that no longer decodes.
    ///
    /// Idempotent: a second sweep with no intervening writes finds nothing.
    pub async fn prune_expired(&self) -> PruneReport {
        let mut report = PruneReport::default();
        let _guard = self.write_lock.lock().await;

        let entries = match self.store.entries_with_prefix(CACHE_KEY_PREFIX).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Cache: prune scan failed: {}", e);
                return report;
            }
        };

        let now = self.clock.now_millis();
        report.scanned = entries.len();

        for entry in entries {
            let corrupt = match serde_json::from_str::<StoredWeather>(&entry.value) {
                Ok(stored) if self.is_stale(stored.fetched_at_epoch_millis, now) => false,
                Ok(_) => continue,
                Err(_) => true,
            };

            match self.store.remove(&entry.key).await {
                Ok(()) if corrupt => report.removed_corrupt += 1,
                Ok(()) => report.removed_expired += 1,
                Err(e) => {
                    tracing::warn!("Cache: failed to prune '{}': {}", entry.key, e);
                }
            }
        }

        tracing::debug!(
            "Cache: pruned {} expired and {} corrupt of {} entries",
            report.removed_expired,
            report.removed_corrupt,
            report.scanned
        );

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

    use crate::clock::ManualClock;
    use crate::db::memory::MemoryKvStore;
    use crate::db::models::KvEntry;
    use crate::db::store::StoreError;

    const T0: i64 = 1_760_000_000_000;

    fn weather(name: &str, temp: f64) -> FetchedWeather {
        FetchedWeather {
            display_name: name.to_string(),
            country_code: "XX".to_string(),
            temperature_celsius: temp,
            condition_description: "clear sky".to_string(),
        }
    }

    fn setup() -> (Arc<MemoryKvStore>, Arc<ManualClock>, CacheManager<MemoryKvStore>) {
        let store = Arc::new(MemoryKvStore::new());
        let clock = Arc::new(ManualClock::new(T0));
        let cache = CacheManager::new(store.clone(), clock.clone(), FRESHNESS_WINDOW);
        (store, clock, cache)
    }

    fn window_ms() -> i64 {
        FRESHNESS_WINDOW.as_millis() as i64
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let (_, _, cache) = setup();
        assert_eq!(cache.get("tokyo").await, None);
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let (_, _, cache) = setup();
        let written = cache.put("tokyo", weather("Tokyo", 18.0)).await;
        assert_eq!(written.fetched_at_epoch_millis, T0);
        assert_eq!(cache.get("tokyo").await, Some(written));
    }

    #[tokio::test]
    async fn test_freshness_boundary() {
        let (_, clock, cache) = setup();
        cache.put("tokyo", weather("Tokyo", 18.0)).await;

        clock.set_millis(T0 + window_ms() - 1);
        assert!(cache.get("tokyo").await.is_some(), "one ms before the window is fresh");

        clock.set_millis(T0 + window_ms());
        assert!(cache.get("tokyo").await.is_none(), "exactly at the window is stale");

        clock.set_millis(T0 + window_ms() + 60_000);
        assert!(cache.get("tokyo").await.is_none());
    }

    #[tokio::test]
    async fn test_stale_get_has_no_side_effect() {
        let (store, clock, cache) = setup();
        cache.put("tokyo", weather("Tokyo", 18.0)).await;
        clock.advance_millis(window_ms());

        let before = store.snapshot().await;
        assert!(cache.get("tokyo").await.is_none());
        assert_eq!(store.snapshot().await, before);
    }

    #[tokio::test]
    async fn test_persisted_layout() {
        let (store, _, cache) = setup();
        cache.put("são paulo", weather("São Paulo", 24.5)).await;

        let raw = store.get("weather_cache:são paulo").await.unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "displayName": "São Paulo",
                "countryCode": "XX",
                "temperatureCelsius": 24.5,
                "conditionDescription": "clear sky",
                "fetchedAtEpochMillis": T0
            })
        );
    }

    #[tokio::test]
    async fn test_put_never_goes_back_in_time() {
        let (_, clock, cache) = setup();
        clock.set_millis(T0 + 5_000);
        cache.put("oslo", weather("Oslo", 1.0)).await;

        clock.set_millis(T0);
        let kept = cache.put("oslo", weather("Oslo", -3.0)).await;
        assert_eq!(kept.fetched_at_epoch_millis, T0 + 5_000);
        assert_eq!(kept.temperature_celsius, 1.0);

        clock.set_millis(T0 + 5_000);
        assert_eq!(cache.get("oslo").await.unwrap().temperature_celsius, 1.0);
    }

    #[tokio::test]
    async fn test_put_overwrites_with_newer() {
        let (_, clock, cache) = setup();
        cache.put("oslo", weather("Oslo", 1.0)).await;
        clock.advance_millis(1_000);
        cache.put("oslo", weather("Oslo", 2.0)).await;

        let got = cache.get("oslo").await.unwrap();
        assert_eq!(got.temperature_celsius, 2.0);
        assert_eq!(got.fetched_at_epoch_millis, T0 + 1_000);
    }

    /// Clock that moves forward one millisecond on every read.
    struct TickingClock(AtomicI64);

    impl Clock for TickingClock {
        fn now_millis(&self) -> i64 {
            self.0.fetch_add(1, Ordering::SeqCst)
        }
    }

    /// Store whose earlier reads take longer to come back than later ones.
    #[derive(Default)]
    struct SlowReadStore {
        inner: MemoryKvStore,
        reads: AtomicUsize,
    }

    impl KvStore for SlowReadStore {
        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            let n = self.reads.fetch_add(1, Ordering::SeqCst);
            let value = self.inner.get(key).await;
            for _ in 0..4usize.saturating_sub(n) {
                tokio::task::yield_now().await;
            }
            value
        }

        async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
            self.inner.set(key, value).await
        }

        async fn remove(&self, key: &str) -> Result<(), StoreError> {
            self.inner.remove(key).await
        }

        async fn entries_with_prefix(&self, prefix: &str) -> Result<Vec<KvEntry>, StoreError> {
            self.inner.entries_with_prefix(prefix).await
        }
    }

    #[tokio::test]
    async fn test_overlapping_puts_keep_the_newer_record() {
        let store = Arc::new(SlowReadStore::default());
        let clock = Arc::new(TickingClock(AtomicI64::new(1_000)));
        let cache = CacheManager::new(store.clone(), clock, FRESHNESS_WINDOW);

        let (a, b) = tokio::join!(
            cache.put("oslo", weather("Oslo", 1.0)),
            cache.put("oslo", weather("Oslo", 2.0))
        );
        let newest = a.fetched_at_epoch_millis.max(b.fetched_at_epoch_millis);

        let raw = store.inner.get("weather_cache:oslo").await.unwrap().unwrap();
        let stored: StoredWeather = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored.fetched_at_epoch_millis, newest);
        assert_eq!(stored.temperature_celsius, 2.0);
    }

    #[tokio::test]
    async fn test_overlapping_puts_across_clones() {
        let store = Arc::new(SlowReadStore::default());
        let clock = Arc::new(TickingClock(AtomicI64::new(1_000)));
        let cache = CacheManager::new(store.clone(), clock, FRESHNESS_WINDOW);
        let other = cache.clone();

        let first = tokio::spawn(async move { other.put("oslo", weather("Oslo", 1.0)).await });
        let second = cache.put("oslo", weather("Oslo", 2.0)).await;
        let first = first.await.unwrap();

        let newest = first
            .fetched_at_epoch_millis
            .max(second.fetched_at_epoch_millis);
        let raw = store.inner.get("weather_cache:oslo").await.unwrap().unwrap();
        let stored: StoredWeather = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored.fetched_at_epoch_millis, newest);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss_and_left_in_place() {
        let (store, _, cache) = setup();
        store.set("weather_cache:tokyo", "{not json").await.unwrap();

        assert_eq!(cache.get("tokyo").await, None);
        assert_eq!(
            store.get("weather_cache:tokyo").await.unwrap(),
            Some("{not json".to_string())
        );
    }

    #[tokio::test]
    async fn test_put_replaces_corrupt_entry() {
        let (_, _, cache) = setup();
        cache.store.set("weather_cache:tokyo", "garbage").await.unwrap();

        cache.put("tokyo", weather("Tokyo", 18.0)).await;
        assert!(cache.get("tokyo").await.is_some());
    }

    #[tokio::test]
    async fn test_prune_removes_only_stale_and_corrupt() {
        let (store, clock, cache) = setup();
        cache.put("old", weather("Old", 1.0)).await;
        clock.advance_millis(window_ms() / 2);
        cache.put("new", weather("New", 2.0)).await;
        store.set("weather_cache:broken", "[]").await.unwrap();
        store.set("recent_history:list", "[]").await.unwrap();

        clock.advance_millis(window_ms() / 2);
        let report = cache.prune_expired().await;

        assert_eq!(
            report,
            PruneReport {
                scanned: 3,
                removed_expired: 1,
                removed_corrupt: 1,
            }
        );
        let keys: Vec<String> = store.snapshot().await.into_keys().collect();
        assert_eq!(keys, vec!["recent_history:list", "weather_cache:new"]);
    }

    #[tokio::test]
    async fn test_prune_is_idempotent() {
        let (store, clock, cache) = setup();
        cache.put("a", weather("A", 1.0)).await;
        cache.put("b", weather("B", 2.0)).await;
        clock.advance_millis(window_ms() + 1);
        cache.put("c", weather("C", 3.0)).await;

        let first = cache.prune_expired().await;
        let after_first = store.snapshot().await;
        let second = cache.prune_expired().await;

        assert_eq!(first.removed(), 2);
        assert_eq!(second.removed(), 0);
        assert_eq!(store.snapshot().await, after_first);
    }

    #[tokio::test]
    async fn test_prune_never_removes_what_get_serves() {
        let (_, clock, cache) = setup();
        cache.put("tokyo", weather("Tokyo", 18.0)).await;
        clock.advance_millis(window_ms() - 1);

        assert_eq!(cache.prune_expired().await.removed(), 0);
        assert!(cache.get("tokyo").await.is_some());
    }
}
