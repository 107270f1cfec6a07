use std::time::Duration;

use crate::services::lookup::{LookupConfig, DEFAULT_LOCATIONS};
use crate::services::openweather::OPENWEATHER_API_URL;

/// Application configuration, parsed from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// SQLite URL of the persistent key-value store.
    pub database_url: String,
    pub openweather_api_key: String,
    pub openweather_api_url: String,
    pub port: u16,
    /// Cache freshness window, also used as the pruning interval.
    pub cache_freshness_secs: u64,
    /// Locations seeded into recent history on first-ever startup.
    pub default_locations: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://weather-lookup.db".to_string()),
            openweather_api_key: std::env::var("OPENWEATHER_API_KEY")
                .expect("OPENWEATHER_API_KEY must be set"),
            openweather_api_url: std::env::var("OPENWEATHER_API_URL")
                .unwrap_or_else(|_| OPENWEATHER_API_URL.to_string()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .expect("PORT must be a valid u16"),
            cache_freshness_secs: std::env::var("CACHE_FRESHNESS_SECS")
                .unwrap_or_else(|_| "600".to_string())
                .parse::<u64>()
                .expect("CACHE_FRESHNESS_SECS must be a whole number of seconds")
                .max(1),
            default_locations: std::env::var("DEFAULT_LOCATIONS")
                .map(|v| parse_location_list(&v))
                .unwrap_or_else(|_| DEFAULT_LOCATIONS.iter().map(|s| s.to_string()).collect()),
        }
    }

    pub fn lookup_config(&self) -> LookupConfig {
        let window = Duration::from_secs(self.cache_freshness_secs);
        LookupConfig {
            freshness_window: window,
            prune_interval: window,
            default_locations: self.default_locations.clone(),
        }
    }
}

/// Split a comma-separated list, dropping blanks.
fn parse_location_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
