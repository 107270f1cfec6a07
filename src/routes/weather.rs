//! Weather lookup HTTP endpoints.
//!
//! - GET /api/v1/weather?location=<text>
//! - GET /api/v1/recent

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::db::store::SqliteKvStore;
use crate::errors::{AppError, ErrorResponse};
use crate::helpers::capitalize_words;
use crate::services::cache::WeatherRecord;
use crate::services::history::{RecentConditionSummary, RecentLocation};
use crate::services::lookup::{LookupService, LookupSource};
use crate::services::openweather::OpenWeatherClient;

/// The lookup service as wired in production.
pub type WeatherLookup = LookupService<SqliteKvStore, OpenWeatherClient>;

/// Shared application state for weather endpoints.
#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) lookup: Arc<WeatherLookup>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct WeatherQuery {
    /// Free-text location name (e.g. "Tokyo", "new york")
    #[serde(default)]
    pub location: String,
}

/// Current conditions for one location.
#[derive(Debug, Serialize, ToSchema)]
pub struct WeatherResponse {
    /// Case-insensitive identity used for caching and history
    pub location_key: String,
    /// Location name as returned by the provider
    pub display_name: String,
    /// ISO 3166 country code
    pub country_code: String,
    /// Air temperature in Celsius
    pub temperature_c: f64,
    /// Condition text as returned by the provider (e.g. "broken clouds")
    pub description: String,
    /// Condition text with each word capitalized (e.g. "Broken Clouds")
    pub description_display: String,
    /// When the conditions were fetched from the provider (ISO 8601)
    pub fetched_at: String,
    /// Whether this response was served from the local cache
    pub cached: bool,
}

impl WeatherResponse {
    fn new(record: WeatherRecord, source: LookupSource) -> Self {
        Self {
            description_display: capitalize_words(&record.condition_description),
            fetched_at: epoch_millis_to_rfc3339(record.fetched_at_epoch_millis),
            cached: source == LookupSource::Cache,
            location_key: record.location_key,
            display_name: record.display_name,
            country_code: record.country_code,
            temperature_c: record.temperature_celsius,
            description: record.condition_description,
        }
    }
}

/// Last-known conditions shown next to a recent location.
#[derive(Debug, Serialize, ToSchema)]
pub struct RecentSummary {
    /// Location name as last returned by the provider
    pub display_name: String,
    /// Air temperature in Celsius
    pub temperature_c: f64,
    /// Condition text as returned by the provider
    pub description: String,
}

impl From<RecentConditionSummary> for RecentSummary {
    fn from(s: RecentConditionSummary) -> Self {
        Self {
            display_name: s.display_name,
            temperature_c: s.temperature_celsius,
            description: s.condition_description,
        }
    }
}

/// One row of the recent-locations list.
#[derive(Debug, Serialize, ToSchema)]
pub struct RecentLocationResponse {
    /// Case-insensitive identity of the location
    pub location_key: String,
    /// Name as most recently looked up
    pub display_name: String,
    /// Last-known conditions; null if the location was never successfully looked up
    pub last_summary: Option<RecentSummary>,
}

impl From<RecentLocation> for RecentLocationResponse {
    fn from(r: RecentLocation) -> Self {
        Self {
            location_key: r.location_key,
            display_name: r.display_name,
            last_summary: r.last_summary.map(RecentSummary::from),
        }
    }
}

fn epoch_millis_to_rfc3339(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}

/// Look up current weather for a location.
///
/// Serves a cached result when one younger than the freshness window exists;
/// otherwise fetches from OpenWeatherMap. Every successful lookup moves the
/// location to the front of the recent list.
#[utoipa::path(
    get,
    path = "/api/v1/weather",
    tag = "Weather",
    params(WeatherQuery),
    responses(
        (status = 200, description = "Current conditions", body = WeatherResponse),
        (status = 400, description = "Blank location", body = ErrorResponse),
        (status = 404, description = "Location not found by the provider", body = ErrorResponse),
        (status = 502, description = "Provider unreachable or returned an error", body = ErrorResponse),
    )
)]
pub(crate) async fn get_weather(
    State(state): State<AppState>,
    Query(params): Query<WeatherQuery>,
) -> Result<Json<WeatherResponse>, AppError> {
    let (record, source) = state.lookup.resolve(&params.location).await?;
    Ok(Json(WeatherResponse::new(record, source)))
}

/// List recently viewed locations, most recent first.
#[utoipa::path(
    get,
    path = "/api/v1/recent",
    tag = "Weather",
    responses(
        (status = 200, description = "Recent locations with last-known conditions", body = Vec<RecentLocationResponse>),
    )
)]
pub(crate) async fn list_recent(State(state): State<AppState>) -> Json<Vec<RecentLocationResponse>> {
    let rows = state.lookup.list_recent_with_summaries().await;
    Json(rows.into_iter().map(RecentLocationResponse::from).collect())
}
