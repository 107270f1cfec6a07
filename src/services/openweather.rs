//! OpenWeatherMap current-weather client.
//!
//! Fetches current conditions for a free-text location name.
//! See: https://openweathermap.org/current

use std::future::Future;

use serde::Deserialize;

/// Current weather as reported by the provider, before it is stamped and cached.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedWeather {
    pub display_name: String,
    pub country_code: String,
    pub temperature_celsius: f64,
    pub condition_description: String,
}

/// Failure of a provider fetch. Only "not found" is distinguished; every
/// other cause (transport, rate limit, bad key, malformed body) is `Failed`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    #[error("location not found")]
    NotFound,

    #[error("{0}")]
    Failed(String),
}

/// The external collaborator that performs the network lookup.
pub trait WeatherFetcher: Send + Sync + 'static {
    fn fetch(
        &self,
        location: &str,
    ) -> impl Future<Output = Result<FetchedWeather, FetchError>> + Send;
}

/// Default OpenWeatherMap endpoint for current conditions.
pub const OPENWEATHER_API_URL: &str = "https://api.openweathermap.org/data/2.5/weather";

/// Client for the OpenWeatherMap current weather API.
#[derive(Debug, Clone)]
pub struct OpenWeatherClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

// --- OpenWeatherMap JSON response types ---

#[derive(Debug, Deserialize)]
struct OwmResponse {
    name: String,
    sys: OwmSys,
    main: OwmMain,
    #[serde(default)]
    weather: Vec<OwmCondition>,
}

#[derive(Debug, Deserialize)]
struct OwmSys {
    #[serde(default)]
    country: String,
}

#[derive(Debug, Deserialize)]
struct OwmMain {
    temp: f64,
}

#[derive(Debug, Deserialize)]
struct OwmCondition {
    description: String,
}

impl From<OwmResponse> for FetchedWeather {
    fn from(r: OwmResponse) -> Self {
        Self {
            display_name: r.name,
            country_code: r.sys.country,
            temperature_celsius: r.main.temp,
            condition_description: r
                .weather
                .into_iter()
                .next()
                .map(|w| w.description)
                .unwrap_or_default(),
        }
    }
}

impl OpenWeatherClient {
    pub fn new(api_url: &str, api_key: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.to_string(),
            api_key: api_key.to_string(),
        }
    }
}

impl WeatherFetcher for OpenWeatherClient {
    async fn fetch(&self, location: &str) -> Result<FetchedWeather, FetchError> {
        let response = self
            .client
            .get(&self.api_url)
            .query(&[
                ("q", location),
                ("appid", self.api_key.as_str()),
                ("units", "metric"),
            ])
            .send()
            .await
            .map_err(|e| FetchError::Failed(format!("OpenWeatherMap request failed: {}", e)))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound);
        }

        if !response.status().is_success() {
            return Err(FetchError::Failed(format!(
                "OpenWeatherMap returned HTTP {}",
                response.status()
            )));
        }

        let parsed: OwmResponse = response.json().await.map_err(|e| {
            FetchError::Failed(format!("OpenWeatherMap JSON parse error: {}", e))
        })?;

        Ok(parsed.into())
    }
}
