use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;

use crate::{
    model::{Reading, Temperature},
    provider::{AbstainReason, ProviderId, ProviderOutcome},
};

use super::WeatherProvider;

const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org";

/// OpenWeatherMap client. Two calls per fetch: geocode the city name, then
/// query current conditions by coordinate.
#[derive(Debug, Clone)]
pub struct OpenWeatherProvider {
    api_key: Option<String>,
    base_url: String,
    http: Client,
}

impl OpenWeatherProvider {
    pub fn new(api_key: Option<String>, http: Client) -> Self {
        Self { api_key, base_url: DEFAULT_BASE_URL.to_string(), http }
    }

    /// Point the client at a different host (tests, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn fetch_current(&self, city: &str, api_key: &str) -> Result<Reading> {
        let location = self.geocode(city, api_key).await?;

        let url = format!("{}/data/2.5/weather", self.base_url);

        let res = self
            .http
            .get(&url)
            .query(&[
                ("lat", location.lat.to_string()),
                ("lon", location.lon.to_string()),
                ("units", "metric".to_string()),
                ("lang", "fr".to_string()),
                ("appid", api_key.to_string()),
            ])
            .send()
            .await
            .context("Failed to send request to OpenWeatherMap (current weather)")?;

        let status = res.status();
        let body = res.text().await.context("Failed to read OpenWeatherMap response body")?;

        if !status.is_success() {
            return Err(anyhow!(
                "OpenWeatherMap current request failed with status {}: {}",
                status,
                truncate_body(&body),
            ));
        }

        let parsed: OwCurrentResponse =
            serde_json::from_str(&body).context("Failed to parse OpenWeatherMap current JSON")?;

        let description = parsed
            .weather
            .first()
            .map(|w| capitalize(&w.description))
            .unwrap_or_else(|| "Inconnu".to_string());

        Ok(Reading {
            city: capitalize(city),
            temperature: Temperature::new(parsed.main.temp, parsed.main.feels_like),
            humidity: parsed.main.humidity,
            // OpenWeatherMap reports m/s even in metric mode.
            wind_speed: parsed.wind.speed * 3.6,
            wind_direction: parsed.wind.deg,
            weather_description: description,
            timestamp: Utc::now(),
            source: ProviderId::OpenWeather.as_str().to_string(),
        })
    }

    async fn geocode(&self, city: &str, api_key: &str) -> Result<OwGeoLocation> {
        let url = format!("{}/geo/1.0/direct", self.base_url);

        let res = self
            .http
            .get(&url)
            .query(&[("q", city), ("limit", "1"), ("appid", api_key)])
            .send()
            .await
            .context("Failed to send request to OpenWeatherMap (geocoding)")?;

        let status = res.status();
        let body = res.text().await.context("Failed to read OpenWeatherMap geocoding body")?;

        if !status.is_success() {
            return Err(anyhow!(
                "OpenWeatherMap geocoding request failed with status {}: {}",
                status,
                truncate_body(&body),
            ));
        }

        let mut locations: Vec<OwGeoLocation> =
            serde_json::from_str(&body).context("Failed to parse OpenWeatherMap geocoding JSON")?;

        if locations.is_empty() {
            return Err(anyhow!("OpenWeatherMap geocoding returned no match for '{city}'"));
        }

        Ok(locations.remove(0))
    }
}

#[derive(Debug, Deserialize)]
struct OwGeoLocation {
    lat: f64,
    lon: f64,
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
    feels_like: f64,
    humidity: f64,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    description: String,
}

#[derive(Debug, Deserialize)]
struct OwWind {
    speed: f64,
    #[serde(default)]
    deg: f64,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    main: OwMain,
    weather: Vec<OwWeather>,
    wind: OwWind,
}

#[async_trait]
impl WeatherProvider for OpenWeatherProvider {
    fn id(&self) -> ProviderId {
        ProviderId::OpenWeather
    }

    async fn fetch_reading(&self, city: &str) -> ProviderOutcome {
        // Lazy credential check: abstain before touching the network.
        let Some(api_key) = self.api_key.clone() else {
            tracing::debug!(provider = %self.id(), "provider abstained: API key not configured");
            return ProviderOutcome::Abstained(AbstainReason::MissingApiKey);
        };

        ProviderOutcome::from_fetch(self.id(), self.fetch_current(city, &api_key).await)
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() <= MAX {
        return body.to_string();
    }
    // Back off to a char boundary so multi-byte text cannot split the slice.
    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
