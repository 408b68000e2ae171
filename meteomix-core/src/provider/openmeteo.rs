use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;

use crate::{
    geo,
    model::{Reading, Temperature},
    provider::{ProviderId, ProviderOutcome},
};

use super::WeatherProvider;

/// Open-Meteo client. Keyless; the only provider that needs the coordinate
/// resolver, since the API is addressed by latitude/longitude.
#[derive(Debug, Clone)]
pub struct OpenMeteoProvider {
    base_url: String,
    http: Client,
}

impl OpenMeteoProvider {
    pub fn new(base_url: String, http: Client) -> Self {
        Self { base_url, http }
    }

    async fn fetch_current(&self, city: &str) -> Result<Reading> {
        let coords = geo::resolve(city)?;

        let url = format!("{}/forecast", self.base_url);

        let res = self
            .http
            .get(&url)
            .query(&[
                ("latitude", coords.lat.to_string()),
                ("longitude", coords.lon.to_string()),
                (
                    "current",
                    "temperature_2m,relative_humidity_2m,wind_speed_10m,wind_direction_10m,weather_code"
                        .to_string(),
                ),
                ("timezone", "auto".to_string()),
            ])
            .send()
            .await
            .context("Failed to send request to Open-Meteo (forecast)")?;

        let status = res.status();
        let body = res.text().await.context("Failed to read Open-Meteo response body")?;

        if !status.is_success() {
            return Err(anyhow!(
                "Open-Meteo request failed with status {}: {}",
                status,
                truncate_body(&body),
            ));
        }

        let parsed: OmResponse =
            serde_json::from_str(&body).context("Failed to parse Open-Meteo JSON")?;

        let current = parsed.current;
        let temperature = current.temperature_2m;

        Ok(Reading {
            city: capitalize(city),
            // Open-Meteo does not report feels-like; default to current.
            temperature: Temperature::new(temperature, temperature),
            humidity: current.relative_humidity_2m,
            wind_speed: current.wind_speed_10m,
            wind_direction: current.wind_direction_10m,
            weather_description: wmo_description(current.weather_code).to_string(),
            timestamp: Utc::now(),
            source: ProviderId::OpenMeteo.as_str().to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct OmCurrent {
    #[serde(default)]
    temperature_2m: f64,
    #[serde(default)]
    relative_humidity_2m: f64,
    #[serde(default)]
    wind_speed_10m: f64,
    #[serde(default)]
    wind_direction_10m: f64,
    #[serde(default)]
    weather_code: i32,
}

#[derive(Debug, Deserialize)]
struct OmResponse {
    current: OmCurrent,
}

#[async_trait]
impl WeatherProvider for OpenMeteoProvider {
    fn id(&self) -> ProviderId {
        ProviderId::OpenMeteo
    }

    async fn fetch_reading(&self, city: &str) -> ProviderOutcome {
        ProviderOutcome::from_fetch(self.id(), self.fetch_current(city).await)
    }
}

/// WMO weather interpretation codes mapped to French descriptions.
/// See: https://open-meteo.com/en/docs#weathervariables
fn wmo_description(code: i32) -> &'static str {
    match code {
        0 => "Ciel dégagé",
        1 => "Principalement clair",
        2 => "Partiellement nuageux",
        3 => "Couvert",
        45 => "Brouillard",
        48 => "Brouillard givrant",
        51 => "Bruine légère",
        53 => "Bruine modérée",
        55 => "Bruine dense",
        56 => "Bruine verglaçante légère",
        57 => "Bruine verglaçante dense",
        61 => "Pluie légère",
        63 => "Pluie modérée",
        65 => "Pluie forte",
        66 => "Pluie verglaçante légère",
        67 => "Pluie verglaçante forte",
        71 => "Chute de neige légère",
        73 => "Chute de neige modérée",
        75 => "Chute de neige forte",
        77 => "Grains de neige",
        80 => "Averses de pluie légères",
        81 => "Averses de pluie modérées",
        82 => "Averses de pluie violentes",
        85 => "Averses de neige légères",
        86 => "Averses de neige fortes",
        95 => "Orage modéré ou fort",
        96 => "Orage avec grêle légère",
        99 => "Orage avec grêle forte",
        _ => "Inconnu",
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

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server: &MockServer) -> OpenMeteoProvider {
        OpenMeteoProvider::new(server.uri(), Client::new())
    }

    #[tokio::test]
    async fn maps_forecast_payload_to_reading() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/forecast"))
            .and(query_param("timezone", "auto"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "current": {
                    "temperature_2m": 18.4,
                    "relative_humidity_2m": 62.0,
                    "wind_speed_10m": 14.2,
                    "wind_direction_10m": 230.0,
                    "weather_code": 61
                }
            })))
            .mount(&server)
            .await;

        let outcome = provider_for(&server).fetch_reading("paris").await;
        let reading = outcome.into_reading().expect("provider should produce a reading");

        assert_eq!(reading.city, "Paris");
        assert_eq!(reading.temperature.current, 18.4);
        // Feels-like is not supplied by Open-Meteo and defaults to current.
        assert_eq!(reading.temperature.feels_like, 18.4);
        assert_eq!(reading.humidity, 62.0);
        assert_eq!(reading.wind_speed, 14.2);
        assert_eq!(reading.wind_direction, 230.0);
        assert_eq!(reading.weather_description, "Pluie légère");
        assert_eq!(reading.source, "open-meteo");
    }

    #[tokio::test]
    async fn unknown_city_abstains_without_a_request() {
        let server = MockServer::start().await;
        // No mock mounted: a request would 404 loudly, but none is expected.

        let outcome = provider_for(&server).fetch_reading("Atlantis").await;
        assert!(outcome.into_reading().is_none());
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn http_error_abstains() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/forecast"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
            .mount(&server)
            .await;

        let outcome = provider_for(&server).fetch_reading("london").await;
        assert!(outcome.into_reading().is_none());
    }

    #[test]
    fn truncate_body_never_splits_a_character() {
        let body = "è".repeat(150); // 300 bytes of two-byte characters
        let truncated = truncate_body(&body);
        assert_eq!(truncated, format!("{}...", "è".repeat(100)));
    }

    #[test]
    fn unknown_wmo_code_is_inconnu() {
        assert_eq!(wmo_description(0), "Ciel dégagé");
        assert_eq!(wmo_description(99), "Orage avec grêle forte");
        assert_eq!(wmo_description(42), "Inconnu");
    }
}
