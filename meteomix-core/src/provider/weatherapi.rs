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

const DEFAULT_BASE_URL: &str = "http://api.weatherapi.com/v1";

/// WeatherAPI.com client. Single call per fetch; the city name goes to the
/// API as a free-text query, no coordinate resolution involved.
#[derive(Debug, Clone)]
pub struct WeatherApiProvider {
    api_key: Option<String>,
    base_url: String,
    http: Client,
}

impl WeatherApiProvider {
    pub fn new(api_key: Option<String>, http: Client) -> Self {
        Self { api_key, base_url: DEFAULT_BASE_URL.to_string(), http }
    }

    /// Point the client at a different host (tests, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn fetch_current(&self, city: &str, api_key: &str) -> Result<Reading> {
        let url = format!("{}/current.json", self.base_url);

        let res = self
            .http
            .get(&url)
            .query(&[("key", api_key), ("q", city), ("aqi", "no"), ("lang", "fr")])
            .send()
            .await
            .context("Failed to send request to WeatherAPI.com (current)")?;

        let status = res.status();
        let body = res.text().await.context("Failed to read WeatherAPI current response body")?;

        if !status.is_success() {
            return Err(anyhow!(
                "WeatherAPI current request failed with status {}: {}",
                status,
                truncate_body(&body),
            ));
        }

        let parsed: WaResponse =
            serde_json::from_str(&body).context("Failed to parse WeatherAPI current JSON")?;

        Ok(Reading {
            city: parsed.location.name,
            temperature: Temperature::new(parsed.current.temp_c, parsed.current.feelslike_c),
            humidity: parsed.current.humidity,
            wind_speed: parsed.current.wind_kph,
            wind_direction: parsed.current.wind_degree,
            weather_description: parsed.current.condition.text,
            timestamp: Utc::now(),
            source: ProviderId::WeatherApi.as_str().to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct WaLocation {
    name: String,
}

#[derive(Debug, Deserialize)]
struct WaCondition {
    text: String,
}

#[derive(Debug, Deserialize)]
struct WaCurrent {
    temp_c: f64,
    feelslike_c: f64,
    humidity: f64,
    wind_kph: f64,
    #[serde(default)]
    wind_degree: f64,
    condition: WaCondition,
}

#[derive(Debug, Deserialize)]
struct WaResponse {
    location: WaLocation,
    current: WaCurrent,
}

#[async_trait]
impl WeatherProvider for WeatherApiProvider {
    fn id(&self) -> ProviderId {
        ProviderId::WeatherApi
    }

    async fn fetch_reading(&self, city: &str) -> ProviderOutcome {
        let Some(api_key) = self.api_key.clone() else {
            tracing::debug!(provider = %self.id(), "provider abstained: API key not configured");
            return ProviderOutcome::Abstained(AbstainReason::MissingApiKey);
        };

        ProviderOutcome::from_fetch(self.id(), self.fetch_current(city, &api_key).await)
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

    fn provider_for(server: &MockServer, api_key: Option<&str>) -> WeatherApiProvider {
        WeatherApiProvider::new(api_key.map(str::to_owned), Client::new())
            .with_base_url(server.uri())
    }

    #[tokio::test]
    async fn missing_api_key_abstains_without_a_request() {
        let server = MockServer::start().await;

        let outcome = provider_for(&server, None).fetch_reading("Tokyo").await;

        match outcome {
            ProviderOutcome::Abstained(AbstainReason::MissingApiKey) => {}
            other => panic!("expected missing-key abstention, got {other:?}"),
        }
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn maps_current_payload_to_reading() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/current.json"))
            .and(query_param("q", "london"))
            .and(query_param("lang", "fr"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "location": {"name": "London"},
                "current": {
                    "temp_c": 14.0,
                    "feelslike_c": 12.5,
                    "humidity": 77.0,
                    "wind_kph": 22.3,
                    "wind_degree": 310.0,
                    "condition": {"text": "Partiellement nuageux"}
                }
            })))
            .mount(&server)
            .await;

        let outcome = provider_for(&server, Some("KEY")).fetch_reading("london").await;
        let reading = outcome.into_reading().expect("provider should produce a reading");

        // City display name comes from the API response, not the query.
        assert_eq!(reading.city, "London");
        assert_eq!(reading.temperature.current, 14.0);
        assert_eq!(reading.temperature.feels_like, 12.5);
        assert_eq!(reading.humidity, 77.0);
        // km/h native, no conversion.
        assert_eq!(reading.wind_speed, 22.3);
        assert_eq!(reading.wind_direction, 310.0);
        assert_eq!(reading.weather_description, "Partiellement nuageux");
        assert_eq!(reading.source, "weatherapi");
    }

    #[tokio::test]
    async fn accented_error_body_straddling_truncation_still_abstains() {
        let server = MockServer::start().await;

        // 'é' is two bytes; byte 200 of this body lands mid-character, which
        // must not panic the truncation of the error message.
        let body = format!("{}{}", "a".repeat(199), "é".repeat(10));

        Mock::given(method("GET"))
            .and(path("/current.json"))
            .respond_with(ResponseTemplate::new(500).set_body_string(body))
            .mount(&server)
            .await;

        let outcome = provider_for(&server, Some("KEY")).fetch_reading("Paris").await;
        assert!(outcome.into_reading().is_none());
    }

    #[test]
    fn truncate_body_backs_off_to_a_char_boundary() {
        let body = format!("{}{}", "a".repeat(199), "é".repeat(10));
        assert_eq!(truncate_body(&body), format!("{}...", "a".repeat(199)));
    }

    #[tokio::test]
    async fn malformed_payload_abstains() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/current.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json at all"))
            .mount(&server)
            .await;

        let outcome = provider_for(&server, Some("KEY")).fetch_reading("london").await;
        assert!(outcome.into_reading().is_none());
    }
}
