use crate::{
    Config,
    provider::{
        openmeteo::OpenMeteoProvider, openweather::OpenWeatherProvider,
        weatherapi::WeatherApiProvider,
    },
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::{convert::TryFrom, fmt::Debug};

use crate::model::Reading;

pub mod openmeteo;
pub mod openweather;
pub mod weatherapi;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    OpenWeather,
    WeatherApi,
    OpenMeteo,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenWeather => "openweathermap",
            ProviderId::WeatherApi => "weatherapi",
            ProviderId::OpenMeteo => "open-meteo",
        }
    }

    /// All providers, in the fixed aggregation invocation order. The merge
    /// policy takes its description from the first survivor in this order.
    pub const fn all() -> &'static [ProviderId] {
        &[ProviderId::OpenWeather, ProviderId::WeatherApi, ProviderId::OpenMeteo]
    }

    /// Whether the provider needs an API key to be usable at all.
    pub const fn requires_api_key(&self) -> bool {
        !matches!(self, ProviderId::OpenMeteo)
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProviderId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        match lower.as_str() {
            "openweathermap" | "openweather" => Ok(ProviderId::OpenWeather),
            "weatherapi" => Ok(ProviderId::WeatherApi),
            "open-meteo" | "openmeteo" => Ok(ProviderId::OpenMeteo),
            _ => Err(anyhow::anyhow!(
                "Unknown provider '{value}'. Supported providers: openweathermap, weatherapi, open-meteo."
            )),
        }
    }
}

/// Why a provider produced no reading for a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbstainReason {
    /// No credential configured; the provider did not even go on the wire.
    MissingApiKey,
    /// Network error, non-success status, or an unparseable payload.
    Upstream(String),
}

impl std::fmt::Display for AbstainReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbstainReason::MissingApiKey => f.write_str("API key not configured"),
            AbstainReason::Upstream(msg) => f.write_str(msg),
        }
    }
}

/// Result of one provider call. Abstention is an expected outcome, not an
/// error: the aggregator filters abstentions out and only fails when every
/// provider abstained.
#[derive(Debug, Clone)]
pub enum ProviderOutcome {
    Reading(Reading),
    Abstained(AbstainReason),
}

impl ProviderOutcome {
    pub fn into_reading(self) -> Option<Reading> {
        match self {
            ProviderOutcome::Reading(reading) => Some(reading),
            ProviderOutcome::Abstained(_) => None,
        }
    }

    /// Convert an internal fallible fetch into an outcome, logging the
    /// abstention. Providers must never let a fault escape this boundary.
    pub(crate) fn from_fetch(id: ProviderId, result: Result<Reading>) -> Self {
        match result {
            Ok(reading) => ProviderOutcome::Reading(reading),
            Err(err) => {
                tracing::debug!(provider = %id, error = %format!("{err:#}"), "provider abstained");
                ProviderOutcome::Abstained(AbstainReason::Upstream(format!("{err:#}")))
            }
        }
    }
}

#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    fn id(&self) -> ProviderId;

    /// Fetch a reading for `city`. Infallible by contract: any failure is
    /// absorbed into [`ProviderOutcome::Abstained`].
    async fn fetch_reading(&self, city: &str) -> ProviderOutcome;
}

/// Construct one provider client from config.
///
/// A missing API key is not an error here: credentials are validated lazily,
/// and a keyless client abstains when invoked.
pub fn provider_from_config(id: ProviderId, config: &Config) -> Result<Box<dyn WeatherProvider>> {
    let http = Client::builder()
        .timeout(config.http_timeout())
        .build()
        .context("Failed to build HTTP client")?;

    let api_key = config.provider_api_key(id).map(str::to_owned);

    let boxed: Box<dyn WeatherProvider> = match id {
        ProviderId::OpenWeather => Box::new(OpenWeatherProvider::new(api_key, http)),
        ProviderId::WeatherApi => Box::new(WeatherApiProvider::new(api_key, http)),
        ProviderId::OpenMeteo => {
            Box::new(OpenMeteoProvider::new(config.open_meteo_url.clone(), http))
        }
    };

    Ok(boxed)
}

/// Construct all provider clients in the fixed invocation order.
pub fn providers_from_config(config: &Config) -> Result<Vec<Box<dyn WeatherProvider>>> {
    ProviderId::all().iter().map(|id| provider_from_config(*id, config)).collect()
}
