use chrono::Utc;
use futures::future::join_all;

use crate::{
    Config,
    error::WeatherError,
    model::{Reading, Temperature},
    provider::{ProviderOutcome, WeatherProvider, providers_from_config},
};

/// Source tag carried by every merged reading.
pub const AGGREGATED_SOURCE: &str = "aggregated";

/// Fan-out aggregation engine: queries every provider concurrently and
/// merges whichever readings survive.
pub struct Aggregator {
    providers: Vec<Box<dyn WeatherProvider>>,
}

impl Aggregator {
    /// Providers are invoked in the order given; the merge policy takes city
    /// and description from the first survivor in that order.
    pub fn new(providers: Vec<Box<dyn WeatherProvider>>) -> Self {
        Self { providers }
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self::new(providers_from_config(config)?))
    }

    /// Query all providers for `city` and merge the survivors.
    ///
    /// This is a join-all, not a first-success race: a slow provider delays
    /// the aggregate but never aborts it. Fails with
    /// [`WeatherError::ServiceUnavailable`] only when every provider
    /// abstained.
    pub async fn get_current_weather(&self, city: &str) -> Result<Reading, WeatherError> {
        let outcomes: Vec<ProviderOutcome> =
            join_all(self.providers.iter().map(|p| p.fetch_reading(city))).await;

        let readings: Vec<Reading> =
            outcomes.into_iter().filter_map(ProviderOutcome::into_reading).collect();

        tracing::debug!(
            city,
            survivors = readings.len(),
            providers = self.providers.len(),
            "aggregation fan-out complete"
        );

        match merge_readings(&readings) {
            Some(merged) => Ok(merged),
            None => {
                tracing::warn!(city, "every provider abstained");
                Err(WeatherError::ServiceUnavailable)
            }
        }
    }
}

/// Merge surviving readings into one consensus reading, or `None` when the
/// slice is empty.
///
/// All numeric fields are arithmetic means: temperatures, humidity and wind
/// speed rounded to one decimal, wind direction rounded to the nearest whole
/// degree. Wind direction uses a plain arithmetic mean, which misbehaves
/// around the 0/360 wrap ({350, 10} averages to 180); kept as documented
/// behavior for compatibility. City and description come verbatim from the
/// first reading; the mean over a single reading is that reading.
pub fn merge_readings(readings: &[Reading]) -> Option<Reading> {
    let first = readings.first()?;
    let n = readings.len() as f64;

    let mean = |field: fn(&Reading) -> f64| readings.iter().map(field).sum::<f64>() / n;

    Some(Reading {
        city: first.city.clone(),
        temperature: Temperature::new(
            round1(mean(|r| r.temperature.current)),
            round1(mean(|r| r.temperature.feels_like)),
        ),
        humidity: round1(mean(|r| r.humidity)),
        wind_speed: round1(mean(|r| r.wind_speed)),
        wind_direction: mean(|r| r.wind_direction).round(),
        weather_description: first.weather_description.clone(),
        timestamp: Utc::now(),
        source: AGGREGATED_SOURCE.to_string(),
    })
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}
