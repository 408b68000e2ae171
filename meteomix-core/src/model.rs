use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Temperature block of a reading. The unit is fixed to Celsius; every
/// provider client normalizes to it before building a [`Reading`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Temperature {
    pub current: f64,
    pub feels_like: f64,
    #[serde(default = "celsius")]
    pub unit: String,
}

fn celsius() -> String {
    "celsius".to_string()
}

impl Temperature {
    pub fn new(current: f64, feels_like: f64) -> Self {
        Self { current, feels_like, unit: celsius() }
    }
}

/// Canonical weather snapshot, either from a single provider or merged.
///
/// Readings are value objects: built once per provider call (or per merge)
/// and never mutated afterwards. `humidity` is a percentage in 0..=100,
/// `wind_speed` is km/h and non-negative, `wind_direction` is degrees in
/// 0..=360. Temperature carries no bound (winter exists).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub city: String,
    pub temperature: Temperature,
    pub humidity: f64,
    pub wind_speed: f64,
    pub wind_direction: f64,
    pub weather_description: String,
    pub timestamp: DateTime<Utc>,
    /// Provider name, or `"aggregated"` for merged readings.
    pub source: String,
}

/// Geographic point resolved from a city name.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}
