use thiserror::Error;

/// Errors surfaced to callers of the aggregation and cache layers.
///
/// Single-provider failures are never represented here: each provider catches
/// its own faults and abstains, and the aggregator only fails once every
/// provider has abstained.
#[derive(Debug, Error)]
pub enum WeatherError {
    /// Unresolvable city name, or a direct cache read for an absent key.
    #[error("not found: {0}")]
    NotFound(String),

    /// Every configured provider abstained for this aggregation call.
    /// Retryable: the upstreams may recover on a later cycle.
    #[error("no weather data source is available")]
    ServiceUnavailable,

    /// Unexpected fault outside the provider-abstention path.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl WeatherError {
    /// True when the error is the caller's fault (unknown city / key).
    pub fn is_not_found(&self) -> bool {
        matches!(self, WeatherError::NotFound(_))
    }
}
