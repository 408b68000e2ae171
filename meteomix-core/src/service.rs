use anyhow::{Context, anyhow};
use std::{sync::Arc, time::Duration};

use crate::{
    aggregate::Aggregator,
    cache::CacheStore,
    error::WeatherError,
    model::Reading,
};

/// Cache-aside layer in front of the aggregation engine, plus the direct
/// key-value operations of the cache surface.
///
/// The store is injected by the composition root and shared behind an `Arc`;
/// the service never reaches for a process-wide connection.
pub struct WeatherService {
    aggregator: Aggregator,
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl WeatherService {
    pub fn new(aggregator: Aggregator, store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { aggregator, store, ttl }
    }

    /// Read-through fetch: cached reading if fresh, otherwise aggregate,
    /// store under `weather:<lowercased city>` with the configured TTL, and
    /// return. A cache entry that no longer deserializes is treated as a
    /// miss and overwritten.
    pub async fn get_cached_weather(&self, city: &str) -> Result<Reading, WeatherError> {
        let key = weather_cache_key(city);

        if let Some(payload) = self.store.get(&key).await {
            match serde_json::from_str::<Reading>(&payload) {
                Ok(reading) => {
                    tracing::debug!(city, %key, "cache hit");
                    return Ok(reading);
                }
                Err(err) => {
                    tracing::warn!(city, %key, error = %err, "corrupt cache entry, refetching");
                }
            }
        }

        tracing::debug!(city, %key, "cache miss");
        let reading = self.aggregator.get_current_weather(city).await?;

        let payload = serde_json::to_string(&reading)
            .context("Failed to serialize reading for the cache")?;
        if !self.store.set(&key, &payload, Some(self.ttl)).await {
            // A write failure costs a refetch on the next call, nothing more.
            tracing::warn!(city, %key, "cache write failed");
        }

        Ok(reading)
    }

    /// Flush the whole underlying store, unrelated keys included. Narrowing
    /// the scope to `weather:` keys would break the existing contract.
    pub async fn clear_cache(&self) -> Result<(), WeatherError> {
        if !self.store.clear().await {
            return Err(WeatherError::from(anyhow!("cache store refused to clear")));
        }
        tracing::info!("cache cleared");
        Ok(())
    }

    /// Release the store connection.
    pub async fn close(&self) {
        self.store.close().await;
    }

    /// Store an arbitrary JSON value verbatim under `cache:<key>`, no TTL.
    pub async fn put_value(&self, key: &str, value: &serde_json::Value) -> Result<(), WeatherError> {
        let store_key = direct_cache_key(key);
        let payload = serde_json::to_string(value)
            .context("Failed to serialize value for the cache")?;

        if !self.store.set(&store_key, &payload, None).await {
            return Err(WeatherError::from(anyhow!("cache store rejected write for {store_key}")));
        }
        Ok(())
    }

    /// Read back a value stored under `cache:<key>`. A payload that is not
    /// valid JSON is returned as a raw JSON string rather than an error;
    /// an absent key is [`WeatherError::NotFound`].
    pub async fn get_value(&self, key: &str) -> Result<serde_json::Value, WeatherError> {
        let store_key = direct_cache_key(key);

        let raw = self
            .store
            .get(&store_key)
            .await
            .ok_or_else(|| WeatherError::NotFound(format!("cache key: {key}")))?;

        Ok(serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw)))
    }
}

fn weather_cache_key(city: &str) -> String {
    format!("weather:{}", city.to_lowercase())
}

fn direct_cache_key(key: &str) -> String {
    format!("cache:{key}")
}
