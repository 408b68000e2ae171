//! Core library for the `meteomix` weather aggregator.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - The coordinate resolver and the three provider clients
//! - The fan-out aggregation engine and its merge policy
//! - The cache store contract and the cache-aside service
//!
//! It is used by `meteomix-cli`, but can also be reused by other binaries or
//! services.

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod error;
pub mod geo;
pub mod model;
pub mod provider;
pub mod service;

pub use aggregate::{AGGREGATED_SOURCE, Aggregator, merge_readings};
pub use cache::{CacheStore, FileStore, MemoryStore};
pub use config::{Config, ProviderConfig};
pub use error::WeatherError;
pub use model::{Coordinates, Reading, Temperature};
pub use provider::{AbstainReason, ProviderId, ProviderOutcome, WeatherProvider};
pub use service::WeatherService;
