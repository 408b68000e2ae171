use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use std::sync::Arc;

use meteomix_core::{
    Aggregator, Config, FileStore, ProviderId, ProviderOutcome, Reading, WeatherService,
    provider::provider_from_config,
};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "meteomix", version, about = "Consensus weather aggregator")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show aggregated weather for a city.
    Show {
        /// City name, e.g. "Paris".
        city: String,

        /// Skip the cache and query the providers directly.
        #[arg(long)]
        no_cache: bool,
    },

    /// Inspect or modify the cache.
    #[command(subcommand)]
    Cache(CacheCommand),

    /// Configure credentials for a specific provider.
    Configure {
        /// Provider short name, e.g. "openweathermap" or "weatherapi".
        provider: String,
    },

    /// Probe every provider with a fixed city and report which respond.
    TestApis,
}

#[derive(Debug, Subcommand)]
pub enum CacheCommand {
    /// Flush the whole cache store.
    Clear,

    /// Read a value stored under cache:<key>.
    Get { key: String },

    /// Store a JSON value verbatim under cache:<key>.
    Set { key: String, value: String },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let config = Config::load()?;

        match self.command {
            Command::Show { city, no_cache } => show(&config, &city, no_cache).await,
            Command::Cache(cmd) => cache(&config, cmd).await,
            Command::Configure { provider } => configure(config, &provider),
            Command::TestApis => test_apis(&config).await,
        }
    }
}

/// Build the service the way a server's composition root would: the store is
/// constructed here and injected, never reached for globally. The store is
/// file-backed so cached readings and `cache:*` values outlive the process.
fn build_service(config: &Config) -> anyhow::Result<WeatherService> {
    let aggregator = Aggregator::from_config(config)?;
    let store = Arc::new(FileStore::open(Config::cache_file_path()?)?);
    Ok(WeatherService::new(aggregator, store, config.cache_ttl()))
}

async fn show(config: &Config, city: &str, no_cache: bool) -> anyhow::Result<()> {
    let reading = if no_cache {
        Aggregator::from_config(config)?.get_current_weather(city).await?
    } else {
        let service = build_service(config)?;
        let reading = service.get_cached_weather(city).await?;
        service.close().await;
        reading
    };

    print_reading(&reading);
    Ok(())
}

async fn cache(config: &Config, cmd: CacheCommand) -> anyhow::Result<()> {
    let service = build_service(config)?;

    match cmd {
        CacheCommand::Clear => {
            service.clear_cache().await?;
            println!("Cache cleared.");
        }
        CacheCommand::Get { key } => {
            let value = service.get_value(&key).await?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        CacheCommand::Set { key, value } => {
            let value: serde_json::Value =
                serde_json::from_str(&value).context("Value must be valid JSON")?;
            service.put_value(&key, &value).await?;
            println!("Stored under cache:{key}.");
        }
    }

    service.close().await;
    Ok(())
}

fn configure(mut config: Config, provider: &str) -> anyhow::Result<()> {
    let id = ProviderId::try_from(provider)?;

    if !id.requires_api_key() {
        bail!("Provider '{id}' is keyless; nothing to configure.");
    }

    let api_key = inquire::Password::new(&format!("API key for {id}:"))
        .without_confirmation()
        .prompt()
        .context("Failed to read API key")?;

    if api_key.trim().is_empty() {
        bail!("Empty API key; configuration unchanged.");
    }

    config.upsert_provider_api_key(id, api_key.trim().to_string());
    config.save()?;

    println!("Saved API key for {id}.");
    Ok(())
}

async fn test_apis(config: &Config) -> anyhow::Result<()> {
    const PROBE_CITY: &str = "Paris";

    println!("Probing providers with '{PROBE_CITY}'...");

    for id in ProviderId::all() {
        let provider = provider_from_config(*id, config)?;
        match provider.fetch_reading(PROBE_CITY).await {
            ProviderOutcome::Reading(reading) => {
                println!("✓ {id}: {:.1}°C", reading.temperature.current);
            }
            ProviderOutcome::Abstained(reason) => {
                println!("✗ {id}: {reason}");
            }
        }
    }

    Ok(())
}

fn print_reading(reading: &Reading) {
    println!("{} — {}", reading.city, reading.weather_description);
    println!(
        "  temperature: {:.1}°C (feels like {:.1}°C)",
        reading.temperature.current, reading.temperature.feels_like
    );
    println!("  humidity:    {:.0}%", reading.humidity);
    println!(
        "  wind:        {:.1} km/h from {:.0}°",
        reading.wind_speed, reading.wind_direction
    );
    println!("  source:      {} at {}", reading.source, reading.timestamp.format("%H:%M:%S UTC"));
}
