use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fs, path::{Path, PathBuf}, time::Duration};

use crate::provider::ProviderId;

/// Default base URL for the keyless Open-Meteo API.
pub const DEFAULT_OPEN_METEO_URL: &str = "https://api.open-meteo.com/v1";

/// Cached readings live for ten minutes unless configured otherwise.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 600;

/// Per-provider HTTP ceiling; there is no extra timeout on the aggregate.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

/// Configuration for a single provider (e.g., API key).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub api_key: String,
}

/// Top-level configuration stored on disk.
///
/// Credentials are validated lazily: a missing API key is only noticed when
/// the corresponding provider is invoked, and that provider then abstains
/// for the cycle instead of failing startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the Open-Meteo API (override for tests / proxies).
    pub open_meteo_url: String,

    /// Time-to-live for cached aggregated readings, in seconds.
    pub cache_ttl_secs: u64,

    /// Per-request HTTP timeout applied to each provider client, in seconds.
    pub http_timeout_secs: u64,

    /// Example TOML:
    /// [providers.openweathermap]
    /// api_key = "..."
    pub providers: HashMap<String, ProviderConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            open_meteo_url: DEFAULT_OPEN_METEO_URL.to_string(),
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            providers: HashMap::new(),
        }
    }
}

impl Config {
    /// Load config from disk, or return defaults if no file exists yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    /// Load config from an explicit path (tests use this with a temp dir).
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "meteomix", "meteomix")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Path to the on-disk cache file used by the file-backed store.
    pub fn cache_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "meteomix", "meteomix")
            .ok_or_else(|| anyhow!("Could not determine platform cache directory"))?;

        Ok(dirs.cache_dir().join("cache.json"))
    }

    /// Set/replace a provider API key.
    pub fn upsert_provider_api_key(&mut self, provider_id: ProviderId, api_key: String) {
        self.providers.insert(provider_id.as_str().to_string(), ProviderConfig { api_key });
    }

    /// Returns API key for a provider, if present. Keyless providers
    /// (Open-Meteo) never consult this.
    pub fn provider_api_key(&self, provider_id: ProviderId) -> Option<&str> {
        self.providers.get(provider_id.as_str()).map(|cfg| cfg.api_key.as_str())
    }

    pub fn is_provider_configured(&self, provider_id: ProviderId) -> bool {
        self.provider_api_key(provider_id).is_some()
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}
