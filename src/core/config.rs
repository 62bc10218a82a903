use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::debug;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct FeedConfig {
    pub base_url: String,
    pub asset_id: String,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        FeedConfig {
            base_url: crate::providers::coingecko::DEFAULT_BASE_URL.to_string(),
            asset_id: "tether".to_string(),
            timeout_secs: crate::providers::coingecko::DEFAULT_TIMEOUT.as_secs(),
            user_agent: "ratefeed/1.0".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct RatesConfig {
    /// Fiat paid out per unit of the reference asset (e.g. THB).
    pub primary_currency: String,
    /// Source currency of the derived cross-rate (e.g. RUB).
    pub secondary_currency: String,
}

impl Default for RatesConfig {
    fn default() -> Self {
        RatesConfig {
            primary_currency: "THB".to_string(),
            secondary_currency: "RUB".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            ttl_secs: crate::core::cache::DEFAULT_TTL.as_secs(),
        }
    }
}

/// Constants substituted when a leg or the derivation is unavailable.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct FallbackConfig {
    /// Primary currency per reference asset.
    pub primary_rate: f64,
    /// Secondary currency per reference asset, the cross-rate denominator.
    pub pair_rate: f64,
    /// Primary per secondary currency, used when the derivation itself fails.
    pub secondary_rate: f64,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        FallbackConfig {
            primary_rate: 33.50,
            pair_rate: 97.0,
            secondary_rate: 0.3454,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CityConfig {
    pub slug: String,
    pub display_name: String,
    pub currency: String,
    /// Multiplier on the live rate, 1.0 = standard, 1.01 = +1%.
    #[serde(default = "default_modifier")]
    pub base_rate_modifier: f64,
}

fn default_modifier() -> f64 {
    1.0
}

fn default_cities() -> Vec<CityConfig> {
    ["Pattaya", "Phuket"]
        .into_iter()
        .map(|name| CityConfig {
            slug: name.to_lowercase(),
            display_name: name.to_string(),
            currency: "THB".to_string(),
            base_rate_modifier: 1.0,
        })
        .collect()
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub rates: RatesConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub fallback: FallbackConfig,
    #[serde(default = "default_cities")]
    pub cities: Vec<CityConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            feed: FeedConfig::default(),
            rates: RatesConfig::default(),
            cache: CacheConfig::default(),
            fallback: FallbackConfig::default(),
            cities: default_cities(),
        }
    }
}

fn parse_override<T>(name: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("Invalid value for {name}: {value}"))
}

impl AppConfig {
    /// Loads the config from the default location, falling back to built-in defaults
    /// when no file exists. Environment overrides apply either way.
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        let mut config = if config_path.exists() {
            Self::read_file(&config_path)?
        } else {
            debug!(
                "No config at {}, using built-in defaults",
                config_path.display()
            );
            Self::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "ratefeed", "ratefeed")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let mut config = Self::read_file(path.as_ref())?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &std::path::Path) -> Result<Self> {
        let config_str = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    /// Applies `RATEFEED_*` overrides looked up through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("RATEFEED_BASE_URL") {
            self.feed.base_url = v;
        }
        if let Some(v) = lookup("RATEFEED_TIMEOUT_SECS") {
            self.feed.timeout_secs = parse_override("RATEFEED_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("RATEFEED_CACHE_TTL_SECS") {
            self.cache.ttl_secs = parse_override("RATEFEED_CACHE_TTL_SECS", &v)?;
        }
        if let Some(v) = lookup("RATEFEED_FALLBACK_PRIMARY_RATE") {
            self.fallback.primary_rate = parse_override("RATEFEED_FALLBACK_PRIMARY_RATE", &v)?;
        }
        if let Some(v) = lookup("RATEFEED_FALLBACK_PAIR_RATE") {
            self.fallback.pair_rate = parse_override("RATEFEED_FALLBACK_PAIR_RATE", &v)?;
        }
        if let Some(v) = lookup("RATEFEED_FALLBACK_SECONDARY_RATE") {
            self.fallback.secondary_rate =
                parse_override("RATEFEED_FALLBACK_SECONDARY_RATE", &v)?;
        }
        Ok(())
    }

    /// Rejects settings that would break the snapshot invariants.
    ///
    /// `fallback.pair_rate` is not checked here; the cross-rate guard handles a bad
    /// denominator at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.cache.ttl_secs == 0 {
            bail!("cache.ttl_secs must be greater than zero");
        }
        if self.feed.timeout_secs == 0 {
            bail!("feed.timeout_secs must be greater than zero");
        }
        for (name, value) in [
            ("fallback.primary_rate", self.fallback.primary_rate),
            ("fallback.secondary_rate", self.fallback.secondary_rate),
        ] {
            if !(value.is_finite() && value > 0.0) {
                bail!("{name} must be a positive number, got {value}");
            }
        }
        if self.cities.is_empty() {
            bail!("At least one city must be configured");
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.feed.timeout_secs)
    }
}
