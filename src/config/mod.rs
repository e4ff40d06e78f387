use anyhow::{anyhow, Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{env, path::PathBuf, str::FromStr, time::Duration};
use url::Url;

use crate::constants::{
    DEFAULT_API_BASE_URL, DEFAULT_REFRESH_INTERVAL_MS, DEFAULT_RETRY_ATTEMPTS,
    DEFAULT_RETRY_DELAY_MS,
};

/// Explorer and cache settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    /// Appended as `apikey` to every request when present.
    pub api_key: Option<String>,
    pub api_base_url: String,
    /// Staleness window for cached results; also the price refresh period.
    pub refresh_interval: Duration,
    /// Retries after the first failed attempt.
    pub retry_attempts: u32,
    /// Base delay for exponential backoff.
    pub retry_delay: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            refresh_interval: Duration::from_millis(DEFAULT_REFRESH_INTERVAL_MS),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        }
    }
}

impl AppConfig {
    /// Reads `ETHERSCAN_API_KEY`, `API_BASE_URL`, `REFRESH_INTERVAL_MS`,
    /// `RETRY_ATTEMPTS` and `RETRY_DELAY_MS`, falling back to defaults for
    /// anything unset. Call `dotenv::dotenv()` first to pick up a `.env`.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary variable source.
    /// Zero intervals and a zero retry count fall back to the defaults.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let api_key = var("ETHERSCAN_API_KEY").filter(|key| !key.trim().is_empty());
        let api_base_url = var("API_BASE_URL")
            .filter(|url| !url.trim().is_empty())
            .unwrap_or(defaults.api_base_url);

        let refresh_interval = parse_var::<u64>(&var, "REFRESH_INTERVAL_MS")?
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(defaults.refresh_interval);
        let retry_attempts = parse_var::<u32>(&var, "RETRY_ATTEMPTS")?
            .filter(|n| *n > 0)
            .unwrap_or(defaults.retry_attempts);
        let retry_delay = parse_var::<u64>(&var, "RETRY_DELAY_MS")?
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(defaults.retry_delay);

        Ok(Self {
            api_key,
            api_base_url,
            refresh_interval,
            retry_attempts,
            retry_delay,
        })
    }

    pub fn validate_all(&self) -> Result<()> {
        self.validate_base_url()?;

        if self.refresh_interval.is_zero() {
            return Err(anyhow!("refresh interval must be greater than zero"));
        }
        if self.retry_delay.is_zero() {
            return Err(anyhow!("retry delay must be greater than zero"));
        }

        if self.api_key.is_none() {
            warn!(
                "ETHERSCAN_API_KEY not set, explorer requests will be rate-limited. \
                 Get a free key at https://etherscan.io/apis"
            );
        }

        Ok(())
    }

    pub fn base_url(&self) -> Result<Url> {
        Url::parse(&self.api_base_url)
            .with_context(|| format!("invalid api base url {:?}", self.api_base_url))
    }

    fn validate_base_url(&self) -> Result<()> {
        let url = self.base_url()?;
        match url.scheme() {
            "http" | "https" => Ok(()),
            other => Err(anyhow!("unsupported api url scheme {other:?}")),
        }
    }

    /// Eviction window for unobserved cache entries.
    pub fn gc_interval(&self) -> Duration {
        self.refresh_interval * 2
    }
}

/// Knobs that only matter to the terminal front end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub log_level: String,
    pub data_dir: PathBuf,
    pub render_interval: Duration,
    pub metrics_port: Option<u16>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            data_dir: PathBuf::from(".eth-exposure"),
            render_interval: Duration::from_secs(1),
            metrics_port: None,
        }
    }
}

impl RuntimeConfig {
    /// Reads `LOG_LEVEL` and `DATA_DIR`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(level) = env::var("LOG_LEVEL") {
            config.log_level = level;
        }
        if let Ok(dir) = env::var("DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        config
    }
}

fn parse_var<T>(var: impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(name) {
        Some(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("{name} must be a number, got {value:?}")),
        _ => Ok(None),
    }
}
