use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use vrfleet_client::http::HttpStore;
use vrfleet_client::retry::RateLimiter;
use vrfleet_client::{ClientError, Gateway};
use vrfleet_core::backoff::{
    BackoffStrategy, RetryPolicy, DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY,
};
use vrfleet_core::error::CoreError;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} must be {expected}, got '{value}'")]
    Invalid {
        var: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Backend connection and batching settings.
#[derive(Debug, Clone, PartialEq)]
pub struct FleetConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    /// Sleep between consecutive calls of a batch.
    pub pacing: Duration,
    /// Token-bucket rate; `None` disables the limiter.
    pub rate_limit_per_sec: Option<u32>,
}

impl FleetConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var                      | Default   |
    /// |------------------------------|-----------|
    /// | `FLEET_API_URL`              | required  |
    /// | `FLEET_API_KEY`              | unset     |
    /// | `FLEET_REQUEST_TIMEOUT_SECS` | `30`      |
    /// | `FLEET_RETRY_MAX_ATTEMPTS`   | `5`       |
    /// | `FLEET_RETRY_BASE_DELAY_MS`  | `1000`    |
    /// | `FLEET_BACKOFF`              | `linear`  |
    /// | `FLEET_BACKOFF_MAX_DELAY_MS` | `30000`   |
    /// | `FLEET_PACING_DELAY_MS`      | `200`     |
    /// | `FLEET_RATE_LIMIT_PER_SEC`   | unset     |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`FleetConfig::from_env`] with an arbitrary variable source.
    /// Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let api_url = get("FLEET_API_URL").ok_or(ConfigError::Missing("FLEET_API_URL"))?;
        match url::Url::parse(api_url.trim()) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            _ => {
                return Err(ConfigError::Invalid {
                    var: "FLEET_API_URL",
                    value: api_url,
                    expected: "an http(s) URL",
                })
            }
        }

        let request_timeout_secs: u64 =
            parse_var(&get, "FLEET_REQUEST_TIMEOUT_SECS", 30, "a whole number of seconds")?;
        let max_attempts: u32 = parse_var(
            &get,
            "FLEET_RETRY_MAX_ATTEMPTS",
            DEFAULT_MAX_ATTEMPTS,
            "a positive integer",
        )?;
        let base_delay_ms: u64 = parse_var(
            &get,
            "FLEET_RETRY_BASE_DELAY_MS",
            DEFAULT_BASE_DELAY.as_millis() as u64,
            "a number of milliseconds",
        )?;
        let max_delay_ms: u64 = parse_var(
            &get,
            "FLEET_BACKOFF_MAX_DELAY_MS",
            DEFAULT_MAX_DELAY.as_millis() as u64,
            "a number of milliseconds",
        )?;
        let strategy = BackoffStrategy::parse(
            get("FLEET_BACKOFF").as_deref().unwrap_or("linear"),
            Duration::from_millis(max_delay_ms),
        )?;
        let pacing_ms: u64 = parse_var(&get, "FLEET_PACING_DELAY_MS", 200, "a number of milliseconds")?;

        let rate_limit_per_sec = match get("FLEET_RATE_LIMIT_PER_SEC") {
            None => None,
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(n) if n > 0 => Some(n),
                _ => {
                    return Err(ConfigError::Invalid {
                        var: "FLEET_RATE_LIMIT_PER_SEC",
                        value: raw,
                        expected: "a positive integer",
                    })
                }
            },
        };

        let retry = RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(base_delay_ms),
            strategy,
        };
        retry.validate()?;

        Ok(Self {
            api_url: api_url.trim().to_string(),
            api_key: get("FLEET_API_KEY").map(|k| k.trim().to_string()),
            request_timeout: Duration::from_secs(request_timeout_secs),
            retry,
            pacing: Duration::from_millis(pacing_ms),
            rate_limit_per_sec,
        })
    }

    /// Build the HTTP-backed gateway every command runs through.
    pub fn gateway(&self) -> Result<Gateway, ConfigError> {
        let store = HttpStore::new(&self.api_url, self.api_key.clone(), self.request_timeout)?;
        let mut gateway = Gateway::new(Arc::new(store))
            .with_policy(self.retry)
            .with_pacing(self.pacing);
        if let Some(per_sec) = self.rate_limit_per_sec {
            gateway = gateway.with_limiter(Arc::new(RateLimiter::per_second(per_sec)?));
        }
        Ok(gateway)
    }
}

fn parse_var<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
    expected: &'static str,
) -> Result<T, ConfigError> {
    match get(var) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            var,
            value: raw,
            expected,
        }),
    }
}
