//! Engine configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DialerError, Result};

/// Default fallback window: short, so the disposition prompt shows up quickly
/// for calls that never connect.
pub const DEFAULT_FALLBACK_DELAY: Duration = Duration::from_secs(8);

/// Upper bounds accepted by [`DialerConfig::validate`]
pub const MAX_FALLBACK_DELAY: Duration = Duration::from_secs(60 * 60);
pub const MAX_PERSIST_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const MAX_BULK_SYNC_DAYS: u32 = 366;

pub const ENV_FALLBACK_SECS: &str = "CRM_DIALER_FALLBACK_SECS";
pub const ENV_DATABASE_URL: &str = "CRM_DIALER_DATABASE_URL";

/// Configuration for the dialer reconciliation engine
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use crm_dialer_core::DialerConfig;
///
/// let config = DialerConfig::default().with_fallback_delay(Duration::from_secs(20));
/// assert!(config.validate().is_ok());
/// assert_eq!(config.fallback_delay, Duration::from_secs(20));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DialerConfig {
    /// Delay before a pending call is given up on and finalized as a fallback.
    /// Re-arming always restarts this full delay.
    #[serde(with = "duration_secs")]
    pub fallback_delay: Duration,

    /// Upper bound for a single persistence write
    #[serde(with = "duration_secs")]
    pub persist_timeout: Duration,

    /// Capacity of the engine command queue
    pub command_queue_capacity: usize,

    /// Capacity of the disposition UI event queue
    pub event_queue_capacity: usize,

    /// Extra attempts on the generic launcher after it fails once
    pub launch_retries: u32,

    /// Look-back window for a bulk call-log sync
    pub bulk_sync_days: u32,

    /// SQLite URL for the durable session store and call-log sink
    pub database_url: Option<String>,
}

impl Default for DialerConfig {
    fn default() -> Self {
        Self {
            fallback_delay: DEFAULT_FALLBACK_DELAY,
            persist_timeout: Duration::from_secs(10),
            command_queue_capacity: 64,
            event_queue_capacity: 64,
            launch_retries: 1,
            bulk_sync_days: 7,
            database_url: None,
        }
    }
}

impl DialerConfig {
    pub fn with_fallback_delay(mut self, delay: Duration) -> Self {
        self.fallback_delay = delay;
        self
    }

    pub fn with_persist_timeout(mut self, timeout: Duration) -> Self {
        self.persist_timeout = timeout;
        self
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    pub fn with_launch_retries(mut self, retries: u32) -> Self {
        self.launch_retries = retries;
        self
    }

    /// Parse a configuration from JSON, missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| DialerError::configuration(format!("invalid config JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `CRM_DIALER_FALLBACK_SECS` and `CRM_DIALER_DATABASE_URL`
    /// overrides from the environment
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(secs) = std::env::var(ENV_FALLBACK_SECS) {
            let secs: f64 = secs.trim().parse().map_err(|_| {
                DialerError::configuration(format!("{} is not a number: '{}'", ENV_FALLBACK_SECS, secs))
            })?;
            if !secs.is_finite() || secs <= 0.0 {
                return Err(DialerError::configuration(format!("{} must be positive", ENV_FALLBACK_SECS)));
            }
            self.fallback_delay = Duration::try_from_secs_f64(secs)
                .map_err(|e| DialerError::configuration(format!("{}: {}", ENV_FALLBACK_SECS, e)))?;
        }
        if let Ok(url) = std::env::var(ENV_DATABASE_URL) {
            self.database_url = Some(url);
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.fallback_delay.is_zero() {
            return Err(DialerError::configuration("fallback_delay must be greater than zero"));
        }
        if self.fallback_delay > MAX_FALLBACK_DELAY {
            return Err(DialerError::configuration(format!(
                "fallback_delay must not exceed {}s",
                MAX_FALLBACK_DELAY.as_secs()
            )));
        }
        if self.persist_timeout.is_zero() {
            return Err(DialerError::configuration("persist_timeout must be greater than zero"));
        }
        if self.persist_timeout > MAX_PERSIST_TIMEOUT {
            return Err(DialerError::configuration(format!(
                "persist_timeout must not exceed {}s",
                MAX_PERSIST_TIMEOUT.as_secs()
            )));
        }
        if self.command_queue_capacity == 0 || self.event_queue_capacity == 0 {
            return Err(DialerError::configuration("queue capacities must be greater than zero"));
        }
        if self.bulk_sync_days == 0 || self.bulk_sync_days > MAX_BULK_SYNC_DAYS {
            return Err(DialerError::configuration(format!(
                "bulk_sync_days must be between 1 and {}",
                MAX_BULK_SYNC_DAYS
            )));
        }
        if let Some(url) = &self.database_url {
            if !url.starts_with("sqlite:") {
                return Err(DialerError::configuration(format!(
                    "unsupported database url '{}', expected sqlite:",
                    url
                )));
            }
        }
        Ok(())
    }
}

/// Durations are written as fractional seconds in config files
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(serde::de::Error::custom("duration must be a non-negative number of seconds"));
        }
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
