use std::path::PathBuf;
use std::time::Duration;

use crate::alerts::background::{clamp_poll_interval, MIN_POLL_INTERVAL};
use crate::alerts::notifier::DeliveryChannel;

/// Application-level constants
pub const APP_NAME: &str = "HealthAlerts";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Overrides the data directory (tests, multi-instance hosts).
pub const DATA_DIR_ENV: &str = "HEALTH_ALERTS_DATA_DIR";
/// Poll interval in minutes for the background scheduler.
pub const POLL_MINUTES_ENV: &str = "HEALTH_ALERTS_POLL_MINUTES";

const DATABASE_FILE: &str = "health_alerts.db";

/// Get the application data directory.
/// `$HEALTH_ALERTS_DATA_DIR` if set, otherwise the platform data dir,
/// falling back to the home directory.
pub fn app_data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Path of the engine's SQLite database
pub fn database_path() -> PathBuf {
    app_data_dir().join(DATABASE_FILE)
}

/// Log filter used when `RUST_LOG` is unset
pub fn default_log_filter() -> &'static str {
    "info,health_alerts=debug"
}

/// Engine tuning knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Background poll interval. Never below 15 minutes.
    pub poll_interval: Duration,
    /// How long a check lease stays valid if its holder dies.
    pub lease_ttl: chrono::Duration,
    pub channel_id: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: MIN_POLL_INTERVAL,
            lease_ttl: chrono::Duration::minutes(5),
            channel_id: DeliveryChannel::DEFAULT_ID.to_string(),
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `HEALTH_ALERTS_POLL_MINUTES`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var(POLL_MINUTES_ENV) {
            match raw.trim().parse::<u64>() {
                Ok(minutes) => config = config.with_poll_interval(Duration::from_secs(minutes.saturating_mul(60))),
                Err(e) => {
                    tracing::warn!(value = %raw, error = %e, "Ignoring invalid HEALTH_ALERTS_POLL_MINUTES");
                }
            }
        }
        config
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        let clamped = clamp_poll_interval(interval);
        if clamped != interval {
            tracing::warn!(
                requested_secs = interval.as_secs(),
                clamped_secs = clamped.as_secs(),
                "Poll interval below minimum, clamped"
            );
        }
        self.poll_interval = clamped;
        self
    }
}
