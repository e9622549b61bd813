//! Configuration types for the uplink arbiter
//!
//! All values are policy knobs the state machine compares against elapsed
//! time; it attaches no other meaning to them. Defaults suit a cloud service
//! that needs frequent keep-alives over NAT on wired links and sparse ones
//! over metered cellular links.

use crate::clock::duration_to_ms;
use crate::color::StatusColor;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Arbiter configuration
///
/// Setters are chainable and consume `self`:
///
/// ```rust
/// use std::time::Duration;
/// use uplink_core::{ArbiterConfig, StatusColor};
///
/// let config = ArbiterConfig::new()
///     .with_primary_connect_timeout(Duration::from_secs(10))
///     .with_backup_color(StatusColor::ORANGE);
///
/// assert_eq!(config.primary_connect_timeout(), Duration::from_secs(10));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArbiterConfig {
    /// Keep-alive set on the cloud session once connected via primary
    #[serde(default = "default_primary_keep_alive_secs")]
    pub primary_keep_alive_secs: u64,

    /// Keep-alive set on the cloud session once connected via backup
    #[serde(default = "default_backup_keep_alive_secs")]
    pub backup_keep_alive_secs: u64,

    /// Time connected over backup before probing the primary again
    #[serde(default = "default_retry_primary_period_ms")]
    pub retry_primary_period_ms: u64,

    /// Maximum wait for the backup interface to become ready
    #[serde(default = "default_backup_connect_timeout_ms")]
    pub backup_connect_timeout_ms: u64,

    /// Maximum wait for the cloud once the backup interface is ready
    #[serde(default = "default_backup_cloud_connect_timeout_ms")]
    pub backup_cloud_connect_timeout_ms: u64,

    /// Maximum wait for the primary interface to become ready
    #[serde(default = "default_primary_connect_timeout_ms")]
    pub primary_connect_timeout_ms: u64,

    /// Maximum wait for the cloud once the primary interface is ready
    #[serde(default = "default_primary_cloud_connect_timeout_ms")]
    pub primary_cloud_connect_timeout_ms: u64,

    /// Indicator color while on backup
    ///
    /// [`StatusColor::DEFAULT`] keeps the normal coloring.
    #[serde(default = "default_backup_color")]
    pub backup_color: StatusColor,

    /// Capacity of the optional arbiter event channel
    ///
    /// When full, events are dropped (with a warning log) rather than
    /// blocking the poll.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl ArbiterConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self {
            primary_keep_alive_secs: default_primary_keep_alive_secs(),
            backup_keep_alive_secs: default_backup_keep_alive_secs(),
            retry_primary_period_ms: default_retry_primary_period_ms(),
            backup_connect_timeout_ms: default_backup_connect_timeout_ms(),
            backup_cloud_connect_timeout_ms: default_backup_cloud_connect_timeout_ms(),
            primary_connect_timeout_ms: default_primary_connect_timeout_ms(),
            primary_cloud_connect_timeout_ms: default_primary_cloud_connect_timeout_ms(),
            backup_color: default_backup_color(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }

    /// Validate the configuration
    ///
    /// Every timeout must be non-zero and fit the 32-bit millisecond clock,
    /// otherwise the modular elapsed-time comparison would never fire.
    pub fn validate(&self) -> Result<(), crate::Error> {
        let timeouts = [
            ("retry_primary_period_ms", self.retry_primary_period_ms),
            ("backup_connect_timeout_ms", self.backup_connect_timeout_ms),
            ("backup_cloud_connect_timeout_ms", self.backup_cloud_connect_timeout_ms),
            ("primary_connect_timeout_ms", self.primary_connect_timeout_ms),
            ("primary_cloud_connect_timeout_ms", self.primary_cloud_connect_timeout_ms),
        ];

        for (name, value) in timeouts {
            if value == 0 {
                return Err(crate::Error::config(format!("{} must be > 0", name)));
            }
            if value > u64::from(u32::MAX) {
                return Err(crate::Error::config(format!(
                    "{} must be at most {} ms (clock range). Got: {}",
                    name,
                    u32::MAX,
                    value
                )));
            }
        }

        if self.primary_keep_alive_secs == 0 {
            return Err(crate::Error::config("primary_keep_alive_secs must be > 0"));
        }
        if self.backup_keep_alive_secs == 0 {
            return Err(crate::Error::config("backup_keep_alive_secs must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("event_channel_capacity must be > 0"));
        }

        Ok(())
    }

    /// Load a configuration from a JSON document
    ///
    /// Missing fields fall back to their defaults.
    pub fn from_json(json: &str) -> Result<Self, crate::Error> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_primary_keep_alive(mut self, value: Duration) -> Self {
        self.primary_keep_alive_secs = value.as_secs();
        self
    }

    pub fn primary_keep_alive(&self) -> Duration {
        Duration::from_secs(self.primary_keep_alive_secs)
    }

    pub fn with_backup_keep_alive(mut self, value: Duration) -> Self {
        self.backup_keep_alive_secs = value.as_secs();
        self
    }

    pub fn backup_keep_alive(&self) -> Duration {
        Duration::from_secs(self.backup_keep_alive_secs)
    }

    pub fn with_retry_primary_period(mut self, value: Duration) -> Self {
        self.retry_primary_period_ms = duration_to_u64_ms(value);
        self
    }

    pub fn retry_primary_period(&self) -> Duration {
        Duration::from_millis(self.retry_primary_period_ms)
    }

    pub fn with_backup_connect_timeout(mut self, value: Duration) -> Self {
        self.backup_connect_timeout_ms = duration_to_u64_ms(value);
        self
    }

    pub fn backup_connect_timeout(&self) -> Duration {
        Duration::from_millis(self.backup_connect_timeout_ms)
    }

    pub fn with_backup_cloud_connect_timeout(mut self, value: Duration) -> Self {
        self.backup_cloud_connect_timeout_ms = duration_to_u64_ms(value);
        self
    }

    pub fn backup_cloud_connect_timeout(&self) -> Duration {
        Duration::from_millis(self.backup_cloud_connect_timeout_ms)
    }

    pub fn with_primary_connect_timeout(mut self, value: Duration) -> Self {
        self.primary_connect_timeout_ms = duration_to_u64_ms(value);
        self
    }

    pub fn primary_connect_timeout(&self) -> Duration {
        Duration::from_millis(self.primary_connect_timeout_ms)
    }

    pub fn with_primary_cloud_connect_timeout(mut self, value: Duration) -> Self {
        self.primary_cloud_connect_timeout_ms = duration_to_u64_ms(value);
        self
    }

    pub fn primary_cloud_connect_timeout(&self) -> Duration {
        Duration::from_millis(self.primary_cloud_connect_timeout_ms)
    }

    /// Set the backup color; [`StatusColor::DEFAULT`] restores normal coloring
    pub fn with_backup_color(mut self, value: StatusColor) -> Self {
        self.backup_color = value;
        self
    }

    pub fn backup_color(&self) -> StatusColor {
        self.backup_color
    }

    pub fn with_event_channel_capacity(mut self, value: usize) -> Self {
        self.event_channel_capacity = value;
        self
    }

    /// Timeouts resolved to clock milliseconds
    pub(crate) fn timeouts(&self) -> Timeouts {
        Timeouts {
            retry_primary_period: duration_to_ms(self.retry_primary_period()),
            backup_connect: duration_to_ms(self.backup_connect_timeout()),
            backup_cloud_connect: duration_to_ms(self.backup_cloud_connect_timeout()),
            primary_connect: duration_to_ms(self.primary_connect_timeout()),
            primary_cloud_connect: duration_to_ms(self.primary_cloud_connect_timeout()),
        }
    }
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Timeouts in clock milliseconds, as compared by the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Timeouts {
    pub retry_primary_period: u32,
    pub backup_connect: u32,
    pub backup_cloud_connect: u32,
    pub primary_connect: u32,
    pub primary_cloud_connect: u32,
}

fn duration_to_u64_ms(value: Duration) -> u64 {
    u64::try_from(value.as_millis()).unwrap_or(u64::MAX)
}

fn default_primary_keep_alive_secs() -> u64 {
    25
}

fn default_backup_keep_alive_secs() -> u64 {
    23 * 60
}

fn default_retry_primary_period_ms() -> u64 {
    5 * 60 * 1000
}

fn default_backup_connect_timeout_ms() -> u64 {
    5 * 60 * 1000
}

fn default_backup_cloud_connect_timeout_ms() -> u64 {
    2 * 60 * 1000
}

fn default_primary_connect_timeout_ms() -> u64 {
    30 * 1000
}

fn default_primary_cloud_connect_timeout_ms() -> u64 {
    30 * 1000
}

fn default_backup_color() -> StatusColor {
    StatusColor::YELLOW
}

fn default_event_channel_capacity() -> usize {
    64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ArbiterConfig::default();
        assert_eq!(config.primary_keep_alive(), Duration::from_secs(25));
        assert_eq!(config.backup_keep_alive(), Duration::from_secs(23 * 60));
        assert_eq!(config.retry_primary_period(), Duration::from_secs(300));
        assert_eq!(config.backup_connect_timeout(), Duration::from_secs(300));
        assert_eq!(config.backup_cloud_connect_timeout(), Duration::from_secs(120));
        assert_eq!(config.primary_connect_timeout(), Duration::from_secs(30));
        assert_eq!(config.primary_cloud_connect_timeout(), Duration::from_secs(30));
        assert_eq!(config.backup_color(), StatusColor::YELLOW);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_chained_setters() {
        let config = ArbiterConfig::new()
            .with_primary_keep_alive(Duration::from_secs(10))
            .with_backup_keep_alive(Duration::from_secs(600))
            .with_retry_primary_period(Duration::from_secs(60))
            .with_backup_connect_timeout(Duration::from_secs(90))
            .with_backup_cloud_connect_timeout(Duration::from_secs(45))
            .with_primary_connect_timeout(Duration::from_millis(1500))
            .with_primary_cloud_connect_timeout(Duration::from_secs(20))
            .with_backup_color(StatusColor::DEFAULT);

        assert_eq!(config.primary_keep_alive_secs, 10);
        assert_eq!(config.backup_keep_alive_secs, 600);
        assert_eq!(config.retry_primary_period_ms, 60_000);
        assert_eq!(config.backup_connect_timeout_ms, 90_000);
        assert_eq!(config.backup_cloud_connect_timeout_ms, 45_000);
        assert_eq!(config.primary_connect_timeout_ms, 1_500);
        assert_eq!(config.primary_cloud_connect_timeout_ms, 20_000);
        assert!(config.backup_color().is_default());
    }

    #[test]
    fn test_validate_rejects_zero_and_out_of_range() {
        let zero = ArbiterConfig::new().with_primary_connect_timeout(Duration::ZERO);
        assert!(zero.validate().is_err());

        let huge = ArbiterConfig::new().with_retry_primary_period(Duration::from_secs(60 * 24 * 3600));
        assert!(huge.validate().is_err());

        let no_keep_alive = ArbiterConfig::new().with_backup_keep_alive(Duration::from_millis(500));
        assert!(no_keep_alive.validate().is_err());

        let no_channel = ArbiterConfig::new().with_event_channel_capacity(0);
        assert!(no_channel.validate().is_err());
    }

    #[test]
    fn test_timeouts_in_clock_ms() {
        let timeouts = ArbiterConfig::default().timeouts();
        assert_eq!(timeouts.primary_connect, 30_000);
        assert_eq!(timeouts.retry_primary_period, 300_000);
    }

    #[test]
    fn test_from_json_partial() {
        let config = ArbiterConfig::from_json(
            r#"{ "primary_connect_timeout_ms": 5000, "backup_color": "orange" }"#,
        )
        .unwrap();
        assert_eq!(config.primary_connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.backup_color(), StatusColor::ORANGE);
        assert_eq!(config.backup_keep_alive_secs, 23 * 60);
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{ "retry_primary_period_ms": 0 }}"#).unwrap();

        let contents = std::fs::read_to_string(file.path()).unwrap();
        let result = ArbiterConfig::from_json(&contents);
        assert!(matches!(result, Err(crate::Error::Config(_))));
    }
}
