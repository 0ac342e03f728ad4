//! Tunables of the connection manager.
//!
//! Defaults mirror the firmware values the state machine was tuned with:
//! ten connection attempts spaced ten seconds apart, DHCP polled every
//! 100 ms for up to 20 s, and a link-quality check every ten seconds while
//! connected.

use super::ConfigError;
use std::time::Duration;

/// Configuration for retry, polling and roaming behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MgmtConfig {
    /// Connection attempts before giving up (ignored when unlimited).
    pub retry_limit: u32,
    /// Retry forever instead of honoring `retry_limit`.
    pub retry_unlimited: bool,
    /// Delay between a failure and the next scan attempt.
    pub retry_interval: Duration,

    /// Number of DHCP polls before declaring DHCP failed.
    pub dhcp_poll_limit: u32,
    pub dhcp_poll_interval: Duration,

    /// Period of the link-quality check while connected.
    pub link_poll_interval: Duration,

    /// RSSI in dBm below which roaming scans are considered.
    pub roam_trigger_rssi: i32,
    /// Required advantage (dB) of the smoothed candidate average.
    pub roam_margin_avg: i32,
    /// Required advantage (dB) of the best single candidate sample.
    pub roam_margin_best: i32,
    /// Weak-signal polls between throttled roaming scans.
    pub scan_throttle_polls: u32,
    /// Roaming scans allowed back to back before throttling kicks in.
    pub scan_fast_polls: u32,

    /// Depth of the event loop message queue.
    pub queue_depth: usize,
    /// Upper bound for blocking shell commands.
    pub block_wait: Duration,
    /// Delivery attempts for a driver indication when the queue is full.
    pub forward_attempts: u32,
    pub forward_backoff: Duration,
}

impl Default for MgmtConfig {
    fn default() -> Self {
        Self {
            retry_limit: 10,
            retry_unlimited: false,
            retry_interval: Duration::from_millis(10_000),
            dhcp_poll_limit: 200,
            dhcp_poll_interval: Duration::from_millis(100),
            link_poll_interval: Duration::from_millis(10_000),
            roam_trigger_rssi: -75,
            roam_margin_avg: 10,
            roam_margin_best: 20,
            scan_throttle_polls: 15,
            scan_fast_polls: 5,
            queue_depth: 8,
            block_wait: Duration::from_millis(20_000),
            forward_attempts: 3,
            forward_backoff: Duration::from_millis(10),
        }
    }
}

impl MgmtConfig {
    /// Default configuration that never stops retrying.
    pub fn unlimited() -> Self {
        Self {
            retry_unlimited: true,
            ..Default::default()
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.retry_unlimited && self.retry_limit == 0 {
            return Err(ConfigError::InvalidConfig("retry_limit must be > 0"));
        }
        if self.retry_interval.is_zero() {
            return Err(ConfigError::InvalidConfig("retry_interval must be > 0"));
        }
        if self.dhcp_poll_limit == 0 {
            return Err(ConfigError::InvalidConfig("dhcp_poll_limit must be > 0"));
        }
        if self.dhcp_poll_interval.is_zero() || self.link_poll_interval.is_zero() {
            return Err(ConfigError::InvalidConfig("poll intervals must be > 0"));
        }
        if self.roam_trigger_rssi >= 0 {
            return Err(ConfigError::InvalidConfig("roam_trigger_rssi must be < 0 dBm"));
        }
        if self.roam_margin_avg <= 0 || self.roam_margin_best <= 0 {
            return Err(ConfigError::InvalidConfig("roaming margins must be > 0"));
        }
        if self.scan_throttle_polls == 0 {
            return Err(ConfigError::InvalidConfig("scan_throttle_polls must be > 0"));
        }
        if self.queue_depth == 0 {
            return Err(ConfigError::InvalidConfig("queue_depth must be > 0"));
        }
        if self.forward_attempts == 0 {
            return Err(ConfigError::InvalidConfig("forward_attempts must be > 0"));
        }
        Ok(())
    }
}

/// Convert a duration to the event loop's millisecond delay, saturating.
pub(crate) fn as_delay_ms(d: Duration) -> u32 {
    u32::try_from(d.as_millis()).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MgmtConfig::default();
        assert_eq!(config.retry_limit, 10);
        assert_eq!(config.dhcp_poll_limit, 200);
        assert_eq!(config.roam_trigger_rssi, -75);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unlimited_allows_zero_limit() {
        let config = MgmtConfig {
            retry_limit: 0,
            ..MgmtConfig::unlimited()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_zero_retry_limit() {
        let config = MgmtConfig {
            retry_limit: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidConfig("retry_limit must be > 0"))
        );
    }

    #[test]
    fn test_config_validation_positive_trigger() {
        let config = MgmtConfig {
            roam_trigger_rssi: 5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_queue() {
        let config = MgmtConfig {
            queue_depth: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_delay_saturates() {
        assert_eq!(as_delay_ms(Duration::from_millis(250)), 250);
        assert_eq!(as_delay_ms(Duration::from_secs(u64::MAX / 1000)), u32::MAX);
    }
}
