//! Station and access-point credential policy.
//!
//! These types are checked once at the API boundary. Anything that reaches the
//! netlink bridge has already passed validation, so the bridge never mutates
//! link state on behalf of a malformed request.
//!
//! # Example
//!
//! ```
//! use wifi_connmgr::config::{ApConfig, StaConfig};
//!
//! let sta = StaConfig::new("HomeNet", "hunter2hunter2").unwrap();
//! assert!(!sta.is_open());
//!
//! let ap = ApConfig::open("setup-ap", 6).unwrap();
//! assert!(ap.is_open());
//! ```

use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Maximum SSID length per IEEE 802.11 standard.
pub const MAX_SSID_LEN: usize = 32;

/// Maximum WPA2 passphrase length.
pub const MAX_PASSWORD_LEN: usize = 64;

/// Minimum WPA2 passphrase length.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Highest 2.4 GHz channel accepted for the soft-AP.
pub const MAX_AP_CHANNEL: u8 = 14;

/// Channel used by the soft-AP when none is given.
pub const DEFAULT_AP_CHANNEL: u8 = 1;

fn check_ssid(ssid: &str) -> Result<(), ConfigError> {
    if ssid.is_empty() {
        return Err(ConfigError::SsidEmpty);
    }
    if ssid.len() > MAX_SSID_LEN {
        return Err(ConfigError::SsidTooLong {
            len: ssid.len(),
            max: MAX_SSID_LEN,
        });
    }
    Ok(())
}

fn check_password(password: &str) -> Result<(), ConfigError> {
    // Empty means an open network.
    if password.is_empty() {
        return Ok(());
    }
    if password.len() < MIN_PASSWORD_LEN {
        return Err(ConfigError::PasswordTooShort {
            len: password.len(),
            min: MIN_PASSWORD_LEN,
        });
    }
    if password.len() > MAX_PASSWORD_LEN {
        return Err(ConfigError::PasswordTooLong {
            len: password.len(),
            max: MAX_PASSWORD_LEN,
        });
    }
    Ok(())
}

/// Credentials of the network the station should join.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct StaConfig {
    ssid: String,
    password: String,
}

impl StaConfig {
    /// Create a validated station configuration.
    pub fn new(ssid: impl Into<String>, password: impl Into<String>) -> Result<Self, ConfigError> {
        let config = Self {
            ssid: ssid.into(),
            password: password.into(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Create a configuration for an open network.
    pub fn open(ssid: impl Into<String>) -> Result<Self, ConfigError> {
        Self::new(ssid, String::new())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_ssid(&self.ssid)?;
        check_password(&self.password)
    }

    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn is_open(&self) -> bool {
        self.password.is_empty()
    }
}

impl fmt::Debug for StaConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaConfig")
            .field("ssid", &self.ssid)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Soft access-point parameters.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct ApConfig {
    ssid: String,
    password: String,
    channel: u8,
    hidden: bool,
}

impl ApConfig {
    /// Create a validated soft-AP configuration.
    ///
    /// An empty password starts an open AP, otherwise WPA2-PSK is used.
    pub fn new(
        ssid: impl Into<String>,
        password: impl Into<String>,
        channel: u8,
        hidden: bool,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            ssid: ssid.into(),
            password: password.into(),
            channel,
            hidden,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn open(ssid: impl Into<String>, channel: u8) -> Result<Self, ConfigError> {
        Self::new(ssid, String::new(), channel, false)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_ssid(&self.ssid)?;
        check_password(&self.password)?;
        if self.channel == 0 || self.channel > MAX_AP_CHANNEL {
            return Err(ConfigError::InvalidChannel(self.channel));
        }
        Ok(())
    }

    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn hidden(&self) -> bool {
        self.hidden
    }

    pub fn is_open(&self) -> bool {
        self.password.is_empty()
    }
}

impl fmt::Debug for ApConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApConfig")
            .field("ssid", &self.ssid)
            .field("channel", &self.channel)
            .field("hidden", &self.hidden)
            .field("open", &self.is_open())
            .finish()
    }
}

/// Errors that can occur while building or parsing configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// SSID is empty.
    SsidEmpty,
    /// SSID exceeds maximum length.
    SsidTooLong { len: usize, max: usize },
    /// Password is too short for WPA2.
    PasswordTooShort { len: usize, min: usize },
    /// Password exceeds maximum length.
    PasswordTooLong { len: usize, max: usize },
    /// Soft-AP channel outside 1..=14.
    InvalidChannel(u8),
    /// Malformed input while parsing.
    InvalidFormat(String),
    /// Unknown shell command.
    UnknownCommand(String),
    /// A tunable is out of range.
    InvalidConfig(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SsidEmpty => write!(f, "SSID cannot be empty"),
            Self::SsidTooLong { len, max } => {
                write!(f, "SSID too long: {} bytes (max {})", len, max)
            }
            Self::PasswordTooShort { len, min } => {
                write!(f, "password too short: {} bytes (min {})", len, min)
            }
            Self::PasswordTooLong { len, max } => {
                write!(f, "password too long: {} bytes (max {})", len, max)
            }
            Self::InvalidChannel(ch) => {
                write!(f, "invalid channel {} (1-{})", ch, MAX_AP_CHANNEL)
            }
            Self::InvalidFormat(msg) => write!(f, "invalid format: {}", msg),
            Self::UnknownCommand(cmd) => write!(f, "unknown command: {}", cmd),
            Self::InvalidConfig(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
