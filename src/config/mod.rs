//! Connection manager configuration.
//!
//! # Components
//!
//! - [`wifi`] - station and soft-AP credential policy (host-testable)
//! - [`mgmt`] - retry, polling and roaming tunables

mod mgmt;
mod wifi;

pub(crate) use mgmt::as_delay_ms;
pub use mgmt::MgmtConfig;
pub use wifi::{
    ApConfig, ConfigError, StaConfig, DEFAULT_AP_CHANNEL, MAX_AP_CHANNEL, MAX_PASSWORD_LEN,
    MAX_SSID_LEN, MIN_PASSWORD_LEN,
};
