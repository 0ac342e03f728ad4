//! WiFi connection manager.
//!
//! A single-worker event loop drives a connection state machine that scans,
//! associates, runs DHCP and roams between access points of the same network.
//! The radio and the IP stack sit behind the [`driver`] traits, so everything
//! here runs and is tested on the host against the [`sim`] implementations.
//!
//! # Components
//!
//! - [`eloop`] - message queue, timeouts and event bindings
//! - [`netlink`] - bridge between driver callbacks and the state machine
//! - [`mgmt`] - connection state machine, retries and roaming
//! - [`shell`] - command surface with blocking variants
//! - [`persistence`] - joined-network record for auto-connect

pub mod config;
pub mod driver;
pub mod eloop;
pub mod mgmt;
pub mod netlink;
pub mod persistence;
pub mod shell;
pub mod sim;

// Re-export commonly used items
pub use config::{ApConfig, ConfigError, MgmtConfig, StaConfig};
pub use driver::{IpStack, WifiDriver};
pub use eloop::{EloopError, EventLoop};
pub use mgmt::{build, MgmtError, WifiState, WifiSystem};
pub use netlink::{LinkStatus, Netlink, WifiStatusReport};
pub use persistence::{JoinedNetwork, JoinedNetworkStore, MemoryStore};
pub use shell::{ShellCommand, WifiControl};
