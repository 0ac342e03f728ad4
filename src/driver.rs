//! Boundary to the radio driver and the IP stack.
//!
//! Both collaborators are external to the connection manager. The bridge
//! calls into them through [`WifiDriver`] and [`IpStack`]; the driver reports
//! asynchronous outcomes back as [`Indication`]s delivered to
//! [`Netlink::deliver`](crate::netlink::Netlink::deliver).
//!
//! Every trait method must return promptly. Operations such as `connect` only
//! submit a request; the outcome arrives later as an indication.

use crate::config::{ApConfig, StaConfig};
use std::fmt;
use std::net::Ipv4Addr;

/// MAC address of an access point radio.
pub type Bssid = [u8; 6];

/// Formats a BSSID as `aa:bb:cc:dd:ee:ff`.
pub struct MacDisplay<'a>(pub &'a Bssid);

impl fmt::Display for MacDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

/// Security advertised by an access point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Security {
    Open,
    Wep,
    WpaPsk,
    Wpa2Psk,
    WpaWpa2Psk,
    Wpa3Sae,
}

impl fmt::Display for Security {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Open => "OPEN",
            Self::Wep => "WEP",
            Self::WpaPsk => "WPA-PSK",
            Self::Wpa2Psk => "WPA2-PSK",
            Self::WpaWpa2Psk => "WPA/WPA2-PSK",
            Self::Wpa3Sae => "WPA3-SAE",
        };
        f.write_str(s)
    }
}

/// One access point seen during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRecord {
    pub ssid: String,
    pub bssid: Bssid,
    pub rssi: i32,
    pub channel: u8,
    /// Highest advertised rate in units of 500 kbit/s.
    pub rate: u16,
    pub security: Security,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bandwidth {
    Ht20,
    Ht40,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WirelessMode {
    B,
    G,
    N,
    Bg,
    Bgn,
}

/// The access point the station is currently associated with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectedAp {
    pub ssid: String,
    pub bssid: Bssid,
    pub channel: u8,
    pub bandwidth: Bandwidth,
    pub mode: WirelessMode,
    pub rssi: i32,
}

/// Outcome of an association attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectResult {
    Success(ConnectedAp),
    ApNotFound,
    AuthFail,
    AssocFail,
    HandshakeFail,
    Other,
}

/// Reason reported with a driver-side disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    RekeyFail,
    MicFail,
    Deauth,
    Disassoc,
    NoBeacon,
    ApChanged,
    FromUi,
    Unspecified,
}

/// A client associated with the soft-AP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoftApStation {
    pub mac: Bssid,
    pub ip: Ipv4Addr,
}

/// Asynchronous notification raised by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Indication {
    ScanDone { success: bool },
    Connect(ConnectResult),
    Disconnect { reason: DisconnectReason, ssid: String },
    /// A client joined the soft-AP and was leased `ip`.
    SoftApStaAdd { mac: Bssid, ip: Ipv4Addr },
    SoftApStaDel { mac: Bssid },
}

/// Synchronous rejection by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverError {
    /// Another operation is in progress.
    Busy,
    /// Request refused with a driver status code.
    Rejected(i32),
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Busy => write!(f, "driver busy"),
            Self::Rejected(code) => write!(f, "driver rejected request ({})", code),
        }
    }
}

impl std::error::Error for DriverError {}

/// Radio driver primitives.
pub trait WifiDriver: Send + Sync {
    /// Start a scan, restricted to `ssid` when given.
    fn scan(&self, ssid: Option<&str>) -> Result<(), DriverError>;

    /// Raw results of the last completed scan, in arrival order.
    fn scan_results(&self) -> Vec<ScanRecord>;

    /// Start associating with the network in `config`.
    fn connect(&self, config: &StaConfig) -> Result<(), DriverError>;

    fn disconnect(&self) -> Result<(), DriverError>;

    /// Signal strength of the current association.
    fn rssi(&self) -> Option<i32>;

    fn ap_start(&self, config: &ApConfig) -> Result<(), DriverError>;

    fn ap_stop(&self) -> Result<(), DriverError>;

    /// Reset the radio, dropping any soft-AP or station state.
    fn restart(&self) -> Result<(), DriverError>;
}

/// IP stack primitives used by the bridge and the DHCP poller.
pub trait IpStack: Send + Sync {
    fn dhcp_start(&self);

    fn dhcp_stop(&self);

    /// Address currently bound to the station interface.
    fn bound_addr(&self) -> Option<Ipv4Addr>;

    fn set_static(&self, addr: Ipv4Addr, netmask: Ipv4Addr, gateway: Ipv4Addr);

    fn set_link(&self, up: bool);

    /// Serve leases to soft-AP clients.
    fn dhcp_server_start(&self);

    fn dhcp_server_stop(&self);
}
