//! Netlink bridge between the radio driver and the connection manager.
//!
//! [`Netlink`] is the only component that calls into the [`WifiDriver`] and
//! the [`IpStack`]. It tracks the coarse [`LinkStatus`], the scan table and
//! the current association, and turns driver indications into
//! [`NetlinkMsg`]s handed to a [`LinkEventSink`] (normally the event loop).
//!
//! Indication entry points (`*_indicate`, `scan_result_notify`, `deliver`)
//! may be called from any thread. Internal state sits behind a short mutex
//! that is never held while calling the driver, the IP stack or the sink.

mod scan;

pub use scan::{ScanTable, MAX_SCAN_RECORDS};

use crate::config::{ApConfig, ConfigError, StaConfig};
use crate::driver::{
    Bssid, ConnectResult, ConnectedAp, DisconnectReason, DriverError, Indication, IpStack,
    MacDisplay, ScanRecord, SoftApStation, WifiDriver,
};
use log::{debug, info, warn};
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Static address of the soft-AP interface.
pub const SOFTAP_ADDR: Ipv4Addr = Ipv4Addr::new(192, 168, 237, 1);
pub const SOFTAP_NETMASK: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 0);
pub const SOFTAP_GATEWAY: Ipv4Addr = SOFTAP_ADDR;

/// Bridge-level outcome forwarded to the state machine as a reason code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum NetlinkMsg {
    ScanSucc = 1,
    ScanFail,
    ConnSuccess,
    ConnNoAp,
    ConnAssocFail,
    ConnHandshakeFail,
    ConnFail,
    DisconRekeyFail,
    DisconMicFail,
    DisconRecvDeauth,
    DisconNoBeacon,
    DisconApChanged,
    DisconFromUi,
    DisconUnspecified,
}

impl NetlinkMsg {
    const ALL: [NetlinkMsg; 14] = [
        Self::ScanSucc,
        Self::ScanFail,
        Self::ConnSuccess,
        Self::ConnNoAp,
        Self::ConnAssocFail,
        Self::ConnHandshakeFail,
        Self::ConnFail,
        Self::DisconRekeyFail,
        Self::DisconMicFail,
        Self::DisconRecvDeauth,
        Self::DisconNoBeacon,
        Self::DisconApChanged,
        Self::DisconFromUi,
        Self::DisconUnspecified,
    ];

    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn from_code(code: u16) -> Option<Self> {
        Self::ALL.iter().copied().find(|m| m.code() == code)
    }

    pub fn is_disconnect(self) -> bool {
        self >= Self::DisconRekeyFail
    }

    fn from_disconnect(reason: DisconnectReason) -> Self {
        match reason {
            DisconnectReason::RekeyFail => Self::DisconRekeyFail,
            DisconnectReason::MicFail => Self::DisconMicFail,
            DisconnectReason::Deauth | DisconnectReason::Disassoc => Self::DisconRecvDeauth,
            DisconnectReason::NoBeacon => Self::DisconNoBeacon,
            DisconnectReason::ApChanged => Self::DisconApChanged,
            DisconnectReason::FromUi => Self::DisconFromUi,
            DisconnectReason::Unspecified => Self::DisconUnspecified,
        }
    }
}

impl PartialOrd for NetlinkMsg {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NetlinkMsg {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.code().cmp(&other.code())
    }
}

/// Coarse view of station connectivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LinkStatus {
    NoLink,
    NoLinkScanning,
    Linking,
    Linked,
    LinkedScanning,
    LinkedConfigured,
}

impl LinkStatus {
    pub fn is_linked(self) -> bool {
        self >= Self::Linked
    }

    pub fn is_scanning(self) -> bool {
        matches!(self, Self::NoLinkScanning | Self::LinkedScanning)
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NoLink => "no link",
            Self::NoLinkScanning => "no link (scanning)",
            Self::Linking => "linking",
            Self::Linked => "linked",
            Self::LinkedScanning => "linked (scanning)",
            Self::LinkedConfigured => "linked (configured)",
        };
        f.write_str(s)
    }
}

/// Receiver of bridge messages. Must be callable from any thread.
pub trait LinkEventSink: Send + Sync {
    fn forward(&self, msg: NetlinkMsg);
}

/// Errors returned by bridge commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetlinkError {
    /// Request failed credential policy.
    Config(ConfigError),
    /// Driver refused the request synchronously.
    Driver(DriverError),
    /// No station link to act on.
    NotLinked,
    /// Soft-AP is not running.
    ApNotStarted,
}

impl fmt::Display for NetlinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "{}", e),
            Self::Driver(e) => write!(f, "{}", e),
            Self::NotLinked => write!(f, "not connected"),
            Self::ApNotStarted => write!(f, "soft-AP not started"),
        }
    }
}

impl std::error::Error for NetlinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Driver(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for NetlinkError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<DriverError> for NetlinkError {
    fn from(e: DriverError) -> Self {
        Self::Driver(e)
    }
}

/// Snapshot rendered by the shell `status` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WifiStatusReport {
    /// The device has not been opened, or was closed.
    Closed,
    SoftAp {
        ssid: String,
        channel: u8,
        secured: bool,
        hidden: bool,
        stations: Vec<SoftApStation>,
    },
    Station {
        ap: ConnectedAp,
        addr: Option<Ipv4Addr>,
    },
    Idle {
        status: LinkStatus,
    },
}

impl fmt::Display for WifiStatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "mode: closed"),
            Self::SoftAp {
                ssid,
                channel,
                secured,
                hidden,
                stations,
            } => {
                writeln!(f, "mode: soft-AP")?;
                writeln!(f, "ssid: {}{}", ssid, if *hidden { " (hidden)" } else { "" })?;
                writeln!(f, "channel: {}", channel)?;
                write!(f, "security: {}", if *secured { "WPA2-PSK" } else { "OPEN" })?;
                for (i, sta) in stations.iter().enumerate() {
                    write!(f, "\nclient[{}]: {} {}", i, MacDisplay(&sta.mac), sta.ip)?;
                }
                Ok(())
            }
            Self::Station { ap, addr } => {
                writeln!(f, "mode: station")?;
                writeln!(f, "ssid: {}", ap.ssid)?;
                writeln!(f, "bssid: {}", MacDisplay(&ap.bssid))?;
                writeln!(f, "channel: {} ({:?}, {:?})", ap.channel, ap.bandwidth, ap.mode)?;
                writeln!(f, "rssi: {} dBm", ap.rssi)?;
                match addr {
                    Some(ip) => write!(f, "ip: {}", ip),
                    None => write!(f, "ip: (none)"),
                }
            }
            Self::Idle { status } => write!(f, "mode: station\nlink: {}", status),
        }
    }
}

#[derive(Debug)]
struct LinkState {
    opened: bool,
    status: LinkStatus,
    scan_ready: bool,
    scan: ScanTable,
    desired: Option<StaConfig>,
    linked: Option<ConnectedAp>,
    addr: Option<Ipv4Addr>,
    last_disconnect: Option<DisconnectReason>,
    ap: Option<ApConfig>,
    stations: Vec<SoftApStation>,
}

impl Default for LinkState {
    fn default() -> Self {
        Self {
            opened: false,
            status: LinkStatus::NoLink,
            scan_ready: false,
            scan: ScanTable::new(),
            desired: None,
            linked: None,
            addr: None,
            last_disconnect: None,
            ap: None,
            stations: Vec::new(),
        }
    }
}

impl LinkState {
    fn drop_link(&mut self) {
        self.linked = None;
        self.addr = None;
        self.status = LinkStatus::NoLink;
    }
}

/// The bridge.
pub struct Netlink {
    driver: Arc<dyn WifiDriver>,
    ip: Arc<dyn IpStack>,
    sink: Box<dyn LinkEventSink>,
    state: Mutex<LinkState>,
}

impl Netlink {
    pub fn new(
        driver: Arc<dyn WifiDriver>,
        ip: Arc<dyn IpStack>,
        sink: Box<dyn LinkEventSink>,
    ) -> Self {
        Self {
            driver,
            ip,
            sink,
            state: Mutex::new(LinkState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, LinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ===== Queries =====

    pub fn link_status(&self) -> LinkStatus {
        self.state().status
    }

    pub fn scan_ready(&self) -> bool {
        self.state().scan_ready
    }

    pub fn linked_ap(&self) -> Option<ConnectedAp> {
        self.state().linked.clone()
    }

    pub fn ip_addr(&self) -> Option<Ipv4Addr> {
        self.state().addr
    }

    pub fn last_disconnect_reason(&self) -> Option<DisconnectReason> {
        self.state().last_disconnect
    }

    pub fn ap_started(&self) -> bool {
        self.state().ap.is_some()
    }

    pub fn is_open(&self) -> bool {
        self.state().opened
    }

    /// Clients currently associated with the soft-AP.
    pub fn softap_stations(&self) -> Vec<SoftApStation> {
        self.state().stations.clone()
    }

    /// Network the state machine should scan for and join.
    pub fn desired(&self) -> Option<StaConfig> {
        self.state().desired.clone()
    }

    pub fn set_desired(&self, config: StaConfig) {
        self.state().desired = Some(config);
    }

    pub fn status(&self) -> WifiStatusReport {
        let state = self.state();
        if !state.opened {
            return WifiStatusReport::Closed;
        }
        if let Some(ap) = &state.ap {
            return WifiStatusReport::SoftAp {
                ssid: ap.ssid().to_string(),
                channel: ap.channel(),
                secured: !ap.is_open(),
                hidden: ap.hidden(),
                stations: state.stations.clone(),
            };
        }
        match (&state.linked, state.status.is_linked()) {
            (Some(ap), true) => WifiStatusReport::Station {
                ap: ap.clone(),
                addr: state.addr,
            },
            _ => WifiStatusReport::Idle {
                status: state.status,
            },
        }
    }

    // ===== Device lifecycle =====

    /// Open the device. No-op when already open.
    pub fn open(&self) {
        let mut state = self.state();
        if !state.opened {
            state.opened = true;
            info!("netlink: device opened");
        }
    }

    /// Close the device: drop the station link, stop the soft-AP and bring
    /// the interface down. Everything but the desired network is forgotten.
    pub fn close(&self) {
        if !self.is_open() {
            return;
        }
        if self.link_status().is_linked() {
            if let Err(e) = self.disconnect_request() {
                debug!("netlink: disconnect on close: {}", e);
            }
        }
        if self.ap_started() {
            if let Err(e) = self.ap_stop() {
                warn!("netlink: soft-AP stop on close failed: {}", e);
            }
        }
        self.ip.set_link(false);
        {
            let mut state = self.state();
            let desired = state.desired.take();
            *state = LinkState {
                desired,
                ..LinkState::default()
            };
        }
        info!("netlink: device closed");
    }

    // ===== Scanning =====

    /// Start a scan. Results arrive through [`scan_result_notify`](Self::scan_result_notify).
    pub fn scan_request(&self, ssid: Option<&str>) -> Result<(), NetlinkError> {
        let previous = {
            let mut state = self.state();
            let previous = state.status;
            state.status = match previous {
                LinkStatus::NoLink => LinkStatus::NoLinkScanning,
                LinkStatus::Linked | LinkStatus::LinkedConfigured => LinkStatus::LinkedScanning,
                other => other,
            };
            state.scan_ready = false;
            previous
        };

        debug!("netlink: scan request (ssid {:?})", ssid);
        if let Err(e) = self.driver.scan(ssid) {
            warn!("netlink: scan rejected: {}", e);
            let mut state = self.state();
            if state.status.is_scanning() {
                state.status = previous;
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// Driver callback: the scan finished.
    pub fn scan_result_notify(&self, success: bool) {
        let bound = self.ip.bound_addr().is_some();
        let records = if success {
            self.driver.scan_results()
        } else {
            Vec::new()
        };

        let count = {
            let mut state = self.state();
            state.status = match state.status {
                LinkStatus::NoLinkScanning => LinkStatus::NoLink,
                LinkStatus::LinkedScanning if bound => LinkStatus::LinkedConfigured,
                LinkStatus::LinkedScanning => LinkStatus::Linked,
                other => other,
            };
            if success {
                let count = state.scan.load(records);
                state.scan_ready = true;
                Some(count)
            } else {
                None
            }
        };

        match count {
            Some(n) => {
                info!("netlink: scan done, {} networks", n);
                self.sink.forward(NetlinkMsg::ScanSucc);
            }
            None => {
                warn!("netlink: scan failed");
                self.sink.forward(NetlinkMsg::ScanFail);
            }
        }
    }

    /// Rebuild the sorted scan view and visit each entry, strongest first.
    /// Returns the number of de-duplicated entries.
    pub fn scan_list_get(&self, visitor: Option<&mut dyn FnMut(&ScanRecord)>) -> usize {
        let entries = {
            let mut state = self.state();
            state.scan.rebuild();
            if visitor.is_none() {
                return state.scan.len();
            }
            state.scan.iter().cloned().collect::<Vec<_>>()
        };
        if let Some(visit) = visitor {
            entries.iter().for_each(|rec| visit(rec));
        }
        entries.len()
    }

    /// Snapshot of the sorted scan view.
    pub fn scan_list(&self) -> Vec<ScanRecord> {
        let mut out = Vec::new();
        self.scan_list_get(Some(&mut |rec: &ScanRecord| out.push(rec.clone())));
        out
    }

    /// Channel of `bssid` in the last scan, if it was seen.
    pub fn ap_channel(&self, bssid: &[u8; 6]) -> Option<u8> {
        self.state()
            .scan
            .iter()
            .find(|r| &r.bssid == bssid)
            .map(|r| r.channel)
    }

    // ===== Station link =====

    /// Submit an association request. The outcome arrives through
    /// [`connect_indicate`](Self::connect_indicate).
    pub fn connect_request(&self, config: &StaConfig) -> Result<(), NetlinkError> {
        config.validate()?;

        if self.ap_started() {
            info!("netlink: leaving soft-AP mode before connecting");
            self.close();
            self.open();
        }

        self.state().status = LinkStatus::Linking;
        info!("netlink: connecting to {}", config.ssid());
        self.driver.connect(config)?;
        Ok(())
    }

    /// Driver callback: association finished.
    pub fn connect_indicate(&self, result: ConnectResult) {
        let msg = {
            let mut state = self.state();
            if state.status != LinkStatus::Linking {
                debug!(
                    "netlink: connect result {:?} ignored in {:?}",
                    result, state.status
                );
                return;
            }
            match result {
                ConnectResult::Success(ap) => {
                    info!(
                        "netlink: associated with {} ({}) ch {}",
                        ap.ssid,
                        MacDisplay(&ap.bssid),
                        ap.channel
                    );
                    state.linked = Some(ap);
                    state.status = LinkStatus::Linked;
                    NetlinkMsg::ConnSuccess
                }
                failure => {
                    state.drop_link();
                    match failure {
                        ConnectResult::ApNotFound => NetlinkMsg::ConnNoAp,
                        ConnectResult::AuthFail | ConnectResult::AssocFail => {
                            NetlinkMsg::ConnAssocFail
                        }
                        ConnectResult::HandshakeFail => NetlinkMsg::ConnHandshakeFail,
                        _ => NetlinkMsg::ConnFail,
                    }
                }
            }
        };
        if msg != NetlinkMsg::ConnSuccess {
            warn!("netlink: connect failed: {:?}", msg);
        }
        self.sink.forward(msg);
    }

    /// Tear down the station link.
    pub fn disconnect_request(&self) -> Result<(), NetlinkError> {
        if !self.link_status().is_linked() {
            info!("netlink: not connected");
            return Err(NetlinkError::NotLinked);
        }
        if let Err(e) = self.driver.disconnect() {
            warn!("netlink: driver disconnect failed: {}", e);
        }
        self.state().drop_link();
        info!("netlink: disconnected");
        Ok(())
    }

    /// Driver callback: the link dropped.
    pub fn disconnect_indicate(&self, reason: DisconnectReason, ssid: &str) {
        let msg = NetlinkMsg::from_disconnect(reason);
        {
            let mut state = self.state();
            state.last_disconnect = Some(reason);
            match state.status {
                LinkStatus::NoLink | LinkStatus::NoLinkScanning => {
                    debug!("netlink: disconnect {:?} while idle", reason);
                    return;
                }
                LinkStatus::Linking => state.drop_link(),
                _ => {
                    // Not forwarded: the link it names is already gone.
                    let same = state.linked.as_ref().map(|ap| ap.ssid == ssid);
                    if same == Some(false) {
                        info!("netlink: disconnect from {} ignored, not associated", ssid);
                        return;
                    }
                    state.drop_link();
                }
            }
        }
        // Drop any lease handed out on the old link.
        self.ip.dhcp_stop();
        warn!("netlink: link lost: {:?}", reason);
        self.sink.forward(msg);
    }

    /// Record the DHCP-assigned address.
    pub fn ip_configured(&self, addr: Ipv4Addr) {
        let mut state = self.state();
        state.addr = Some(addr);
        if state.status.is_linked() {
            state.status = LinkStatus::LinkedConfigured;
        }
        info!("netlink: address {}", addr);
    }

    /// Forget the current association without calling the driver.
    pub fn reset_link(&self) {
        self.state().drop_link();
    }

    /// Signal strength of the current association, 0 when not linked.
    pub fn bss_rssi(&self) -> i32 {
        if !self.link_status().is_linked() {
            return 0;
        }
        let rssi = self.driver.rssi().unwrap_or(0);
        if let Some(ap) = self.state().linked.as_mut() {
            ap.rssi = rssi;
        }
        rssi
    }

    /// Route a driver indication to its handler.
    pub fn deliver(&self, indication: Indication) {
        match indication {
            Indication::ScanDone { success } => self.scan_result_notify(success),
            Indication::Connect(result) => self.connect_indicate(result),
            Indication::Disconnect { reason, ssid } => self.disconnect_indicate(reason, &ssid),
            Indication::SoftApStaAdd { mac, ip } => self.softap_sta_add(mac, ip),
            Indication::SoftApStaDel { mac } => self.softap_sta_del(mac),
        }
    }

    // ===== Soft-AP =====

    /// Start the soft-AP, dropping any station link first.
    pub fn ap_start(&self, config: ApConfig) -> Result<(), NetlinkError> {
        config.validate()?;

        if self.link_status().is_linked() {
            self.disconnect_request()?;
        }
        if self.ap_started() {
            info!("netlink: restarting radio for new soft-AP");
            self.close();
            self.driver.restart()?;
        }
        self.open();

        self.driver.ap_start(&config)?;
        self.ip.set_static(SOFTAP_ADDR, SOFTAP_NETMASK, SOFTAP_GATEWAY);
        self.ip.dhcp_server_start();
        self.ip.set_link(true);
        info!(
            "netlink: soft-AP {} on channel {} ({})",
            config.ssid(),
            config.channel(),
            if config.is_open() { "open" } else { "WPA2" }
        );
        self.state().ap = Some(config);
        Ok(())
    }

    pub fn ap_stop(&self) -> Result<(), NetlinkError> {
        if !self.ap_started() {
            return Err(NetlinkError::ApNotStarted);
        }
        self.driver.ap_stop()?;
        self.ip.dhcp_server_stop();
        self.ip.set_link(false);
        {
            let mut state = self.state();
            state.ap = None;
            state.stations.clear();
        }
        info!("netlink: soft-AP stopped");
        Ok(())
    }

    /// Driver callback: a client joined the soft-AP.
    pub fn softap_sta_add(&self, mac: Bssid, ip: Ipv4Addr) {
        let mut state = self.state();
        if state.ap.is_none() {
            debug!("netlink: station {} ignored, soft-AP down", MacDisplay(&mac));
            return;
        }
        match state.stations.iter_mut().find(|sta| sta.mac == mac) {
            Some(sta) => sta.ip = ip,
            None => state.stations.push(SoftApStation { mac, ip }),
        }
        info!("netlink: station {} joined ({})", MacDisplay(&mac), ip);
    }

    /// Driver callback: a client left the soft-AP.
    pub fn softap_sta_del(&self, mac: Bssid) {
        let mut state = self.state();
        let before = state.stations.len();
        state.stations.retain(|sta| sta.mac != mac);
        if state.stations.len() != before {
            info!("netlink: station {} left", MacDisplay(&mac));
        }
    }
}

impl fmt::Debug for Netlink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Netlink")
            .field("state", &*self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::Security;
    use crate::sim::{DriverCall, SimDriver, SimIpStack};

    #[derive(Default)]
    struct Collect(Mutex<Vec<NetlinkMsg>>);

    impl LinkEventSink for Arc<Collect> {
        fn forward(&self, msg: NetlinkMsg) {
            self.0.lock().unwrap().push(msg);
        }
    }

    impl Collect {
        fn take(&self) -> Vec<NetlinkMsg> {
            std::mem::take(&mut *self.0.lock().unwrap())
        }
    }

    struct Fixture {
        netlink: Netlink,
        driver: Arc<SimDriver>,
        ip: Arc<SimIpStack>,
        sink: Arc<Collect>,
    }

    fn fixture() -> Fixture {
        let (driver, _rx) = SimDriver::new();
        let driver = Arc::new(driver);
        driver.add_ap("home", [2, 0, 0, 0, 0, 1], -50, 6, "password1");
        driver.add_ap("home", [2, 0, 0, 0, 0, 2], -70, 11, "password1");
        driver.add_ap("cafe", [2, 0, 0, 0, 0, 3], -60, 1, "");
        let ip = Arc::new(SimIpStack::new(Some(Ipv4Addr::new(10, 0, 0, 9))));
        let sink = Arc::new(Collect::default());
        let netlink = Netlink::new(driver.clone(), ip.clone(), Box::new(sink.clone()));
        netlink.open();
        Fixture {
            netlink,
            driver,
            ip,
            sink,
        }
    }

    fn linked_ap(ssid: &str) -> ConnectedAp {
        ConnectedAp {
            ssid: ssid.to_string(),
            bssid: [2, 0, 0, 0, 0, 1],
            channel: 6,
            bandwidth: crate::driver::Bandwidth::Ht20,
            mode: crate::driver::WirelessMode::Bgn,
            rssi: -50,
        }
    }

    fn link_up(f: &Fixture, ssid: &str) {
        let config = StaConfig::new(ssid, "password1").unwrap();
        f.netlink.connect_request(&config).unwrap();
        f.netlink.connect_indicate(ConnectResult::Success(linked_ap(ssid)));
        f.sink.take();
    }

    // ===== NetlinkMsg Tests =====

    #[test]
    fn test_msg_codes_roundtrip() {
        assert_eq!(NetlinkMsg::ScanSucc.code(), 1);
        assert_eq!(NetlinkMsg::DisconUnspecified.code(), 14);
        assert_eq!(NetlinkMsg::from_code(10), Some(NetlinkMsg::DisconRecvDeauth));
        assert_eq!(NetlinkMsg::from_code(0), None);
        assert!(NetlinkMsg::DisconNoBeacon.is_disconnect());
        assert!(!NetlinkMsg::ConnFail.is_disconnect());
    }

    // ===== Scan Tests =====

    #[test]
    fn test_scan_sets_and_unwinds_status() {
        let f = fixture();
        f.netlink.scan_request(None).unwrap();
        assert_eq!(f.netlink.link_status(), LinkStatus::NoLinkScanning);
        assert!(!f.netlink.scan_ready());

        f.netlink.scan_result_notify(true);
        assert_eq!(f.netlink.link_status(), LinkStatus::NoLink);
        assert!(f.netlink.scan_ready());
        assert_eq!(f.sink.take(), vec![NetlinkMsg::ScanSucc]);
        assert_eq!(f.netlink.scan_list_get(None), 2);
    }

    #[test]
    fn test_linked_scan_unwinds_to_configured_when_bound() {
        let f = fixture();
        link_up(&f, "home");
        f.ip.dhcp_start();
        f.netlink.ip_configured(Ipv4Addr::new(10, 0, 0, 9));
        f.netlink.scan_request(None).unwrap();
        assert_eq!(f.netlink.link_status(), LinkStatus::LinkedScanning);
        f.netlink.scan_result_notify(false);
        assert_eq!(f.netlink.link_status(), LinkStatus::LinkedConfigured);
        assert_eq!(f.sink.take(), vec![NetlinkMsg::ScanFail]);
        assert!(!f.netlink.scan_ready());
    }

    #[test]
    fn test_linked_scan_unwinds_to_linked_without_address() {
        let f = fixture();
        link_up(&f, "home");
        f.netlink.scan_request(None).unwrap();
        f.netlink.scan_result_notify(true);
        assert_eq!(f.netlink.link_status(), LinkStatus::Linked);
    }

    #[test]
    fn test_rejected_scan_restores_status() {
        let f = fixture();
        f.driver.set_reject_scan(true);
        assert!(matches!(
            f.netlink.scan_request(None),
            Err(NetlinkError::Driver(DriverError::Busy))
        ));
        assert_eq!(f.netlink.link_status(), LinkStatus::NoLink);
    }

    #[test]
    fn test_scan_list_visitor_order() {
        let f = fixture();
        f.netlink.scan_request(None).unwrap();
        f.netlink.scan_result_notify(true);
        let mut seen = Vec::new();
        let n = f
            .netlink
            .scan_list_get(Some(&mut |r: &ScanRecord| seen.push((r.ssid.clone(), r.rssi))));
        assert_eq!(n, 2);
        assert_eq!(seen, vec![("home".to_string(), -50), ("cafe".to_string(), -60)]);
        assert_eq!(f.netlink.ap_channel(&[2, 0, 0, 0, 0, 3]), Some(1));
        assert_eq!(f.netlink.ap_channel(&[2, 0, 0, 0, 0, 2]), None);
        assert_eq!(f.netlink.scan_list()[1].security, Security::Open);
    }

    // ===== Connect Tests =====

    #[test]
    fn test_connect_request_sets_linking() {
        let f = fixture();
        let config = StaConfig::new("home", "password1").unwrap();
        f.netlink.connect_request(&config).unwrap();
        assert_eq!(f.netlink.link_status(), LinkStatus::Linking);
        assert!(f
            .driver
            .calls()
            .iter()
            .any(|c| matches!(c, DriverCall::Connect(ssid) if ssid == "home")));
    }

    #[test]
    fn test_connect_success_records_ap() {
        let f = fixture();
        link_up(&f, "home");
        assert_eq!(f.netlink.link_status(), LinkStatus::Linked);
        assert_eq!(f.netlink.linked_ap().unwrap().ssid, "home");
    }

    #[test]
    fn test_connect_failure_maps_codes() {
        let cases = [
            (ConnectResult::ApNotFound, NetlinkMsg::ConnNoAp),
            (ConnectResult::AuthFail, NetlinkMsg::ConnAssocFail),
            (ConnectResult::AssocFail, NetlinkMsg::ConnAssocFail),
            (ConnectResult::HandshakeFail, NetlinkMsg::ConnHandshakeFail),
            (ConnectResult::Other, NetlinkMsg::ConnFail),
        ];
        for (result, expected) in cases {
            let f = fixture();
            f.netlink
                .connect_request(&StaConfig::open("cafe").unwrap())
                .unwrap();
            f.netlink.connect_indicate(result);
            assert_eq!(f.netlink.link_status(), LinkStatus::NoLink);
            assert_eq!(f.sink.take(), vec![expected]);
        }
    }

    #[test]
    fn test_connect_indicate_outside_linking_dropped() {
        let f = fixture();
        f.netlink.connect_indicate(ConnectResult::Success(linked_ap("home")));
        assert_eq!(f.netlink.link_status(), LinkStatus::NoLink);
        assert!(f.sink.take().is_empty());
    }

    // ===== Disconnect Tests =====

    #[test]
    fn test_disconnect_request_requires_link() {
        let f = fixture();
        assert_eq!(f.netlink.disconnect_request(), Err(NetlinkError::NotLinked));
        link_up(&f, "home");
        f.netlink.disconnect_request().unwrap();
        assert_eq!(f.netlink.link_status(), LinkStatus::NoLink);
        assert!(f.netlink.linked_ap().is_none());
        assert!(f.driver.calls().contains(&DriverCall::Disconnect));
    }

    #[test]
    fn test_disconnect_indicate_forwards_reason() {
        let f = fixture();
        link_up(&f, "home");
        f.netlink.disconnect_indicate(DisconnectReason::Disassoc, "home");
        assert_eq!(f.sink.take(), vec![NetlinkMsg::DisconRecvDeauth]);
        assert_eq!(f.netlink.link_status(), LinkStatus::NoLink);
        assert_eq!(
            f.netlink.last_disconnect_reason(),
            Some(DisconnectReason::Disassoc)
        );
    }

    #[test]
    fn test_disconnect_indicate_ignored_when_idle() {
        let f = fixture();
        f.netlink.disconnect_indicate(DisconnectReason::NoBeacon, "home");
        assert!(f.sink.take().is_empty());
    }

    #[test]
    fn test_disconnect_indicate_other_ssid_ignored() {
        let f = fixture();
        link_up(&f, "home");
        f.netlink.disconnect_indicate(DisconnectReason::NoBeacon, "elsewhere");
        assert!(f.sink.take().is_empty());
        assert_eq!(f.netlink.link_status(), LinkStatus::Linked);
    }

    #[test]
    fn test_disconnect_indicate_while_linking() {
        let f = fixture();
        f.netlink
            .connect_request(&StaConfig::open("cafe").unwrap())
            .unwrap();
        f.netlink.disconnect_indicate(DisconnectReason::Unspecified, "cafe");
        assert_eq!(f.sink.take(), vec![NetlinkMsg::DisconUnspecified]);
        assert_eq!(f.netlink.link_status(), LinkStatus::NoLink);
    }

    #[test]
    fn test_bss_rssi() {
        let f = fixture();
        assert_eq!(f.netlink.bss_rssi(), 0);
        link_up(&f, "home");
        f.driver.set_rssi(-81);
        assert_eq!(f.netlink.bss_rssi(), -81);
        assert_eq!(f.netlink.linked_ap().unwrap().rssi, -81);
    }

    // ===== Soft-AP Tests =====

    #[test]
    fn test_ap_start_drops_station_link() {
        let f = fixture();
        link_up(&f, "home");
        f.netlink
            .ap_start(ApConfig::new("setup", "apsecret1", 6, false).unwrap())
            .unwrap();
        assert_eq!(f.netlink.link_status(), LinkStatus::NoLink);
        assert!(f.ip.link_up());
        assert_eq!(f.ip.static_addr(), Some(SOFTAP_ADDR));
        match f.netlink.status() {
            WifiStatusReport::SoftAp { ssid, secured, .. } => {
                assert_eq!(ssid, "setup");
                assert!(secured);
            }
            other => panic!("unexpected status {:?}", other),
        }
    }

    #[test]
    fn test_ap_restart_and_stop() {
        let f = fixture();
        f.netlink.ap_start(ApConfig::open("one", 1).unwrap()).unwrap();
        f.netlink.ap_start(ApConfig::open("two", 6).unwrap()).unwrap();
        assert!(f.driver.calls().contains(&DriverCall::Restart));
        f.netlink.ap_stop().unwrap();
        assert!(!f.ip.link_up());
        assert_eq!(f.netlink.ap_stop(), Err(NetlinkError::ApNotStarted));
    }

    #[test]
    fn test_ap_serves_leases_while_running() {
        let f = fixture();
        f.netlink.ap_start(ApConfig::open("setup", 1).unwrap()).unwrap();
        assert!(f.ip.dhcp_server_running());
        f.netlink.ap_stop().unwrap();
        assert!(!f.ip.dhcp_server_running());
    }

    #[test]
    fn test_softap_stations_tracked() {
        let f = fixture();
        let first = Ipv4Addr::new(192, 168, 237, 2);
        let second = Ipv4Addr::new(192, 168, 237, 3);

        // No soft-AP yet.
        f.netlink.softap_sta_add([7; 6], first);
        assert!(f.netlink.softap_stations().is_empty());

        f.netlink.ap_start(ApConfig::open("setup", 1).unwrap()).unwrap();
        f.netlink.deliver(Indication::SoftApStaAdd { mac: [7; 6], ip: first });
        f.netlink.deliver(Indication::SoftApStaAdd { mac: [8; 6], ip: second });
        assert_eq!(f.netlink.softap_stations().len(), 2);

        let text = f.netlink.status().to_string();
        assert!(text.contains("client[0]: 07:07:07:07:07:07 192.168.237.2"));
        assert!(text.contains("client[1]: 08:08:08:08:08:08 192.168.237.3"));

        f.netlink.deliver(Indication::SoftApStaDel { mac: [7; 6] });
        assert_eq!(
            f.netlink.softap_stations(),
            vec![SoftApStation { mac: [8; 6], ip: second }]
        );

        f.netlink.ap_stop().unwrap();
        assert!(f.netlink.softap_stations().is_empty());
        assert!(f.sink.take().is_empty());
    }

    #[test]
    fn test_connect_stops_soft_ap() {
        let f = fixture();
        f.netlink.ap_start(ApConfig::open("setup", 1).unwrap()).unwrap();
        f.netlink
            .connect_request(&StaConfig::open("cafe").unwrap())
            .unwrap();
        assert!(!f.netlink.ap_started());
        assert!(f.driver.calls().contains(&DriverCall::ApStop));
    }

    // ===== Lifecycle Tests =====

    #[test]
    fn test_status_closed_until_opened() {
        let (driver, _rx) = SimDriver::new();
        let ip = Arc::new(SimIpStack::new(None));
        let netlink = Netlink::new(Arc::new(driver), ip, Box::new(Arc::new(Collect::default())));
        assert!(!netlink.is_open());
        assert_eq!(netlink.status(), WifiStatusReport::Closed);
        assert_eq!(netlink.status().to_string(), "mode: closed");

        netlink.open();
        netlink.open();
        assert!(netlink.is_open());
        assert_eq!(netlink.status().to_string(), "mode: station\nlink: no link");
    }

    #[test]
    fn test_close_tears_down_and_keeps_desired() {
        let f = fixture();
        let config = StaConfig::new("home", "password1").unwrap();
        f.netlink.set_desired(config.clone());
        link_up(&f, "home");

        f.netlink.close();
        assert_eq!(f.netlink.status().to_string(), "mode: closed");
        assert_eq!(f.netlink.link_status(), LinkStatus::NoLink);
        assert!(f.netlink.linked_ap().is_none());
        assert!(f.driver.calls().contains(&DriverCall::Disconnect));
        assert!(!f.ip.link_up());
        assert_eq!(f.netlink.desired(), Some(config));

        // Closing twice is harmless.
        f.netlink.close();
        assert!(!f.netlink.is_open());
    }

    #[test]
    fn test_close_stops_soft_ap() {
        let f = fixture();
        f.netlink.ap_start(ApConfig::open("setup", 1).unwrap()).unwrap();
        f.netlink.close();
        assert!(!f.netlink.ap_started());
        assert!(!f.ip.dhcp_server_running());
        assert!(f.driver.calls().contains(&DriverCall::ApStop));
    }

    #[test]
    fn test_ap_start_opens_device() {
        let f = fixture();
        f.netlink.close();
        f.netlink.ap_start(ApConfig::open("setup", 1).unwrap()).unwrap();
        assert!(f.netlink.is_open());
        assert!(matches!(f.netlink.status(), WifiStatusReport::SoftAp { .. }));
    }

    #[test]
    fn test_status_report_rendering() {
        let f = fixture();
        assert_eq!(f.netlink.status().to_string(), "mode: station\nlink: no link");
        link_up(&f, "home");
        f.netlink.ip_configured(Ipv4Addr::new(10, 0, 0, 9));
        let text = f.netlink.status().to_string();
        assert!(text.contains("ssid: home"));
        assert!(text.contains("bssid: 02:00:00:00:00:01"));
        assert!(text.contains("ip: 10.0.0.9"));
    }
}
