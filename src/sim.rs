//! In-process radio and IP stack simulation.
//!
//! [`SimDriver`] answers every request immediately and queues the matching
//! [`Indication`] on an unbounded channel. The host shell pumps that channel
//! into [`Netlink::deliver`](crate::netlink::Netlink::deliver) with a small
//! delay; tests read it directly to decide when each indication lands.

use crate::config::{ApConfig, StaConfig};
use crate::driver::{
    Bandwidth, Bssid, ConnectResult, ConnectedAp, DisconnectReason, DriverError, Indication,
    IpStack, ScanRecord, Security, WifiDriver, WirelessMode,
};
use log::debug;
use std::net::Ipv4Addr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

/// A request seen by the simulated driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
    Scan(Option<String>),
    Connect(String),
    Disconnect,
    ApStart(String),
    ApStop,
    Restart,
}

#[derive(Debug, Clone)]
struct SimAp {
    record: ScanRecord,
    password: String,
}

#[derive(Debug, Default)]
struct Radio {
    aps: Vec<SimAp>,
    calls: Vec<DriverCall>,
    associated: Option<ConnectedAp>,
    last_scan: Vec<ScanRecord>,
    reject_scan: bool,
    fail_scan: bool,
    reject_connect: bool,
    rssi_override: Option<i32>,
    ap_running: bool,
}

/// Simulated radio driver.
pub struct SimDriver {
    radio: Mutex<Radio>,
    indications: mpsc::UnboundedSender<Indication>,
}

impl SimDriver {
    /// Create a driver and the receiver its indications are queued on.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Indication>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let driver = Self {
            radio: Mutex::new(Radio::default()),
            indications: tx,
        };
        (driver, rx)
    }

    fn radio(&self) -> MutexGuard<'_, Radio> {
        self.radio.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn indicate(&self, indication: Indication) {
        if self.indications.send(indication).is_err() {
            debug!("sim: indication dropped, no receiver");
        }
    }

    /// Add an access point to the simulated air. An empty password makes it
    /// open, anything else WPA2-PSK.
    pub fn add_ap(&self, ssid: &str, bssid: Bssid, rssi: i32, channel: u8, password: &str) {
        let security = if password.is_empty() {
            Security::Open
        } else {
            Security::Wpa2Psk
        };
        self.radio().aps.push(SimAp {
            record: ScanRecord {
                ssid: ssid.to_string(),
                bssid,
                rssi,
                channel,
                rate: 108,
                security,
            },
            password: password.to_string(),
        });
    }

    /// Change the signal strength of an access point.
    pub fn set_ap_rssi(&self, bssid: Bssid, rssi: i32) {
        let mut radio = self.radio();
        for ap in radio.aps.iter_mut().filter(|ap| ap.record.bssid == bssid) {
            ap.record.rssi = rssi;
        }
        if let Some(cur) = radio.associated.as_mut().filter(|cur| cur.bssid == bssid) {
            cur.rssi = rssi;
        }
    }

    /// Force the RSSI reported for the current association.
    pub fn set_rssi(&self, rssi: i32) {
        self.radio().rssi_override = Some(rssi);
    }

    /// Refuse scan requests synchronously.
    pub fn set_reject_scan(&self, reject: bool) {
        self.radio().reject_scan = reject;
    }

    /// Accept scans but report them as failed.
    pub fn set_fail_scan(&self, fail: bool) {
        self.radio().fail_scan = fail;
    }

    pub fn set_reject_connect(&self, reject: bool) {
        self.radio().reject_connect = reject;
    }

    /// Drop the current association as if the AP went away.
    pub fn drop_link(&self, reason: DisconnectReason) {
        let dropped = self.radio().associated.take();
        if let Some(ap) = dropped {
            self.indicate(Indication::Disconnect {
                reason,
                ssid: ap.ssid,
            });
        }
    }

    /// A client joins the soft-AP. Ignored while no soft-AP runs.
    pub fn station_join(&self, mac: Bssid, ip: Ipv4Addr) {
        if self.radio().ap_running {
            self.indicate(Indication::SoftApStaAdd { mac, ip });
        }
    }

    pub fn station_leave(&self, mac: Bssid) {
        if self.radio().ap_running {
            self.indicate(Indication::SoftApStaDel { mac });
        }
    }

    pub fn ap_running(&self) -> bool {
        self.radio().ap_running
    }

    pub fn calls(&self) -> Vec<DriverCall> {
        self.radio().calls.clone()
    }

    pub fn associated(&self) -> Option<ConnectedAp> {
        self.radio().associated.clone()
    }
}

impl WifiDriver for SimDriver {
    fn scan(&self, ssid: Option<&str>) -> Result<(), DriverError> {
        let success = {
            let mut radio = self.radio();
            radio.calls.push(DriverCall::Scan(ssid.map(str::to_string)));
            if radio.reject_scan {
                return Err(DriverError::Busy);
            }
            radio.last_scan = radio
                .aps
                .iter()
                .filter(|ap| ssid.map_or(true, |s| ap.record.ssid == s))
                .map(|ap| ap.record.clone())
                .collect();
            !radio.fail_scan
        };
        self.indicate(Indication::ScanDone { success });
        Ok(())
    }

    fn scan_results(&self) -> Vec<ScanRecord> {
        self.radio().last_scan.clone()
    }

    fn connect(&self, config: &StaConfig) -> Result<(), DriverError> {
        let result = {
            let mut radio = self.radio();
            radio.calls.push(DriverCall::Connect(config.ssid().to_string()));
            if radio.reject_connect {
                return Err(DriverError::Rejected(-1));
            }
            let best = radio
                .aps
                .iter()
                .filter(|ap| ap.record.ssid == config.ssid())
                .max_by_key(|ap| ap.record.rssi)
                .cloned();
            match best {
                None => ConnectResult::ApNotFound,
                Some(ap) if ap.password != config.password() => ConnectResult::AuthFail,
                Some(ap) => {
                    let joined = ConnectedAp {
                        ssid: ap.record.ssid.clone(),
                        bssid: ap.record.bssid,
                        channel: ap.record.channel,
                        bandwidth: Bandwidth::Ht20,
                        mode: WirelessMode::Bgn,
                        rssi: ap.record.rssi,
                    };
                    radio.associated = Some(joined.clone());
                    radio.rssi_override = None;
                    ConnectResult::Success(joined)
                }
            }
        };
        self.indicate(Indication::Connect(result));
        Ok(())
    }

    fn disconnect(&self) -> Result<(), DriverError> {
        let mut radio = self.radio();
        radio.calls.push(DriverCall::Disconnect);
        radio.associated = None;
        Ok(())
    }

    fn rssi(&self) -> Option<i32> {
        let radio = self.radio();
        let current = radio.associated.as_ref()?;
        Some(radio.rssi_override.unwrap_or(current.rssi))
    }

    fn ap_start(&self, config: &ApConfig) -> Result<(), DriverError> {
        let mut radio = self.radio();
        radio.calls.push(DriverCall::ApStart(config.ssid().to_string()));
        radio.ap_running = true;
        Ok(())
    }

    fn ap_stop(&self) -> Result<(), DriverError> {
        let mut radio = self.radio();
        radio.calls.push(DriverCall::ApStop);
        radio.ap_running = false;
        Ok(())
    }

    fn restart(&self) -> Result<(), DriverError> {
        let mut radio = self.radio();
        radio.calls.push(DriverCall::Restart);
        radio.associated = None;
        radio.ap_running = false;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct IpState {
    lease: Option<Ipv4Addr>,
    dhcp_running: bool,
    dhcp_starts: u32,
    static_addr: Option<Ipv4Addr>,
    link_up: bool,
    dhcp_server: bool,
}

/// Simulated IP stack. DHCP binds the configured lease as soon as it runs.
pub struct SimIpStack {
    state: Mutex<IpState>,
}

impl SimIpStack {
    pub fn new(lease: Option<Ipv4Addr>) -> Self {
        Self {
            state: Mutex::new(IpState {
                lease,
                ..Default::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, IpState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Address handed out by DHCP; `None` makes DHCP never complete.
    pub fn set_lease(&self, lease: Option<Ipv4Addr>) {
        self.state().lease = lease;
    }

    pub fn dhcp_running(&self) -> bool {
        self.state().dhcp_running
    }

    pub fn dhcp_starts(&self) -> u32 {
        self.state().dhcp_starts
    }

    pub fn static_addr(&self) -> Option<Ipv4Addr> {
        self.state().static_addr
    }

    pub fn link_up(&self) -> bool {
        self.state().link_up
    }

    pub fn dhcp_server_running(&self) -> bool {
        self.state().dhcp_server
    }
}

impl IpStack for SimIpStack {
    fn dhcp_start(&self) {
        let mut state = self.state();
        state.dhcp_running = true;
        state.dhcp_starts += 1;
    }

    fn dhcp_stop(&self) {
        self.state().dhcp_running = false;
    }

    fn bound_addr(&self) -> Option<Ipv4Addr> {
        let state = self.state();
        if state.dhcp_running {
            state.lease
        } else {
            None
        }
    }

    fn set_static(&self, addr: Ipv4Addr, _netmask: Ipv4Addr, _gateway: Ipv4Addr) {
        self.state().static_addr = Some(addr);
    }

    fn set_link(&self, up: bool) {
        self.state().link_up = up;
    }

    fn dhcp_server_start(&self) {
        self.state().dhcp_server = true;
    }

    fn dhcp_server_stop(&self) {
        self.state().dhcp_server = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_filters_by_ssid() {
        let (driver, mut rx) = SimDriver::new();
        driver.add_ap("a", [1; 6], -40, 1, "");
        driver.add_ap("b", [2; 6], -50, 6, "password1");
        driver.scan(Some("b")).unwrap();
        assert_eq!(rx.try_recv().unwrap(), Indication::ScanDone { success: true });
        let results = driver.scan_results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].security, Security::Wpa2Psk);
    }

    #[test]
    fn test_connect_checks_password() {
        let (driver, mut rx) = SimDriver::new();
        driver.add_ap("home", [1; 6], -40, 1, "password1");
        driver.connect(&StaConfig::new("home", "wrongpass").unwrap()).unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            Indication::Connect(ConnectResult::AuthFail)
        );
        driver.connect(&StaConfig::open("away").unwrap()).unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            Indication::Connect(ConnectResult::ApNotFound)
        );
    }

    #[test]
    fn test_connect_picks_strongest_bssid() {
        let (driver, _rx) = SimDriver::new();
        driver.add_ap("home", [1; 6], -70, 1, "password1");
        driver.add_ap("home", [2; 6], -45, 11, "password1");
        driver.connect(&StaConfig::new("home", "password1").unwrap()).unwrap();
        assert_eq!(driver.associated().unwrap().bssid, [2; 6]);
        assert_eq!(driver.rssi(), Some(-45));
    }

    #[test]
    fn test_drop_link_indicates() {
        let (driver, mut rx) = SimDriver::new();
        driver.add_ap("home", [1; 6], -40, 1, "");
        driver.connect(&StaConfig::open("home").unwrap()).unwrap();
        rx.try_recv().unwrap();
        driver.drop_link(DisconnectReason::NoBeacon);
        assert_eq!(
            rx.try_recv().unwrap(),
            Indication::Disconnect {
                reason: DisconnectReason::NoBeacon,
                ssid: "home".to_string()
            }
        );
        assert_eq!(driver.rssi(), None);
    }

    #[test]
    fn test_station_indications_need_running_ap() {
        let (driver, mut rx) = SimDriver::new();
        let ip = Ipv4Addr::new(192, 168, 237, 2);
        driver.station_join([7; 6], ip);
        assert!(rx.try_recv().is_err());

        driver.ap_start(&ApConfig::open("setup", 1).unwrap()).unwrap();
        driver.station_join([7; 6], ip);
        assert_eq!(
            rx.try_recv().unwrap(),
            Indication::SoftApStaAdd { mac: [7; 6], ip }
        );
        driver.restart().unwrap();
        assert!(!driver.ap_running());
        driver.station_leave([7; 6]);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_ip_stack_binds_only_while_dhcp_runs() {
        let ip = SimIpStack::new(Some(Ipv4Addr::new(10, 0, 0, 2)));
        assert_eq!(ip.bound_addr(), None);
        ip.dhcp_start();
        assert_eq!(ip.bound_addr(), Some(Ipv4Addr::new(10, 0, 0, 2)));
        ip.dhcp_stop();
        assert_eq!(ip.bound_addr(), None);
        assert_eq!(ip.dhcp_starts(), 1);
    }
}
