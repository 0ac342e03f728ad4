//! Command-shell surface of the connection manager.
//!
//! [`WifiControl`] is the handle other tasks use to drive the state machine.
//! It validates requests at the boundary, posts events to the loop and, for
//! the blocking variants, sleeps until the bridge reports the outcome.
//!
//! [`ShellCommand`] parses the text commands of the interactive shell:
//!
//! ```text
//! scan [-b]
//! connect <ssid> [password] [-b]
//! disconnect
//! ap <ssid> [password|-] [channel] [hidden]
//! ap-stop
//! status | rssi | list
//! autoconn <on|off>
//! ```

use crate::config::{ApConfig, ConfigError, MgmtConfig, StaConfig, DEFAULT_AP_CHANNEL};
use crate::driver::{MacDisplay, ScanRecord};
use crate::eloop::EloopSender;
use crate::mgmt::{BlockWaiters, MgmtError, MgmtStatus, WifiEvent, WifiState};
use crate::netlink::{LinkStatus, Netlink, NetlinkError, WifiStatusReport};
use crate::persistence::JoinedNetworkStore;
use log::{debug, info, warn};
use std::fmt::{self, Write as _};
use std::sync::Arc;

/// Front-end of the connection manager, cheap to clone across tasks.
#[derive(Clone)]
pub struct WifiControl {
    config: MgmtConfig,
    sender: EloopSender,
    netlink: Arc<Netlink>,
    status: Arc<MgmtStatus>,
    waiters: Arc<BlockWaiters>,
    store: Arc<dyn JoinedNetworkStore>,
}

impl WifiControl {
    pub(crate) fn new(
        config: MgmtConfig,
        sender: EloopSender,
        netlink: Arc<Netlink>,
        status: Arc<MgmtStatus>,
        waiters: Arc<BlockWaiters>,
        store: Arc<dyn JoinedNetworkStore>,
    ) -> Self {
        Self {
            config,
            sender,
            netlink,
            status,
            waiters,
            store,
        }
    }

    /// Initialize the state machine and, when enabled, rejoin the last
    /// network.
    pub fn start(&self) -> Result<(), MgmtError> {
        self.netlink.open();
        self.sender.send_event(WifiEvent::Init.id())?;

        if !self.store.auto_connect() {
            return Ok(());
        }
        let joined = match self.store.load() {
            Ok(Some(joined)) => joined,
            Ok(None) => {
                debug!("wifi_mgmt: auto-connect enabled but no joined network");
                return Ok(());
            }
            Err(e) => {
                warn!("wifi_mgmt: failed to load joined network: {}", e);
                return Ok(());
            }
        };
        match joined.sta_config() {
            Ok(config) => {
                info!("wifi_mgmt: auto-connecting to {}", config.ssid());
                self.netlink.set_desired(config);
                self.sender.send_event(WifiEvent::AutoConnect.id())?;
            }
            Err(e) => warn!("wifi_mgmt: stored network invalid: {}", e),
        }
        Ok(())
    }

    /// Join `config`. With `blocking`, wait until an address is bound or the
    /// attempt fails.
    pub async fn connect(&self, config: StaConfig, blocking: bool) -> Result<(), MgmtError> {
        if self.netlink.link_status() == LinkStatus::Linking {
            info!("wifi_mgmt: link is ongoing, try again later");
            return Err(MgmtError::LinkOngoing);
        }
        config.validate()?;
        self.netlink.set_desired(config);

        if blocking {
            self.waiters.conn.arm();
        }
        if let Err(e) = self.sender.send_event(WifiEvent::ConnectCmd.id()) {
            self.waiters.conn.disarm();
            return Err(e.into());
        }
        if !blocking {
            return Ok(());
        }

        self.waiters.conn.wait(self.config.block_wait).await?;
        if self.netlink.link_status() == LinkStatus::LinkedConfigured {
            Ok(())
        } else {
            Err(NetlinkError::NotLinked.into())
        }
    }

    pub fn disconnect(&self) -> Result<(), MgmtError> {
        self.sender.send_event(WifiEvent::DisconnectCmd.id())?;
        Ok(())
    }

    /// Start a full scan. A blocking scan returns the number of networks
    /// found, zero if the scan failed.
    pub async fn scan(&self, blocking: bool) -> Result<Option<usize>, MgmtError> {
        let state = self.status.state();
        if !matches!(state, WifiState::Idle | WifiState::Connected) {
            return Err(MgmtError::ScanRefused(state));
        }

        if blocking {
            self.waiters.scan.arm();
        }
        if let Err(e) = self.netlink.scan_request(None) {
            self.waiters.scan.disarm();
            return Err(e.into());
        }
        if !blocking {
            return Ok(None);
        }

        self.waiters.scan.wait(self.config.block_wait).await?;
        if self.netlink.scan_ready() {
            Ok(Some(self.netlink.scan_list_get(None)))
        } else {
            Ok(Some(0))
        }
    }

    /// Start the soft-AP, leaving station mode first.
    pub fn ap_start(&self, config: ApConfig) -> Result<(), MgmtError> {
        self.sender.send_event(WifiEvent::DisconnectCmd.id())?;
        self.netlink.ap_start(config)?;
        Ok(())
    }

    pub fn ap_stop(&self) -> Result<(), MgmtError> {
        self.netlink.ap_stop()?;
        Ok(())
    }

    pub fn status(&self) -> WifiStatusReport {
        self.netlink.status()
    }

    /// RSSI of the current association.
    pub fn rssi(&self) -> Option<i32> {
        if !self.netlink.link_status().is_linked() {
            return None;
        }
        Some(self.netlink.bss_rssi())
    }

    pub fn state(&self) -> WifiState {
        self.status.state()
    }

    pub fn set_auto_connect(&self, enabled: bool) -> Result<(), MgmtError> {
        self.store.set_auto_connect(enabled)?;
        Ok(())
    }

    pub fn auto_connect(&self) -> bool {
        self.store.auto_connect()
    }

    pub fn netlink(&self) -> &Arc<Netlink> {
        &self.netlink
    }

    /// Stop the event loop.
    pub fn terminate(&self) -> Result<(), MgmtError> {
        self.sender.terminate()?;
        Ok(())
    }

    /// Run a shell command and render its outcome.
    pub async fn execute(&self, cmd: ShellCommand) -> String {
        match cmd {
            ShellCommand::Scan { blocking } => match self.scan(blocking).await {
                Ok(Some(n)) => format!("{} networks found", n),
                Ok(None) => "scan started".to_string(),
                Err(e) => format!("scan failed: {}", e),
            },
            ShellCommand::Connect { config, blocking } => {
                let ssid = config.ssid().to_string();
                match self.connect(config, blocking).await {
                    Ok(()) if blocking => format!("connected to {}", ssid),
                    Ok(()) => format!("connecting to {}", ssid),
                    Err(e) => format!("connect failed: {}", e),
                }
            }
            ShellCommand::Disconnect => match self.disconnect() {
                Ok(()) => "disconnecting".to_string(),
                Err(e) => format!("disconnect failed: {}", e),
            },
            ShellCommand::ApStart(config) => {
                let ssid = config.ssid().to_string();
                match self.ap_start(config) {
                    Ok(()) => format!("soft-AP {} started", ssid),
                    Err(e) => format!("soft-AP failed: {}", e),
                }
            }
            ShellCommand::ApStop => match self.ap_stop() {
                Ok(()) => "soft-AP stopped".to_string(),
                Err(e) => format!("soft-AP stop failed: {}", e),
            },
            ShellCommand::Status => format!("{}\nstate: {}", self.status(), self.state()),
            ShellCommand::Rssi => match self.rssi() {
                Some(rssi) => format!("rssi: {} dBm", rssi),
                None => "not connected".to_string(),
            },
            ShellCommand::List => self.render_scan_list(),
            ShellCommand::AutoConnect(enabled) => match self.set_auto_connect(enabled) {
                Ok(()) => format!("auto-connect {}", if enabled { "on" } else { "off" }),
                Err(e) => format!("auto-connect failed: {}", e),
            },
            ShellCommand::Help => HELP.to_string(),
            ShellCommand::Quit => match self.terminate() {
                Ok(()) => "bye".to_string(),
                Err(e) => format!("terminate failed: {}", e),
            },
        }
    }

    fn render_scan_list(&self) -> String {
        let mut out = String::new();
        let count = self.netlink.scan_list_get(Some(&mut |rec: &ScanRecord| {
            let _ = writeln!(
                out,
                "{:<32} {} {:>4} dBm ch {:>2} {:?}",
                rec.ssid,
                MacDisplay(&rec.bssid),
                rec.rssi,
                rec.channel,
                rec.security
            );
        }));
        if count == 0 {
            return "no scan results".to_string();
        }
        out.pop();
        out
    }
}

impl fmt::Debug for WifiControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WifiControl")
            .field("state", &self.status.state())
            .field("link", &self.netlink.link_status())
            .finish()
    }
}

const HELP: &str = "\
scan [-b]                                 scan for networks
connect <ssid> [password] [-b]            join a network
disconnect                                leave the network
ap <ssid> [password|-] [channel] [hidden] start a soft-AP
ap-stop                                   stop the soft-AP
status                                    show connection status
rssi                                      show signal strength
list                                      show the last scan
autoconn <on|off>                         rejoin the last network at start
quit                                      exit";

/// A parsed shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Scan { blocking: bool },
    Connect { config: StaConfig, blocking: bool },
    Disconnect,
    ApStart(ApConfig),
    ApStop,
    Status,
    Rssi,
    List,
    AutoConnect(bool),
    Help,
    Quit,
}

impl ShellCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Scan { .. } => "scan",
            Self::Connect { .. } => "connect",
            Self::Disconnect => "disconnect",
            Self::ApStart(_) => "ap",
            Self::ApStop => "ap-stop",
            Self::Status => "status",
            Self::Rssi => "rssi",
            Self::List => "list",
            Self::AutoConnect(_) => "autoconn",
            Self::Help => "help",
            Self::Quit => "quit",
        }
    }
}

fn no_more_args<'a>(mut rest: impl Iterator<Item = &'a str>) -> Result<(), ConfigError> {
    match rest.next() {
        Some(extra) => Err(ConfigError::InvalidFormat(format!(
            "unexpected argument: {}",
            extra
        ))),
        None => Ok(()),
    }
}

impl std::str::FromStr for ShellCommand {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut words: Vec<&str> = s.split_whitespace().collect();
        let blocking = match words.iter().position(|w| *w == "-b") {
            Some(pos) => {
                words.remove(pos);
                true
            }
            None => false,
        };

        let mut args = words.into_iter();
        let Some(name) = args.next() else {
            return Err(ConfigError::UnknownCommand(String::new()));
        };

        let cmd = match name.to_lowercase().as_str() {
            "scan" => Self::Scan { blocking },
            "connect" => {
                let ssid = args.next().ok_or(ConfigError::SsidEmpty)?;
                let password = args.next().unwrap_or("");
                Self::Connect {
                    config: StaConfig::new(ssid, password)?,
                    blocking,
                }
            }
            "disconnect" => Self::Disconnect,
            "ap" => {
                let ssid = args.next().ok_or(ConfigError::SsidEmpty)?;
                let password = match args.next() {
                    Some("-") | None => "",
                    Some(pw) => pw,
                };
                let channel = match args.next() {
                    Some(ch) => ch
                        .parse::<u8>()
                        .map_err(|_| ConfigError::InvalidFormat(format!("bad channel: {}", ch)))?,
                    None => DEFAULT_AP_CHANNEL,
                };
                let hidden = match args.next() {
                    Some("hidden" | "1") => true,
                    Some("0") | None => false,
                    Some(other) => {
                        return Err(ConfigError::InvalidFormat(format!(
                            "bad hidden flag: {}",
                            other
                        )))
                    }
                };
                Self::ApStart(ApConfig::new(ssid, password, channel, hidden)?)
            }
            "ap-stop" => Self::ApStop,
            "status" => Self::Status,
            "rssi" => Self::Rssi,
            "list" => Self::List,
            "autoconn" => match args.next() {
                Some("on" | "1") => Self::AutoConnect(true),
                Some("off" | "0") => Self::AutoConnect(false),
                other => {
                    return Err(ConfigError::InvalidFormat(format!(
                        "autoconn expects on|off, got {:?}",
                        other
                    )))
                }
            },
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            _ => return Err(ConfigError::UnknownCommand(name.to_string())),
        };

        no_more_args(args)?;
        if blocking && !matches!(cmd, Self::Scan { .. } | Self::Connect { .. }) {
            return Err(ConfigError::InvalidFormat(format!(
                "{} has no blocking variant",
                cmd.name()
            )));
        }
        Ok(cmd)
    }
}

impl fmt::Display for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::Indication;
    use crate::mgmt::build;
    use crate::persistence::MemoryStore;
    use crate::sim::{SimDriver, SimIpStack};
    use std::net::Ipv4Addr;
    use tokio::sync::mpsc::UnboundedReceiver;

    // ===== Parsing Tests =====

    #[test]
    fn test_parse_scan() {
        assert_eq!(
            "scan".parse::<ShellCommand>().unwrap(),
            ShellCommand::Scan { blocking: false }
        );
        assert_eq!(
            " SCAN -b ".parse::<ShellCommand>().unwrap(),
            ShellCommand::Scan { blocking: true }
        );
    }

    #[test]
    fn test_parse_connect() {
        let cmd: ShellCommand = "connect -b HomeNet hunter2pass".parse().unwrap();
        match cmd {
            ShellCommand::Connect { config, blocking } => {
                assert!(blocking);
                assert_eq!(config.ssid(), "HomeNet");
                assert_eq!(config.password(), "hunter2pass");
            }
            other => panic!("unexpected {:?}", other),
        }

        let open: ShellCommand = "connect Cafe".parse().unwrap();
        assert!(matches!(open, ShellCommand::Connect { ref config, blocking: false } if config.is_open()));
    }

    #[test]
    fn test_parse_connect_policy_errors() {
        assert_eq!(
            "connect".parse::<ShellCommand>(),
            Err(ConfigError::SsidEmpty)
        );
        assert_eq!(
            "connect net short".parse::<ShellCommand>(),
            Err(ConfigError::PasswordTooShort { len: 5, min: 8 })
        );
        let long = "x".repeat(33);
        assert!(matches!(
            format!("connect {}", long).parse::<ShellCommand>(),
            Err(ConfigError::SsidTooLong { len: 33, max: 32 })
        ));
    }

    #[test]
    fn test_parse_ap() {
        let cmd: ShellCommand = "ap Lab - 11 hidden".parse().unwrap();
        match cmd {
            ShellCommand::ApStart(ap) => {
                assert_eq!(ap.ssid(), "Lab");
                assert!(ap.is_open());
                assert_eq!(ap.channel(), 11);
                assert!(ap.hidden());
            }
            other => panic!("unexpected {:?}", other),
        }

        let cmd: ShellCommand = "ap Lab password123".parse().unwrap();
        assert!(matches!(cmd, ShellCommand::ApStart(ref ap) if ap.channel() == DEFAULT_AP_CHANNEL && !ap.hidden()));

        assert_eq!(
            "ap Lab - 15".parse::<ShellCommand>(),
            Err(ConfigError::InvalidChannel(15))
        );
        assert!(matches!(
            "ap Lab - six".parse::<ShellCommand>(),
            Err(ConfigError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!("disconnect".parse::<ShellCommand>(), Ok(ShellCommand::Disconnect));
        assert_eq!("ap-stop".parse::<ShellCommand>(), Ok(ShellCommand::ApStop));
        assert_eq!("status".parse::<ShellCommand>(), Ok(ShellCommand::Status));
        assert_eq!("rssi".parse::<ShellCommand>(), Ok(ShellCommand::Rssi));
        assert_eq!("list".parse::<ShellCommand>(), Ok(ShellCommand::List));
        assert_eq!("autoconn on".parse::<ShellCommand>(), Ok(ShellCommand::AutoConnect(true)));
        assert_eq!("autoconn 0".parse::<ShellCommand>(), Ok(ShellCommand::AutoConnect(false)));
        assert_eq!("exit".parse::<ShellCommand>(), Ok(ShellCommand::Quit));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert_eq!(
            "reboot".parse::<ShellCommand>(),
            Err(ConfigError::UnknownCommand("reboot".to_string()))
        );
        assert!(matches!(
            "status now".parse::<ShellCommand>(),
            Err(ConfigError::InvalidFormat(_))
        ));
        assert!(matches!(
            "disconnect -b".parse::<ShellCommand>(),
            Err(ConfigError::InvalidFormat(_))
        ));
        assert!(matches!(
            "autoconn maybe".parse::<ShellCommand>(),
            Err(ConfigError::InvalidFormat(_))
        ));
        assert!("".parse::<ShellCommand>().is_err());
    }

    // ===== Control Tests =====

    struct Running {
        control: WifiControl,
        driver: Arc<SimDriver>,
        ip: Arc<SimIpStack>,
    }

    fn spawn_pump(netlink: Arc<Netlink>, mut rx: UnboundedReceiver<Indication>) {
        tokio::spawn(async move {
            while let Some(indication) = rx.recv().await {
                netlink.deliver(indication);
            }
        });
    }

    fn running(store: MemoryStore) -> Running {
        let (driver, rx) = SimDriver::new();
        let driver = Arc::new(driver);
        driver.add_ap("HomeNet", [0x10; 6], -50, 6, "hunter2pass");
        driver.add_ap("Cafe", [0x20; 6], -65, 1, "");
        let ip = Arc::new(SimIpStack::new(Some(Ipv4Addr::new(10, 0, 0, 7))));

        let system = build(
            MgmtConfig::default(),
            driver.clone(),
            ip.clone(),
            Arc::new(store),
        )
        .unwrap();
        spawn_pump(system.netlink.clone(), rx);
        let mut eloop = system.eloop;
        tokio::spawn(async move {
            let _ = eloop.run().await;
            eloop.destroy();
        });
        system.control.start().unwrap();
        Running {
            control: system.control,
            driver,
            ip,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocking_connect_waits_for_address() {
        let r = running(MemoryStore::new(false));
        let config = StaConfig::new("HomeNet", "hunter2pass").unwrap();
        r.control.connect(config, true).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;

        assert_eq!(r.control.state(), WifiState::Connected);
        assert_eq!(r.control.rssi(), Some(-50));
        assert!(r.ip.dhcp_running());
        match r.control.status() {
            WifiStatusReport::Station { ap, addr } => {
                assert_eq!(ap.ssid, "HomeNet");
                assert_eq!(addr, Some(Ipv4Addr::new(10, 0, 0, 7)));
            }
            other => panic!("unexpected {:?}", other),
        }
        r.control.terminate().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocking_connect_reports_failure() {
        let r = running(MemoryStore::new(false));
        let config = StaConfig::new("HomeNet", "wrongpassword").unwrap();
        let result = r.control.connect(config, true).await;
        assert!(matches!(
            result,
            Err(MgmtError::Netlink(NetlinkError::NotLinked))
        ));
        r.control.terminate().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocking_scan_counts_networks() {
        let r = running(MemoryStore::new(false));
        assert_eq!(r.control.scan(true).await.unwrap(), Some(2));
        let list = r.control.execute(ShellCommand::List).await;
        assert!(list.lines().next().unwrap().starts_with("HomeNet"));
        assert_eq!(list.lines().count(), 2);
        r.control.terminate().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_scan_reports_zero() {
        let r = running(MemoryStore::new(false));
        r.driver.set_fail_scan(true);
        assert_eq!(r.control.scan(true).await.unwrap(), Some(0));
        r.control.terminate().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_refused_while_connecting() {
        let r = running(MemoryStore::new(false));
        // A refused scan leaves the machine in SCAN waiting for its retry.
        r.driver.set_reject_scan(true);
        let config = StaConfig::open("Nowhere").unwrap();
        r.control.connect(config, false).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;

        assert_eq!(r.control.state(), WifiState::Scan);
        assert!(matches!(
            r.control.scan(false).await,
            Err(MgmtError::ScanRefused(_))
        ));
        r.control.terminate().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_refused_while_linking() {
        let r = running(MemoryStore::new(false));
        r.driver.set_reject_connect(true);
        let config = StaConfig::new("HomeNet", "hunter2pass").unwrap();
        r.control.connect(config.clone(), false).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;

        assert_eq!(r.control.netlink().link_status(), LinkStatus::Linking);
        assert!(matches!(
            r.control.connect(config, false).await,
            Err(MgmtError::LinkOngoing)
        ));
        r.control.terminate().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_opens_device_and_status_lists_clients() {
        let (driver, rx) = SimDriver::new();
        let driver = Arc::new(driver);
        let ip = Arc::new(SimIpStack::new(None));
        let system = build(
            MgmtConfig::default(),
            driver.clone(),
            ip.clone(),
            Arc::new(MemoryStore::new(false)),
        )
        .unwrap();
        assert_eq!(system.control.status(), WifiStatusReport::Closed);

        spawn_pump(system.netlink.clone(), rx);
        let mut eloop = system.eloop;
        tokio::spawn(async move {
            let _ = eloop.run().await;
            eloop.destroy();
        });
        let control = system.control;
        control.start().unwrap();
        assert!(matches!(control.status(), WifiStatusReport::Idle { .. }));

        control.ap_start(ApConfig::open("setup", 1).unwrap()).unwrap();
        assert!(ip.dhcp_server_running());
        driver.station_join([0x30; 6], Ipv4Addr::new(192, 168, 237, 2));
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;

        let text = control.execute(ShellCommand::Status).await;
        assert!(text.contains("mode: soft-AP"));
        assert!(text.contains("client[0]: 30:30:30:30:30:30 192.168.237.2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_connect_at_start() {
        let joined = crate::persistence::JoinedNetwork::new(
            &StaConfig::open("Cafe").unwrap(),
            Some(Ipv4Addr::new(10, 0, 0, 9)),
        );
        let r = running(MemoryStore::with_network(true, joined));
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        assert_eq!(r.control.state(), WifiState::Connected);
        assert_eq!(r.driver.associated().map(|ap| ap.ssid), Some("Cafe".to_string()));
        r.control.terminate().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_renders_outcomes() {
        let r = running(MemoryStore::new(false));
        assert_eq!(r.control.execute(ShellCommand::Rssi).await, "not connected");
        assert_eq!(r.control.execute(ShellCommand::List).await, "no scan results");
        assert_eq!(
            r.control.execute(ShellCommand::AutoConnect(true)).await,
            "auto-connect on"
        );
        assert!(r.control.auto_connect());

        let ap = ApConfig::new("Lab", "", 6, false).unwrap();
        assert_eq!(
            r.control.execute(ShellCommand::ApStart(ap)).await,
            "soft-AP Lab started"
        );
        let status = r.control.execute(ShellCommand::Status).await;
        assert!(status.contains("soft-AP"));
        assert!(status.contains("channel: 6"));
        assert_eq!(
            r.control.execute(ShellCommand::ApStop).await,
            "soft-AP stopped"
        );
        assert!(r
            .control
            .execute(ShellCommand::ApStop)
            .await
            .starts_with("soft-AP stop failed"));
        assert_eq!(r.control.execute(ShellCommand::Quit).await, "bye");
    }
}
