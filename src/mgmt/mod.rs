//! Connection management state machine.
//!
//! [`WifiManagement`] is the dispatch context of the event loop. It consumes
//! the [`WifiEvent`]s raised by the shell and by the netlink bridge, owns the
//! retry budget and the DHCP and link-status pollers, and drives the bridge
//! through IDLE, SCAN, CONNECT, DHCP and CONNECTED.
//!
//! ```text
//!          CONNECT_CMD / AUTO_CONNECT
//!   IDLE ─────────────────────────────▶ SCAN ──SCAN_DONE──▶ CONNECT
//!    ▲                                   ▲                     │
//!    │ retries exhausted      retry timer│      CONNECT_SUCCESS│
//!    │                                   │                     ▼
//!    └────── CONNECT_FAIL / DISCONNECT ──┴─────────────────── DHCP
//!                                                              │ DHCP_SUCCESS
//!                                         DISCONNECT           ▼
//!                         SCAN or CONNECT ◀──────────────── CONNECTED
//! ```
//!
//! Any event not expected in the current state is logged and ignored.

mod event;
mod forward;
mod roaming;

pub use event::{WifiEvent, WifiState};
pub use forward::{BlockWaiters, MgmtForwarder, Waiter};
pub use roaming::Roaming;

use crate::config::{as_delay_ms, ConfigError, MgmtConfig};
use crate::driver::{IpStack, WifiDriver};
use crate::eloop::{
    Binding, Ctx, CtxMatch, Dispatch, EloopError, EloopHandle, EventId, EventLoop, Message,
};
use crate::netlink::{Netlink, NetlinkError, NetlinkMsg};
use crate::persistence::{JoinedNetwork, JoinedNetworkStore, PersistError};
use log::{debug, error, info, warn};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Handlers the state machine registers with the event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MgmtHandler {
    /// Static binding on every event.
    RunStateMachine,
    /// One-shot binding on SCAN_DONE during a roaming scan.
    RoamingScanDone,
    DhcpPolling,
    LinkStatusPolling,
    ConnectRetry,
}

/// Errors returned by management commands.
#[derive(Debug)]
pub enum MgmtError {
    /// A connection attempt is already linking.
    LinkOngoing,
    /// Scans are only accepted while idle or connected.
    ScanRefused(WifiState),
    Config(ConfigError),
    Netlink(NetlinkError),
    Eloop(EloopError),
    Persist(PersistError),
    /// A blocking command gave up waiting.
    Timeout,
}

impl fmt::Display for MgmtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LinkOngoing => write!(f, "connection attempt in progress"),
            Self::ScanRefused(state) => write!(f, "scan not allowed in state {}", state),
            Self::Config(e) => write!(f, "{}", e),
            Self::Netlink(e) => write!(f, "{}", e),
            Self::Eloop(e) => write!(f, "{}", e),
            Self::Persist(e) => write!(f, "{}", e),
            Self::Timeout => write!(f, "timed out"),
        }
    }
}

impl std::error::Error for MgmtError {}

impl From<ConfigError> for MgmtError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<NetlinkError> for MgmtError {
    fn from(e: NetlinkError) -> Self {
        Self::Netlink(e)
    }
}

impl From<EloopError> for MgmtError {
    fn from(e: EloopError) -> Self {
        Self::Eloop(e)
    }
}

impl From<PersistError> for MgmtError {
    fn from(e: PersistError) -> Self {
        Self::Persist(e)
    }
}

/// Remaining automatic reconnection attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryBudget {
    Unlimited,
    Remaining(u32),
}

impl RetryBudget {
    /// Budget after a reset: one attempt is the one about to start.
    pub fn reset(config: &MgmtConfig) -> Self {
        if config.retry_unlimited {
            Self::Unlimited
        } else {
            Self::Remaining(config.retry_limit.saturating_sub(1))
        }
    }

    /// Consume one retry. Returns false once the budget is spent.
    pub fn take(&mut self) -> bool {
        match self {
            Self::Unlimited => true,
            Self::Remaining(0) => false,
            Self::Remaining(n) => {
                *n -= 1;
                true
            }
        }
    }
}

/// State published for other tasks.
#[derive(Debug)]
pub struct MgmtStatus {
    state: AtomicU8,
}

impl Default for MgmtStatus {
    fn default() -> Self {
        Self {
            state: AtomicU8::new(WifiState::Idle as u8),
        }
    }
}

impl MgmtStatus {
    pub fn state(&self) -> WifiState {
        WifiState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn publish(&self, state: WifiState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

#[derive(Debug)]
struct SmContext {
    dhcp_polls: u32,
    initialized: bool,
    retry: RetryBudget,
    state: WifiState,
    changed: bool,
}

/// The state machine and its pollers.
pub struct WifiManagement {
    config: MgmtConfig,
    netlink: Arc<Netlink>,
    ip: Arc<dyn IpStack>,
    store: Arc<dyn JoinedNetworkStore>,
    status: Arc<MgmtStatus>,
    waiters: Arc<BlockWaiters>,
    sm: SmContext,
    roaming: Roaming,
}

impl WifiManagement {
    pub fn new(
        config: MgmtConfig,
        netlink: Arc<Netlink>,
        ip: Arc<dyn IpStack>,
        store: Arc<dyn JoinedNetworkStore>,
        status: Arc<MgmtStatus>,
        waiters: Arc<BlockWaiters>,
    ) -> Self {
        Self {
            config,
            netlink,
            ip,
            store,
            status,
            waiters,
            sm: SmContext {
                dhcp_polls: 0,
                initialized: false,
                retry: RetryBudget::reset(&config),
                state: WifiState::Idle,
                changed: false,
            },
            roaming: Roaming::new(&config),
        }
    }

    pub fn state(&self) -> WifiState {
        self.sm.state
    }

    pub fn retry_budget(&self) -> RetryBudget {
        self.sm.retry
    }

    pub fn roaming(&self) -> &Roaming {
        &self.roaming
    }

    fn raise(&self, eloop: &EloopHandle<MgmtHandler>, event: WifiEvent) {
        if let Err(e) = eloop.send_event(event.id()) {
            error!("wifi_mgmt: failed to raise {}: {}", event, e);
        }
    }

    fn arm(&self, eloop: &EloopHandle<MgmtHandler>, handler: MgmtHandler, delay: std::time::Duration) {
        eloop.cancel_timeout(handler, CtxMatch::Any, CtxMatch::Any);
        if let Err(e) = eloop.register_timeout(as_delay_ms(delay), handler, Ctx::NONE, Ctx::NONE) {
            error!("wifi_mgmt: failed to arm {:?}: {}", handler, e);
        }
    }

    // ===== State machine =====

    fn run_state_machine(&mut self, msg: Message, eloop: &EloopHandle<MgmtHandler>) {
        let Some(event) = WifiEvent::from_id(msg.event) else {
            return;
        };
        if event < WifiEvent::Init {
            return;
        }
        debug!(
            "wifi_mgmt: {} (reason {}) in {}",
            event, msg.reason, self.sm.state
        );
        self.step(event, msg.reason, eloop);
    }

    fn step(&mut self, event: WifiEvent, reason: u16, eloop: &EloopHandle<MgmtHandler>) {
        self.sm.changed = false;

        if event == WifiEvent::Init || !self.sm.initialized {
            self.sm.initialized = true;
            self.sm.dhcp_polls = 0;
            self.sm.retry = RetryBudget::reset(&self.config);
            self.roaming.reset();
            self.enter(WifiState::Idle, eloop);
            // The event that initializes the machine is consumed by it.
            return;
        }

        use WifiEvent as E;
        use WifiState as S;
        match (self.sm.state, event) {
            (_, E::ConnectCmd) => self.retry_reset_and_scan(eloop),

            (S::Idle, E::AutoConnect) => self.enter(S::Scan, eloop),
            (S::Idle, E::DisconnectCmd | E::ScanDone | E::ScanFail | E::ConnectFail) => {}

            (_, E::DisconnectCmd) => {
                eloop.cancel_timeout(MgmtHandler::ConnectRetry, CtxMatch::Any, CtxMatch::Any);
                self.enter(S::Idle, eloop);
            }

            (S::Scan, E::ScanDone) => self.enter(S::Connect, eloop),
            (S::Scan, E::ScanFail) => {
                if !self.schedule_retry(eloop) {
                    self.enter(S::Idle, eloop);
                }
            }

            (S::Connect, E::ConnectSuccess) => self.enter(S::Dhcp, eloop),
            (S::Connect | S::Dhcp, E::ConnectFail | E::Disconnect) => {
                self.schedule_retry(eloop);
                self.enter(S::Idle, eloop);
            }

            (S::Dhcp, E::DhcpSuccess) => {
                self.enter(S::Connected, eloop);
                eloop.cancel_timeout(MgmtHandler::ConnectRetry, CtxMatch::Any, CtxMatch::Any);
            }
            (S::Dhcp, E::DhcpFail) => {
                if let Err(e) = self.netlink.disconnect_request() {
                    debug!("wifi_mgmt: disconnect after DHCP failure: {}", e);
                }
                self.schedule_retry(eloop);
                self.enter(S::Idle, eloop);
            }

            (S::Connected, E::Disconnect) => {
                self.sm.retry = RetryBudget::reset(&self.config);
                eloop.cancel_timeout(
                    MgmtHandler::ConnectRetry,
                    CtxMatch::Exactly(Ctx::NONE),
                    CtxMatch::Exactly(Ctx::NONE),
                );
                match NetlinkMsg::from_code(reason) {
                    Some(
                        NetlinkMsg::DisconApChanged
                        | NetlinkMsg::DisconNoBeacon
                        | NetlinkMsg::DisconRecvDeauth,
                    ) => {
                        info!("wifi_mgmt: link lost, rescanning");
                        self.enter(S::Scan, eloop);
                    }
                    _ => {
                        info!("wifi_mgmt: link lost, reconnecting");
                        self.enter(S::Connect, eloop);
                    }
                }
            }

            // Roaming scans complete while associated.
            (S::Connect | S::Dhcp | S::Connected, E::ScanDone | E::ScanFail) => {}

            (state, event) => {
                warn!(
                    "wifi_mgmt: unexpected event {} (reason {}) in {}",
                    event, reason, state
                );
                return;
            }
        }

        if !self.sm.changed {
            debug!(
                "wifi_mgmt: stay in {} upon {} (reason {})",
                self.sm.state, event, reason
            );
        }
        self.sm.changed = false;
    }

    /// Return to IDLE, refill the retry budget, drop a pending retry and
    /// start over with a scan.
    fn retry_reset_and_scan(&mut self, eloop: &EloopHandle<MgmtHandler>) {
        if self.sm.state != WifiState::Idle {
            self.enter(WifiState::Idle, eloop);
        }
        self.sm.retry = RetryBudget::reset(&self.config);
        eloop.cancel_timeout(
            MgmtHandler::ConnectRetry,
            CtxMatch::Exactly(Ctx::NONE),
            CtxMatch::Exactly(Ctx::NONE),
        );
        self.enter(WifiState::Scan, eloop);
    }

    /// Arm the retry timer if the budget allows. Returns whether it did.
    fn schedule_retry(&mut self, eloop: &EloopHandle<MgmtHandler>) -> bool {
        if !self.sm.retry.take() {
            warn!("wifi_mgmt: retries exhausted, giving up");
            return false;
        }
        match self.sm.retry {
            RetryBudget::Unlimited => info!(
                "wifi_mgmt: retry in {} ms",
                self.config.retry_interval.as_millis()
            ),
            RetryBudget::Remaining(n) => info!(
                "wifi_mgmt: retry in {} ms ({} left)",
                self.config.retry_interval.as_millis(),
                n
            ),
        }
        if let Err(e) = eloop.register_timeout(
            as_delay_ms(self.config.retry_interval),
            MgmtHandler::ConnectRetry,
            Ctx::NONE,
            Ctx::NONE,
        ) {
            error!("wifi_mgmt: failed to arm retry: {}", e);
            return false;
        }
        true
    }

    // ===== Entry actions =====

    fn enter(&mut self, state: WifiState, eloop: &EloopHandle<MgmtHandler>) {
        if self.sm.state != state {
            info!("wifi_mgmt: {} -> {}", self.sm.state, state);
        }
        self.sm.state = state;
        self.sm.changed = true;
        self.status.publish(state);

        match state {
            WifiState::Idle => {
                self.stop_pollers(eloop);
                if self.netlink.link_status().is_linked() {
                    if let Err(e) = self.netlink.disconnect_request() {
                        debug!("wifi_mgmt: disconnect on idle: {}", e);
                    }
                }
                self.netlink.reset_link();
            }
            WifiState::Scan => {
                self.stop_pollers(eloop);
                let desired = self.netlink.desired();
                let ssid = desired.as_ref().map(|c| c.ssid());
                if let Err(e) = self.netlink.scan_request(ssid) {
                    warn!("wifi_mgmt: scan request failed: {}", e);
                    self.raise(eloop, WifiEvent::ScanFail);
                }
            }
            WifiState::Connect => match self.netlink.desired() {
                Some(config) => {
                    if let Err(e) = self.netlink.connect_request(&config) {
                        error!("wifi_mgmt: connect request failed: {}", e);
                    }
                }
                None => error!("wifi_mgmt: no network configured"),
            },
            WifiState::Dhcp => {
                self.sm.dhcp_polls = self.config.dhcp_poll_limit;
                self.ip.dhcp_start();
                self.arm(eloop, MgmtHandler::DhcpPolling, self.config.dhcp_poll_interval);
            }
            WifiState::Connected => {
                self.roaming.reset();
                if self.store.auto_connect() {
                    self.save_joined();
                }
                self.arm(
                    eloop,
                    MgmtHandler::LinkStatusPolling,
                    self.config.link_poll_interval,
                );
            }
        }
    }

    fn stop_pollers(&self, eloop: &EloopHandle<MgmtHandler>) {
        self.ip.dhcp_stop();
        eloop.cancel_timeout(MgmtHandler::DhcpPolling, CtxMatch::Any, CtxMatch::Any);
        eloop.cancel_timeout(MgmtHandler::LinkStatusPolling, CtxMatch::Any, CtxMatch::Any);
    }

    fn save_joined(&self) {
        let Some(config) = self.netlink.desired() else {
            return;
        };
        let joined = JoinedNetwork::new(&config, self.netlink.ip_addr());
        if let Err(e) = self.store.store(&joined) {
            warn!("wifi_mgmt: failed to save joined network: {}", e);
        }
    }

    // ===== Timers =====

    fn dhcp_poll(&mut self, eloop: &EloopHandle<MgmtHandler>) {
        if let Some(addr) = self.ip.bound_addr() {
            self.netlink.ip_configured(addr);
            self.raise(eloop, WifiEvent::DhcpSuccess);
            self.waiters.conn.release();
            return;
        }

        self.sm.dhcp_polls = self.sm.dhcp_polls.saturating_sub(1);
        if self.sm.dhcp_polls != 0 {
            if self.sm.dhcp_polls % 16 == 0 {
                debug!("wifi_mgmt: waiting for DHCP ({} polls left)", self.sm.dhcp_polls);
            }
            self.arm(eloop, MgmtHandler::DhcpPolling, self.config.dhcp_poll_interval);
        } else {
            warn!("wifi_mgmt: DHCP timed out");
            self.ip.dhcp_stop();
            self.raise(eloop, WifiEvent::DhcpFail);
        }
    }

    fn link_status_poll(&mut self, eloop: &EloopHandle<MgmtHandler>) {
        let rssi = self.netlink.bss_rssi();
        if self.roaming.poll(rssi) {
            info!("wifi_mgmt: weak link ({} dBm), roaming scan", rssi);
            let event = WifiEvent::ScanDone.id();
            let bound = if eloop.is_event_registered(event, MgmtHandler::RoamingScanDone) {
                Ok(())
            } else {
                eloop.register_event(event, MgmtHandler::RoamingScanDone, Ctx::NONE, Ctx::NONE)
            };
            match bound {
                Ok(()) => {
                    if let Err(e) = self.netlink.scan_request(None) {
                        warn!("wifi_mgmt: roaming scan failed: {}", e);
                        eloop.unregister_event(event);
                    }
                }
                Err(e) => warn!("wifi_mgmt: roaming scan not bound: {}", e),
            }
        }
        self.arm(
            eloop,
            MgmtHandler::LinkStatusPolling,
            self.config.link_poll_interval,
        );
    }

    fn roaming_scan_done(&mut self, eloop: &EloopHandle<MgmtHandler>) {
        eloop.unregister_event(WifiEvent::ScanDone.id());

        let Some(current) = self.netlink.linked_ap() else {
            return;
        };
        let scan = self.netlink.scan_list();
        let Some(best) = self.roaming.observe_scan(&current, &scan) else {
            debug!("wifi_mgmt: no roaming candidate");
            return;
        };

        let rssi = self.netlink.bss_rssi();
        if self.roaming.should_roam(rssi, best) {
            info!(
                "wifi_mgmt: roaming from {} dBm (candidate avg {}, best {})",
                rssi,
                self.roaming.candidate_avg(),
                best
            );
            self.raise(eloop, WifiEvent::ConnectCmd);
        }
    }
}

impl Dispatch for WifiManagement {
    type Handler = MgmtHandler;

    fn on_event(
        &mut self,
        handler: MgmtHandler,
        msg: Message,
        _ctx1: Ctx,
        _ctx2: Ctx,
        eloop: &EloopHandle<MgmtHandler>,
    ) {
        match handler {
            MgmtHandler::RunStateMachine => self.run_state_machine(msg, eloop),
            MgmtHandler::RoamingScanDone => self.roaming_scan_done(eloop),
            other => warn!("wifi_mgmt: {:?} bound to event {}", other, msg.event),
        }
    }

    fn on_timeout(
        &mut self,
        handler: MgmtHandler,
        _ctx1: Ctx,
        _ctx2: Ctx,
        eloop: &EloopHandle<MgmtHandler>,
    ) {
        match handler {
            MgmtHandler::DhcpPolling => self.dhcp_poll(eloop),
            MgmtHandler::LinkStatusPolling => self.link_status_poll(eloop),
            MgmtHandler::ConnectRetry => {
                info!("wifi_mgmt: retrying connection");
                self.enter(WifiState::Scan, eloop);
            }
            other => warn!("wifi_mgmt: {:?} registered as timeout", other),
        }
    }
}

/// Everything [`build`] wires together.
pub struct WifiSystem {
    pub eloop: EventLoop<WifiManagement>,
    pub netlink: Arc<Netlink>,
    pub control: crate::shell::WifiControl,
}

/// Wire the event loop, the bridge and the state machine together.
///
/// The returned loop is initialized but not running; spawn
/// [`EventLoop::run`] on a worker and call
/// [`WifiControl::start`](crate::shell::WifiControl::start).
pub fn build(
    config: MgmtConfig,
    driver: Arc<dyn WifiDriver>,
    ip: Arc<dyn IpStack>,
    store: Arc<dyn JoinedNetworkStore>,
) -> Result<WifiSystem, MgmtError> {
    config.validate()?;

    let status = Arc::new(MgmtStatus::default());
    let waiters = Arc::new(BlockWaiters::default());
    let mut netlink_slot = None;

    let mut eloop = EventLoop::new(config.queue_depth, |handle| {
        let forwarder = MgmtForwarder::new(
            handle.sender(),
            waiters.clone(),
            config.forward_attempts,
            config.forward_backoff,
        );
        let netlink = Arc::new(Netlink::new(driver, ip.clone(), Box::new(forwarder)));
        netlink_slot = Some(netlink.clone());
        WifiManagement::new(
            config,
            netlink,
            ip,
            store.clone(),
            status.clone(),
            waiters.clone(),
        )
    });
    eloop.init(vec![Binding::new(EventId::ALL, MgmtHandler::RunStateMachine)])?;

    let netlink = match netlink_slot {
        Some(n) => n,
        None => return Err(MgmtError::Eloop(EloopError::NotInitialized)),
    };
    let control = crate::shell::WifiControl::new(
        config,
        eloop.handle().sender(),
        netlink.clone(),
        status,
        waiters,
        store,
    );
    Ok(WifiSystem {
        eloop,
        netlink,
        control,
    })
}
