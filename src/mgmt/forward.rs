//! Delivery of bridge messages to the event loop, and the waiters blocked
//! shell commands sleep on.

use super::event::WifiEvent;
use super::MgmtError;
use crate::eloop::{EloopError, EloopSender};
use crate::netlink::{LinkEventSink, NetlinkMsg};
use log::{debug, error};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;

/// One blocked-command slot: a flag saying someone waits, and a semaphore
/// released only while the flag is set.
#[derive(Debug)]
pub struct Waiter {
    blocked: AtomicBool,
    sem: Semaphore,
}

impl Default for Waiter {
    fn default() -> Self {
        Self {
            blocked: AtomicBool::new(false),
            sem: Semaphore::new(0),
        }
    }
}

impl Waiter {
    /// Mark a caller as waiting. Must precede the request it waits for.
    pub fn arm(&self) {
        // Discard a release that raced a previous timeout.
        while let Ok(permit) = self.sem.try_acquire() {
            permit.forget();
        }
        self.blocked.store(true, Ordering::Release);
    }

    /// Wake the waiter, if any.
    pub fn release(&self) {
        if self.blocked.swap(false, Ordering::AcqRel) {
            self.sem.add_permits(1);
        }
    }

    /// Withdraw an [`arm`](Self::arm) whose request was never submitted.
    pub fn disarm(&self) {
        self.blocked.store(false, Ordering::Release);
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked.load(Ordering::Acquire)
    }

    pub async fn wait(&self, limit: Duration) -> Result<(), MgmtError> {
        match tokio::time::timeout(limit, self.sem.acquire()).await {
            Ok(Ok(permit)) => {
                permit.forget();
                Ok(())
            }
            Ok(Err(_)) => Err(MgmtError::Eloop(EloopError::Closed)),
            Err(_) => {
                self.blocked.store(false, Ordering::Release);
                Err(MgmtError::Timeout)
            }
        }
    }
}

/// Waiters for blocking scan and connect commands.
#[derive(Debug, Default)]
pub struct BlockWaiters {
    pub scan: Waiter,
    pub conn: Waiter,
}

/// Forwards bridge messages into the event loop queue.
///
/// A full queue is retried with a blocking sleep between attempts, so
/// [`forward`](LinkEventSink::forward) must run on a driver or blocking
/// thread, never on a runtime worker that also drives [`EventLoop::run`].
///
/// [`EventLoop::run`]: crate::eloop::EventLoop::run
pub struct MgmtForwarder {
    sender: EloopSender,
    waiters: std::sync::Arc<BlockWaiters>,
    attempts: u32,
    backoff: Duration,
}

impl MgmtForwarder {
    pub fn new(
        sender: EloopSender,
        waiters: std::sync::Arc<BlockWaiters>,
        attempts: u32,
        backoff: Duration,
    ) -> Self {
        Self {
            sender,
            waiters,
            attempts: attempts.max(1),
            backoff,
        }
    }

    /// State machine event raised for a bridge message.
    pub fn event_for(msg: NetlinkMsg) -> WifiEvent {
        match msg {
            NetlinkMsg::ScanSucc => WifiEvent::ScanDone,
            NetlinkMsg::ScanFail => WifiEvent::ScanFail,
            NetlinkMsg::ConnSuccess => WifiEvent::ConnectSuccess,
            NetlinkMsg::ConnNoAp
            | NetlinkMsg::ConnAssocFail
            | NetlinkMsg::ConnHandshakeFail
            | NetlinkMsg::ConnFail => WifiEvent::ConnectFail,
            _ => WifiEvent::Disconnect,
        }
    }
}

impl LinkEventSink for MgmtForwarder {
    fn forward(&self, msg: NetlinkMsg) {
        let event = Self::event_for(msg);
        debug!("wifi_mgmt: {:?} -> {}", msg, event);

        let mut attempt = 1;
        loop {
            match self.sender.send_message(event.id(), msg.code()) {
                Ok(()) => break,
                Err(EloopError::QueueFull) if attempt < self.attempts => {
                    attempt += 1;
                    std::thread::sleep(self.backoff);
                }
                Err(e) => {
                    error!("wifi_mgmt: dropped {} after {} attempts: {}", event, attempt, e);
                    break;
                }
            }
        }

        match event {
            WifiEvent::ScanDone | WifiEvent::ScanFail => self.waiters.scan.release(),
            WifiEvent::ConnectFail | WifiEvent::Disconnect => self.waiters.conn.release(),
            _ => {}
        }
    }
}
