//! Roaming heuristic.
//!
//! While connected, the link-status poller feeds the current RSSI to
//! [`Roaming::poll`]. Below the trigger level it asks for a background scan,
//! at first on every poll (the fast budget), then only every
//! `scan_throttle_polls` polls. Each completed scan is folded in through
//! [`Roaming::observe_scan`]: access points that share the connected SSID
//! but have a different BSSID update an exponentially smoothed average
//! (`avg = (3 * avg + sample) / 4`, floored) and the best single sample.
//! Finding a candidate re-arms the fast budget.
//!
//! [`Roaming::should_roam`] decides whether the current link is weak enough,
//! and a candidate strong enough, to force a rescan and reconnect.

use crate::config::MgmtConfig;
use crate::driver::{ConnectedAp, ScanRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Roaming {
    candidate_avg: i32,
    fast: u32,
    throttle: u32,
    trigger: i32,
    margin_avg: i32,
    margin_best: i32,
    fast_polls: u32,
    throttle_polls: u32,
}

impl Roaming {
    pub fn new(config: &MgmtConfig) -> Self {
        Self {
            candidate_avg: 0,
            fast: config.scan_fast_polls,
            throttle: config.scan_throttle_polls,
            trigger: config.roam_trigger_rssi,
            margin_avg: config.roam_margin_avg,
            margin_best: config.roam_margin_best,
            fast_polls: config.scan_fast_polls,
            throttle_polls: config.scan_throttle_polls,
        }
    }

    /// Forget all history. Called on every entry to the connected state.
    pub fn reset(&mut self) {
        self.candidate_avg = 0;
        self.fast = self.fast_polls;
        self.throttle = self.throttle_polls;
    }

    /// Account for one link-status poll. Returns true if a roaming scan
    /// should be started.
    pub fn poll(&mut self, rssi: i32) -> bool {
        if rssi >= self.trigger {
            return false;
        }
        // The throttle only counts down once the fast budget is spent.
        let due = self.fast > 0 || {
            self.throttle = self.throttle.saturating_sub(1);
            self.throttle == 0
        };
        if !due {
            return false;
        }
        if self.candidate_avg == 0 {
            self.candidate_avg = rssi;
        }
        if self.fast > 0 {
            self.fast -= 1;
        }
        if self.throttle == 0 {
            self.throttle = self.throttle_polls;
        }
        true
    }

    /// Fold a completed scan in. Returns the best candidate RSSI, if any AP
    /// other than the current one advertises the connected SSID.
    pub fn observe_scan(&mut self, current: &ConnectedAp, scan: &[ScanRecord]) -> Option<i32> {
        let mut best: Option<i32> = None;
        for rec in scan
            .iter()
            .filter(|r| r.ssid == current.ssid && r.bssid != current.bssid)
        {
            self.candidate_avg = (self.candidate_avg * 3 + rec.rssi) >> 2;
            best = Some(best.map_or(rec.rssi, |b| b.max(rec.rssi)));
        }
        if best.is_some() {
            self.fast = self.fast_polls;
        }
        best
    }

    /// Whether a link at `rssi` should give way to a candidate whose best
    /// sample is `best`.
    pub fn should_roam(&self, rssi: i32, best: i32) -> bool {
        rssi < self.trigger
            && (rssi + self.margin_avg < self.candidate_avg || rssi + self.margin_best < best)
    }

    pub fn candidate_avg(&self) -> i32 {
        self.candidate_avg
    }

    pub fn fast_remaining(&self) -> u32 {
        self.fast
    }
}
