//! Sorted, de-duplicated view over raw scan results.
//!
//! The raw records are kept untouched in arrival order; the view is a list of
//! indices into them. Building the view walks the raw records once:
//!
//! - a record whose (SSID, security) pair is already in the view replaces the
//!   existing entry in place, but only if its RSSI is strictly stronger;
//! - any other record is inserted before the first entry it strictly beats
//!   on RSSI, so ties keep arrival order.
//!
//! Two networks sharing an SSID but advertising different security stay
//! distinct entries.

use crate::driver::ScanRecord;

/// Maximum number of raw records retained from one scan.
pub const MAX_SCAN_RECORDS: usize = 32;

#[derive(Debug, Default, Clone)]
pub struct ScanTable {
    raw: Vec<ScanRecord>,
    view: Vec<usize>,
}

impl ScanTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the raw records and rebuild the view. Records beyond
    /// [`MAX_SCAN_RECORDS`] are discarded.
    pub fn load(&mut self, mut records: Vec<ScanRecord>) -> usize {
        if records.len() > MAX_SCAN_RECORDS {
            log::debug!(
                "netlink: truncating {} scan records to {}",
                records.len(),
                MAX_SCAN_RECORDS
            );
            records.truncate(MAX_SCAN_RECORDS);
        }
        self.raw = records;
        self.rebuild()
    }

    /// Rebuild the sorted view. Returns the number of surviving entries.
    pub fn rebuild(&mut self) -> usize {
        self.view.clear();
        for (i, rec) in self.raw.iter().enumerate() {
            let same_network = self.view.iter().position(|&j| {
                let other = &self.raw[j];
                other.ssid == rec.ssid && other.security == rec.security
            });
            match same_network {
                Some(pos) => {
                    if rec.rssi > self.raw[self.view[pos]].rssi {
                        self.view[pos] = i;
                    }
                }
                None => {
                    let pos = self
                        .view
                        .iter()
                        .position(|&j| rec.rssi > self.raw[j].rssi)
                        .unwrap_or(self.view.len());
                    self.view.insert(pos, i);
                }
            }
        }
        self.view.len()
    }

    /// Entries in view order, strongest first.
    pub fn iter(&self) -> impl Iterator<Item = &ScanRecord> {
        self.view.iter().map(move |&i| &self.raw[i])
    }

    pub fn len(&self) -> usize {
        self.view.len()
    }

    pub fn is_empty(&self) -> bool {
        self.view.is_empty()
    }

    pub fn raw_len(&self) -> usize {
        self.raw.len()
    }

    pub fn clear(&mut self) {
        self.raw.clear();
        self.view.clear();
    }
}
