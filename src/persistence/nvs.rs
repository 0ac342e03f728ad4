//! NVS persistence for the joined network.
//!
//! Stores the record in ESP32's Non-Volatile Storage so auto-connect works
//! across reboots.

use super::{JoinedNetwork, JoinedNetworkStore, PersistError, MAX_RECORD_LEN};
use esp_idf_svc::nvs::{EspNvs, EspNvsPartition, NvsDefault};
use esp_idf_sys::EspError;
use log::warn;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// NVS namespace for connection manager state.
const NVS_NAMESPACE: &str = "wifi_connmgr";

/// NVS key for the joined-network record.
const NVS_KEY_JOINED: &str = "joined";

/// NVS key for the auto-connect flag.
const NVS_KEY_AUTOCONN: &str = "autoconn";

/// Store backed by an NVS namespace.
pub struct NvsStore {
    nvs: Mutex<EspNvs<NvsDefault>>,
}

impl NvsStore {
    pub fn new(nvs: EspNvs<NvsDefault>) -> Self {
        Self {
            nvs: Mutex::new(nvs),
        }
    }

    /// Open the namespace on the default partition.
    pub fn open(partition: EspNvsPartition<NvsDefault>) -> Result<Self, EspError> {
        Ok(Self::new(EspNvs::new(partition, NVS_NAMESPACE, true)?))
    }

    fn nvs(&self) -> MutexGuard<'_, EspNvs<NvsDefault>> {
        self.nvs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl JoinedNetworkStore for NvsStore {
    fn load(&self) -> Result<Option<JoinedNetwork>, PersistError> {
        let mut buf = [0u8; MAX_RECORD_LEN];
        let nvs = self.nvs();
        let Some(bytes) = nvs.get_raw(NVS_KEY_JOINED, &mut buf)? else {
            return Ok(None);
        };
        Ok(Some(JoinedNetwork::from_bytes(bytes)?))
    }

    fn store(&self, network: &JoinedNetwork) -> Result<(), PersistError> {
        let bytes = network.to_bytes();
        self.nvs().set_raw(NVS_KEY_JOINED, &bytes)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), PersistError> {
        self.nvs().remove(NVS_KEY_JOINED)?;
        Ok(())
    }

    fn auto_connect(&self) -> bool {
        match self.nvs().get_u8(NVS_KEY_AUTOCONN) {
            Ok(flag) => flag.unwrap_or(0) != 0,
            Err(e) => {
                warn!("Failed to read auto-connect flag: {}", e);
                false
            }
        }
    }

    fn set_auto_connect(&self, enabled: bool) -> Result<(), PersistError> {
        self.nvs().set_u8(NVS_KEY_AUTOCONN, u8::from(enabled))?;
        Ok(())
    }
}
