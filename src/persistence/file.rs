//! Joined-network persistence for host builds.
//!
//! Stores the last joined network and the auto-connect flag as JSON so they
//! survive restarts of the host shell. Uses `~/.wifi-connmgr/joined.json` by
//! default.
//!
//! # Usage
//!
//! ```ignore
//! use wifi_connmgr::persistence::{FileStore, JoinedNetworkStore};
//!
//! let store = FileStore::at_default_path()?;
//! if let Some(net) = store.load()? {
//!     log::info!("last joined: {}", net.ssid());
//! }
//! ```

use super::{JoinedNetwork, JoinedNetworkStore, PersistError};
use crate::config::StaConfig;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredState {
    auto_connect: bool,
    #[serde(default)]
    network: Option<StoredNetwork>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredNetwork {
    ssid: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    ip: Option<Ipv4Addr>,
}

/// Get the default store path: `~/.wifi-connmgr/joined.json`.
pub fn default_store_path() -> io::Result<PathBuf> {
    let home = std::env::var("HOME")
        .map_err(|_| io::Error::new(io::ErrorKind::NotFound, "HOME not set"))?;
    Ok(PathBuf::from(home).join(".wifi-connmgr").join("joined.json"))
}

/// JSON file store.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles.
    guard: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    pub fn at_default_path() -> io::Result<Self> {
        Ok(Self::new(default_store_path()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.guard.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read(&self) -> Result<StoredState, PersistError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No joined-network file at {:?}", self.path);
                return Ok(StoredState::default());
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&text).map_err(|e| PersistError::Format(e.to_string()))
    }

    /// Current contents for a read-modify-write. An unparsable file is
    /// logged and replaced; I/O errors are returned.
    fn read_for_update(&self) -> Result<StoredState, PersistError> {
        match self.read() {
            Err(PersistError::Format(e)) => {
                warn!("Joined-network file {:?} unreadable, rewriting: {}", self.path, e);
                Ok(StoredState::default())
            }
            other => other,
        }
    }

    fn write(&self, state: &StoredState) -> Result<(), PersistError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let text =
            serde_json::to_string_pretty(state).map_err(|e| PersistError::Format(e.to_string()))?;
        fs::write(&self.path, text)?;
        Ok(())
    }
}

impl JoinedNetworkStore for FileStore {
    fn load(&self) -> Result<Option<JoinedNetwork>, PersistError> {
        let _guard = self.lock();
        let Some(stored) = self.read()?.network else {
            return Ok(None);
        };
        match StaConfig::new(stored.ssid, stored.password) {
            Ok(config) => Ok(Some(JoinedNetwork::new(&config, stored.ip))),
            Err(e) => {
                warn!("Stored network rejected: {}", e);
                Err(e.into())
            }
        }
    }

    fn store(&self, network: &JoinedNetwork) -> Result<(), PersistError> {
        let _guard = self.lock();
        let mut state = self.read_for_update()?;
        state.network = Some(StoredNetwork {
            ssid: network.ssid().to_string(),
            password: network.password().to_string(),
            ip: network.ip(),
        });
        self.write(&state)?;
        info!("Joined network {} saved to {:?}", network.ssid(), self.path);
        Ok(())
    }

    fn clear(&self) -> Result<(), PersistError> {
        let _guard = self.lock();
        let mut state = self.read_for_update()?;
        state.network = None;
        self.write(&state)
    }

    fn auto_connect(&self) -> bool {
        let _guard = self.lock();
        match self.read() {
            Ok(state) => state.auto_connect,
            Err(e) => {
                warn!("Failed to read joined-network file: {}", e);
                false
            }
        }
    }

    fn set_auto_connect(&self, enabled: bool) -> Result<(), PersistError> {
        let _guard = self.lock();
        let mut state = self.read_for_update()?;
        state.auto_connect = enabled;
        self.write(&state)
    }
}
