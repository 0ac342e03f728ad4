//! Storage of the last joined network for auto-connect after restart.
//!
//! # Components
//!
//! - [`MemoryStore`] - volatile store for tests and the simulator
//! - [`FileStore`] - JSON file on the host (`~/.wifi-connmgr/joined.json`)
//! - [`NvsStore`] - ESP-IDF NVS namespace (`esp32` feature)

#[cfg(not(target_os = "espidf"))]
mod file;
#[cfg(feature = "esp32")]
mod nvs;

#[cfg(not(target_os = "espidf"))]
pub use file::FileStore;
#[cfg(feature = "esp32")]
pub use nvs::NvsStore;

use crate::config::{ConfigError, StaConfig, MAX_PASSWORD_LEN, MAX_SSID_LEN};
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::{Mutex, PoisonError};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Serialized size upper bound: `[ssid_len][ssid][pw_len][pw][ip_len][ip]`.
pub const MAX_RECORD_LEN: usize = 1 + MAX_SSID_LEN + 1 + MAX_PASSWORD_LEN + 1 + 4;

/// A network the station joined successfully.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct JoinedNetwork {
    ssid: String,
    password: String,
    #[zeroize(skip)]
    ip: Option<Ipv4Addr>,
}

impl JoinedNetwork {
    pub fn new(config: &StaConfig, ip: Option<Ipv4Addr>) -> Self {
        Self {
            ssid: config.ssid().to_string(),
            password: config.password().to_string(),
            ip,
        }
    }

    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn ip(&self) -> Option<Ipv4Addr> {
        self.ip
    }

    /// Credentials to reconnect with.
    pub fn sta_config(&self) -> Result<StaConfig, ConfigError> {
        StaConfig::new(self.ssid.as_str(), self.password.as_str())
    }

    /// Serialize for raw key/value storage.
    ///
    /// Format: `[ssid_len:1][ssid:N][password_len:1][password:M][ip_len:1][ip:0|4]`
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(MAX_RECORD_LEN);
        bytes.push(self.ssid.len() as u8);
        bytes.extend_from_slice(self.ssid.as_bytes());
        bytes.push(self.password.len() as u8);
        bytes.extend_from_slice(self.password.as_bytes());
        match self.ip {
            Some(ip) => {
                bytes.push(4);
                bytes.extend_from_slice(&ip.octets());
            }
            None => bytes.push(0),
        }
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        let mut rest = bytes;
        let ssid = take_field(&mut rest, "SSID")?;
        let password = take_field(&mut rest, "password")?;
        let ip = take_field(&mut rest, "address")?;

        let ssid = String::from_utf8(ssid.to_vec())
            .map_err(|_| ConfigError::InvalidFormat("invalid SSID UTF-8".into()))?;
        let password = String::from_utf8(password.to_vec())
            .map_err(|_| ConfigError::InvalidFormat("invalid password UTF-8".into()))?;
        let ip = match ip {
            [] => None,
            [a, b, c, d] => Some(Ipv4Addr::new(*a, *b, *c, *d)),
            _ => return Err(ConfigError::InvalidFormat("bad address length".into())),
        };

        let config = StaConfig::new(ssid, password)?;
        Ok(Self::new(&config, ip))
    }
}

fn take_field<'a>(rest: &mut &'a [u8], what: &str) -> Result<&'a [u8], ConfigError> {
    let current: &'a [u8] = *rest;
    let (&len, tail) = current
        .split_first()
        .ok_or_else(|| ConfigError::InvalidFormat(format!("missing {} length", what)))?;
    let len = usize::from(len);
    if tail.len() < len {
        return Err(ConfigError::InvalidFormat(format!("truncated {}", what)));
    }
    let (field, tail) = tail.split_at(len);
    *rest = tail;
    Ok(field)
}

impl fmt::Debug for JoinedNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinedNetwork")
            .field("ssid", &self.ssid)
            .field("ip", &self.ip)
            .finish_non_exhaustive()
    }
}

/// Errors from a joined-network store.
#[derive(Debug)]
pub enum PersistError {
    Io(std::io::Error),
    Format(String),
    #[cfg(feature = "esp32")]
    Esp(esp_idf_sys::EspError),
}

impl fmt::Display for PersistError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {}", e),
            Self::Format(msg) => write!(f, "corrupt record: {}", msg),
            #[cfg(feature = "esp32")]
            Self::Esp(e) => write!(f, "NVS error: {}", e),
        }
    }
}

impl std::error::Error for PersistError {}

impl From<std::io::Error> for PersistError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<ConfigError> for PersistError {
    fn from(e: ConfigError) -> Self {
        Self::Format(e.to_string())
    }
}

#[cfg(feature = "esp32")]
impl From<esp_idf_sys::EspError> for PersistError {
    fn from(e: esp_idf_sys::EspError) -> Self {
        Self::Esp(e)
    }
}

/// Key/value store for the joined network and the auto-connect flag.
pub trait JoinedNetworkStore: Send + Sync {
    fn load(&self) -> Result<Option<JoinedNetwork>, PersistError>;

    fn store(&self, network: &JoinedNetwork) -> Result<(), PersistError>;

    fn clear(&self) -> Result<(), PersistError>;

    fn auto_connect(&self) -> bool;

    fn set_auto_connect(&self, enabled: bool) -> Result<(), PersistError>;
}

/// Volatile store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<(bool, Option<JoinedNetwork>)>,
}

impl MemoryStore {
    pub fn new(auto_connect: bool) -> Self {
        Self {
            inner: Mutex::new((auto_connect, None)),
        }
    }

    pub fn with_network(auto_connect: bool, network: JoinedNetwork) -> Self {
        Self {
            inner: Mutex::new((auto_connect, Some(network))),
        }
    }
}

impl JoinedNetworkStore for MemoryStore {
    fn load(&self) -> Result<Option<JoinedNetwork>, PersistError> {
        Ok(self.inner.lock().unwrap_or_else(PoisonError::into_inner).1.clone())
    }

    fn store(&self, network: &JoinedNetwork) -> Result<(), PersistError> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).1 = Some(network.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), PersistError> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).1 = None;
        Ok(())
    }

    fn auto_connect(&self) -> bool {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).0
    }

    fn set_auto_connect(&self, enabled: bool) -> Result<(), PersistError> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).0 = enabled;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network(ip: Option<Ipv4Addr>) -> JoinedNetwork {
        JoinedNetwork::new(&StaConfig::new("MyNetwork", "MyPassword").unwrap(), ip)
    }

    // ==================== Serialization Tests ====================

    #[test]
    fn test_serialize_deserialize() {
        let net = network(Some(Ipv4Addr::new(192, 168, 1, 20)));
        let restored = JoinedNetwork::from_bytes(&net.to_bytes()).unwrap();
        assert_eq!(net, restored);
        assert!(net.to_bytes().len() <= MAX_RECORD_LEN);
    }

    #[test]
    fn test_serialize_open_without_address() {
        let net = JoinedNetwork::new(&StaConfig::open("OpenNet").unwrap(), None);
        let restored = JoinedNetwork::from_bytes(&net.to_bytes()).unwrap();
        assert_eq!(restored.password(), "");
        assert_eq!(restored.ip(), None);
    }

    #[test]
    fn test_deserialize_empty() {
        assert!(matches!(
            JoinedNetwork::from_bytes(&[]),
            Err(ConfigError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_deserialize_truncated() {
        let result = JoinedNetwork::from_bytes(&[5, b'h', b'e', b'l', b'l']);
        assert!(matches!(result, Err(ConfigError::InvalidFormat(_))));
    }

    #[test]
    fn test_deserialize_rejects_policy_violation() {
        // SSID "net", password "short" (too short for WPA2), no address.
        let bytes = [3, b'n', b'e', b't', 5, b's', b'h', b'o', b'r', b't', 0];
        assert!(matches!(
            JoinedNetwork::from_bytes(&bytes),
            Err(ConfigError::PasswordTooShort { .. })
        ));
    }

    #[test]
    fn test_debug_hides_password() {
        let rendered = format!("{:?}", network(None));
        assert!(!rendered.contains("MyPassword"));
    }

    // ==================== MemoryStore Tests ====================

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new(false);
        assert!(store.load().unwrap().is_none());
        store.store(&network(None)).unwrap();
        assert_eq!(store.load().unwrap().unwrap().ssid(), "MyNetwork");
        store.set_auto_connect(true).unwrap();
        assert!(store.auto_connect());
        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }
}
