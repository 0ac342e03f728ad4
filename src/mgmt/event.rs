//! Events and states of the connection state machine.

use crate::eloop::EventId;
use std::fmt;

/// Events understood by the state machine, numbered after the event loop's
/// reserved identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u16)]
pub enum WifiEvent {
    Start = 4,
    Init,
    ConnectCmd,
    DisconnectCmd,
    ScanDone,
    ScanFail,
    ConnectSuccess,
    ConnectFail,
    Disconnect,
    DhcpSuccess,
    DhcpFail,
    AutoConnect,
}

impl WifiEvent {
    const ALL: [WifiEvent; 12] = [
        Self::Start,
        Self::Init,
        Self::ConnectCmd,
        Self::DisconnectCmd,
        Self::ScanDone,
        Self::ScanFail,
        Self::ConnectSuccess,
        Self::ConnectFail,
        Self::Disconnect,
        Self::DhcpSuccess,
        Self::DhcpFail,
        Self::AutoConnect,
    ];

    pub fn id(self) -> EventId {
        EventId(self as u16)
    }

    pub fn from_id(id: EventId) -> Option<Self> {
        Self::ALL.iter().copied().find(|e| e.id() == id)
    }
}

impl From<WifiEvent> for EventId {
    fn from(e: WifiEvent) -> Self {
        e.id()
    }
}

impl fmt::Display for WifiEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Start => "START",
            Self::Init => "INIT",
            Self::ConnectCmd => "CONNECT_CMD",
            Self::DisconnectCmd => "DISCONNECT_CMD",
            Self::ScanDone => "SCAN_DONE",
            Self::ScanFail => "SCAN_FAIL",
            Self::ConnectSuccess => "CONNECT_SUCCESS",
            Self::ConnectFail => "CONNECT_FAIL",
            Self::Disconnect => "DISCONNECT",
            Self::DhcpSuccess => "DHCP_SUCCESS",
            Self::DhcpFail => "DHCP_FAIL",
            Self::AutoConnect => "AUTO_CONNECT",
        };
        f.write_str(s)
    }
}

/// States of the connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WifiState {
    Idle = 0,
    Scan,
    Connect,
    Dhcp,
    Connected,
}

impl WifiState {
    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Scan,
            2 => Self::Connect,
            3 => Self::Dhcp,
            4 => Self::Connected,
            _ => Self::Idle,
        }
    }
}

impl fmt::Display for WifiState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "IDLE",
            Self::Scan => "SCAN",
            Self::Connect => "CONNECT",
            Self::Dhcp => "DHCP",
            Self::Connected => "CONNECTED",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_ids_follow_reserved_range() {
        assert_eq!(WifiEvent::Start.id(), EventId::FIRST_USER);
        assert_eq!(WifiEvent::Init.id(), EventId(5));
        assert_eq!(WifiEvent::AutoConnect.id(), EventId(15));
        assert_eq!(WifiEvent::from_id(EventId(8)), Some(WifiEvent::ScanDone));
        assert_eq!(WifiEvent::from_id(EventId::ALL), None);
    }

    #[test]
    fn test_state_u8_roundtrip() {
        for state in [
            WifiState::Idle,
            WifiState::Scan,
            WifiState::Connect,
            WifiState::Dhcp,
            WifiState::Connected,
        ] {
            assert_eq!(WifiState::from_u8(state as u8), state);
        }
    }
}
