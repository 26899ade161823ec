use crate::domain::error::LinkError;

/// ATT default payload ceiling. One write or notify carries one complete
/// message; there is no fragmentation layer.
pub const MAX_PAYLOAD: usize = 20;

/// A discovered or connected remote device. The address is the stable key;
/// the advertised name may be absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerIdentity {
    pub address: String,
    pub name: Option<String>,
}

impl PeerIdentity {
    pub fn new(address: impl Into<String>, name: Option<String>) -> Self {
        Self {
            address: address.into(),
            name,
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown")
    }
}

/// Application payload exchanged over the characteristic.
///
/// Construction validates the size limit, so a `Message` that exists is
/// always transmittable as a single write or notify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message(Vec<u8>);

impl Message {
    pub fn from_text(text: &str) -> Result<Self, LinkError> {
        Self::from_bytes(text.as_bytes().to_vec())
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, LinkError> {
        if bytes.len() > MAX_PAYLOAD {
            return Err(LinkError::PayloadTooLarge { len: bytes.len() });
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn to_text(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }
}

/// Central connection phases: `Idle → Scanning → Connecting → Connected → Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CentralPhase {
    Idle,
    Scanning,
    Connecting,
    Connected,
}

impl CentralPhase {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Scanning => "scanning",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

/// Peripheral phases: `Uninitialized → Advertising ⇄ Connected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeripheralPhase {
    Uninitialized,
    Advertising,
    Connected,
}

impl PeripheralPhase {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Advertising => "advertising",
            Self::Connected => "connected",
        }
    }
}

/// Events the central manager reports to its UI collaborator.
#[derive(Debug, Clone)]
pub enum CentralEvent {
    RequestEnableRadio,
    RequestLocationPermission,
    Status(String),
    PeerFound(PeerIdentity),
    PeerList(Vec<PeerIdentity>),
    Alert(String),
}

/// Events the peripheral manager reports to its UI collaborator.
#[derive(Debug, Clone)]
pub enum PeripheralEvent {
    RequestEnableRadio,
    Status(String),
    Alert(String),
}

/// UI-to-core commands for the central worker loop.
#[derive(Debug, Clone)]
pub enum CentralCommand {
    GrantLocationPermission,
    StartScan,
    Connect(String),
    Send(String),
    Disconnect,
}

/// UI-to-core commands for the peripheral worker loop.
#[derive(Debug, Clone)]
pub enum PeripheralCommand {
    InitServer,
    Send(String),
    Close,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_accepts_up_to_twenty_bytes() {
        let msg = Message::from_text("exactly 20 bytes !!!").unwrap();
        assert_eq!(msg.as_bytes().len(), 20);
    }

    #[test]
    fn message_rejects_oversized_payload() {
        let err = Message::from_text("twenty one bytes here").unwrap_err();
        assert_eq!(err, LinkError::PayloadTooLarge { len: 21 });
    }

    #[test]
    fn message_round_trips_utf8() {
        let msg = Message::from_text("hello").unwrap();
        assert_eq!(msg.to_text(), "hello");
        assert_eq!(msg.as_bytes(), b"hello");
    }

    #[test]
    fn display_name_falls_back_to_unknown() {
        let peer = PeerIdentity::new("AA:BB:CC:DD:EE:FF", None);
        assert_eq!(peer.display_name(), "Unknown");
    }
}
