use thiserror::Error;

/// Failures raised inside the link managers.
///
/// Every variant is absorbed at the manager boundary and converted into
/// callback events; nothing here crosses the public command API as a fault.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("bluetooth le is not supported on this device")]
    RadioUnsupported,

    #[error("bluetooth is disabled")]
    RadioDisabled,

    #[error("location permission has not been granted")]
    LocationPermissionMissing,

    #[error("scan is only valid while idle or scanning, current phase: {0}")]
    InvalidPhase(&'static str),

    #[error("a connection attempt is already in progress")]
    ConnectInProgress,

    #[error("already connected to a device")]
    AlreadyConnected,

    #[error("unknown device address: {0:?}")]
    UnknownPeer(String),

    #[error("no active connection")]
    NotConnected,

    #[error("no connected peer")]
    NoPeer,

    #[error("gatt server lost the peer address")]
    PeerAddressLost,

    #[error("gatt server is not initialized")]
    ServerNotInitialized,

    #[error("payload is {len} bytes, limit is 20")]
    PayloadTooLarge { len: usize },

    #[error("advertiser is not available")]
    AdvertiserUnavailable,

    #[error("radio failure: {0}")]
    Radio(String),
}
