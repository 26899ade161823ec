//! Bidirectional short-message exchange over a low-power radio link.
//!
//! Two symmetric link managers form the core: a [`CentralManager`] that
//! scans and holds the single outbound connection, and a
//! [`PeripheralManager`] that advertises and hosts the GATT server. Both
//! talk to the radio through the port in [`infrastructure::radio`] and
//! report everything to their UI collaborators through callback events.

pub mod central;
pub mod domain;
pub mod infrastructure;
pub mod peripheral;

pub use central::CentralManager;
pub use domain::error::LinkError;
pub use domain::models::{
    CentralCommand, CentralEvent, CentralPhase, Message, PeerIdentity, PeripheralCommand,
    PeripheralEvent, PeripheralPhase, MAX_PAYLOAD,
};
pub use domain::settings::{LinkConfig, Settings, SettingsService};
pub use infrastructure::radio::{LoopbackRadio, RadioAdapter};
pub use peripheral::PeripheralManager;
