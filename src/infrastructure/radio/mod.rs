//! Radio Module
//!
//! The port between the link managers and the underlying radio stack.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     commands      ┌───────────────┐
//! │ CentralManager│ ────────────────▶ │               │
//! └──────────────┘                   │               │
//!        ▲  radio events (channel)   │ LoopbackRadio │
//!        └───────────────────────────│  (the stack)  │
//! ┌────────────────┐   commands      │               │
//! │PeripheralManager│ ──────────────▶ │               │
//! └────────────────┘                 └───────────────┘
//!        ▲  radio events (channel)          │
//!        └───────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`adapter`] - radio presence/power probe
//! - [`gatt`] - service layout and request/response vocabulary
//! - [`loopback`] - in-process stack routing traffic between the two roles

pub mod adapter;
pub mod gatt;
pub mod loopback;

pub use adapter::RadioAdapter;
pub use loopback::{CentralRadioEvent, LoopbackRadio, PeripheralRadioEvent};
