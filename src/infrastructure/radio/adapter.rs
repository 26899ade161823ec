//! Radio capability probe.
//!
//! Thin stand-in for the platform adapter: is the radio present, is it
//! powered on. Enabling is asynchronous on every real stack (a system
//! prompt), so `request_enable` only records the request; the harness or
//! demo flips the power state with [`RadioAdapter::set_enabled`].

use std::sync::atomic::{AtomicBool, Ordering};

pub struct RadioAdapter {
    present: bool,
    enabled: AtomicBool,
    enable_requested: AtomicBool,
}

impl RadioAdapter {
    /// A present, powered-on radio.
    pub fn new() -> Self {
        Self {
            present: true,
            enabled: AtomicBool::new(true),
            enable_requested: AtomicBool::new(false),
        }
    }

    /// A present radio that is powered off.
    pub fn disabled() -> Self {
        let adapter = Self::new();
        adapter.enabled.store(false, Ordering::SeqCst);
        adapter
    }

    /// No radio hardware at all. Managers treat this as terminal.
    pub fn unsupported() -> Self {
        Self {
            present: false,
            enabled: AtomicBool::new(false),
            enable_requested: AtomicBool::new(false),
        }
    }

    pub fn is_supported(&self) -> bool {
        self.present
    }

    pub fn is_enabled(&self) -> bool {
        self.present && self.enabled.load(Ordering::SeqCst)
    }

    /// Record that an enable prompt was shown. Does not block and does not
    /// change the power state.
    pub fn request_enable(&self) {
        self.enable_requested.store(true, Ordering::SeqCst);
    }

    pub fn enable_requested(&self) -> bool {
        self.enable_requested.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, on: bool) {
        self.enabled.store(on, Ordering::SeqCst);
    }
}

impl Default for RadioAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_radio_is_never_enabled() {
        let adapter = RadioAdapter::unsupported();
        adapter.set_enabled(true);
        assert!(!adapter.is_supported());
        assert!(!adapter.is_enabled());
    }

    #[test]
    fn request_enable_is_recorded_without_powering_on() {
        let adapter = RadioAdapter::disabled();
        adapter.request_enable();
        assert!(adapter.enable_requested());
        assert!(!adapter.is_enabled());
    }
}
