//! Callback contract between the central manager and its UI collaborator.
//!
//! The manager never holds a concrete UI type; it emits [`CentralEvent`]s
//! into a channel and a single consumer task dispatches them onto this
//! trait, so every callback runs on the UI-owned task.

use tokio::sync::mpsc;

use crate::domain::models::{CentralEvent, PeerIdentity};

pub trait CentralCallback: Send {
    fn request_enable_radio(&mut self);
    fn request_location_permission(&mut self);
    fn on_status(&mut self, message: &str);
    fn on_peer_found(&mut self, peer: &PeerIdentity);
    fn on_peer_list(&mut self, peers: &[PeerIdentity]);
    fn on_alert(&mut self, message: &str);
}

pub fn dispatch(callback: &mut dyn CentralCallback, event: &CentralEvent) {
    match event {
        CentralEvent::RequestEnableRadio => callback.request_enable_radio(),
        CentralEvent::RequestLocationPermission => callback.request_location_permission(),
        CentralEvent::Status(message) => callback.on_status(message),
        CentralEvent::PeerFound(peer) => callback.on_peer_found(peer),
        CentralEvent::PeerList(peers) => callback.on_peer_list(peers),
        CentralEvent::Alert(message) => callback.on_alert(message),
    }
}

/// Drain manager events onto the callback until the manager goes away.
pub async fn pump_events(
    mut events: mpsc::UnboundedReceiver<CentralEvent>,
    mut callback: impl CentralCallback,
) {
    while let Some(event) = events.recv().await {
        dispatch(&mut callback, &event);
    }
}
