//! Callback contract between the peripheral manager and its UI
//! collaborator, dispatched from a single consumer task.

use tokio::sync::mpsc;

use crate::domain::models::PeripheralEvent;

pub trait PeripheralCallback: Send {
    fn request_enable_radio(&mut self);
    fn on_status(&mut self, message: &str);
    fn on_alert(&mut self, message: &str);
}

pub fn dispatch(callback: &mut dyn PeripheralCallback, event: &PeripheralEvent) {
    match event {
        PeripheralEvent::RequestEnableRadio => callback.request_enable_radio(),
        PeripheralEvent::Status(message) => callback.on_status(message),
        PeripheralEvent::Alert(message) => callback.on_alert(message),
    }
}

/// Drain manager events onto the callback until the manager goes away.
pub async fn pump_events(
    mut events: mpsc::UnboundedReceiver<PeripheralEvent>,
    mut callback: impl PeripheralCallback,
) {
    while let Some(event) = events.recv().await {
        dispatch(&mut callback, &event);
    }
}
