//! Peripheral role: advertise the exchange service, host the GATT server,
//! accept the single inbound connection and serve reads, writes and
//! notifications.

pub mod callback;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::domain::error::LinkError;
use crate::domain::models::{
    Message, PeerIdentity, PeripheralCommand, PeripheralEvent, PeripheralPhase,
};
use crate::domain::settings::LinkConfig;
use crate::infrastructure::radio::gatt::{
    AdvertisePlan, AttributeTarget, GattStatus, ServiceDescriptor,
};
use crate::infrastructure::radio::{LoopbackRadio, PeripheralRadioEvent, RadioAdapter};

pub struct PeripheralManager {
    adapter: Arc<RadioAdapter>,
    radio: Arc<LoopbackRadio>,
    config: LinkConfig,
    identity: PeerIdentity,
    events: mpsc::UnboundedSender<PeripheralEvent>,
    radio_tx: mpsc::UnboundedSender<PeripheralRadioEvent>,

    phase: PeripheralPhase,
    peer: Option<PeerIdentity>,
    server_open: bool,
    /// Current application-visible value of the characteristic.
    characteristic_value: Vec<u8>,
    descriptor_value: Vec<u8>,
    indicate: bool,
}

impl PeripheralManager {
    pub fn new(
        adapter: Arc<RadioAdapter>,
        radio: Arc<LoopbackRadio>,
        config: LinkConfig,
        identity: PeerIdentity,
        events: mpsc::UnboundedSender<PeripheralEvent>,
        radio_tx: mpsc::UnboundedSender<PeripheralRadioEvent>,
    ) -> Self {
        Self {
            adapter,
            radio,
            config,
            identity,
            events,
            radio_tx,
            phase: PeripheralPhase::Uninitialized,
            peer: None,
            server_open: false,
            characteristic_value: Vec::new(),
            descriptor_value: Vec::new(),
            indicate: false,
        }
    }

    pub fn phase(&self) -> PeripheralPhase {
        self.phase
    }

    pub fn peer(&self) -> Option<&PeerIdentity> {
        self.peer.as_ref()
    }

    pub fn characteristic_value(&self) -> &[u8] {
        &self.characteristic_value
    }

    // ---- commands ------------------------------------------------------

    pub fn init_server(&mut self) {
        if let Err(e) = self.try_init_server() {
            self.report(e);
        }
    }

    pub fn send_data(&mut self, text: &str) {
        if let Err(e) = self.try_send_data(text) {
            self.report(e);
        }
    }

    /// Stop the server and the advertisement. Safe if either was never
    /// started, and safe to repeat.
    pub fn close(&mut self) {
        if self.adapter.is_enabled() {
            self.radio.close_server();
            self.radio.stop_advertising();
        }
        self.server_open = false;
        self.peer = None;
        self.phase = PeripheralPhase::Uninitialized;
        info!("gatt server closed");
        self.status("close server");
    }

    pub fn handle_command(&mut self, command: PeripheralCommand) {
        match command {
            PeripheralCommand::InitServer => self.init_server(),
            PeripheralCommand::Send(text) => self.send_data(&text),
            PeripheralCommand::Close => self.close(),
        }
    }

    fn try_init_server(&mut self) -> Result<(), LinkError> {
        if !self.adapter.is_supported() {
            return Err(LinkError::RadioUnsupported);
        }
        if !self.adapter.is_enabled() {
            return Err(LinkError::RadioDisabled);
        }
        if self.server_open {
            self.status("server already initialized");
            return Ok(());
        }

        let service = ServiceDescriptor::exchange_service(&self.config);
        self.characteristic_value = service.characteristic.initial_value.clone();
        self.descriptor_value = service.characteristic.descriptor.value.clone();
        self.indicate = service.characteristic.properties.indicate;

        self.radio
            .open_server(self.identity.clone(), service, self.radio_tx.clone())
            .map_err(|e| {
                warn!(error = %e, "unable to create gatt server");
                e
            })?;
        self.server_open = true;
        info!(address = %self.identity.address, "gatt server open");

        let plan = AdvertisePlan::for_service(
            self.config.service_uuid,
            self.identity.display_name().to_string(),
        );
        // Success arrives asynchronously as AdvertiseStarted/Failed; a
        // synchronous error rolls the server back so a later init starts
        // from scratch.
        if let Err(e) = self.radio.start_advertising(plan) {
            self.radio.close_server();
            self.server_open = false;
            if matches!(e, LinkError::AdvertiserUnavailable) {
                let _ = self
                    .events
                    .send(PeripheralEvent::Alert("failed to create advertiser".to_string()));
            }
            return Err(e);
        }
        Ok(())
    }

    fn try_send_data(&mut self, text: &str) -> Result<(), LinkError> {
        // Three distinct guards, matching the three distinct failure
        // reports: no peer, peer without an address, no server.
        let peer = self.peer.as_ref().ok_or(LinkError::NoPeer)?;
        if peer.address.is_empty() {
            return Err(LinkError::PeerAddressLost);
        }
        if !self.server_open {
            return Err(LinkError::ServerNotInitialized);
        }

        let message = Message::from_text(text)?;
        self.characteristic_value = message.as_bytes().to_vec();
        self.radio
            .notify(message.into_bytes(), self.indicate)?;
        self.status(&format!("write: {text}"));
        Ok(())
    }

    // ---- radio results and inbound requests ----------------------------

    pub fn handle_radio_event(&mut self, event: PeripheralRadioEvent) {
        match event {
            PeripheralRadioEvent::AdvertiseStarted => {
                if self.phase == PeripheralPhase::Uninitialized {
                    self.phase = PeripheralPhase::Advertising;
                }
                info!("advertising started");
                self.status("gatt server advertise start success");
            }
            PeripheralRadioEvent::AdvertiseFailed { reason } => {
                warn!(reason, "advertising failed");
                self.radio.close_server();
                self.server_open = false;
                self.phase = PeripheralPhase::Uninitialized;
                self.status("gatt server advertise start failure");
                let _ = self
                    .events
                    .send(PeripheralEvent::Alert(format!("advertise failed: {reason}")));
            }
            PeripheralRadioEvent::ConnectionStateChange {
                peer,
                connected,
                status,
            } => self.on_connection_state(peer, connected, status),
            PeripheralRadioEvent::ReadRequest {
                request_id,
                offset,
                target,
            } => self.on_read_request(request_id, offset, target),
            PeripheralRadioEvent::WriteRequest {
                request_id,
                target,
                value,
                response_needed,
            } => self.on_write_request(request_id, target, value, response_needed),
        }
    }

    fn on_connection_state(&mut self, peer: PeerIdentity, connected: bool, status: GattStatus) {
        if status != GattStatus::Success {
            self.peer = None;
            if self.phase == PeripheralPhase::Connected {
                self.phase = PeripheralPhase::Advertising;
            }
            self.status("gatt server failure");
            return;
        }
        if connected {
            if self.peer.is_some() {
                // Last-bound-wins is a trap with a single characteristic
                // value; keep the first peer and report the attempt.
                warn!(address = %peer.address, "second connection refused");
                self.status("second connection refused");
                return;
            }
            if peer.address.is_empty() {
                // Observed in the field: a connect callback whose device
                // reference has no address. Report it, never crash on it.
                let _ = self
                    .events
                    .send(PeripheralEvent::Alert("connected peer lost its address".to_string()));
                self.status("gatt server lost the peer address");
                return;
            }
            info!(address = %peer.address, "peer connected");
            self.status(&format!("gatt server connected: {}", peer.address));
            self.peer = Some(peer);
            self.phase = PeripheralPhase::Connected;
        } else {
            info!("peer disconnected");
            self.peer = None;
            if self.phase == PeripheralPhase::Connected {
                self.phase = PeripheralPhase::Advertising;
            }
            self.status("gatt server disconnected");
        }
    }

    fn on_read_request(&mut self, request_id: u32, offset: usize, target: AttributeTarget) {
        // Only whole-value reads are served; long-read offsets are refused.
        if offset != 0 {
            debug!(request_id, offset, "read with nonzero offset");
            self.radio
                .send_response(request_id, GattStatus::InvalidOffset, Vec::new());
            return;
        }
        let value = match target {
            AttributeTarget::Characteristic => self.characteristic_value.clone(),
            AttributeTarget::ConfigDescriptor => self.descriptor_value.clone(),
        };
        self.radio.send_response(request_id, GattStatus::Success, value);
    }

    fn on_write_request(
        &mut self,
        request_id: u32,
        target: AttributeTarget,
        value: Vec<u8>,
        response_needed: bool,
    ) {
        match target {
            AttributeTarget::Characteristic => {
                let text = String::from_utf8_lossy(&value).into_owned();
                info!(len = value.len(), "inbound write");
                self.characteristic_value = value;
                self.status(&format!("read: {text}"));
                let _ = self.events.send(PeripheralEvent::Alert(text));
                if response_needed {
                    self.radio
                        .send_response(request_id, GattStatus::Success, Vec::new());
                }
            }
            AttributeTarget::ConfigDescriptor => {
                // Store and acknowledge; the subscription itself is the
                // radio stack's business.
                self.descriptor_value = value;
                self.radio
                    .send_response(request_id, GattStatus::Success, Vec::new());
            }
        }
    }

    // ---- reporting -----------------------------------------------------

    fn report(&mut self, error: LinkError) {
        warn!(%error, "peripheral operation refused");
        if error == LinkError::RadioDisabled {
            self.adapter.request_enable();
            let _ = self.events.send(PeripheralEvent::RequestEnableRadio);
        }
        self.status(&error.to_string());
    }

    fn status(&self, message: &str) {
        let _ = self
            .events
            .send(PeripheralEvent::Status(message.to_string()));
    }
}

/// Worker loop mirroring the central one: UI commands and radio results
/// serialized onto a single task.
pub async fn run(
    mut manager: PeripheralManager,
    mut commands: mpsc::UnboundedReceiver<PeripheralCommand>,
    mut radio_rx: mpsc::UnboundedReceiver<PeripheralRadioEvent>,
) {
    loop {
        tokio::select! {
            cmd = commands.recv() => match cmd {
                Some(cmd) => manager.handle_command(cmd),
                None => break,
            },
            Some(event) = radio_rx.recv() => manager.handle_radio_event(event),
        }
    }
}
