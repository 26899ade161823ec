//! Central role: scan for the peer's service, hold the single outbound
//! connection, write application messages and receive notifications.

pub mod callback;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::domain::error::LinkError;
use crate::domain::models::{CentralCommand, CentralEvent, CentralPhase, Message, PeerIdentity};
use crate::domain::settings::LinkConfig;
use crate::infrastructure::radio::gatt::{
    AttributeTarget, GattStatus, ENABLE_NOTIFICATION_VALUE,
};
use crate::infrastructure::radio::{CentralRadioEvent, LoopbackRadio, RadioAdapter};

pub struct CentralManager {
    adapter: Arc<RadioAdapter>,
    radio: Arc<LoopbackRadio>,
    config: LinkConfig,
    identity: PeerIdentity,
    events: mpsc::UnboundedSender<CentralEvent>,
    radio_tx: mpsc::UnboundedSender<CentralRadioEvent>,

    phase: CentralPhase,
    seen: Vec<PeerIdentity>,
    peer: Option<PeerIdentity>,
    location_granted: bool,
    connect_deadline: Option<Instant>,
}

impl CentralManager {
    pub fn new(
        adapter: Arc<RadioAdapter>,
        radio: Arc<LoopbackRadio>,
        config: LinkConfig,
        identity: PeerIdentity,
        events: mpsc::UnboundedSender<CentralEvent>,
        radio_tx: mpsc::UnboundedSender<CentralRadioEvent>,
    ) -> Self {
        Self {
            adapter,
            radio,
            config,
            identity,
            events,
            radio_tx,
            phase: CentralPhase::Idle,
            seen: Vec::new(),
            peer: None,
            location_granted: false,
            connect_deadline: None,
        }
    }

    pub fn phase(&self) -> CentralPhase {
        self.phase
    }

    pub fn peer(&self) -> Option<&PeerIdentity> {
        self.peer.as_ref()
    }

    pub fn seen_peers(&self) -> &[PeerIdentity] {
        &self.seen
    }

    pub fn connect_deadline(&self) -> Option<Instant> {
        self.connect_deadline
    }

    /// The UI collaborator reports the platform granted location access.
    pub fn grant_location_permission(&mut self) {
        self.location_granted = true;
    }

    // ---- commands ------------------------------------------------------

    pub fn start_scan(&mut self) {
        if let Err(e) = self.try_start_scan() {
            self.report(e);
        }
    }

    pub fn connect_device(&mut self, address: &str) {
        if let Err(e) = self.try_connect_device(address) {
            self.report(e);
        }
    }

    pub fn send_data(&mut self, text: &str) {
        if let Err(e) = self.try_send_data(text) {
            self.report(e);
        }
    }

    /// Release the connection and return to idle. Valid in any phase and
    /// safe to repeat.
    pub fn disconnect_gatt_server(&mut self) {
        if self.phase == CentralPhase::Idle {
            self.status("no active connection");
            return;
        }
        if self.phase == CentralPhase::Scanning {
            self.radio.stop_scan();
        } else {
            self.radio.disconnect();
        }
        info!("central released its connection");
        self.phase = CentralPhase::Idle;
        self.peer = None;
        self.connect_deadline = None;
        self.status("disconnected from gatt server");
    }

    pub fn handle_command(&mut self, command: CentralCommand) {
        match command {
            CentralCommand::GrantLocationPermission => self.grant_location_permission(),
            CentralCommand::StartScan => self.start_scan(),
            CentralCommand::Connect(address) => self.connect_device(&address),
            CentralCommand::Send(text) => self.send_data(&text),
            CentralCommand::Disconnect => self.disconnect_gatt_server(),
        }
    }

    fn try_start_scan(&mut self) -> Result<(), LinkError> {
        self.radio_ready()?;
        if !self.location_granted {
            return Err(LinkError::LocationPermissionMissing);
        }
        match self.phase {
            CentralPhase::Idle | CentralPhase::Scanning => {}
            phase => return Err(LinkError::InvalidPhase(phase.name())),
        }
        // A new scan never carries results over from the previous session.
        self.seen.clear();
        self.radio
            .start_scan(self.config.service_uuid, self.radio_tx.clone());
        self.phase = CentralPhase::Scanning;
        info!(service = %self.config.service_uuid, "scan started");
        self.status("scan start");
        Ok(())
    }

    fn try_connect_device(&mut self, address: &str) -> Result<(), LinkError> {
        self.radio_ready()?;
        match self.phase {
            CentralPhase::Connecting => return Err(LinkError::ConnectInProgress),
            CentralPhase::Connected => return Err(LinkError::AlreadyConnected),
            _ => {}
        }
        if address.is_empty() || !self.seen.iter().any(|p| p.address == address) {
            return Err(LinkError::UnknownPeer(address.to_string()));
        }

        self.radio.stop_scan();
        self.phase = CentralPhase::Connecting;
        self.connect_deadline = self
            .config
            .connect_timeout
            .map(|timeout| Instant::now() + timeout);
        info!(address, "connecting");
        self.status(&format!("connecting to {address}"));
        self.radio
            .connect(self.identity.clone(), address, self.radio_tx.clone());
        Ok(())
    }

    fn try_send_data(&mut self, text: &str) -> Result<(), LinkError> {
        if !self.adapter.is_supported() {
            return Err(LinkError::RadioUnsupported);
        }
        if self.phase != CentralPhase::Connected {
            return Err(LinkError::NotConnected);
        }
        let message = Message::from_text(text)?;
        debug!(len = message.as_bytes().len(), "writing characteristic");
        self.radio
            .write_characteristic(message.into_bytes(), true, self.radio_tx.clone())?;
        Ok(())
    }

    // ---- radio results -------------------------------------------------

    pub fn handle_radio_event(&mut self, event: CentralRadioEvent) {
        match event {
            CentralRadioEvent::AdvertisementReceived { address, name, .. } => {
                self.on_advertisement(address, name)
            }
            CentralRadioEvent::Connected { peer } => self.on_connected(peer),
            CentralRadioEvent::ConnectFailed { address, reason } => {
                if self.phase == CentralPhase::Connecting {
                    warn!(address, reason, "connect failed");
                    self.phase = CentralPhase::Idle;
                    self.connect_deadline = None;
                    self.status(&format!("connect failed: {reason}"));
                }
            }
            CentralRadioEvent::Disconnected => {
                if matches!(self.phase, CentralPhase::Connecting | CentralPhase::Connected) {
                    self.phase = CentralPhase::Idle;
                    self.peer = None;
                    self.connect_deadline = None;
                    self.status("disconnected from gatt server");
                }
            }
            CentralRadioEvent::ReadResponse { status, value, .. } => match status {
                GattStatus::Success => {
                    debug!(len = value.len(), "read test ok");
                    self.status("read test ok");
                }
                _ => self.status("read test failed"),
            },
            CentralRadioEvent::WriteResponse { target, status } => {
                self.on_write_response(target, status)
            }
            CentralRadioEvent::Notified { value } => {
                let text = String::from_utf8_lossy(&value).into_owned();
                self.status(&format!("notify: {text}"));
            }
        }
    }

    /// The connect timeout elapsed while still in `Connecting`.
    pub fn on_connect_timeout(&mut self) {
        if self.phase != CentralPhase::Connecting {
            self.connect_deadline = None;
            return;
        }
        warn!("connect attempt timed out");
        self.radio.disconnect();
        self.phase = CentralPhase::Idle;
        self.connect_deadline = None;
        self.status("connect timed out");
    }

    fn on_advertisement(&mut self, address: String, name: Option<String>) {
        if self.phase != CentralPhase::Scanning {
            return;
        }
        // Same address again: stay quiet, the UI already has it.
        if self.seen.iter().any(|p| p.address == address) {
            return;
        }
        let peer = PeerIdentity::new(address, name);
        info!(address = %peer.address, name = peer.display_name(), "scan result");
        self.status(&format!(
            "scan result device: {}, {}",
            peer.address,
            peer.display_name()
        ));
        self.seen.push(peer.clone());
        let _ = self.events.send(CentralEvent::PeerFound(peer));
        let _ = self.events.send(CentralEvent::PeerList(self.seen.clone()));
    }

    fn on_connected(&mut self, peer: PeerIdentity) {
        if self.phase != CentralPhase::Connecting {
            return;
        }
        info!(address = %peer.address, "connected to gatt server");
        self.status(&format!("connected to gatt server: {}", peer.address));
        self.peer = Some(peer);
        self.phase = CentralPhase::Connected;
        self.connect_deadline = None;

        // Sanity read, then subscribe to notifications through the config
        // descriptor; the standard post-connect handshake.
        if let Err(e) = self.radio.read_remote(
            AttributeTarget::Characteristic,
            0,
            self.radio_tx.clone(),
        ) {
            warn!(error = %e, "diagnostic read failed");
        }
        if let Err(e) = self
            .radio
            .write_descriptor(ENABLE_NOTIFICATION_VALUE.to_vec(), self.radio_tx.clone())
        {
            warn!(error = %e, "subscribe failed");
            self.status("failed to enable notifications");
        }
    }

    fn on_write_response(&mut self, target: AttributeTarget, status: GattStatus) {
        match (target, status) {
            (AttributeTarget::ConfigDescriptor, GattStatus::Success) => {
                self.status("notifications enabled");
            }
            (AttributeTarget::ConfigDescriptor, _) => {
                self.status("failed to enable notifications");
            }
            (AttributeTarget::Characteristic, GattStatus::Success) => {
                self.status("write success");
            }
            (AttributeTarget::Characteristic, _) => {
                self.status("write failed");
            }
        }
    }

    // ---- reporting -----------------------------------------------------

    fn radio_ready(&self) -> Result<(), LinkError> {
        if !self.adapter.is_supported() {
            return Err(LinkError::RadioUnsupported);
        }
        if !self.adapter.is_enabled() {
            return Err(LinkError::RadioDisabled);
        }
        Ok(())
    }

    fn report(&mut self, error: LinkError) {
        warn!(%error, "central operation refused");
        match error {
            LinkError::RadioDisabled => {
                self.adapter.request_enable();
                let _ = self.events.send(CentralEvent::RequestEnableRadio);
                self.status(&error.to_string());
            }
            LinkError::LocationPermissionMissing => {
                let _ = self.events.send(CentralEvent::RequestLocationPermission);
                self.status(&error.to_string());
            }
            _ => self.status(&error.to_string()),
        }
    }

    fn status(&self, message: &str) {
        let _ = self.events.send(CentralEvent::Status(message.to_string()));
    }
}

/// Worker loop: commands from the UI collaborator, results from the radio
/// and the optional connect deadline, serialized onto one task.
pub async fn run(
    mut manager: CentralManager,
    mut commands: mpsc::UnboundedReceiver<CentralCommand>,
    mut radio_rx: mpsc::UnboundedReceiver<CentralRadioEvent>,
) {
    loop {
        let deadline = manager.connect_deadline();
        tokio::select! {
            cmd = commands.recv() => match cmd {
                Some(cmd) => manager.handle_command(cmd),
                None => break,
            },
            Some(event) = radio_rx.recv() => manager.handle_radio_event(event),
            _ = sleep_until_deadline(deadline) => manager.on_connect_timeout(),
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::radio::gatt::{AdvertisePlan, ServiceDescriptor};
    use crate::infrastructure::radio::PeripheralRadioEvent;

    const PERIPHERAL_ADDR: &str = "AA:AA:AA:AA:AA:01";
    const CENTRAL_ADDR: &str = "AA:AA:AA:AA:AA:02";

    struct Harness {
        manager: CentralManager,
        events: mpsc::UnboundedReceiver<CentralEvent>,
        radio_rx: mpsc::UnboundedReceiver<CentralRadioEvent>,
        radio: Arc<LoopbackRadio>,
        _peripheral_rx: mpsc::UnboundedReceiver<PeripheralRadioEvent>,
    }

    fn harness_with(adapter: RadioAdapter) -> Harness {
        let radio = Arc::new(LoopbackRadio::new());
        let config = LinkConfig::default();

        // A bare server stands in for the peripheral role.
        let (p_tx, p_rx) = mpsc::unbounded_channel();
        radio
            .open_server(
                PeerIdentity::new(PERIPHERAL_ADDR, Some("peer".to_string())),
                ServiceDescriptor::exchange_service(&config),
                p_tx,
            )
            .unwrap();
        radio
            .start_advertising(AdvertisePlan::for_service(config.service_uuid, "peer"))
            .unwrap();

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (radio_tx, radio_rx) = mpsc::unbounded_channel();
        let manager = CentralManager::new(
            Arc::new(adapter),
            radio.clone(),
            config,
            PeerIdentity::new(CENTRAL_ADDR, Some("central".to_string())),
            event_tx,
            radio_tx,
        );
        Harness {
            manager,
            events: event_rx,
            radio_rx,
            radio,
            _peripheral_rx: p_rx,
        }
    }

    fn harness() -> Harness {
        let mut h = harness_with(RadioAdapter::new());
        h.manager.grant_location_permission();
        h
    }

    impl Harness {
        fn pump(&mut self) {
            while let Ok(event) = self.radio_rx.try_recv() {
                self.manager.handle_radio_event(event);
            }
        }

        fn statuses(&mut self) -> Vec<String> {
            let mut out = Vec::new();
            while let Ok(event) = self.events.try_recv() {
                if let CentralEvent::Status(s) = event {
                    out.push(s);
                }
            }
            out
        }

        fn drain(&mut self) -> Vec<CentralEvent> {
            let mut out = Vec::new();
            while let Ok(event) = self.events.try_recv() {
                out.push(event);
            }
            out
        }

        fn connect(&mut self) {
            self.manager.start_scan();
            self.pump();
            self.manager.connect_device(PERIPHERAL_ADDR);
            self.pump();
            assert_eq!(self.manager.phase(), CentralPhase::Connected);
        }
    }

    #[test]
    fn disabled_radio_requests_enable_and_aborts_scan() {
        let mut h = harness_with(RadioAdapter::disabled());
        h.manager.grant_location_permission();
        h.manager.start_scan();
        assert_eq!(h.manager.phase(), CentralPhase::Idle);
        assert!(h
            .drain()
            .iter()
            .any(|e| matches!(e, CentralEvent::RequestEnableRadio)));
    }

    #[test]
    fn unsupported_radio_is_fatal_for_every_operation() {
        let mut h = harness_with(RadioAdapter::unsupported());
        h.manager.grant_location_permission();
        h.manager.start_scan();
        h.manager.connect_device(PERIPHERAL_ADDR);
        h.manager.send_data("x");
        assert_eq!(h.manager.phase(), CentralPhase::Idle);
        let statuses = h.statuses();
        assert_eq!(statuses.len(), 3);
        assert!(statuses.iter().all(|s| s.contains("not supported")));
    }

    #[test]
    fn scan_needs_location_permission_first() {
        let mut h = harness_with(RadioAdapter::new());
        h.manager.start_scan();
        assert_eq!(h.manager.phase(), CentralPhase::Idle);
        assert!(h
            .drain()
            .iter()
            .any(|e| matches!(e, CentralEvent::RequestLocationPermission)));

        h.manager.grant_location_permission();
        h.manager.start_scan();
        assert_eq!(h.manager.phase(), CentralPhase::Scanning);
    }

    #[test]
    fn scan_discovers_the_advertising_peer_once() {
        let mut h = harness();
        h.manager.start_scan();
        h.pump();
        h.radio.rebroadcast();
        h.radio.rebroadcast();
        h.pump();

        assert_eq!(h.manager.seen_peers().len(), 1);
        let found: Vec<_> = h
            .drain()
            .into_iter()
            .filter(|e| matches!(e, CentralEvent::PeerFound(_)))
            .collect();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn rescan_starts_a_fresh_session() {
        let mut h = harness();
        h.manager.start_scan();
        h.pump();
        assert_eq!(h.manager.seen_peers().len(), 1);

        // Peer goes away; the next scan must not remember it.
        h.radio.stop_advertising();
        h.manager.start_scan();
        h.pump();
        assert!(h.manager.seen_peers().is_empty());
    }

    #[test]
    fn connect_requires_a_previously_seen_address() {
        let mut h = harness();
        h.manager.start_scan();
        h.pump();
        h.manager.connect_device("11:22:33:44:55:66");
        assert_eq!(h.manager.phase(), CentralPhase::Scanning);
        assert!(h.statuses().iter().any(|s| s.contains("unknown device")));
    }

    #[test]
    fn connect_is_rejected_while_connecting_or_connected() {
        let mut h = harness();
        h.radio.set_unresponsive(true);
        h.manager.start_scan();
        h.pump();
        h.manager.connect_device(PERIPHERAL_ADDR);
        assert_eq!(h.manager.phase(), CentralPhase::Connecting);

        h.manager.connect_device(PERIPHERAL_ADDR);
        assert_eq!(h.manager.phase(), CentralPhase::Connecting);
        assert!(h
            .statuses()
            .iter()
            .any(|s| s.contains("already in progress")));

        h.radio.set_unresponsive(false);
        h.manager.on_connect_timeout();
        assert_eq!(h.manager.phase(), CentralPhase::Idle);

        let mut h = harness();
        h.connect();
        h.manager.connect_device(PERIPHERAL_ADDR);
        assert_eq!(h.manager.phase(), CentralPhase::Connected);
        assert!(h.statuses().iter().any(|s| s.contains("already connected")));
    }

    #[test]
    fn connect_timeout_returns_to_idle() {
        let mut h = harness();
        h.radio.set_unresponsive(true);
        h.manager.start_scan();
        h.pump();
        h.manager.connect_device(PERIPHERAL_ADDR);
        assert!(h.manager.connect_deadline().is_some());

        h.manager.on_connect_timeout();
        assert_eq!(h.manager.phase(), CentralPhase::Idle);
        assert!(h.manager.connect_deadline().is_none());
        assert!(h.statuses().iter().any(|s| s.contains("timed out")));
    }

    #[test]
    fn send_is_rejected_outside_connected() {
        let mut h = harness();
        h.manager.send_data("hi");
        assert!(h.statuses().iter().any(|s| s.contains("no active connection")));
    }

    #[test]
    fn send_rejects_oversized_payload_before_transmission() {
        let mut h = harness();
        h.connect();
        h.manager.send_data("this payload is far longer than twenty bytes");
        assert!(h.statuses().iter().any(|s| s.contains("limit is 20")));
    }

    #[test]
    fn disconnect_is_idempotent_and_safe_without_a_connection() {
        let mut h = harness();
        h.manager.disconnect_gatt_server();
        h.manager.disconnect_gatt_server();
        assert_eq!(h.manager.phase(), CentralPhase::Idle);
        assert!(h
            .statuses()
            .iter()
            .any(|s| s.contains("no active connection")));
    }

    #[test]
    fn disconnect_releases_an_active_connection() {
        let mut h = harness();
        h.connect();
        h.manager.disconnect_gatt_server();
        assert_eq!(h.manager.phase(), CentralPhase::Idle);
        assert!(h.manager.peer().is_none());
    }
}
