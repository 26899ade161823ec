//! In-process radio stack.
//!
//! `LoopbackRadio` plays the role the platform Bluetooth stack plays on a
//! phone: it carries one advertiser, one scanner and at most one link
//! between them. Every call is fire-and-forget; results and inbound GATT
//! traffic are delivered later on the channel each side registered, the
//! same shape as the callback threads of a real stack. The managers never
//! see each other, only this hub.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::error::LinkError;
use crate::domain::models::PeerIdentity;
use crate::infrastructure::radio::gatt::{
    AdvertisePlan, AttributeTarget, GattStatus, ServiceDescriptor,
};

/// Radio results delivered to a central.
#[derive(Debug, Clone)]
pub enum CentralRadioEvent {
    AdvertisementReceived {
        address: String,
        name: Option<String>,
        service_uuid: Uuid,
    },
    Connected {
        peer: PeerIdentity,
    },
    ConnectFailed {
        address: String,
        reason: String,
    },
    Disconnected,
    ReadResponse {
        target: AttributeTarget,
        status: GattStatus,
        value: Vec<u8>,
    },
    WriteResponse {
        target: AttributeTarget,
        status: GattStatus,
    },
    Notified {
        value: Vec<u8>,
    },
}

/// Radio results and inbound requests delivered to a peripheral.
#[derive(Debug, Clone)]
pub enum PeripheralRadioEvent {
    AdvertiseStarted,
    AdvertiseFailed {
        reason: String,
    },
    ConnectionStateChange {
        peer: PeerIdentity,
        connected: bool,
        status: GattStatus,
    },
    ReadRequest {
        request_id: u32,
        offset: usize,
        target: AttributeTarget,
    },
    WriteRequest {
        request_id: u32,
        target: AttributeTarget,
        value: Vec<u8>,
        response_needed: bool,
    },
}

struct ServerEntry {
    identity: PeerIdentity,
    service: ServiceDescriptor,
    plan: Option<AdvertisePlan>,
    events: UnboundedSender<PeripheralRadioEvent>,
}

struct ScannerEntry {
    filter: Uuid,
    events: UnboundedSender<CentralRadioEvent>,
}

struct LinkEntry {
    central: PeerIdentity,
    central_events: UnboundedSender<CentralRadioEvent>,
    subscribed: bool,
}

struct PendingRequest {
    target: AttributeTarget,
    is_read: bool,
    reply: UnboundedSender<CentralRadioEvent>,
}

struct Inner {
    advertiser_available: bool,
    fail_next_advertise: bool,
    unresponsive: bool,
    server: Option<ServerEntry>,
    scanner: Option<ScannerEntry>,
    link: Option<LinkEntry>,
    next_request_id: u32,
    pending: HashMap<u32, PendingRequest>,
}

pub struct LoopbackRadio {
    inner: Mutex<Inner>,
}

impl LoopbackRadio {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                advertiser_available: true,
                fail_next_advertise: false,
                unresponsive: false,
                server: None,
                scanner: None,
                link: None,
                next_request_id: 1,
                pending: HashMap::new(),
            }),
        }
    }

    // ---- harness knobs -------------------------------------------------

    /// Simulate a chipset without an LE advertiser.
    pub fn set_advertiser_available(&self, available: bool) {
        self.lock().advertiser_available = available;
    }

    /// Make the next advertise start fail asynchronously.
    pub fn fail_next_advertise(&self) {
        self.lock().fail_next_advertise = true;
    }

    /// Swallow connect attempts entirely, leaving the central hanging in
    /// `Connecting` until its timeout fires.
    pub fn set_unresponsive(&self, unresponsive: bool) {
        self.lock().unresponsive = unresponsive;
    }

    pub fn advertiser_available(&self) -> bool {
        self.lock().advertiser_available
    }

    // ---- peripheral side -----------------------------------------------

    pub fn open_server(
        &self,
        identity: PeerIdentity,
        service: ServiceDescriptor,
        events: UnboundedSender<PeripheralRadioEvent>,
    ) -> Result<(), LinkError> {
        let mut inner = self.lock();
        if inner.server.is_some() {
            return Err(LinkError::Radio("gatt server already open".to_string()));
        }
        debug!(address = %identity.address, "opening gatt server");
        inner.server = Some(ServerEntry {
            identity,
            service,
            plan: None,
            events,
        });
        Ok(())
    }

    pub fn start_advertising(&self, plan: AdvertisePlan) -> Result<(), LinkError> {
        let mut inner = self.lock();
        if !inner.advertiser_available {
            return Err(LinkError::AdvertiserUnavailable);
        }
        let fail = inner.fail_next_advertise;
        inner.fail_next_advertise = false;
        let Some(server) = inner.server.as_mut() else {
            return Err(LinkError::ServerNotInitialized);
        };
        if plan.service_uuid != server.service.service_uuid {
            return Err(LinkError::Radio(
                "advertised service does not match the registered service".to_string(),
            ));
        }

        if fail {
            let _ = server.events.send(PeripheralRadioEvent::AdvertiseFailed {
                reason: "advertise start rejected by the controller".to_string(),
            });
            return Ok(());
        }

        debug!(service = %plan.service_uuid, "advertising started");
        server.plan = Some(plan);
        let _ = server.events.send(PeripheralRadioEvent::AdvertiseStarted);
        inner.deliver_advertisement();
        Ok(())
    }

    pub fn stop_advertising(&self) {
        let mut inner = self.lock();
        if let Some(server) = inner.server.as_mut() {
            server.plan = None;
        }
    }

    /// Close the server and drop the advertisement. An active link is torn
    /// down and the central is told it lost the connection.
    pub fn close_server(&self) {
        let mut inner = self.lock();
        if let Some(link) = inner.link.take() {
            let _ = link.central_events.send(CentralRadioEvent::Disconnected);
        }
        inner.pending.clear();
        inner.server = None;
    }

    /// Push the current characteristic value to the linked central, if it
    /// subscribed through the config descriptor.
    pub fn notify(&self, value: Vec<u8>, indicate: bool) -> Result<(), LinkError> {
        let inner = self.lock();
        if inner.server.is_none() {
            return Err(LinkError::ServerNotInitialized);
        }
        let link = inner.link.as_ref().ok_or(LinkError::NotConnected)?;
        if !link.subscribed {
            debug!("central not subscribed, dropping notification");
            return Ok(());
        }
        debug!(len = value.len(), indicate, "notifying central");
        let _ = link.central_events.send(CentralRadioEvent::Notified { value });
        Ok(())
    }

    /// Answer a previously delivered read or write request.
    pub fn send_response(&self, request_id: u32, status: GattStatus, value: Vec<u8>) {
        let mut inner = self.lock();
        let Some(pending) = inner.pending.remove(&request_id) else {
            warn!(request_id, "response for unknown request");
            return;
        };
        let event = if pending.is_read {
            CentralRadioEvent::ReadResponse {
                target: pending.target,
                status,
                value,
            }
        } else {
            CentralRadioEvent::WriteResponse {
                target: pending.target,
                status,
            }
        };
        let _ = pending.reply.send(event);
    }

    // ---- central side --------------------------------------------------

    pub fn start_scan(&self, filter: Uuid, events: UnboundedSender<CentralRadioEvent>) {
        let mut inner = self.lock();
        debug!(%filter, "scan started");
        inner.scanner = Some(ScannerEntry { filter, events });
        inner.deliver_advertisement();
    }

    pub fn stop_scan(&self) {
        self.lock().scanner = None;
    }

    /// Re-deliver the current advertisement, as a periodic beacon would.
    pub fn rebroadcast(&self) {
        self.lock().deliver_advertisement();
    }

    pub fn connect(
        &self,
        central: PeerIdentity,
        address: &str,
        events: UnboundedSender<CentralRadioEvent>,
    ) {
        let mut inner = self.lock();
        if inner.unresponsive {
            debug!(address, "connect swallowed, radio unresponsive");
            return;
        }

        if inner.link.is_some() {
            // Single-link radio: a second central is refused outright.
            let _ = events.send(CentralRadioEvent::ConnectFailed {
                address: address.to_string(),
                reason: "peer already has a connection".to_string(),
            });
            return;
        }
        let Some(server) = inner
            .server
            .as_ref()
            .filter(|s| s.plan.is_some() && s.identity.address == address)
        else {
            let _ = events.send(CentralRadioEvent::ConnectFailed {
                address: address.to_string(),
                reason: "device is not advertising".to_string(),
            });
            return;
        };
        let peer = server.identity.clone();
        let _ = server
            .events
            .send(PeripheralRadioEvent::ConnectionStateChange {
                peer: central.clone(),
                connected: true,
                status: GattStatus::Success,
            });
        let _ = events.send(CentralRadioEvent::Connected { peer });
        inner.link = Some(LinkEntry {
            central,
            central_events: events,
            subscribed: false,
        });
    }

    /// Tear down the active link. Safe to call with none.
    pub fn disconnect(&self) {
        let mut inner = self.lock();
        let Some(link) = inner.link.take() else {
            return;
        };
        inner.pending.clear();
        let _ = link.central_events.send(CentralRadioEvent::Disconnected);
        if let Some(server) = inner.server.as_ref() {
            let _ = server
                .events
                .send(PeripheralRadioEvent::ConnectionStateChange {
                    peer: link.central,
                    connected: false,
                    status: GattStatus::Success,
                });
        }
    }

    pub fn write_characteristic(
        &self,
        value: Vec<u8>,
        response_needed: bool,
        reply: UnboundedSender<CentralRadioEvent>,
    ) -> Result<(), LinkError> {
        self.route_write(AttributeTarget::Characteristic, value, response_needed, reply)
    }

    /// Config-descriptor writes always carry a response and flip the
    /// subscription state of the link.
    pub fn write_descriptor(
        &self,
        value: Vec<u8>,
        reply: UnboundedSender<CentralRadioEvent>,
    ) -> Result<(), LinkError> {
        {
            let mut inner = self.lock();
            if let Some(link) = inner.link.as_mut() {
                link.subscribed = value.first().map(|b| b & 0x01 != 0).unwrap_or(false);
            }
        }
        self.route_write(AttributeTarget::ConfigDescriptor, value, true, reply)
    }

    pub fn read_remote(
        &self,
        target: AttributeTarget,
        offset: usize,
        reply: UnboundedSender<CentralRadioEvent>,
    ) -> Result<(), LinkError> {
        let mut inner = self.lock();
        if inner.server.is_none() {
            return Err(LinkError::ServerNotInitialized);
        }
        let request_id = inner.register(PendingRequest {
            target,
            is_read: true,
            reply,
        });
        if let Some(server) = inner.server.as_ref() {
            let _ = server.events.send(PeripheralRadioEvent::ReadRequest {
                request_id,
                offset,
                target,
            });
        }
        Ok(())
    }

    // ---- internals -----------------------------------------------------

    fn route_write(
        &self,
        target: AttributeTarget,
        value: Vec<u8>,
        response_needed: bool,
        reply: UnboundedSender<CentralRadioEvent>,
    ) -> Result<(), LinkError> {
        let mut inner = self.lock();
        if inner.server.is_none() {
            return Err(LinkError::ServerNotInitialized);
        }
        let request_id = if response_needed {
            inner.register(PendingRequest {
                target,
                is_read: false,
                reply,
            })
        } else {
            inner.bump_request_id()
        };
        if let Some(server) = inner.server.as_ref() {
            let _ = server.events.send(PeripheralRadioEvent::WriteRequest {
                request_id,
                target,
                value,
                response_needed,
            });
        }
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Inner sends never block, so the lock cannot be poisoned mid-route
        // in any interesting way; recover the guard either way.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for LoopbackRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    fn bump_request_id(&mut self) -> u32 {
        let id = self.next_request_id;
        self.next_request_id += 1;
        id
    }

    fn register(&mut self, pending: PendingRequest) -> u32 {
        let id = self.bump_request_id();
        self.pending.insert(id, pending);
        id
    }

    fn deliver_advertisement(&self) {
        let Some(scanner) = self.scanner.as_ref() else {
            return;
        };
        let Some(server) = self.server.as_ref() else {
            return;
        };
        let Some(plan) = server.plan.as_ref() else {
            return;
        };
        if plan.service_uuid != scanner.filter {
            return;
        }
        let _ = scanner
            .events
            .send(CentralRadioEvent::AdvertisementReceived {
                address: server.identity.address.clone(),
                name: plan
                    .scan_response_name
                    .clone()
                    .or_else(|| server.identity.name.clone()),
                service_uuid: plan.service_uuid,
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::settings::LinkConfig;
    use tokio::sync::mpsc;

    fn server_parts() -> (PeerIdentity, ServiceDescriptor, AdvertisePlan) {
        let config = LinkConfig::default();
        let identity = PeerIdentity::new("AA:AA:AA:AA:AA:01", Some("peer".to_string()));
        let service = ServiceDescriptor::exchange_service(&config);
        let plan = AdvertisePlan::for_service(config.service_uuid, "peer");
        (identity, service, plan)
    }

    #[test]
    fn scanner_sees_an_advertising_server() {
        let radio = LoopbackRadio::new();
        let (p_tx, _p_rx) = mpsc::unbounded_channel();
        let (c_tx, mut c_rx) = mpsc::unbounded_channel();
        let (identity, service, plan) = server_parts();

        radio.open_server(identity, service, p_tx).unwrap();
        radio.start_advertising(plan).unwrap();
        radio.start_scan(LinkConfig::default().service_uuid, c_tx);

        match c_rx.try_recv().unwrap() {
            CentralRadioEvent::AdvertisementReceived { address, name, .. } => {
                assert_eq!(address, "AA:AA:AA:AA:AA:01");
                assert_eq!(name.as_deref(), Some("peer"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn scanner_with_other_filter_sees_nothing() {
        let radio = LoopbackRadio::new();
        let (p_tx, _p_rx) = mpsc::unbounded_channel();
        let (c_tx, mut c_rx) = mpsc::unbounded_channel();
        let (identity, service, plan) = server_parts();

        radio.open_server(identity, service, p_tx).unwrap();
        radio.start_advertising(plan).unwrap();
        radio.start_scan(Uuid::from_u128(0xdead_beef), c_tx);

        assert!(c_rx.try_recv().is_err());
    }

    #[test]
    fn advertise_plan_must_match_the_registered_service() {
        let radio = LoopbackRadio::new();
        let (p_tx, _p_rx) = mpsc::unbounded_channel();
        let (identity, service, _plan) = server_parts();
        radio.open_server(identity, service, p_tx).unwrap();

        let stray = AdvertisePlan::for_service(Uuid::from_u128(0xdead_beef), "peer");
        assert!(radio.start_advertising(stray).is_err());
    }

    #[test]
    fn connect_to_silent_address_fails() {
        let radio = LoopbackRadio::new();
        let (c_tx, mut c_rx) = mpsc::unbounded_channel();
        radio.connect(
            PeerIdentity::new("AA:AA:AA:AA:AA:02", None),
            "11:22:33:44:55:66",
            c_tx,
        );
        assert!(matches!(
            c_rx.try_recv().unwrap(),
            CentralRadioEvent::ConnectFailed { .. }
        ));
    }

    #[test]
    fn second_link_is_refused() {
        let radio = LoopbackRadio::new();
        let (p_tx, _p_rx) = mpsc::unbounded_channel();
        let (identity, service, plan) = server_parts();
        radio.open_server(identity, service, p_tx).unwrap();
        radio.start_advertising(plan).unwrap();

        let (c1_tx, mut c1_rx) = mpsc::unbounded_channel();
        radio.connect(
            PeerIdentity::new("AA:AA:AA:AA:AA:02", None),
            "AA:AA:AA:AA:AA:01",
            c1_tx,
        );
        assert!(matches!(
            c1_rx.try_recv().unwrap(),
            CentralRadioEvent::Connected { .. }
        ));

        let (c2_tx, mut c2_rx) = mpsc::unbounded_channel();
        radio.connect(
            PeerIdentity::new("AA:AA:AA:AA:AA:03", None),
            "AA:AA:AA:AA:AA:01",
            c2_tx,
        );
        assert!(matches!(
            c2_rx.try_recv().unwrap(),
            CentralRadioEvent::ConnectFailed { .. }
        ));
    }

    #[test]
    fn notify_reaches_only_a_subscribed_central() {
        let radio = LoopbackRadio::new();
        let (p_tx, mut p_rx) = mpsc::unbounded_channel();
        let (identity, service, plan) = server_parts();
        radio.open_server(identity, service, p_tx).unwrap();
        radio.start_advertising(plan).unwrap();

        let (c_tx, mut c_rx) = mpsc::unbounded_channel();
        radio.connect(
            PeerIdentity::new("AA:AA:AA:AA:AA:02", None),
            "AA:AA:AA:AA:AA:01",
            c_tx.clone(),
        );
        let _ = c_rx.try_recv(); // Connected

        radio.notify(b"dropped".to_vec(), false).unwrap();
        assert!(c_rx.try_recv().is_err());

        radio.write_descriptor(vec![0x01, 0x00], c_tx).unwrap();
        // Drain the descriptor write on the peripheral and ack it.
        loop {
            match p_rx.try_recv().unwrap() {
                PeripheralRadioEvent::WriteRequest { request_id, .. } => {
                    radio.send_response(request_id, GattStatus::Success, Vec::new());
                    break;
                }
                _ => continue,
            }
        }

        radio.notify(b"seen".to_vec(), false).unwrap();
        let notified = loop {
            match c_rx.try_recv().unwrap() {
                CentralRadioEvent::Notified { value } => break value,
                _ => continue,
            }
        };
        assert_eq!(notified, b"seen".to_vec());
    }

    #[test]
    fn disconnect_without_link_is_a_no_op() {
        let radio = LoopbackRadio::new();
        radio.disconnect();
        radio.close_server();
    }
}
