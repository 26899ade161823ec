//! Demo: both roles in one process, wired over the loopback radio.
//!
//! The peripheral opens its server and advertises; the central scans,
//! connects to the first discovered peer and the two exchange one short
//! message in each direction before tearing the link down.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::info;

use ble_exchange_rust::central::callback::CentralCallback;
use ble_exchange_rust::infrastructure::logging;
use ble_exchange_rust::peripheral::callback::PeripheralCallback;
use ble_exchange_rust::{
    central, peripheral, CentralCommand, CentralManager, LoopbackRadio, PeerIdentity,
    PeripheralCommand, PeripheralManager, RadioAdapter, SettingsService,
};

const PERIPHERAL_ADDR: &str = "AA:AA:AA:AA:AA:01";
const CENTRAL_ADDR: &str = "AA:AA:AA:AA:AA:02";

/// Renders central events and drives the connection: grants the location
/// prompt and connects to the first peer the scan reports.
struct ConsoleCentral {
    commands: mpsc::UnboundedSender<CentralCommand>,
}

impl CentralCallback for ConsoleCentral {
    fn request_enable_radio(&mut self) {
        println!("[central] please enable bluetooth");
    }

    fn request_location_permission(&mut self) {
        println!("[central] location permission requested, granting");
        let _ = self.commands.send(CentralCommand::GrantLocationPermission);
        let _ = self.commands.send(CentralCommand::StartScan);
    }

    fn on_status(&mut self, message: &str) {
        println!("[central] {message}");
    }

    fn on_peer_found(&mut self, peer: &PeerIdentity) {
        println!("[central] found {} ({})", peer.address, peer.display_name());
        let _ = self.commands.send(CentralCommand::Connect(peer.address.clone()));
    }

    fn on_peer_list(&mut self, peers: &[PeerIdentity]) {
        println!("[central] {} device(s) discovered so far", peers.len());
    }

    fn on_alert(&mut self, message: &str) {
        println!("[central] !! {message}");
    }
}

struct ConsolePeripheral;

impl PeripheralCallback for ConsolePeripheral {
    fn request_enable_radio(&mut self) {
        println!("[peripheral] please enable bluetooth");
    }

    fn on_status(&mut self, message: &str) {
        println!("[peripheral] {message}");
    }

    fn on_alert(&mut self, message: &str) {
        println!("[peripheral] !! {message}");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings_service = SettingsService::new()?;
    let settings = settings_service.get().clone();
    let _logging = logging::init_logger(&settings.log_settings)?;
    let config = settings.link_config()?;

    info!("starting loopback exchange demo");

    let adapter = Arc::new(RadioAdapter::new());
    let radio = Arc::new(LoopbackRadio::new());

    // Peripheral role.
    let (p_event_tx, p_event_rx) = mpsc::unbounded_channel();
    let (p_radio_tx, p_radio_rx) = mpsc::unbounded_channel();
    let (p_cmd_tx, p_cmd_rx) = mpsc::unbounded_channel();
    let peripheral_manager = PeripheralManager::new(
        adapter.clone(),
        radio.clone(),
        config.clone(),
        PeerIdentity::new(PERIPHERAL_ADDR, Some(settings.local_name.clone())),
        p_event_tx,
        p_radio_tx,
    );
    tokio::spawn(peripheral::run(peripheral_manager, p_cmd_rx, p_radio_rx));
    tokio::spawn(peripheral::callback::pump_events(
        p_event_rx,
        ConsolePeripheral,
    ));

    // Central role.
    let (c_event_tx, c_event_rx) = mpsc::unbounded_channel();
    let (c_radio_tx, c_radio_rx) = mpsc::unbounded_channel();
    let (c_cmd_tx, c_cmd_rx) = mpsc::unbounded_channel();
    let central_manager = CentralManager::new(
        adapter,
        radio,
        config,
        PeerIdentity::new(CENTRAL_ADDR, Some("Central".to_string())),
        c_event_tx,
        c_radio_tx,
    );
    tokio::spawn(central::run(central_manager, c_cmd_rx, c_radio_rx));
    tokio::spawn(central::callback::pump_events(
        c_event_rx,
        ConsoleCentral {
            commands: c_cmd_tx.clone(),
        },
    ));

    let step = Duration::from_millis(150);

    let _ = p_cmd_tx.send(PeripheralCommand::InitServer);
    tokio::time::sleep(step).await;

    // First scan attempt runs into the location prompt; the console
    // callback grants it and retries.
    let _ = c_cmd_tx.send(CentralCommand::StartScan);
    tokio::time::sleep(step * 2).await;

    let _ = c_cmd_tx.send(CentralCommand::Send("ping from central".to_string()));
    tokio::time::sleep(step).await;

    let _ = p_cmd_tx.send(PeripheralCommand::Send("pong from peer".to_string()));
    tokio::time::sleep(step).await;

    let _ = c_cmd_tx.send(CentralCommand::Disconnect);
    tokio::time::sleep(step).await;

    let _ = p_cmd_tx.send(PeripheralCommand::Close);
    tokio::time::sleep(step).await;

    info!("demo finished");
    Ok(())
}
