//! GATT building blocks: the fixed service layout both roles share and the
//! request/response vocabulary the radio routes between them.

use uuid::Uuid;

use crate::domain::settings::LinkConfig;

/// Value a central writes to the config descriptor to subscribe to
/// notifications.
pub const ENABLE_NOTIFICATION_VALUE: [u8; 2] = [0x01, 0x00];
pub const DISABLE_NOTIFICATION_VALUE: [u8; 2] = [0x00, 0x00];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharacteristicProperties {
    pub read: bool,
    pub write: bool,
    pub notify: bool,
    pub indicate: bool,
}

#[derive(Debug, Clone)]
pub struct DescriptorSpec {
    pub uuid: Uuid,
    pub value: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct CharacteristicSpec {
    pub uuid: Uuid,
    pub properties: CharacteristicProperties,
    pub initial_value: Vec<u8>,
    pub descriptor: DescriptorSpec,
}

/// The single exposed service: one characteristic (read + write + notify)
/// carrying one client-config descriptor.
#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
    pub service_uuid: Uuid,
    pub characteristic: CharacteristicSpec,
}

impl ServiceDescriptor {
    pub fn exchange_service(config: &LinkConfig) -> Self {
        Self {
            service_uuid: config.service_uuid,
            characteristic: CharacteristicSpec {
                uuid: config.characteristic_uuid,
                properties: CharacteristicProperties {
                    read: true,
                    write: true,
                    notify: true,
                    indicate: false,
                },
                initial_value: vec![0, 0],
                descriptor: DescriptorSpec {
                    uuid: config.config_descriptor_uuid,
                    value: DISABLE_NOTIFICATION_VALUE.to_vec(),
                },
            },
        }
    }
}

/// Result code carried in a GATT response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GattStatus {
    Success,
    InvalidOffset,
    Failure,
}

/// Which attribute a request addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeTarget {
    Characteristic,
    ConfigDescriptor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvertiseMode {
    LowPower,
    Balanced,
    LowLatency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxPower {
    Low,
    Medium,
    High,
}

/// How the peripheral announces itself: the service UUID travels in the
/// primary payload, the device name in the scan response.
#[derive(Debug, Clone)]
pub struct AdvertisePlan {
    pub connectable: bool,
    pub mode: AdvertiseMode,
    pub tx_power: TxPower,
    pub service_uuid: Uuid,
    pub scan_response_name: Option<String>,
}

impl AdvertisePlan {
    pub fn for_service(service_uuid: Uuid, name: impl Into<String>) -> Self {
        Self {
            connectable: true,
            mode: AdvertiseMode::Balanced,
            tx_power: TxPower::Medium,
            service_uuid,
            scan_response_name: Some(name.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exchange_service_has_one_characteristic_and_one_descriptor() {
        let service = ServiceDescriptor::exchange_service(&LinkConfig::default());
        let ch = &service.characteristic;
        assert!(ch.properties.read && ch.properties.write && ch.properties.notify);
        assert!(!ch.properties.indicate);
        assert_eq!(ch.initial_value, vec![0, 0]);
        assert_eq!(ch.descriptor.value, DISABLE_NOTIFICATION_VALUE.to_vec());
    }

    #[test]
    fn advertise_plan_is_connectable_and_balanced() {
        let plan = AdvertisePlan::for_service(LinkConfig::default().service_uuid, "BLE Exchange");
        assert!(plan.connectable);
        assert_eq!(plan.mode, AdvertiseMode::Balanced);
        assert_eq!(plan.tx_power, TxPower::Medium);
        assert_eq!(plan.scan_response_name.as_deref(), Some("BLE Exchange"));
    }
}
