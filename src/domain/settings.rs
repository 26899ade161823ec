use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_false(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_thread_ids: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

fn default_level() -> String {
    "info".into()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".into()
}
fn default_prefix() -> String {
    "ble_exchange".into()
}
fn default_rotation() -> String {
    "daily".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Name advertised in the scan response.
    #[serde(default = "default_local_name")]
    pub local_name: String,

    // Fixed GATT identifiers shared by both roles. The central filters its
    // scan by the service UUID; the peripheral exposes the service.
    #[serde(default = "default_service_uuid")]
    pub ble_service_uuid: String,
    #[serde(default = "default_characteristic_uuid")]
    pub ble_characteristic_uuid: String,
    #[serde(default = "default_config_descriptor_uuid")]
    pub ble_config_descriptor_uuid: String,

    /// Deadline for a stuck `Connecting` phase, in milliseconds. Zero
    /// disables the timeout.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default)]
    pub log_settings: LogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            local_name: default_local_name(),
            ble_service_uuid: default_service_uuid(),
            ble_characteristic_uuid: default_characteristic_uuid(),
            ble_config_descriptor_uuid: default_config_descriptor_uuid(),
            connect_timeout_ms: default_connect_timeout_ms(),
            log_settings: LogSettings::default(),
        }
    }
}

impl Settings {
    /// Resolve the UUID strings into the config the managers consume.
    pub fn link_config(&self) -> anyhow::Result<LinkConfig> {
        Ok(LinkConfig {
            service_uuid: Uuid::parse_str(&self.ble_service_uuid)?,
            characteristic_uuid: Uuid::parse_str(&self.ble_characteristic_uuid)?,
            config_descriptor_uuid: Uuid::parse_str(&self.ble_config_descriptor_uuid)?,
            connect_timeout: match self.connect_timeout_ms {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            },
        })
    }
}

fn default_local_name() -> String {
    "BLE Exchange".to_string()
}
// The service reuses the standard Current Time Service identifiers; the
// config descriptor is the standard CCCD.
fn default_service_uuid() -> String {
    "00001805-0000-1000-8000-00805f9b34fb".to_string()
}
fn default_characteristic_uuid() -> String {
    "00002a2b-0000-1000-8000-00805f9b34fb".to_string()
}
fn default_config_descriptor_uuid() -> String {
    "00002902-0000-1000-8000-00805f9b34fb".to_string()
}
fn default_connect_timeout_ms() -> u64 {
    10_000
}

/// Parsed link parameters handed to both managers at construction.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub service_uuid: Uuid,
    pub characteristic_uuid: Uuid,
    pub config_descriptor_uuid: Uuid,
    pub connect_timeout: Option<Duration>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Settings::default()
            .link_config()
            .expect("default UUIDs are valid")
    }
}

/// Loads settings from `<config dir>/BleExchange/settings.json`, falling
/// back to defaults when the file is missing or unreadable.
pub struct SettingsService {
    settings: Settings,
    path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let path = Self::storage_path()?;
        let settings = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
            Err(_) => Settings::default(),
        };
        Ok(Self { settings, path })
    }

    fn storage_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("no user config directory"))?;
        path.push("BleExchange");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        fs::write(&self.path, serde_json::to_string_pretty(&self.settings)?)?;
        Ok(())
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_resolve_to_a_link_config() {
        let config = Settings::default().link_config().unwrap();
        assert_eq!(
            config.service_uuid,
            Uuid::parse_str("00001805-0000-1000-8000-00805f9b34fb").unwrap()
        );
        assert_eq!(config.connect_timeout, Some(Duration::from_millis(10_000)));
    }

    #[test]
    fn zero_timeout_disables_the_connect_deadline() {
        let settings = Settings {
            connect_timeout_ms: 0,
            ..Settings::default()
        };
        assert!(settings.link_config().unwrap().connect_timeout.is_none());
    }

    #[test]
    fn malformed_uuid_is_a_config_error() {
        let settings = Settings {
            ble_service_uuid: "not-a-uuid".to_string(),
            ..Settings::default()
        };
        assert!(settings.link_config().is_err());
    }
}
