//! Configuration types for GloveLink
//!
//! Defines `Settings` and its per-section structs. Every field has a default,
//! so a partial `config.toml` is always valid.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use glovelink_transport::{RadioParams, SerialParams, DEFAULT_BAUD_RATE, DEFAULT_NAME_PREFIX};

/// Global settings from `config.toml`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub serial: SerialSettings,

    #[serde(default)]
    pub radio: RadioSettings,

    #[serde(default)]
    pub journal: JournalSettings,

    #[serde(default)]
    pub ai: AiSettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SerialSettings {
    /// Device path; empty or missing auto-picks a port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Only auto-pick USB ports from this vendor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usb_vendor_id: Option<u16>,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: default_baud_rate(),
            usb_vendor_id: None,
        }
    }
}

impl SerialSettings {
    pub fn params(&self) -> SerialParams {
        SerialParams {
            port: self.port.clone().filter(|p| !p.trim().is_empty()),
            baud_rate: self.baud_rate,
            usb_vendor_id: self.usb_vendor_id,
        }
    }
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RadioSettings {
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,

    /// Hardware address; takes precedence over `name_prefix`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    #[serde(default = "default_scan_secs")]
    pub scan_secs: u64,

    /// 0 disables the signal strength poll
    #[serde(default = "default_rssi_poll_secs")]
    pub rssi_poll_secs: u64,
}

impl Default for RadioSettings {
    fn default() -> Self {
        Self {
            name_prefix: default_name_prefix(),
            address: None,
            scan_secs: default_scan_secs(),
            rssi_poll_secs: default_rssi_poll_secs(),
        }
    }
}

impl RadioSettings {
    pub fn params(&self) -> RadioParams {
        RadioParams {
            name_prefix: self.name_prefix.clone(),
            address: self.address.clone().filter(|a| !a.trim().is_empty()),
            scan_window: Duration::from_secs(self.scan_secs),
            rssi_poll: (self.rssi_poll_secs > 0).then(|| Duration::from_secs(self.rssi_poll_secs)),
        }
    }
}

fn default_name_prefix() -> String {
    DEFAULT_NAME_PREFIX.to_string()
}

fn default_scan_secs() -> u64 {
    4
}

fn default_rssi_poll_secs() -> u64 {
    5
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct JournalSettings {
    /// Directory holding one JSON file per day; defaults to the data dir
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AiSettings {
    #[serde(default = "default_model")]
    pub model: String,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Language used by `translate` when none is given
    #[serde(default = "default_target_language")]
    pub target_language: String,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_key_env: default_api_key_env(),
            target_language: default_target_language(),
        }
    }
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

fn default_target_language() -> String {
    "en".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.serial.baud_rate, 115_200);
        assert_eq!(settings.radio.name_prefix, "NeuroGlove");
        assert_eq!(settings.radio.scan_secs, 4);
        assert_eq!(settings.ai.model, "gemini-2.5-flash");
        assert!(settings.journal.dir.is_none());
    }

    #[test]
    fn test_partial_toml() {
        let settings: Settings = toml::from_str(
            r#"
[serial]
port = "/dev/ttyACM0"

[ai]
target_language = "fr"
"#,
        )
        .unwrap();

        assert_eq!(settings.serial.port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(settings.serial.baud_rate, 115_200);
        assert_eq!(settings.ai.target_language, "fr");
        assert_eq!(settings.ai.api_key_env, "GEMINI_API_KEY");
    }

    #[test]
    fn test_params_from_settings() {
        let mut settings = Settings::default();
        settings.serial.port = Some("  ".into());
        settings.serial.usb_vendor_id = Some(0x10c4);
        settings.radio.rssi_poll_secs = 0;

        let serial = settings.serial.params();
        assert!(serial.port.is_none());
        assert_eq!(serial.usb_vendor_id, Some(0x10c4));

        let radio = settings.radio.params();
        assert_eq!(radio.scan_window, Duration::from_secs(4));
        assert!(radio.rssi_poll.is_none());
    }
}
