//! Settings file loading and initialization
//!
//! The file lives at `<config_dir>/glovelink/config.toml` unless a path is
//! given explicitly. Loading never fails: a missing or broken file yields the
//! defaults.

use std::path::{Path, PathBuf};

use glovelink_core::prelude::*;

use super::types::Settings;

const CONFIG_DIR: &str = "glovelink";
const CONFIG_FILENAME: &str = "config.toml";

/// Default settings path for this user
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR)
        .join(CONFIG_FILENAME)
}

/// Default journal directory for this user
pub fn default_journal_dir() -> PathBuf {
    glovelink_core::logging::data_directory().join("journal")
}

/// Load settings from `config_path`, falling back to defaults
pub fn load_settings(config_path: &Path) -> Settings {
    if !config_path.exists() {
        debug!("No config file at {:?}, using defaults", config_path);
        return Settings::default();
    }

    match std::fs::read_to_string(config_path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(settings) => {
                debug!("Loaded settings from {:?}", config_path);
                settings
            }
            Err(e) => {
                warn!("Failed to parse {:?}: {}", config_path, e);
                Settings::default()
            }
        },
        Err(e) => {
            warn!("Failed to read {:?}: {}", config_path, e);
            Settings::default()
        }
    }
}

/// Write a commented default config if none exists.
///
/// Returns `true` when a file was created.
pub fn init_config(config_path: &Path) -> Result<bool> {
    if config_path.exists() {
        debug!("Config already present at {:?}", config_path);
        return Ok(false);
    }

    ensure_parent(config_path)?;
    std::fs::write(config_path, DEFAULT_CONFIG)
        .map_err(|e| Error::config(format!("Failed to write {:?}: {}", config_path, e)))?;

    info!("Created default config at {:?}", config_path);
    Ok(true)
}

fn ensure_parent(config_path: &Path) -> Result<()> {
    match config_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() && !dir.exists() => std::fs::create_dir_all(dir)
            .map_err(|e| Error::config(format!("Failed to create {:?}: {}", dir, e))),
        _ => Ok(()),
    }
}

const DEFAULT_CONFIG: &str = r#"# GloveLink Configuration

[serial]
# port = "/dev/ttyUSB0"   # Leave unset to pick the first available port
baud_rate = 115200
# usb_vendor_id = 4292    # Only auto-pick ports from this USB vendor

[radio]
name_prefix = "NeuroGlove"
# address = "C0:FF:EE:00:11:22"
scan_secs = 4
rssi_poll_secs = 5        # 0 disables signal strength updates

[journal]
# dir = "/path/to/journal"

[ai]
model = "gemini-2.5-flash"
api_key_env = "GEMINI_API_KEY"
target_language = "en"
"#;
