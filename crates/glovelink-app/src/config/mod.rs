//! Configuration file parsing for GloveLink
//!
//! Supports `<config_dir>/glovelink/config.toml` with `[serial]`, `[radio]`,
//! `[journal]` and `[ai]` sections.

pub mod settings;
pub mod types;

pub use settings::{default_config_path, default_journal_dir, init_config, load_settings};
pub use types::*;
