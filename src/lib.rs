//! GloveLink Library
//!
//! Serial and radio console for the Neuro Glove. The session engine lives in
//! the workspace crates; this crate wires it to the command line.

pub mod commands;
pub mod headless;

pub use headless::runner::run_connect;

use glovelink_core::prelude::*;

/// Shared process setup: panic/error reports and file logging
pub fn startup() -> Result<()> {
    color_eyre::install().map_err(|e| Error::cli(e.to_string()))?;
    glovelink_core::logging::init()?;
    Ok(())
}
