//! # glovelink-core - Core Domain Types
//!
//! Foundation crate for GloveLink. Provides domain types, session events,
//! error handling and logging setup.
//!
//! This crate has **zero internal dependencies** -- it only depends on external
//! crates (serde, chrono, thiserror, tracing, uuid).
//!
//! ## Public API
//!
//! ### Domain Types (`types`)
//! - [`LogEntry`] - A journaled message with id, timestamp, direction and text
//! - [`Direction`] - `In` (from the device) or `Out` (to the device)
//! - [`TransportKind`] - Serial cable or wireless radio
//! - [`ConnectionState`] - Disconnected / Connecting / Connected(kind, metadata)
//!
//! ### Events (`events`)
//! - [`SessionEvent`] - Notifications published by a device session
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Error enum covering transport, journal and AI failures
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//!
//! ## Prelude
//!
//! Import commonly used types with:
//! ```rust
//! use glovelink_core::prelude::*;
//! ```

pub mod error;
pub mod events;
pub mod logging;
pub mod types;

/// Prelude for common imports used throughout all GloveLink crates
pub mod prelude {
    pub use super::error::{Error, Result};
    pub use tracing::{debug, error, info, trace, warn};
}

// Re-export commonly used types at crate root for convenience
pub use error::{Error, Result};
pub use events::SessionEvent;
pub use types::{ConnectionState, Direction, LogEntry, Metadata, TransportKind};
