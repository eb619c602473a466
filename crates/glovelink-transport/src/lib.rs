//! # glovelink-transport - Device Links
//!
//! Opens byte channels to the glove over a serial cable or a BLE radio link,
//! frames the incoming stream into lines, and owns the per-connection read
//! loop.
//!
//! Depends on [`glovelink_core`] for domain types and error handling.
//!
//! ## Public API
//!
//! ### Channels
//! - [`TransportProvider`] - Host capability that opens a [`Channel`]
//! - [`ChannelSelector`] - Which transport to open and how to pick the device
//! - [`HostTransport`] - Provider backed by real serial ports and radios
//!
//! ### Sessions
//! - [`TransportSession`] - One open channel: read loop, writes, close
//! - [`LinkEvent`] - Lines, metadata refreshes and link end from the read loop
//!
//! ### Framing
//! - [`LineFramer`] - Newline framing with partial-line buffering
//! - [`bridge`] - Async halves for thread- and callback-driven backends
//!
//! ### Backends
//! - [`serial::list_ports()`] - Enumerate serial ports
//! - [`radio`] - Nordic UART over BLE (`radio` feature)

pub mod bridge;
pub mod channel;
pub mod framer;
pub mod host;
pub mod radio;
pub mod serial;
pub mod session;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_utils;

pub use channel::{
    Channel, ChannelReader, ChannelSelector, ChannelWriter, LinkEnd, LinkEvent,
    LocalTransportProvider, RadioParams, SerialParams, TransportProvider, DEFAULT_BAUD_RATE,
    DEFAULT_NAME_PREFIX,
};
pub use framer::LineFramer;
pub use host::HostTransport;
pub use serial::{list_ports, SerialPortSummary};
pub use session::{TransportSession, LINK_EVENT_CAPACITY};
