//! Channel and provider contract between sessions and physical transports
//!
//! A [`TransportProvider`] turns a [`ChannelSelector`] into an open
//! [`Channel`]: a reader half, a writer half and the metadata describing the
//! link. Everything above this module is transport-agnostic.

use std::io;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use glovelink_core::prelude::*;
use glovelink_core::{Metadata, TransportKind};

use crate::bridge::FrameSender;

/// Default serial line speed used by the glove firmware
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Advertised name prefix of the glove's radio module
pub const DEFAULT_NAME_PREFIX: &str = "NeuroGlove";

/// Serial port request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialParams {
    /// Device path (`/dev/ttyUSB0`, `COM3`); `None` picks the first match
    pub port: Option<String>,
    pub baud_rate: u32,
    /// Only consider USB ports from this vendor when auto-picking
    pub usb_vendor_id: Option<u16>,
}

impl Default for SerialParams {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            usb_vendor_id: None,
        }
    }
}

/// Radio (BLE) device request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadioParams {
    /// Match peripherals whose advertised name starts with this prefix
    pub name_prefix: String,
    /// Exact hardware address; takes precedence over the name prefix
    pub address: Option<String>,
    /// How long to scan before giving up
    pub scan_window: Duration,
    /// Interval of the signal-strength poll; `None` disables it
    pub rssi_poll: Option<Duration>,
}

impl Default for RadioParams {
    fn default() -> Self {
        Self {
            name_prefix: DEFAULT_NAME_PREFIX.to_string(),
            address: None,
            scan_window: Duration::from_secs(4),
            rssi_poll: Some(Duration::from_secs(5)),
        }
    }
}

/// What to open: the transport kind plus its filter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ChannelSelector {
    Serial(SerialParams),
    Radio(RadioParams),
}

impl ChannelSelector {
    pub fn kind(&self) -> TransportKind {
        match self {
            ChannelSelector::Serial(_) => TransportKind::Serial,
            ChannelSelector::Radio(_) => TransportKind::Radio,
        }
    }

    /// Default selector for a transport kind
    pub fn default_for(kind: TransportKind) -> Self {
        match kind {
            TransportKind::Serial => ChannelSelector::Serial(SerialParams::default()),
            TransportKind::Radio => ChannelSelector::Radio(RadioParams::default()),
        }
    }
}

pub type ChannelReader = Box<dyn AsyncRead + Send + Unpin>;

/// Write half of a channel
pub enum ChannelWriter {
    /// A byte stream; a frame is done once it is flushed
    Stream(Box<dyn AsyncWrite + Send + Unpin>),
    /// A backend that acknowledges each frame after the device write
    Frames(FrameSender),
}

impl ChannelWriter {
    /// Write one complete frame
    pub async fn write_frame(&mut self, frame: Vec<u8>) -> io::Result<()> {
        match self {
            ChannelWriter::Stream(writer) => {
                writer.write_all(&frame).await?;
                writer.flush().await
            }
            ChannelWriter::Frames(frames) => frames.send(frame).await,
        }
    }

    pub async fn shutdown(&mut self) -> io::Result<()> {
        match self {
            ChannelWriter::Stream(writer) => writer.shutdown().await,
            ChannelWriter::Frames(frames) => {
                frames.close();
                Ok(())
            }
        }
    }
}

/// An open duplex link to the device.
///
/// The reader ends (returns 0) when the device goes away and fails when the
/// link breaks. Shutting the writer down closes the link and releases the
/// underlying port or peripheral.
pub struct Channel {
    pub kind: TransportKind,
    pub reader: ChannelReader,
    pub writer: ChannelWriter,
    pub metadata: Metadata,
    /// In-place metadata refreshes (signal strength polls)
    pub metadata_updates: Option<mpsc::Receiver<Metadata>>,
}

impl Channel {
    pub fn new(
        kind: TransportKind,
        reader: impl AsyncRead + Send + Unpin + 'static,
        writer: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        Self::with_writer(kind, reader, ChannelWriter::Stream(Box::new(writer)))
    }

    /// Channel whose writes are acknowledged per frame by a backend
    pub fn framed(
        kind: TransportKind,
        reader: impl AsyncRead + Send + Unpin + 'static,
        frames: FrameSender,
    ) -> Self {
        Self::with_writer(kind, reader, ChannelWriter::Frames(frames))
    }

    fn with_writer(
        kind: TransportKind,
        reader: impl AsyncRead + Send + Unpin + 'static,
        writer: ChannelWriter,
    ) -> Self {
        Self {
            kind,
            reader: Box::new(reader),
            writer,
            metadata: Metadata::new(),
            metadata_updates: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_metadata_updates(mut self, updates: mpsc::Receiver<Metadata>) -> Self {
        self.metadata_updates = Some(updates);
        self
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("kind", &self.kind)
            .field("metadata", &self.metadata)
            .field("metadata_updates", &self.metadata_updates.is_some())
            .finish()
    }
}

/// Host capability that opens channels.
///
/// Implementations map their failures onto the transport errors:
/// - [`Error::TransportUnavailable`] when the host lacks the capability
/// - [`Error::TransportDenied`] when the request is declined or nothing matches
/// - [`Error::TransportOpenFailed`] for any other open-time fault
#[trait_variant::make(TransportProvider: Send)]
pub trait LocalTransportProvider {
    /// Request and open one channel matching `selector`
    async fn request_channel(&self, selector: &ChannelSelector) -> Result<Channel>;
}

/// Why a read loop stopped on its own
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEnd {
    /// The device closed the stream
    EndOfStream,
    /// The stream reported an error
    Fault(String),
}

impl std::fmt::Display for LinkEnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkEnd::EndOfStream => write!(f, "device closed the connection"),
            LinkEnd::Fault(reason) => write!(f, "read error: {reason}"),
        }
    }
}

/// Output of a transport session's read loop
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// One complete, trimmed line from the device
    Line(String),
    /// Fresh connection metadata
    Metadata(Metadata),
    /// The loop stopped without being cancelled
    Ended(LinkEnd),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_kind() {
        assert_eq!(
            ChannelSelector::Serial(SerialParams::default()).kind(),
            TransportKind::Serial
        );
        assert_eq!(
            ChannelSelector::default_for(TransportKind::Radio).kind(),
            TransportKind::Radio
        );
    }

    #[test]
    fn test_default_params() {
        let serial = SerialParams::default();
        assert_eq!(serial.baud_rate, 115_200);
        assert!(serial.port.is_none());

        let radio = RadioParams::default();
        assert_eq!(radio.name_prefix, "NeuroGlove");
        assert_eq!(radio.rssi_poll, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_link_end_display() {
        assert_eq!(
            LinkEnd::EndOfStream.to_string(),
            "device closed the connection"
        );
        assert_eq!(
            LinkEnd::Fault("broken pipe".into()).to_string(),
            "read error: broken pipe"
        );
    }

    #[test]
    fn test_channel_builder() {
        let (a, _b) = tokio::io::duplex(8);
        let (reader, writer) = tokio::io::split(a);
        let mut metadata = Metadata::new();
        metadata.insert("port".into(), serde_json::json!("/dev/ttyUSB0"));

        let channel = Channel::new(TransportKind::Serial, reader, writer).with_metadata(metadata);
        assert_eq!(channel.metadata["port"], "/dev/ttyUSB0");
        assert!(channel.metadata_updates.is_none());
    }
}
