//! Serial port backend
//!
//! `serialport` is blocking, so an open port gets two blocking threads: one
//! reads the port into a [`ChunkReader`], one writes the frames queued on a
//! [`FrameSender`] and reports each outcome back. A port write fault fails
//! that one write; a port read fault ends the link as a read error.
//!
//! [`ChunkReader`]: crate::bridge::ChunkReader
//! [`FrameSender`]: crate::bridge::FrameSender

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serialport::{DataBits, Parity, SerialPort, SerialPortType, StopBits};
use tokio::sync::mpsc;

use glovelink_core::prelude::*;
use glovelink_core::{Metadata, TransportKind};

use crate::bridge::{self, ChunkSender, FrameRequest};
use crate::channel::{Channel, SerialParams};

/// Blocking read timeout; bounds how long the reader thread takes to notice a close
const PORT_TIMEOUT: Duration = Duration::from_millis(100);

/// Capacity of the chunk and frame queues between the port threads and the session
const CHUNK_CHANNEL_CAPACITY: usize = 64;

const KIND: TransportKind = TransportKind::Serial;

/// A serial port visible on this host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SerialPortSummary {
    pub name: String,
    pub usb_vendor_id: Option<u16>,
    pub usb_product_id: Option<u16>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
}

impl SerialPortSummary {
    fn from_info(info: serialport::SerialPortInfo) -> Self {
        match info.port_type {
            SerialPortType::UsbPort(usb) => Self {
                name: info.port_name,
                usb_vendor_id: Some(usb.vid),
                usb_product_id: Some(usb.pid),
                manufacturer: usb.manufacturer,
                product: usb.product,
            },
            _ => Self {
                name: info.port_name,
                usb_vendor_id: None,
                usb_product_id: None,
                manufacturer: None,
                product: None,
            },
        }
    }
}

/// List the serial ports the host exposes
pub fn list_ports() -> Result<Vec<SerialPortSummary>> {
    let ports = serialport::available_ports()
        .map_err(|e| Error::unavailable(KIND, format!("cannot enumerate serial ports: {e}")))?;
    Ok(ports.into_iter().map(SerialPortSummary::from_info).collect())
}

/// Pick the port to open.
///
/// An explicit port always wins. Otherwise the first port passing the vendor
/// filter is used; no ports at all means the capability is missing, ports
/// that all fail the filter mean nothing was selectable.
pub fn resolve_port(params: &SerialParams, ports: &[SerialPortSummary]) -> Result<String> {
    if let Some(port) = &params.port {
        return Ok(port.clone());
    }

    if ports.is_empty() {
        return Err(Error::unavailable(KIND, "no serial ports found"));
    }

    ports
        .iter()
        .find(|p| match params.usb_vendor_id {
            Some(vid) => p.usb_vendor_id == Some(vid),
            None => true,
        })
        .map(|p| p.name.clone())
        .ok_or_else(|| {
            Error::denied(
                KIND,
                format!(
                    "no serial port with USB vendor id {:04x}",
                    params.usb_vendor_id.unwrap_or_default()
                ),
            )
        })
}

/// Open a serial port and bridge it onto an async channel
pub async fn open(params: &SerialParams) -> Result<Channel> {
    let ports = match params.port {
        Some(_) => Vec::new(),
        None => list_ports()?,
    };
    let port_name = resolve_port(params, &ports)?;
    let baud_rate = params.baud_rate;

    info!("Opening serial port {} at {} baud", port_name, baud_rate);

    let name = port_name.clone();
    let port = tokio::task::spawn_blocking(move || open_port(&name, baud_rate))
        .await
        .map_err(|e| Error::open_failed(KIND, e.to_string()))??;

    let reader_port = port
        .try_clone()
        .map_err(|e| Error::open_failed(KIND, format!("{port_name}: {e}")))?;

    let stop = Arc::new(AtomicBool::new(false));

    // device -> session
    let (chunk_tx, reader) = bridge::chunk_channel(CHUNK_CHANNEL_CAPACITY);
    let reader_stop = Arc::clone(&stop);
    tokio::task::spawn_blocking(move || port_reader(reader_port, chunk_tx, reader_stop));

    // session -> device
    let (frames, frame_rx) = bridge::frame_channel(CHUNK_CHANNEL_CAPACITY);
    tokio::task::spawn_blocking(move || port_writer(port, frame_rx, stop));

    let mut metadata = Metadata::new();
    metadata.insert("port".into(), serde_json::json!(port_name));
    metadata.insert("baud_rate".into(), serde_json::json!(baud_rate));
    if let Some(summary) = ports.iter().find(|p| p.name == port_name) {
        if let Some(vid) = summary.usb_vendor_id {
            metadata.insert("usb_vendor_id".into(), serde_json::json!(vid));
        }
        if let Some(pid) = summary.usb_product_id {
            metadata.insert("usb_product_id".into(), serde_json::json!(pid));
        }
        if let Some(product) = &summary.product {
            metadata.insert("product".into(), serde_json::json!(product));
        }
    }

    Ok(Channel::framed(KIND, reader, frames).with_metadata(metadata))
}

fn open_port(name: &str, baud_rate: u32) -> Result<Box<dyn SerialPort>> {
    serialport::new(name, baud_rate)
        .timeout(PORT_TIMEOUT)
        .data_bits(DataBits::Eight)
        .stop_bits(StopBits::One)
        .parity(Parity::None)
        .open()
        .map_err(|e| map_open_error(name, e))
}

fn map_open_error(name: &str, e: serialport::Error) -> Error {
    match e.kind() {
        serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
            Error::denied(KIND, format!("{name}: {e}"))
        }
        _ => Error::open_failed(KIND, format!("{name}: {e}")),
    }
}

/// Blocking thread: read the port until it fails or the writer side stops.
///
/// A read fault is forwarded so the session sees it as a broken link rather
/// than the device hanging up.
fn port_reader(mut port: Box<dyn SerialPort>, tx: ChunkSender, stop: Arc<AtomicBool>) {
    let mut buf = [0u8; 512];

    while !stop.load(Ordering::Acquire) {
        match port.read(&mut buf) {
            Ok(0) => continue,
            Ok(n) => {
                if tx.blocking_send(Ok(buf[..n].to_vec())).is_err() {
                    break;
                }
            }
            Err(e) if is_idle(&e) => continue,
            Err(e) => {
                warn!("Serial read failed: {}", e);
                let _ = tx.blocking_send(Err(e));
                break;
            }
        }
    }

    debug!("serial reader finished");
}

fn is_idle(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::Interrupted
    )
}

/// Blocking thread: write frames to the port until the session closes.
///
/// Each frame's outcome goes back to the writing session. Dropping `port` on
/// exit releases the device; `stop` tells the reader thread to let go of its
/// clone as well.
fn port_writer(
    mut port: Box<dyn SerialPort>,
    mut rx: mpsc::Receiver<FrameRequest>,
    stop: Arc<AtomicBool>,
) {
    while let Some(request) = rx.blocking_recv() {
        let result = write_frame(&mut *port, &request.bytes);
        if let Err(e) = &result {
            warn!("Serial write of {} bytes failed: {}", request.bytes.len(), e);
        }
        request.complete(result);
    }

    stop.store(true, Ordering::Release);
    debug!("serial writer finished");
}

fn write_frame(port: &mut dyn Write, frame: &[u8]) -> std::io::Result<()> {
    port.write_all(frame)?;
    port.flush()
}
