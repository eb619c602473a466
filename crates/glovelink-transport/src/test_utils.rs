//! Test utilities for transport consumers
//!
//! [`MockTransport`] is a scripted [`TransportProvider`]: each request pops
//! the next queued outcome. Queued devices are wired like the real backends:
//! device bytes arrive through a chunk reader and host frames are
//! acknowledged one by one. The test keeps the [`MockDevice`] end and plays
//! the glove, including broken reads and refused writes.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::{mpsc, oneshot};

use glovelink_core::prelude::*;
use glovelink_core::{Metadata, TransportKind};

use crate::bridge::{self, ChunkReader, ChunkSender, FrameRequest, FrameSender};
use crate::channel::{Channel, ChannelSelector, TransportProvider};

const MOCK_BUFFER: usize = 4096;
const MOCK_QUEUE: usize = 64;

/// Scripted open failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    Unavailable,
    Denied,
    OpenFailed,
}

impl MockFailure {
    fn into_error(self, kind: TransportKind) -> Error {
        match self {
            MockFailure::Unavailable => Error::unavailable(kind, "mock: capability missing"),
            MockFailure::Denied => Error::denied(kind, "mock: request declined"),
            MockFailure::OpenFailed => Error::open_failed(kind, "mock: open failed"),
        }
    }
}

enum MockOutcome {
    Device {
        reader: ChunkReader,
        frames: FrameSender,
        pump: FramePump,
        metadata: Metadata,
        updates: mpsc::Receiver<Metadata>,
        gate: Option<oneshot::Receiver<()>>,
    },
    Fail(MockFailure),
}

#[derive(Default)]
struct MockState {
    outcomes: VecDeque<MockOutcome>,
    requests: Vec<ChannelSelector>,
}

/// Scripted transport provider
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a device for the next request
    pub fn push_device(&self) -> MockDevice {
        self.push_device_with(Metadata::new())
    }

    /// Queue a device that reports `metadata` on open
    pub fn push_device_with(&self, metadata: Metadata) -> MockDevice {
        let (device, outcome) = Self::device_outcome(metadata, None);
        self.push(outcome);
        device
    }

    /// Queue a device whose open only completes once the returned sender
    /// fires (or is dropped).
    pub fn push_gated_device(&self) -> (MockDevice, oneshot::Sender<()>) {
        let (gate_tx, gate_rx) = oneshot::channel();
        let (device, outcome) = Self::device_outcome(Metadata::new(), Some(gate_rx));
        self.push(outcome);
        (device, gate_tx)
    }

    /// Queue an open failure for the next request
    pub fn push_failure(&self, failure: MockFailure) {
        self.push(MockOutcome::Fail(failure));
    }

    /// Selectors received so far
    pub fn requests(&self) -> Vec<ChannelSelector> {
        self.lock().requests.clone()
    }

    pub fn request_count(&self) -> usize {
        self.lock().requests.len()
    }

    fn device_outcome(
        metadata: Metadata,
        gate: Option<oneshot::Receiver<()>>,
    ) -> (MockDevice, MockOutcome) {
        let (chunks, reader) = bridge::chunk_channel(MOCK_QUEUE);
        let (frames, requests) = bridge::frame_channel(MOCK_QUEUE);
        let (host_wire, device_wire) = tokio::io::duplex(MOCK_BUFFER);
        let (updates_tx, updates_rx) = mpsc::channel(8);
        let write_fault = Arc::new(AtomicBool::new(false));

        let device = MockDevice {
            chunks,
            wire: device_wire,
            updates: updates_tx,
            received: Vec::new(),
            write_fault: Arc::clone(&write_fault),
        };
        let outcome = MockOutcome::Device {
            reader,
            frames,
            pump: FramePump {
                requests,
                wire: host_wire,
                write_fault,
            },
            metadata,
            updates: updates_rx,
            gate,
        };
        (device, outcome)
    }

    fn push(&self, outcome: MockOutcome) {
        self.lock().outcomes.push_back(outcome);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl TransportProvider for MockTransport {
    async fn request_channel(&self, selector: &ChannelSelector) -> Result<Channel> {
        let outcome = {
            let mut state = self.lock();
            state.requests.push(selector.clone());
            state.outcomes.pop_front()
        };
        let kind = selector.kind();

        match outcome {
            None => Err(Error::denied(kind, "mock: no device queued")),
            Some(MockOutcome::Fail(failure)) => Err(failure.into_error(kind)),
            Some(MockOutcome::Device {
                reader,
                frames,
                pump,
                metadata,
                updates,
                gate,
            }) => {
                if let Some(gate) = gate {
                    let _ = gate.await;
                }
                tokio::spawn(pump.run());
                Ok(Channel::framed(kind, reader, frames)
                    .with_metadata(metadata)
                    .with_metadata_updates(updates))
            }
        }
    }
}

/// Host frames on their way to the device wire
struct FramePump {
    requests: mpsc::Receiver<FrameRequest>,
    wire: DuplexStream,
    write_fault: Arc<AtomicBool>,
}

impl FramePump {
    async fn run(mut self) {
        while let Some(request) = self.requests.recv().await {
            let result = if self.write_fault.load(Ordering::Acquire) {
                Err(io::Error::other("mock: write fault"))
            } else {
                write_all_flush(&mut self.wire, &request.bytes).await
            };
            request.complete(result);
        }
        // Host closed the channel
        let _ = self.wire.shutdown().await;
    }
}

async fn write_all_flush(wire: &mut DuplexStream, bytes: &[u8]) -> io::Result<()> {
    wire.write_all(bytes).await?;
    wire.flush().await
}

/// Device end of a mock channel
pub struct MockDevice {
    chunks: ChunkSender,
    wire: DuplexStream,
    updates: mpsc::Sender<Metadata>,
    received: Vec<u8>,
    write_fault: Arc<AtomicBool>,
}

impl MockDevice {
    /// Send one newline-terminated line to the host
    pub async fn send_line(&mut self, line: &str) {
        self.send_raw(format!("{line}\n").as_bytes()).await;
    }

    /// Send raw bytes to the host
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.chunks
            .send(Ok(bytes.to_vec()))
            .await
            .expect("mock host reader dropped");
    }

    /// Break the link: the host's next read fails with `reason`
    pub async fn fail_read(&self, reason: &str) {
        self.chunks
            .send(Err(io::Error::other(reason.to_string())))
            .await
            .expect("mock host reader dropped");
    }

    /// Refuse (or accept again) every host write until toggled back
    pub fn fail_writes(&self, refuse: bool) {
        self.write_fault.store(refuse, Ordering::Release);
    }

    /// Push a metadata refresh (signal strength and similar)
    pub async fn push_metadata(&self, metadata: Metadata) {
        self.updates
            .send(metadata)
            .await
            .expect("mock metadata receiver dropped");
    }

    /// Next line the host wrote, without its terminator.
    ///
    /// Returns `None` if the host closed the channel first, or nothing
    /// arrives within a second.
    pub async fn read_line(&mut self) -> Option<String> {
        loop {
            if let Some(pos) = self.received.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = self.received.drain(..=pos).collect();
                return Some(String::from_utf8_lossy(&line[..pos]).into_owned());
            }
            let mut buf = [0u8; 256];
            let read = tokio::time::timeout(Duration::from_secs(1), self.wire.read(&mut buf));
            match read.await {
                Ok(Ok(0)) | Ok(Err(_)) | Err(_) => return None,
                Ok(Ok(n)) => self.received.extend_from_slice(&buf[..n]),
            }
        }
    }

    /// Everything the host writes within `window`, including buffered bytes
    pub async fn drain_for(&mut self, window: Duration) -> Vec<u8> {
        let mut out = std::mem::take(&mut self.received);
        let deadline = tokio::time::Instant::now() + window;
        let mut buf = [0u8; 256];
        while let Ok(Ok(n)) = tokio::time::timeout_at(deadline, self.wire.read(&mut buf)).await {
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        out
    }

    /// Whether the host has closed its writer (read returns EOF)
    pub async fn host_closed(&mut self) -> bool {
        let mut buf = [0u8; 256];
        loop {
            match tokio::time::timeout(Duration::from_secs(1), self.wire.read(&mut buf)).await {
                Ok(Ok(0)) | Ok(Err(_)) => return true,
                Ok(Ok(n)) => self.received.extend_from_slice(&buf[..n]),
                Err(_) => return false,
            }
        }
    }

    /// Close the device side; the host sees end-of-stream
    pub async fn hang_up(self) {
        drop(self.chunks);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::SerialParams;

    fn serial() -> ChannelSelector {
        ChannelSelector::Serial(SerialParams::default())
    }

    #[tokio::test]
    async fn test_empty_queue_is_denied() {
        let mock = MockTransport::new();
        let err = mock.request_channel(&serial()).await.unwrap_err();
        assert!(matches!(err, Error::TransportDenied { .. }));
        assert_eq!(mock.request_count(), 1);
    }

    #[tokio::test]
    async fn test_failures_pop_in_order() {
        let mock = MockTransport::new();
        mock.push_failure(MockFailure::Unavailable);
        mock.push_failure(MockFailure::OpenFailed);

        assert!(matches!(
            mock.request_channel(&serial()).await.unwrap_err(),
            Error::TransportUnavailable { .. }
        ));
        assert!(matches!(
            mock.request_channel(&serial()).await.unwrap_err(),
            Error::TransportOpenFailed { .. }
        ));
    }

    #[tokio::test]
    async fn test_device_round_trip() {
        let mock = MockTransport::new();
        let mut device = mock.push_device();
        let mut channel = mock.request_channel(&serial()).await.unwrap();

        channel.writer.write_frame(b"ping\n".to_vec()).await.unwrap();
        assert_eq!(device.read_line().await.as_deref(), Some("ping"));

        device.send_line("pong").await;
        let mut buf = [0u8; 16];
        let n = channel.reader.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"pong\n");
    }

    #[tokio::test]
    async fn test_device_can_refuse_writes() {
        let mock = MockTransport::new();
        let mut device = mock.push_device();
        let mut channel = mock.request_channel(&serial()).await.unwrap();

        device.fail_writes(true);
        let err = channel.writer.write_frame(b"lost\n".to_vec()).await.unwrap_err();
        assert_eq!(err.to_string(), "mock: write fault");

        device.fail_writes(false);
        channel.writer.write_frame(b"kept\n".to_vec()).await.unwrap();
        assert_eq!(device.read_line().await.as_deref(), Some("kept"));
    }

    #[tokio::test]
    async fn test_read_failure_and_close() {
        let mock = MockTransport::new();
        let mut device = mock.push_device();
        let mut channel = mock.request_channel(&serial()).await.unwrap();

        device.fail_read("framing error").await;
        let mut buf = [0u8; 16];
        let err = channel.reader.read(&mut buf).await.unwrap_err();
        assert_eq!(err.to_string(), "framing error");

        channel.writer.shutdown().await.unwrap();
        assert!(device.host_closed().await);
    }

    #[tokio::test]
    async fn test_gated_device_waits() {
        let mock = MockTransport::new();
        let (_device, gate) = mock.push_gated_device();

        let pending = tokio::spawn({
            let mock = mock.clone();
            async move { mock.request_channel(&serial()).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!pending.is_finished());

        gate.send(()).unwrap();
        assert!(pending.await.unwrap().is_ok());
    }
}
