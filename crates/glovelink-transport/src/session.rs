//! Transport session: one open channel, its read loop and serialized writes

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::AsyncReadExt;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

use glovelink_core::prelude::*;
use glovelink_core::{Metadata, TransportKind};

use crate::channel::{
    ChannelReader, ChannelSelector, ChannelWriter, LinkEnd, LinkEvent, TransportProvider,
};
use crate::framer::LineFramer;

/// Size of a single read from the channel
const READ_BUFFER_SIZE: usize = 1024;

/// Capacity of the link event channel handed to [`TransportSession::open`]
pub const LINK_EVENT_CAPACITY: usize = 256;

/// Owns exactly one open channel.
///
/// The read loop runs in a background task that frames the byte stream and
/// forwards [`LinkEvent`]s. It stops when [`close`](Self::close) is called or
/// when the channel ends; only the second case produces
/// [`LinkEvent::Ended`].
///
/// Writes hold the writer lock across write and flush, so two concurrent
/// `write` calls never interleave on the wire.
pub struct TransportSession {
    kind: TransportKind,
    metadata: Metadata,
    writer: Mutex<Option<ChannelWriter>>,
    /// One-shot sender that tells the read loop to stop.
    /// Consumed on first close.
    cancel_tx: std::sync::Mutex<Option<oneshot::Sender<()>>>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl TransportSession {
    /// Request a channel from `provider` and start its read loop.
    ///
    /// Link events are delivered to `event_tx` in arrival order.
    pub async fn open<P: TransportProvider>(
        provider: &P,
        selector: &ChannelSelector,
        event_tx: mpsc::Sender<LinkEvent>,
    ) -> Result<Self> {
        let kind = selector.kind();
        info!("Opening {} channel", kind);

        let channel = provider.request_channel(selector).await?;
        info!("{} channel open: {:?}", kind, channel.metadata);

        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        let reader_task = tokio::spawn(Self::read_loop(
            channel.reader,
            channel.metadata_updates,
            cancel_rx,
            event_tx,
        ));

        Ok(Self {
            kind,
            metadata: channel.metadata,
            writer: Mutex::new(Some(channel.writer)),
            cancel_tx: std::sync::Mutex::new(Some(cancel_tx)),
            reader_task: Mutex::new(Some(reader_task)),
            closed: AtomicBool::new(false),
        })
    }

    /// Background task: read chunks, frame them, forward complete lines.
    ///
    /// Three ways the task can end:
    /// 1. `cancel_rx` fires: return silently, the closer owns the teardown.
    /// 2. The reader returns 0 bytes: emit `Ended(EndOfStream)`.
    /// 3. The reader errors: emit `Ended(Fault)`.
    ///
    /// The unterminated tail is dropped in every case.
    async fn read_loop(
        mut reader: ChannelReader,
        mut metadata_updates: Option<mpsc::Receiver<Metadata>>,
        mut cancel_rx: oneshot::Receiver<()>,
        tx: mpsc::Sender<LinkEvent>,
    ) {
        let mut framer = LineFramer::new();
        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        let end = loop {
            tokio::select! {
                biased;

                _ = &mut cancel_rx => {
                    let dropped = framer.discard();
                    debug!("Read loop cancelled ({} pending bytes dropped)", dropped);
                    return;
                }

                Some(metadata) = next_metadata(&mut metadata_updates) => {
                    trace!("metadata update: {:?}", metadata);
                    if tx.send(LinkEvent::Metadata(metadata)).await.is_err() {
                        debug!("link event channel closed");
                        return;
                    }
                }

                read = reader.read(&mut buf) => match read {
                    Ok(0) => break LinkEnd::EndOfStream,
                    Ok(n) => {
                        for line in framer.feed(&buf[..n]) {
                            trace!("rx: {}", line);
                            if tx.send(LinkEvent::Line(line)).await.is_err() {
                                debug!("link event channel closed");
                                return;
                            }
                        }
                    }
                    Err(e) => break LinkEnd::Fault(e.to_string()),
                },
            }
        };

        let dropped = framer.discard();
        if dropped > 0 {
            debug!("Dropping {} bytes of unterminated input", dropped);
        }
        info!("Read loop finished: {}", end);
        let _ = tx.send(LinkEvent::Ended(end)).await;
    }

    /// Write one message followed by a single `\n`.
    ///
    /// Text holding a line break would reach the device as several messages
    /// and is refused with [`Error::InvalidMessage`]. A write fault is
    /// returned as [`Error::WriteFailed`]; the channel stays open.
    pub async fn write(&self, text: &str) -> Result<()> {
        if text.contains(['\n', '\r']) {
            return Err(Error::invalid_message("text contains a line break"));
        }
        if self.is_closed() {
            return Err(Error::NotConnected);
        }

        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(Error::NotConnected)?;

        let mut frame = Vec::with_capacity(text.len() + 1);
        frame.extend_from_slice(text.as_bytes());
        frame.push(b'\n');

        debug!("tx: {}", text);
        writer.write_frame(frame).await.map_err(|e| {
            warn!("{} write failed: {}", self.kind, e);
            Error::write_failed(e.to_string())
        })
    }

    /// Stop the read loop and close the channel.
    ///
    /// Idempotent. The read loop is cancelled and awaited before the writer is
    /// shut down, so no line is forwarded once this returns. A fault while
    /// shutting the writer down is returned for reporting only; the session is
    /// closed regardless.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            debug!("{} session already closed", self.kind);
            return Ok(());
        }

        info!("Closing {} channel", self.kind);

        let cancel = self
            .cancel_tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(tx) = cancel {
            // The loop may have ended on its own.
            let _ = tx.send(());
        }

        if let Some(task) = self.reader_task.lock().await.take() {
            if let Err(e) = task.await {
                warn!("Read loop task failed: {}", e);
            }
        }

        let writer = self.writer.lock().await.take();
        match writer {
            Some(mut writer) => writer.shutdown().await.map_err(|e| {
                warn!("Failed to shut down {} channel: {}", self.kind, e);
                Error::Io(e)
            }),
            None => Ok(()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    /// Metadata reported when the channel was opened
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}

impl Drop for TransportSession {
    fn drop(&mut self) {
        if !self.is_closed() {
            warn!("TransportSession dropped while {} channel open", self.kind);
            if let Some(tx) = self
                .cancel_tx
                .get_mut()
                .unwrap_or_else(|e| e.into_inner())
                .take()
            {
                let _ = tx.send(());
            }
        }
    }
}

async fn next_metadata(updates: &mut Option<mpsc::Receiver<Metadata>>) -> Option<Metadata> {
    match updates {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
