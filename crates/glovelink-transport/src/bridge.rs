//! Async halves for devices driven from threads or callbacks
//!
//! Serial ports block and BLE characteristics are written one call at a
//! time, so neither backend can hand the session a plain stream. Instead:
//!
//! - [`ChunkReader`] is the read half. The backend pushes chunks (or the read
//!   error that ended the link) into its sender; dropping the sender is
//!   end-of-stream.
//! - [`FrameSender`] is the write half. Every frame travels with a oneshot
//!   that the backend completes once the bytes reached the device, so a
//!   device write fault comes back to the writer instead of being lost.

use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::{mpsc, oneshot};

/// Chunks (or the terminating read error) flowing towards the session
pub type ChunkSender = mpsc::Sender<io::Result<Vec<u8>>>;

/// One frame handed to a backend, plus the slot for its outcome
#[derive(Debug)]
pub struct FrameRequest {
    pub bytes: Vec<u8>,
    done: oneshot::Sender<io::Result<()>>,
}

impl FrameRequest {
    /// Report the outcome back to the writer
    pub fn complete(self, result: io::Result<()>) {
        // The writer may have given up waiting
        let _ = self.done.send(result);
    }
}

/// Read half fed by a [`ChunkSender`]
#[derive(Debug)]
pub struct ChunkReader {
    rx: mpsc::Receiver<io::Result<Vec<u8>>>,
    pending: Vec<u8>,
    pos: usize,
}

pub fn chunk_channel(capacity: usize) -> (ChunkSender, ChunkReader) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        tx,
        ChunkReader {
            rx,
            pending: Vec::new(),
            pos: 0,
        },
    )
}

impl AsyncRead for ChunkReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            if this.pos < this.pending.len() {
                let n = buf.remaining().min(this.pending.len() - this.pos);
                buf.put_slice(&this.pending[this.pos..this.pos + n]);
                this.pos += n;
                return Poll::Ready(Ok(()));
            }

            match ready!(this.rx.poll_recv(cx)) {
                Some(Ok(chunk)) => {
                    this.pending = chunk;
                    this.pos = 0;
                }
                Some(Err(e)) => return Poll::Ready(Err(e)),
                None => return Poll::Ready(Ok(())),
            }
        }
    }
}

/// Write half whose frames are acknowledged by the backend
#[derive(Debug)]
pub struct FrameSender {
    tx: Option<mpsc::Sender<FrameRequest>>,
}

pub fn frame_channel(capacity: usize) -> (FrameSender, mpsc::Receiver<FrameRequest>) {
    let (tx, rx) = mpsc::channel(capacity);
    (FrameSender { tx: Some(tx) }, rx)
}

impl FrameSender {
    /// Hand `bytes` to the backend and wait for the device write to finish
    pub async fn send(&self, bytes: Vec<u8>) -> io::Result<()> {
        let tx = self.tx.as_ref().ok_or_else(writer_closed)?;
        let (done, result) = oneshot::channel();
        tx.send(FrameRequest { bytes, done })
            .await
            .map_err(|_| bridge_gone())?;
        result.await.map_err(|_| bridge_gone())?
    }

    /// Stop accepting frames; the backend sees its receiver end
    pub fn close(&mut self) {
        self.tx = None;
    }
}

fn writer_closed() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "writer closed")
}

fn bridge_gone() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "device link is gone")
}
