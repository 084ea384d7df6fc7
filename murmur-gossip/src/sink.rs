// SPDX-License-Identifier: MIT OR Apache-2.0

//! The byte-sink seam towards the RPC transport.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use murmur_core::ErrorKind;
use thiserror::Error;
use tokio::sync::mpsc;

/// A writable stream of byte frames towards one remote peer.
///
/// `close` is graceful and terminal: sends after a close (or after the
/// remote went away) fail with [`SinkError::Closed`].
#[async_trait]
pub trait ByteSink: Send + Sync {
    async fn send(&self, bytes: Vec<u8>) -> Result<(), SinkError>;

    async fn close(&self) -> Result<(), SinkError>;

    fn is_closed(&self) -> bool;
}

/// Channel-backed [`ByteSink`] for in-process wiring and tests.
///
/// Frames arrive on the paired receiver; closing the sink drops the
/// sender so the receiver terminates.
pub struct ChannelSink {
    tx: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
    close_calls: AtomicUsize,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(capacity);
        let sink = Self {
            tx: Mutex::new(Some(tx)),
            close_calls: AtomicUsize::new(0),
        };
        (sink, rx)
    }

    /// How often `close` has been called, successfully or not.
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    fn sender(&self) -> Option<mpsc::Sender<Vec<u8>>> {
        self.tx.lock().expect("sink sender lock").clone()
    }
}

#[async_trait]
impl ByteSink for ChannelSink {
    async fn send(&self, bytes: Vec<u8>) -> Result<(), SinkError> {
        let tx = self.sender().ok_or(SinkError::Closed)?;
        tx.send(bytes).await.map_err(|_| SinkError::Closed)
    }

    async fn close(&self) -> Result<(), SinkError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.tx.lock().expect("sink sender lock").take();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.tx.lock().expect("sink sender lock").is_none()
    }
}

#[derive(Error, Debug)]
pub enum SinkError {
    /// The sink was closed locally or the remote has gone away.
    #[error("sink is closed")]
    Closed,

    #[error("could not encode message for the sink: {0}")]
    Encode(String),
}

impl SinkError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SinkError::Closed => ErrorKind::Cancelled,
            SinkError::Encode(_) => ErrorKind::Transient,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ByteSink, ChannelSink, SinkError};

    #[tokio::test]
    async fn send_after_close_fails() {
        let (sink, mut rx) = ChannelSink::new(4);
        sink.send(b"one".to_vec()).await.unwrap();
        sink.close().await.unwrap();

        assert!(sink.is_closed());
        assert!(matches!(
            sink.send(b"two".to_vec()).await,
            Err(SinkError::Closed)
        ));

        assert_eq!(rx.recv().await, Some(b"one".to_vec()));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn dropped_receiver_closes_the_sink() {
        let (sink, rx) = ChannelSink::new(4);
        drop(rx);
        assert!(matches!(
            sink.send(b"lost".to_vec()).await,
            Err(SinkError::Closed)
        ));
    }
}
