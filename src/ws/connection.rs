//! Connection handles: the send/close capability for one participant's transport.
//!
//! A handle never touches the socket directly. Frames go into a bounded queue
//! drained by a writer task that owns the socket sink, so sending is a
//! non-blocking enqueue whose failure comes back as a value.

use std::fmt::Display;
use std::sync::Arc;

use axum::extract::ws::Message;
use futures_util::{Sink, SinkExt};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::debug;
use uuid::Uuid;

use crate::models::Envelope;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    /// The writer is gone (broken pipe or connection already torn down).
    #[error("connection closed")]
    Closed,
    /// The peer is not draining its queue fast enough.
    #[error("outbound queue full")]
    Full,
    #[error("envelope could not be encoded")]
    Encode,
}

#[derive(Clone)]
pub struct ConnectionHandle {
    conn_id: Uuid,
    tx: mpsc::Sender<String>,
    shutdown: Arc<watch::Sender<bool>>,
}

/// Receiving half of a [`ConnectionHandle`], owned by the writer task.
pub struct Outbound {
    rx: mpsc::Receiver<String>,
    shutdown: watch::Receiver<bool>,
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("conn_id", &self.conn_id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl ConnectionHandle {
    /// Create a handle and the outbound queue it feeds.
    pub fn channel(capacity: usize) -> (ConnectionHandle, Outbound) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = ConnectionHandle {
            conn_id: Uuid::new_v4(),
            tx,
            shutdown: Arc::new(shutdown_tx),
        };
        (handle, Outbound { rx, shutdown: shutdown_rx })
    }

    pub fn conn_id(&self) -> Uuid {
        self.conn_id
    }

    /// Queue an already encoded frame.
    pub fn send_text(&self, text: String) -> Result<(), DeliveryError> {
        if *self.shutdown.borrow() {
            return Err(DeliveryError::Closed);
        }
        self.tx.try_send(text).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    pub fn send(&self, envelope: &Envelope) -> Result<(), DeliveryError> {
        let text = encode(envelope)?;
        self.send_text(text)
    }

    /// Ask the writer to flush what is queued and close the transport.
    ///
    /// Idempotent. Also wakes the worker blocked on this connection's receive.
    pub fn close(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.shutdown.borrow() || self.tx.is_closed()
    }

    /// Resolves once [`close`](Self::close) has been called on any clone.
    pub async fn closed(&self) {
        let mut rx = self.shutdown.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

pub fn encode(envelope: &Envelope) -> Result<String, DeliveryError> {
    serde_json::to_string(envelope).map_err(|e| {
        debug!("Failed to encode '{}' envelope: {}", envelope.kind(), e);
        DeliveryError::Encode
    })
}

impl Outbound {
    /// Next queued frame; `None` once the handle is closed and the queue drained.
    pub async fn recv(&mut self) -> Option<String> {
        tokio::select! {
            biased;
            frame = self.rx.recv() => frame,
            _ = self.shutdown.wait_for(|closed| *closed) => self.rx.try_recv().ok(),
        }
    }

    /// Non-blocking read of the next queued frame.
    pub fn try_recv(&mut self) -> Option<String> {
        self.rx.try_recv().ok()
    }
}

/// Drain `outbound` into the socket sink until the handle closes or the sink fails.
pub async fn run_writer<K>(mut sink: K, mut outbound: Outbound, conn_id: Uuid)
where
    K: Sink<Message> + Unpin,
    K::Error: Display,
{
    while let Some(text) = outbound.recv().await {
        if let Err(e) = sink.send(Message::Text(text)).await {
            debug!("Writer for connection {} stopped: {}", conn_id, e);
            return;
        }
    }

    let _ = sink.send(Message::Close(None)).await;
    let _ = sink.close().await;
    debug!("Writer for connection {} finished", conn_id);
}
