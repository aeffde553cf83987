//! Transport seam between the tracking channel and the wire.
//!
//! A transport owns one connection at a time and reports everything that
//! happens to it as [`TransportEvent`]s pushed into an [`EventSink`]. Each sink
//! carries the generation of the `open` call that created it, so the channel
//! can discard events that arrive after it has moved on.

use crate::error::Result;
use courier_protocol::{InboundEvent, OutboundEvent};
use std::fmt;
use std::sync::mpsc::Sender;

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A connection attempt started (1-based).
    Connecting { attempt: u32 },
    /// Handshake completed; the namespace is joined.
    Connected,
    /// Handshake failed; a retry is scheduled.
    Errored { reason: String },
    /// An established connection was lost; a retry is scheduled.
    Disconnected { reason: String },
    /// The transport stopped retrying and will not reconnect on its own.
    Closed { reason: String },
    Inbound(InboundEvent),
}

#[derive(Debug, Clone)]
pub struct ChannelEnvelope {
    pub generation: u64,
    pub event: TransportEvent,
}

/// Generation-tagged sender handed to a transport on `open`.
#[derive(Clone)]
pub struct EventSink {
    generation: u64,
    tx: Sender<ChannelEnvelope>,
}

impl EventSink {
    pub fn new(generation: u64, tx: Sender<ChannelEnvelope>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns false once the receiving side is gone.
    pub fn send(&self, event: TransportEvent) -> bool {
        self.tx
            .send(ChannelEnvelope {
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("generation", &self.generation)
            .finish()
    }
}

/// Everything a transport needs to reach the backend namespace.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub base_url: String,
    pub namespace: String,
    pub driver_id: String,
    /// Presented once, at handshake time.
    pub token: String,
}

impl fmt::Debug for ConnectRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectRequest")
            .field("base_url", &self.base_url)
            .field("namespace", &self.namespace)
            .field("driver_id", &self.driver_id)
            .finish()
    }
}

pub trait Transport: Send {
    /// Starts connecting and returns immediately. Reconnection after failures
    /// is the transport's job; progress is reported through `sink`.
    fn open(&mut self, request: ConnectRequest, sink: EventSink) -> Result<()>;

    /// Best-effort emit on the current connection.
    fn emit(&mut self, event: &OutboundEvent) -> Result<()>;

    /// Tears the connection down and stops retrying. Safe to call when closed.
    fn close(&mut self);
}
