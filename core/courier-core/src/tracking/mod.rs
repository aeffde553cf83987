//! Tracking channel.
//!
//! Owns the one socket session to the backend namespace. Outbound position
//! updates go out through [`TrackingChannel::send`]; inbound offer events and
//! connection state changes come back through [`TrackingChannel::poll_event`]
//! and friends, always on the caller's thread.
//!
//! ```text
//! Disconnected ── connect ──▶ Connecting ── handshake ──▶ Connected
//!      ▲                        │    ▲                      │
//!      │                   fail │    │ retry           lost │
//!      │                        ▼    │                      ▼
//!      └──── disconnect ──── Errored ┘              Disconnected (retrying)
//! ```
//!
//! Every `connect` opens a new generation. Events the transport produced for
//! an older generation are discarded, so nothing surfaces after `disconnect`
//! returns.

mod backoff;
mod socketio;
mod transport;

pub use backoff::Backoff;
pub use socketio::{socket_url, SocketIoTransport};
pub use transport::{ChannelEnvelope, ConnectRequest, EventSink, Transport, TransportEvent};

use crate::error::{CourierError, Result};
use crate::types::{Credentials, PositionSample, TrackingChannelState};
use courier_protocol::{InboundEvent, JoinDriver, OutboundEvent};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

/// Something the caller should react to.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelUpdate {
    State(TrackingChannelState),
    Inbound(InboundEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// Not connected, or the emit failed. The next sample supersedes it.
    Dropped,
}

pub struct TrackingChannel {
    transport: Box<dyn Transport>,
    events_tx: Sender<ChannelEnvelope>,
    events_rx: Receiver<ChannelEnvelope>,
    state: TrackingChannelState,
    generation: u64,
    driver_id: Option<String>,
    link_open: bool,
    base_url: String,
    namespace: String,
    last_error: Option<String>,
    sent: u64,
    dropped: u64,
}

impl TrackingChannel {
    pub fn new(
        transport: Box<dyn Transport>,
        base_url: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        let (events_tx, events_rx) = channel();
        Self {
            transport,
            events_tx,
            events_rx,
            state: TrackingChannelState::Disconnected,
            generation: 0,
            driver_id: None,
            link_open: false,
            base_url: base_url.into(),
            namespace: namespace.into(),
            last_error: None,
            sent: 0,
            dropped: 0,
        }
    }

    pub fn state(&self) -> TrackingChannelState {
        self.state
    }

    pub fn driver_id(&self) -> Option<&str> {
        self.driver_id.as_deref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Samples sent and dropped since construction.
    pub fn counters(&self) -> (u64, u64) {
        (self.sent, self.dropped)
    }

    /// Starts connecting as `credentials.driver_id`. Returns immediately.
    ///
    /// A no-op while a link for the same driver is open or retrying. A
    /// different driver replaces the existing link.
    pub fn connect(&mut self, credentials: &Credentials) -> Result<()> {
        if self.link_open {
            if self.driver_id.as_deref() == Some(credentials.driver_id.as_str()) {
                tracing::debug!(driver_id = %credentials.driver_id, "Tracking channel already open");
                return Ok(());
            }
            self.disconnect();
        }

        self.generation += 1;
        let request = ConnectRequest {
            base_url: self.base_url.clone(),
            namespace: self.namespace.clone(),
            driver_id: credentials.driver_id.clone(),
            token: credentials.token.clone(),
        };
        let sink = EventSink::new(self.generation, self.events_tx.clone());

        self.state = TrackingChannelState::Connecting;
        self.last_error = None;
        if let Err(err) = self.transport.open(request, sink) {
            self.generation += 1;
            self.state = TrackingChannelState::Disconnected;
            self.last_error = Some(err.to_string());
            tracing::warn!(error = %err, "Tracking channel could not start");
            return Err(match err {
                CourierError::TransportConnect { .. } => err,
                other => CourierError::TransportConnect {
                    reason: other.to_string(),
                },
            });
        }

        self.driver_id = Some(credentials.driver_id.clone());
        self.link_open = true;
        tracing::info!(
            driver_id = %credentials.driver_id,
            generation = self.generation,
            "Tracking channel connecting"
        );
        Ok(())
    }

    /// Closes the link and discards everything it produced. Safe to repeat.
    pub fn disconnect(&mut self) {
        if self.link_open {
            self.transport.close();
            tracing::info!(
                driver_id = self.driver_id.as_deref().unwrap_or("-"),
                sent = self.sent,
                dropped = self.dropped,
                "Tracking channel disconnected"
            );
        }
        self.generation += 1;
        self.link_open = false;
        self.driver_id = None;
        self.state = TrackingChannelState::Disconnected;
        while self.events_rx.try_recv().is_ok() {}
    }

    /// Fire-and-forget position update; dropped unless `Connected`.
    pub fn send(&mut self, sample: &PositionSample, order_id: Option<&str>) -> SendOutcome {
        let driver_id = match (&self.driver_id, self.state) {
            (Some(driver_id), TrackingChannelState::Connected) => driver_id.clone(),
            _ => {
                self.dropped += 1;
                tracing::trace!(state = %self.state, "Dropping sample while not connected");
                return SendOutcome::Dropped;
            }
        };

        let event = OutboundEvent::UpdateLocation(sample.to_update(&driver_id, order_id));
        match self.transport.emit(&event) {
            Ok(()) => {
                self.sent += 1;
                SendOutcome::Sent
            }
            Err(err) => {
                self.dropped += 1;
                tracing::warn!(error = %err, "Dropping sample");
                SendOutcome::Dropped
            }
        }
    }

    /// Next update already queued, without blocking.
    pub fn poll_event(&mut self) -> Option<ChannelUpdate> {
        while let Ok(envelope) = self.events_rx.try_recv() {
            if let Some(update) = self.apply(envelope) {
                return Some(update);
            }
        }
        None
    }

    /// Every update already queued, in arrival order.
    pub fn drain(&mut self) -> Vec<ChannelUpdate> {
        let mut updates = Vec::new();
        while let Some(update) = self.poll_event() {
            updates.push(update);
        }
        updates
    }

    /// Blocks up to `timeout` for the next update.
    pub fn wait(&mut self, timeout: Duration) -> Option<ChannelUpdate> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.events_rx.recv_timeout(remaining) {
                Ok(envelope) => {
                    if let Some(update) = self.apply(envelope) {
                        return Some(update);
                    }
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return None
                }
            }
        }
    }

    fn apply(&mut self, envelope: ChannelEnvelope) -> Option<ChannelUpdate> {
        if envelope.generation != self.generation || !self.link_open {
            tracing::trace!(
                generation = envelope.generation,
                current = self.generation,
                "Discarding stale transport event"
            );
            return None;
        }

        match envelope.event {
            TransportEvent::Connecting { attempt } => {
                tracing::debug!(attempt, "Tracking channel connect attempt");
                self.transition(TrackingChannelState::Connecting)
            }
            TransportEvent::Connected => {
                self.last_error = None;
                self.announce();
                self.transition(TrackingChannelState::Connected)
            }
            TransportEvent::Errored { reason } => {
                self.last_error = Some(reason);
                self.transition(TrackingChannelState::Errored)
            }
            TransportEvent::Disconnected { reason } => {
                self.last_error = Some(reason);
                self.transition(TrackingChannelState::Disconnected)
            }
            TransportEvent::Closed { reason } => {
                tracing::warn!(reason = %reason, "Tracking channel gave up reconnecting");
                self.last_error = Some(reason);
                self.link_open = false;
                self.transition(TrackingChannelState::Errored)
            }
            TransportEvent::Inbound(event) => Some(ChannelUpdate::Inbound(event)),
        }
    }

    fn transition(&mut self, next: TrackingChannelState) -> Option<ChannelUpdate> {
        if self.state == next {
            return None;
        }
        tracing::debug!(from = %self.state, to = %next, "Tracking channel state");
        self.state = next;
        Some(ChannelUpdate::State(next))
    }

    /// Identification message, sent once per established connection.
    fn announce(&mut self) {
        let Some(driver_id) = self.driver_id.clone() else {
            return;
        };
        let join = OutboundEvent::JoinDriver(JoinDriver { driver_id });
        if let Err(err) = self.transport.emit(&join) {
            tracing::warn!(error = %err, "Failed to announce driver");
        }
    }
}

impl Drop for TrackingChannel {
    fn drop(&mut self) {
        self.disconnect();
    }
}
