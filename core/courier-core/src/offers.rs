//! Offer channel: the delivery-offer view of inbound tracking events.
//!
//! Shares the tracking transport. Inbound events are translated into
//! [`OfferEvent`]s and fanned out to subscribers in the order the transport
//! delivered them.

use courier_protocol::{DeliveryOffer, DeliveryRecord, DeliveryStatus, InboundEvent};
use std::sync::mpsc::{channel, Receiver, Sender};

#[derive(Debug, Clone, PartialEq)]
pub enum OfferEvent {
    /// A delivery became available.
    NewOffer(DeliveryOffer),
    /// An offer is no longer available (taken elsewhere or expired).
    OfferTaken { offer_id: String },
    /// A delivery's status changed on the server.
    StatusChanged {
        offer_id: String,
        status: DeliveryStatus,
        record: DeliveryRecord,
    },
}

impl OfferEvent {
    pub fn offer_id(&self) -> &str {
        match self {
            OfferEvent::NewOffer(offer) => &offer.id,
            OfferEvent::OfferTaken { offer_id } | OfferEvent::StatusChanged { offer_id, .. } => {
                offer_id
            }
        }
    }
}

impl From<InboundEvent> for OfferEvent {
    fn from(event: InboundEvent) -> Self {
        match event {
            InboundEvent::NewAvailableDelivery(offer) => OfferEvent::NewOffer(offer),
            InboundEvent::DeliveryTaken { order_id } => OfferEvent::OfferTaken { offer_id: order_id },
            InboundEvent::OrderStatusUpdate {
                order_id,
                status,
                order,
            } => OfferEvent::StatusChanged {
                offer_id: order_id,
                status,
                record: order,
            },
        }
    }
}

#[derive(Default)]
pub struct OfferChannel {
    subscribers: Vec<Sender<OfferEvent>>,
    published: u64,
}

impl OfferChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receives every event published from now on. Dropped receivers are
    /// pruned on the next publish.
    pub fn subscribe(&mut self) -> Receiver<OfferEvent> {
        let (tx, rx) = channel();
        self.subscribers.push(tx);
        rx
    }

    /// Translates and fans out one inbound event, returning it for the caller.
    pub fn publish(&mut self, event: InboundEvent) -> OfferEvent {
        let event = OfferEvent::from(event);
        tracing::debug!(offer_id = %event.offer_id(), ?event, "Offer event");
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
        self.published += 1;
        event
    }

    pub fn published(&self) -> u64 {
        self.published
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
