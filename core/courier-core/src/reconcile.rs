//! Reconciliation layer: the locally visible offer list.
//!
//! Newest offers come first and ids are unique. Offers leave the list when
//! they are taken elsewhere, when a local accept resolves either way, or
//! when the driver goes offline.
//!
//! Taken ids are remembered for a while so a redelivered or reordered
//! `newOffer` cannot bring them back.

use crate::error::{CourierError, Result};
use crate::offers::OfferEvent;
use chrono::{DateTime, Duration, Utc};
use courier_protocol::{DeliveryOffer, DeliveryRecord, DeliveryStatus};
use std::collections::HashMap;

/// Local signal that a new offer arrived (haptic, sound, bell).
pub trait OfferAlert: Send {
    fn new_offer(&mut self, offer: &DeliveryOffer);
}

/// Alert that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlert;

impl OfferAlert for LogAlert {
    fn new_offer(&mut self, offer: &DeliveryOffer) {
        tracing::info!(offer_id = %offer.id, fee = ?offer.delivery_fee, "New delivery offer");
    }
}

/// What an event did to the list.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciled {
    Added(DeliveryOffer),
    Removed(String),
    /// The event changed nothing: duplicate offer, unknown id, or a status
    /// change for something not in the list.
    Unchanged,
    /// A late offer for an id that was taken or is the active delivery.
    Suppressed(String),
}

pub struct OfferBook {
    offers: Vec<DeliveryOffer>,
    recently_taken: HashMap<String, DateTime<Utc>>,
    memory: Duration,
    active_id: Option<String>,
    alert: Box<dyn OfferAlert>,
}

impl OfferBook {
    pub fn new(memory: Duration, alert: Box<dyn OfferAlert>) -> Self {
        Self {
            offers: Vec::new(),
            recently_taken: HashMap::new(),
            memory,
            active_id: None,
            alert,
        }
    }

    pub fn offers(&self) -> &[DeliveryOffer] {
        &self.offers
    }

    pub fn get(&self, offer_id: &str) -> Option<&DeliveryOffer> {
        self.offers.iter().find(|offer| offer.id == offer_id)
    }

    pub fn contains(&self, offer_id: &str) -> bool {
        self.get(offer_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.offers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offers.is_empty()
    }

    /// The active delivery never shows up as an offer.
    pub fn set_active(&mut self, offer_id: Option<String>) {
        if let Some(id) = &offer_id {
            self.remove(id);
        }
        self.active_id = offer_id;
    }

    pub fn apply(&mut self, event: &OfferEvent) -> Reconciled {
        self.apply_at(event, Utc::now())
    }

    pub fn apply_at(&mut self, event: &OfferEvent, now: DateTime<Utc>) -> Reconciled {
        self.expire(now);
        match event {
            OfferEvent::NewOffer(offer) => self.insert(offer.clone()),
            OfferEvent::OfferTaken { offer_id } => self.mark_taken_at(offer_id, now),
            OfferEvent::StatusChanged {
                offer_id, status, ..
            } => {
                // Anything past PENDING is no longer up for grabs.
                if *status != DeliveryStatus::Pending && self.contains(offer_id) {
                    self.mark_taken_at(offer_id, now)
                } else {
                    Reconciled::Unchanged
                }
            }
        }
    }

    /// Removes `offer_id` and remembers it as taken. A no-op when absent.
    pub fn mark_taken(&mut self, offer_id: &str) -> Reconciled {
        self.mark_taken_at(offer_id, Utc::now())
    }

    fn mark_taken_at(&mut self, offer_id: &str, now: DateTime<Utc>) -> Reconciled {
        self.recently_taken.insert(offer_id.to_string(), now);
        if self.remove(offer_id) {
            tracing::debug!(offer_id = %offer_id, "Offer taken");
            Reconciled::Removed(offer_id.to_string())
        } else {
            Reconciled::Unchanged
        }
    }

    /// Settles a local accept against the list. The offer leaves the list
    /// when the outcome is final: accepted here, taken by someone else, or
    /// gone from the backend. Any other failure leaves the list intact.
    pub fn resolve_accept(
        &mut self,
        offer_id: &str,
        outcome: Result<DeliveryRecord>,
    ) -> Result<DeliveryRecord> {
        match outcome {
            Ok(record) => {
                self.remove(offer_id);
                self.recently_taken
                    .insert(offer_id.to_string(), Utc::now());
                Ok(record)
            }
            Err(CourierError::OfferAlreadyTaken { .. }) => {
                self.mark_taken(offer_id);
                Err(CourierError::OfferAlreadyTaken {
                    offer_id: offer_id.to_string(),
                })
            }
            Err(CourierError::OfferNotFound(_)) => {
                self.mark_taken(offer_id);
                Err(CourierError::OfferNotFound(offer_id.to_string()))
            }
            Err(err) => Err(err),
        }
    }

    /// Replaces the list with a fresh server listing, keeping suppression.
    pub fn replace_all(&mut self, offers: Vec<DeliveryOffer>) {
        self.expire(Utc::now());
        let mut next: Vec<DeliveryOffer> = Vec::with_capacity(offers.len());
        for offer in offers {
            if self.is_suppressed(&offer.id) || next.iter().any(|seen| seen.id == offer.id) {
                continue;
            }
            next.push(offer);
        }
        self.offers = next;
    }

    /// Drops every offer and all memory. Used when going offline.
    pub fn clear(&mut self) {
        if !self.offers.is_empty() {
            tracing::debug!(count = self.offers.len(), "Clearing offers");
        }
        self.offers.clear();
        self.recently_taken.clear();
        self.active_id = None;
    }

    fn insert(&mut self, offer: DeliveryOffer) -> Reconciled {
        if self.is_suppressed(&offer.id) {
            tracing::debug!(offer_id = %offer.id, "Suppressing late offer");
            return Reconciled::Suppressed(offer.id);
        }
        if self.contains(&offer.id) {
            return Reconciled::Unchanged;
        }
        self.alert.new_offer(&offer);
        self.offers.insert(0, offer.clone());
        Reconciled::Added(offer)
    }

    fn remove(&mut self, offer_id: &str) -> bool {
        let before = self.offers.len();
        self.offers.retain(|offer| offer.id != offer_id);
        self.offers.len() != before
    }

    fn is_suppressed(&self, offer_id: &str) -> bool {
        self.active_id.as_deref() == Some(offer_id) || self.recently_taken.contains_key(offer_id)
    }

    fn expire(&mut self, now: DateTime<Utc>) {
        let memory = self.memory;
        self.recently_taken
            .retain(|_, taken_at| now.signed_duration_since(*taken_at) < memory);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    struct CountingAlert(Arc<Mutex<Vec<String>>>);

    impl OfferAlert for CountingAlert {
        fn new_offer(&mut self, offer: &DeliveryOffer) {
            self.0.lock().unwrap().push(offer.id.clone());
        }
    }

    fn book() -> (OfferBook, Arc<Mutex<Vec<String>>>) {
        let alerts = Arc::new(Mutex::new(Vec::new()));
        let book = OfferBook::new(
            Duration::seconds(300),
            Box::new(CountingAlert(Arc::clone(&alerts))),
        );
        (book, alerts)
    }

    fn offer(id: &str) -> DeliveryOffer {
        serde_json::from_value(json!({ "id": id })).unwrap()
    }

    fn record(id: &str) -> DeliveryRecord {
        serde_json::from_value(json!({ "id": id, "status": "ACCEPTED" })).unwrap()
    }

    fn new_offer(id: &str) -> OfferEvent {
        OfferEvent::NewOffer(offer(id))
    }

    fn taken(id: &str) -> OfferEvent {
        OfferEvent::OfferTaken {
            offer_id: id.to_string(),
        }
    }

    fn ids(book: &OfferBook) -> Vec<&str> {
        book.offers().iter().map(|offer| offer.id.as_str()).collect()
    }

    #[test]
    fn newest_first_and_duplicates_ignored() {
        let (mut book, alerts) = book();
        book.apply(&new_offer("a"));
        book.apply(&new_offer("b"));
        assert_eq!(book.apply(&new_offer("a")), Reconciled::Unchanged);
        assert_eq!(ids(&book), vec!["b", "a"]);
        assert_eq!(*alerts.lock().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn taken_removes_and_absent_is_noop() {
        let (mut book, _) = book();
        book.apply(&new_offer("a"));
        assert_eq!(book.apply(&taken("a")), Reconciled::Removed("a".to_string()));
        assert_eq!(book.apply(&taken("a")), Reconciled::Unchanged);
        assert_eq!(book.apply(&taken("zzz")), Reconciled::Unchanged);
        assert!(book.is_empty());
    }

    #[test]
    fn late_offer_after_taken_is_suppressed() {
        let (mut book, alerts) = book();
        book.apply(&taken("a"));
        assert_eq!(
            book.apply(&new_offer("a")),
            Reconciled::Suppressed("a".to_string())
        );
        assert!(book.is_empty());
        assert!(alerts.lock().unwrap().is_empty());
    }

    #[test]
    fn taken_memory_expires() {
        let (mut book, _) = book();
        let start = Utc::now();
        book.apply_at(&taken("a"), start);
        let later = start + Duration::seconds(301);
        assert!(matches!(
            book.apply_at(&new_offer("a"), later),
            Reconciled::Added(_)
        ));
    }

    #[test]
    fn accept_success_removes_offer() {
        let (mut book, _) = book();
        book.apply(&new_offer("a"));
        let result = book.resolve_accept("a", Ok(record("a")));
        assert!(result.is_ok());
        assert!(book.is_empty());
        assert!(matches!(book.apply(&new_offer("a")), Reconciled::Suppressed(_)));
    }

    #[test]
    fn accept_race_lost_removes_offer_once() {
        let (mut book, _) = book();
        book.apply(&new_offer("a"));
        book.apply(&taken("a"));
        let result = book.resolve_accept(
            "a",
            Err(CourierError::OfferAlreadyTaken {
                offer_id: "a".to_string(),
            }),
        );
        assert!(matches!(result, Err(CourierError::OfferAlreadyTaken { .. })));
        assert!(book.is_empty());
    }

    #[test]
    fn accept_of_vanished_offer_removes_it() {
        let (mut book, _) = book();
        book.apply(&new_offer("a"));
        let result = book.resolve_accept("a", Err(CourierError::OfferNotFound("a".to_string())));
        assert!(matches!(result, Err(CourierError::OfferNotFound(id)) if id == "a"));
        assert!(book.is_empty());
        assert!(matches!(book.apply(&new_offer("a")), Reconciled::Suppressed(_)));
    }

    #[test]
    fn other_accept_failure_keeps_offer() {
        let (mut book, _) = book();
        book.apply(&new_offer("a"));
        let result = book.resolve_accept("a", Err(CourierError::network("accept", "timeout")));
        assert!(matches!(result, Err(CourierError::Network { .. })));
        assert_eq!(ids(&book), vec!["a"]);
    }

    #[test]
    fn status_change_past_pending_removes_offer() {
        let (mut book, _) = book();
        book.apply(&new_offer("a"));
        let event = OfferEvent::StatusChanged {
            offer_id: "a".to_string(),
            status: DeliveryStatus::Accepted,
            record: record("a"),
        };
        assert_eq!(book.apply(&event), Reconciled::Removed("a".to_string()));
    }

    #[test]
    fn active_delivery_never_listed() {
        let (mut book, _) = book();
        book.apply(&new_offer("a"));
        book.set_active(Some("a".to_string()));
        assert!(book.is_empty());
        assert!(matches!(book.apply(&new_offer("a")), Reconciled::Suppressed(_)));
        book.replace_all(vec![offer("a"), offer("b"), offer("b")]);
        assert_eq!(ids(&book), vec!["b"]);
    }

    #[test]
    fn clear_forgets_everything() {
        let (mut book, _) = book();
        book.apply(&new_offer("a"));
        book.apply(&taken("b"));
        book.clear();
        assert!(book.is_empty());
        assert!(matches!(book.apply(&new_offer("b")), Reconciled::Added(_)));
    }
}
