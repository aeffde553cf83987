//! DriverEngine - the single entry point for courier clients.
//!
//! The engine owns every component and is driven from one thread:
//! - **Synchronous**: no async runtime; call [`DriverEngine::pump`] (or
//!   [`DriverEngine::wait_and_pump`]) from the host's event loop.
//! - **Online-gated**: going online starts the sampler and connects the
//!   channel; going offline (or dropping the engine) stops both and clears
//!   the offer list.
//! - **Degrading reads**: offers, profile, earnings and history fall back to
//!   empty/default values on network trouble. Only an expired session is an
//!   error, and it signs the driver out.
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use courier_core::{CourierConfig, DriverEngine};
//!
//! let mut engine = DriverEngine::connect_default(CourierConfig::default(), None)?;
//! engine.login(credentials);
//! engine.go_online()?;
//! loop {
//!     for notice in engine.wait_and_pump(Duration::from_millis(200)) {
//!         render(notice);
//!     }
//! }
//! ```

use crate::api::{DeliveryApi, HttpDeliveryApi};
use crate::config::CourierConfig;
use crate::credentials::CredentialStore;
use crate::error::{CourierError, Result};
use crate::offers::{OfferChannel, OfferEvent};
use crate::reconcile::{LogAlert, OfferAlert, OfferBook, Reconciled};
use crate::sampler::{LocationSensor, PositionSampler};
use crate::session::SessionStore;
use crate::tracking::{ChannelUpdate, SocketIoTransport, TrackingChannel, Transport};
use crate::types::{
    ActiveDelivery, Credentials, DeliveryHistoryEntry, DriverProfile, DriverSession,
    EarningsSummary, TrackingChannelState, TrackingStatus,
};
use courier_protocol::{DeliveryOffer, DeliveryRecord, DeliveryStatus};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::mpsc::Receiver;
use std::time::Duration;

/// Something the UI layer should react to, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineNotice {
    NewOffer(DeliveryOffer),
    OfferRemoved {
        offer_id: String,
    },
    /// Server-driven status change for a delivery this driver holds.
    StatusChanged {
        offer_id: String,
        status: DeliveryStatus,
        record: DeliveryRecord,
    },
    ChannelState(TrackingChannelState),
    /// Tracking did not start; the driver is still online.
    TrackingUnavailable(TrackingStatus),
    /// The backend rejected the token; the driver has been signed out.
    SessionExpired,
}

/// Read-only projection of everything the UI renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    pub session: DriverSession,
    pub channel: TrackingChannelState,
    pub tracking: TrackingStatus,
    pub offers: Vec<DeliveryOffer>,
    pub active_delivery: Option<ActiveDelivery>,
}

/// The collaborators an engine is built from.
pub struct EngineParts {
    pub sensor: Option<Box<dyn LocationSensor>>,
    pub transport: Box<dyn Transport>,
    pub api: Box<dyn DeliveryApi>,
    pub alert: Box<dyn OfferAlert>,
}

pub struct DriverEngine {
    config: CourierConfig,
    session: SessionStore,
    sampler: PositionSampler,
    channel: TrackingChannel,
    offers: OfferChannel,
    book: OfferBook,
    api: Box<dyn DeliveryApi>,
    active: Option<ActiveDelivery>,
    tracking: TrackingStatus,
    pending: VecDeque<EngineNotice>,
}

impl DriverEngine {
    pub fn new(config: CourierConfig, parts: EngineParts) -> Self {
        let sampler = PositionSampler::resolve(parts.sensor, config.permission_timeout());
        let channel = TrackingChannel::new(
            parts.transport,
            config.socket_base_url.clone(),
            config.namespace.clone(),
        );
        let book = OfferBook::new(config.taken_memory(), parts.alert);
        Self {
            session: SessionStore::new(),
            sampler,
            channel,
            offers: OfferChannel::new(),
            book,
            api: parts.api,
            active: None,
            tracking: TrackingStatus::Inactive,
            pending: VecDeque::new(),
            config,
        }
    }

    /// Engine backed by the Socket.IO transport and the HTTP client.
    pub fn connect_default(
        config: CourierConfig,
        sensor: Option<Box<dyn LocationSensor>>,
    ) -> Result<Self> {
        let api = HttpDeliveryApi::new(&config.api_base_url, config.request_timeout())?;
        let transport = SocketIoTransport::new(config.reconnect.clone());
        Ok(Self::new(
            config,
            EngineParts {
                sensor,
                transport: Box::new(transport),
                api: Box::new(api),
                alert: Box::new(LogAlert),
            },
        ))
    }

    pub fn config(&self) -> &CourierConfig {
        &self.config
    }

    /// Handle to the session store, for subscribers.
    pub fn session(&self) -> SessionStore {
        self.session.clone()
    }

    /// Receives every offer event from now on.
    pub fn subscribe_offers(&mut self) -> Receiver<OfferEvent> {
        self.offers.subscribe()
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Session
    // ─────────────────────────────────────────────────────────────────────────────

    /// Starts a session. A different driver's session is torn down first.
    pub fn login(&mut self, credentials: Credentials) {
        if let Some(current) = self.session.driver_id() {
            if current != credentials.driver_id {
                self.teardown();
                self.active = None;
            }
        }
        self.session.login(credentials);
    }

    pub fn login_from(&mut self, store: &dyn CredentialStore) -> Result<()> {
        let credentials = store.load().ok_or(CourierError::NotLoggedIn)?;
        self.login(credentials);
        Ok(())
    }

    /// Stops tracking and clears the session. Tells the backend the driver is
    /// offline when it can; failures are only logged.
    pub fn logout(&mut self) {
        if let Some(credentials) = self.session.credentials() {
            if self.session.is_online() {
                if let Err(err) = self.api.set_driver_online(&credentials, false) {
                    tracing::warn!(error = %err, "Failed to mark driver offline during logout");
                }
            }
        }
        self.teardown();
        self.active = None;
        self.session.logout();
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Online / offline
    // ─────────────────────────────────────────────────────────────────────────────

    /// Marks the driver online, starts tracking and connects the channel.
    ///
    /// Sensor and socket trouble do not fail this call; they show up as the
    /// returned status and as notices.
    pub fn go_online(&mut self) -> Result<TrackingStatus> {
        let credentials = self.credentials()?;
        if self.session.is_online() {
            return Ok(self.tracking.clone());
        }

        let marked = self.api.set_driver_online(&credentials, true);
        self.guard(marked)?;
        self.session.set_online(true)?;
        tracing::info!(driver_id = %credentials.driver_id, "Driver online");

        self.tracking = match self.sampler.start(&self.config.sampling) {
            Ok(status) => status,
            Err(err) => {
                let status = match err {
                    CourierError::PermissionDenied => TrackingStatus::PermissionDenied,
                    other => TrackingStatus::Unavailable {
                        reason: other.to_string(),
                    },
                };
                tracing::warn!(status = ?status, "Position tracking unavailable");
                self.pending
                    .push_back(EngineNotice::TrackingUnavailable(status.clone()));
                status
            }
        };

        if let Some(first) = self.sampler.poll() {
            if let Err(err) = self.api.update_driver_location(&credentials, &first) {
                tracing::warn!(error = %err, "Failed to report initial position");
            }
        }

        if let Err(err) = self.channel.connect(&credentials) {
            tracing::warn!(error = %err, "Tracking channel unavailable");
        }

        self.refresh_offers()?;
        Ok(self.tracking.clone())
    }

    /// Marks the driver offline. Refused while a delivery is active.
    ///
    /// Local teardown always runs, even when the backend call fails.
    pub fn go_offline(&mut self) -> Result<()> {
        let credentials = self.credentials()?;
        if let Some(active) = &self.active {
            return Err(CourierError::DeliveryAlreadyActive(active.id().to_string()));
        }
        if !self.session.is_online() {
            return Ok(());
        }

        match self.api.set_driver_online(&credentials, false) {
            Ok(()) => {}
            Err(CourierError::AuthExpired) => return Err(self.expire_session()),
            Err(err) => tracing::warn!(error = %err, "Failed to mark driver offline on backend"),
        }

        self.session.set_online(false)?;
        self.teardown();
        tracing::info!(driver_id = %credentials.driver_id, "Driver offline");
        Ok(())
    }

    /// Stops the sampler, closes the channel and clears offers. Each step runs
    /// regardless of the others.
    fn teardown(&mut self) {
        self.sampler.stop();
        self.channel.disconnect();
        self.book.clear();
        self.tracking = TrackingStatus::Inactive;
        self.pending.clear();
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Event loop
    // ─────────────────────────────────────────────────────────────────────────────

    /// Processes everything queued: channel updates, offer events, and due
    /// position samples. Never blocks.
    pub fn pump(&mut self) -> Vec<EngineNotice> {
        let mut notices: Vec<EngineNotice> = self.pending.drain(..).collect();

        while let Some(update) = self.channel.poll_event() {
            self.handle_update(update, &mut notices);
        }

        if self.session.is_online() {
            let order_id = self.active.as_ref().map(|record| record.id().to_string());
            for sample in self.sampler.samples() {
                self.channel.send(&sample, order_id.as_deref());
            }
        }

        notices
    }

    /// Waits up to `timeout` for channel activity, then pumps.
    pub fn wait_and_pump(&mut self, timeout: Duration) -> Vec<EngineNotice> {
        let mut notices = Vec::new();
        if self.pending.is_empty() {
            if let Some(update) = self.channel.wait(timeout) {
                self.handle_update(update, &mut notices);
            }
        }
        notices.extend(self.pump());
        notices
    }

    fn handle_update(&mut self, update: ChannelUpdate, notices: &mut Vec<EngineNotice>) {
        match update {
            ChannelUpdate::State(state) => notices.push(EngineNotice::ChannelState(state)),
            ChannelUpdate::Inbound(event) => {
                let event = self.offers.publish(event);
                self.handle_offer_event(event, notices);
            }
        }
    }

    fn handle_offer_event(&mut self, event: OfferEvent, notices: &mut Vec<EngineNotice>) {
        match self.book.apply(&event) {
            Reconciled::Added(offer) => notices.push(EngineNotice::NewOffer(offer)),
            Reconciled::Removed(offer_id) => notices.push(EngineNotice::OfferRemoved { offer_id }),
            Reconciled::Unchanged | Reconciled::Suppressed(_) => {}
        }

        if let OfferEvent::StatusChanged {
            offer_id,
            status,
            mut record,
        } = event
        {
            let is_ours = self
                .active
                .as_ref()
                .is_some_and(|active| active.id() == offer_id);
            if !is_ours {
                return;
            }
            record.status = status;
            tracing::info!(offer_id = %offer_id, status = %status, "Active delivery updated by server");
            self.apply_active(record.clone());
            notices.push(EngineNotice::StatusChanged {
                offer_id,
                status,
                record,
            });
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Offers and deliveries
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn offers(&self) -> &[DeliveryOffer] {
        self.book.offers()
    }

    pub fn active_delivery(&self) -> Option<&ActiveDelivery> {
        self.active.as_ref()
    }

    /// Accepts an offer. The backend decides races: the result is either the
    /// accepted delivery or `OfferAlreadyTaken`, and the offer leaves the
    /// list in both cases. An offer the backend no longer knows
    /// (`OfferNotFound`) leaves the list too.
    pub fn accept_offer(&mut self, offer_id: &str) -> Result<ActiveDelivery> {
        let credentials = self.credentials()?;
        if !self.session.is_online() {
            return Err(CourierError::Offline);
        }
        if let Some(active) = &self.active {
            return Err(CourierError::DeliveryAlreadyActive(active.id().to_string()));
        }

        let outcome = self.api.accept_delivery(&credentials, offer_id);
        if matches!(outcome, Err(CourierError::AuthExpired)) {
            return Err(self.expire_session());
        }
        let record = self.book.resolve_accept(offer_id, outcome)?;
        tracing::info!(offer_id = %offer_id, "Delivery accepted");
        self.apply_active(record.clone());
        Ok(record)
    }

    /// Moves the active delivery one step along its lifecycle.
    pub fn advance_delivery(&mut self) -> Result<ActiveDelivery> {
        let current = self.active.as_ref().ok_or(CourierError::NoActiveDelivery)?;
        let next = current
            .status
            .next()
            .ok_or_else(|| CourierError::InvalidTransition {
                from: current.status.to_string(),
                to: "-".to_string(),
            })?;
        self.transition_to(next)
    }

    pub fn cancel_delivery(&mut self) -> Result<ActiveDelivery> {
        self.transition_to(DeliveryStatus::Cancelled)
    }

    /// Requests `target` for the active delivery. Invalid transitions fail
    /// before any request; a failed request leaves the delivery untouched.
    pub fn transition_to(&mut self, target: DeliveryStatus) -> Result<ActiveDelivery> {
        let credentials = self.credentials()?;
        let current = self.active.as_ref().ok_or(CourierError::NoActiveDelivery)?;
        if !current.status.can_advance_to(target) {
            return Err(CourierError::InvalidTransition {
                from: current.status.to_string(),
                to: target.to_string(),
            });
        }
        let offer_id = current.id().to_string();

        let updated = self
            .api
            .update_delivery_status(&credentials, &offer_id, target);
        let mut record = self.guard(updated)?;
        record.status = target;
        tracing::info!(offer_id = %offer_id, status = %target, "Delivery status updated");
        self.apply_active(record.clone());
        Ok(record)
    }

    /// Installs `record` as the active delivery, or clears it when terminal.
    fn apply_active(&mut self, record: DeliveryRecord) {
        let offer_id = record.id().to_string();
        let next = if record.status.is_terminal() {
            None
        } else {
            Some(offer_id.clone())
        };
        if let Err(err) = self.session.set_active_offer(next.clone()) {
            tracing::warn!(error = %err, offer_id = %offer_id, "Session rejected active delivery");
        }
        self.book.set_active(next.clone());
        self.active = next.map(|_| record);
    }

    /// Replaces the offer list with the server's listing. Network trouble
    /// keeps the current list.
    pub fn refresh_offers(&mut self) -> Result<Vec<DeliveryOffer>> {
        let credentials = self.credentials()?;
        if !self.session.is_online() {
            return Ok(Vec::new());
        }
        match self.api.fetch_available_deliveries(&credentials) {
            Ok(offers) => self.book.replace_all(offers),
            Err(CourierError::AuthExpired) => return Err(self.expire_session()),
            Err(err) => tracing::warn!(error = %err, "Failed to refresh offers"),
        }
        Ok(self.book.offers().to_vec())
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Account reads
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn profile(&mut self) -> Result<DriverProfile> {
        let credentials = self.credentials()?;
        let result = self.api.fetch_profile(&credentials);
        self.degrade("profile", result)
    }

    pub fn earnings(&mut self) -> Result<EarningsSummary> {
        let credentials = self.credentials()?;
        let result = self.api.fetch_earnings(&credentials);
        self.degrade("earnings", result)
    }

    pub fn history(&mut self) -> Result<Vec<DeliveryHistoryEntry>> {
        let credentials = self.credentials()?;
        let result = self.api.fetch_history(&credentials);
        self.degrade("history", result)
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            session: self.session.snapshot(),
            channel: self.channel.state(),
            tracking: self.tracking.clone(),
            offers: self.book.offers().to_vec(),
            active_delivery: self.active.clone(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────────────────────

    fn credentials(&self) -> Result<Credentials> {
        self.session.credentials().ok_or(CourierError::NotLoggedIn)
    }

    /// Passes results through, signing the driver out on an expired session.
    fn guard<T>(&mut self, result: Result<T>) -> Result<T> {
        match result {
            Err(CourierError::AuthExpired) => Err(self.expire_session()),
            other => other,
        }
    }

    fn degrade<T: Default>(&mut self, what: &str, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => Ok(value),
            Err(CourierError::AuthExpired) => Err(self.expire_session()),
            Err(err) => {
                tracing::warn!(error = %err, what, "Read failed; using defaults");
                Ok(T::default())
            }
        }
    }

    fn expire_session(&mut self) -> CourierError {
        tracing::warn!(driver_id = ?self.session.driver_id(), "Session expired; signing out");
        self.teardown();
        self.active = None;
        self.session.logout();
        self.pending.push_back(EngineNotice::SessionExpired);
        CourierError::AuthExpired
    }
}

impl Drop for DriverEngine {
    fn drop(&mut self) {
        self.teardown();
    }
}
