//! Session store: the authenticated identity and the online flag.
//!
//! The store is an explicit handle created at login and torn down at logout,
//! passed to whatever needs it. It is the single writer of `is_online`;
//! everything else reads snapshots or subscribes to changes.

use crate::error::{CourierError, Result};
use crate::types::{Credentials, DriverSession};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
struct SessionInner {
    credentials: Option<Credentials>,
    session: DriverSession,
    subscribers: Vec<Sender<DriverSession>>,
}

impl SessionInner {
    fn publish(&mut self) {
        let snapshot = self.session.clone();
        self.subscribers
            .retain(|subscriber| subscriber.send(snapshot.clone()).is_ok());
    }
}

/// Cloneable handle to the driver session.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<Mutex<SessionInner>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Starts a session for the given identity. Any prior session is replaced
    /// and the driver starts offline.
    pub fn login(&self, credentials: Credentials) {
        let mut inner = self.lock();
        tracing::info!(driver_id = %credentials.driver_id, "Session started");
        inner.session = DriverSession {
            driver_id: Some(credentials.driver_id.clone()),
            is_online: false,
            active_offer_id: None,
        };
        inner.credentials = Some(credentials);
        inner.publish();
    }

    /// Clears identity and all flags.
    pub fn logout(&self) {
        let mut inner = self.lock();
        if inner.credentials.is_none() && inner.session == DriverSession::default() {
            return;
        }
        tracing::info!(driver_id = ?inner.session.driver_id, "Session cleared");
        inner.credentials = None;
        inner.session = DriverSession::default();
        inner.publish();
    }

    pub fn snapshot(&self) -> DriverSession {
        self.lock().session.clone()
    }

    pub fn credentials(&self) -> Option<Credentials> {
        self.lock().credentials.clone()
    }

    pub fn driver_id(&self) -> Option<String> {
        self.lock().session.driver_id.clone()
    }

    pub fn is_online(&self) -> bool {
        self.lock().session.is_online
    }

    pub fn active_offer_id(&self) -> Option<String> {
        self.lock().session.active_offer_id.clone()
    }

    /// Flips the online flag. Returns whether the flag changed.
    ///
    /// Going online requires a logged-in driver; going offline is refused
    /// while a delivery is active.
    pub fn set_online(&self, online: bool) -> Result<bool> {
        let mut inner = self.lock();
        if inner.credentials.is_none() {
            return Err(CourierError::NotLoggedIn);
        }
        if inner.session.is_online == online {
            return Ok(false);
        }
        if !online {
            if let Some(active) = inner.session.active_offer_id.clone() {
                return Err(CourierError::DeliveryAlreadyActive(active));
            }
        }
        inner.session.is_online = online;
        inner.publish();
        Ok(true)
    }

    pub fn set_active_offer(&self, offer_id: Option<String>) -> Result<()> {
        let mut inner = self.lock();
        if offer_id.is_some() && !inner.session.is_online {
            return Err(CourierError::Offline);
        }
        if inner.session.active_offer_id == offer_id {
            return Ok(());
        }
        inner.session.active_offer_id = offer_id;
        inner.publish();
        Ok(())
    }

    /// Receives a snapshot after every change. Dropped receivers are pruned
    /// on the next publish.
    pub fn subscribe(&self) -> Receiver<DriverSession> {
        let (tx, rx) = channel();
        self.lock().subscribers.push(tx);
        rx
    }
}
