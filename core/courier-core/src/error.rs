//! Error types for courier-core operations.
//!
//! Propagation follows three tiers:
//! - sensor failures become a passive tracking status, never a hard error
//! - transport failures are retried inside the channel and only surface as state
//! - offer races, auth expiry and REST failures return to the caller of the action

use std::path::PathBuf;

/// All errors that can occur in courier-core operations.
#[derive(Debug, thiserror::Error)]
pub enum CourierError {
    // ─────────────────────────────────────────────────────────────────────
    // Location Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Location sensor unavailable: {reason}")]
    SensorUnavailable { reason: String },

    // ─────────────────────────────────────────────────────────────────────
    // Transport Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Tracking channel connect failed: {reason}")]
    TransportConnect { reason: String },

    #[error("Tracking channel disconnected: {reason}")]
    TransportDisconnected { reason: String },

    #[error("Protocol error: {code}: {message}")]
    Protocol { code: String, message: String },

    // ─────────────────────────────────────────────────────────────────────
    // Delivery Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Delivery {offer_id} was already taken by another driver")]
    OfferAlreadyTaken { offer_id: String },

    #[error("Delivery not found: {0}")]
    OfferNotFound(String),

    #[error("No active delivery")]
    NoActiveDelivery,

    #[error("A delivery is already active: {0}")]
    DeliveryAlreadyActive(String),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Driver is offline")]
    Offline,

    // ─────────────────────────────────────────────────────────────────────
    // Session / REST Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Not logged in")]
    NotLoggedIn,

    #[error("Session expired; sign in again")]
    AuthExpired,

    #[error("Network error: {context}: {details}")]
    Network { context: String, details: String },

    #[error("Backend returned {status}: {body}")]
    Http { status: u16, body: String },

    // ─────────────────────────────────────────────────────────────────────
    // Configuration / I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Configuration file malformed: {path}: {details}")]
    Config { path: PathBuf, details: String },

    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON parsing error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

impl CourierError {
    /// Errors the channel recovers from by itself on the next reconnect.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CourierError::TransportConnect { .. }
                | CourierError::TransportDisconnected { .. }
                | CourierError::Network { .. }
        )
    }

    /// Errors reported to the UI as a status flag rather than thrown.
    pub fn is_sensor_failure(&self) -> bool {
        matches!(
            self,
            CourierError::PermissionDenied | CourierError::SensorUnavailable { .. }
        )
    }

    pub fn network(context: &str, details: impl ToString) -> Self {
        CourierError::Network {
            context: context.to_string(),
            details: details.to_string(),
        }
    }
}

impl From<courier_protocol::ErrorInfo> for CourierError {
    fn from(info: courier_protocol::ErrorInfo) -> Self {
        CourierError::Protocol {
            code: info.code,
            message: info.message,
        }
    }
}

/// Convenience type alias for Results using CourierError.
pub type Result<T> = std::result::Result<T, CourierError>;

impl From<CourierError> for String {
    fn from(err: CourierError) -> String {
        err.to_string()
    }
}
