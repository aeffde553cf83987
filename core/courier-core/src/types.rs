//! Shared data types for the courier client.

use chrono::{DateTime, Utc};
use courier_protocol::{DeliveryRecord, UpdateLocation};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The single delivery a driver has accepted and is executing.
pub type ActiveDelivery = DeliveryRecord;

// ═══════════════════════════════════════════════════════════════════════════════
// Session
// ═══════════════════════════════════════════════════════════════════════════════

/// Read-only projection of the session store.
///
/// Invariant: `active_offer_id.is_some()` implies `is_online`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverSession {
    pub driver_id: Option<String>,
    pub is_online: bool,
    pub active_offer_id: Option<String>,
}

impl DriverSession {
    pub fn is_logged_in(&self) -> bool {
        self.driver_id.is_some()
    }
}

/// Identity and bearer token supplied by the credential store.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub driver_id: String,
    pub token: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("driver_id", &self.driver_id)
            .field("token", &"<redacted>")
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Location
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesiredAccuracy {
    Lowest,
    Low,
    Balanced,
    #[default]
    High,
    Highest,
    BestForNavigation,
}

/// Thresholds that gate how often the sampler emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingPolicy {
    pub minimum_time_interval_ms: u64,
    pub minimum_distance_meters: f64,
    pub desired_accuracy: DesiredAccuracy,
}

impl Default for SamplingPolicy {
    fn default() -> Self {
        Self {
            minimum_time_interval_ms: 5_000,
            minimum_distance_meters: 10.0,
            desired_accuracy: DesiredAccuracy::High,
        }
    }
}

/// A single position reading, immutable once captured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub accuracy: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub heading: Option<f64>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl PositionSample {
    pub fn new(latitude: f64, longitude: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            latitude,
            longitude,
            accuracy: None,
            speed: None,
            heading: None,
            timestamp,
        }
    }

    pub fn to_update(&self, driver_id: &str, order_id: Option<&str>) -> UpdateLocation {
        UpdateLocation {
            driver_id: driver_id.to_string(),
            latitude: self.latitude,
            longitude: self.longitude,
            accuracy: self.accuracy,
            speed: self.speed,
            heading: self.heading,
            order_id: order_id.map(str::to_string),
        }
    }
}

/// Passive status flag for the UI: whether position tracking is running.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TrackingStatus {
    #[default]
    Inactive,
    Active {
        background: bool,
    },
    PermissionDenied,
    Unavailable {
        reason: String,
    },
}

// ═══════════════════════════════════════════════════════════════════════════════
// Channel
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingChannelState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Errored,
}

impl TrackingChannelState {
    /// True while a connection exists or is being (re)established.
    pub fn is_active(&self) -> bool {
        !matches!(self, TrackingChannelState::Disconnected)
    }
}

impl fmt::Display for TrackingChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TrackingChannelState::Disconnected => "disconnected",
            TrackingChannelState::Connecting => "connecting",
            TrackingChannelState::Connected => "connected",
            TrackingChannelState::Errored => "errored",
        };
        f.write_str(label)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Driver account (REST read models)
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DriverProfile {
    #[serde(alias = "_id")]
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub vehicle_type: Option<String>,
    pub is_online: bool,
    pub rating: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EarningsSummary {
    pub today: f64,
    pub week: f64,
    pub month: f64,
    pub total: f64,
    pub deliveries_completed: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryHistoryEntry {
    #[serde(flatten)]
    pub record: DeliveryRecord,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}
