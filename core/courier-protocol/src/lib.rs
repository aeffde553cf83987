//! Wire protocol types and validation for the courier tracking channel.
//!
//! This crate is shared by the core and any other client to prevent schema drift.
//! The backend remains the authority on validation, but clients reuse the same
//! types to build outbound messages and to reject malformed inbound ones before
//! they reach local state.

pub mod packet;

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_NAMESPACE: &str = "/tracking";
pub const MAX_PAYLOAD_BYTES: usize = 1024 * 1024; // 1MB
pub const MAX_ID_LEN: usize = 128;

pub const EVENT_UPDATE_LOCATION: &str = "updateLocation";
pub const EVENT_JOIN_DRIVER: &str = "joinDriver";
pub const EVENT_NEW_AVAILABLE_DELIVERY: &str = "newAvailableDelivery";
pub const EVENT_DELIVERY_TAKEN: &str = "deliveryTaken";
pub const EVENT_ORDER_STATUS_UPDATE: &str = "orderStatusUpdate";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Delivery status vocabulary
// ═══════════════════════════════════════════════════════════════════════════════

/// Status of a delivery as the backend reports it.
///
/// `PENDING` belongs to orders nobody has accepted yet; the driver-side
/// lifecycle runs `ACCEPTED -> PICKED_UP -> IN_TRANSIT -> DELIVERED`, and
/// `CANCELLED` can interrupt any non-terminal step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    Pending,
    Accepted,
    PickedUp,
    InTransit,
    Delivered,
    Cancelled,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "PENDING",
            DeliveryStatus::Accepted => "ACCEPTED",
            DeliveryStatus::PickedUp => "PICKED_UP",
            DeliveryStatus::InTransit => "IN_TRANSIT",
            DeliveryStatus::Delivered => "DELIVERED",
            DeliveryStatus::Cancelled => "CANCELLED",
        }
    }

    /// Lenient parse: case-insensitive, `-` and spaces treated as `_`.
    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "PENDING" => Some(DeliveryStatus::Pending),
            "ACCEPTED" => Some(DeliveryStatus::Accepted),
            "PICKED_UP" => Some(DeliveryStatus::PickedUp),
            "IN_TRANSIT" => Some(DeliveryStatus::InTransit),
            "DELIVERED" => Some(DeliveryStatus::Delivered),
            "CANCELLED" | "CANCELED" => Some(DeliveryStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryStatus::Delivered | DeliveryStatus::Cancelled)
    }

    /// The next step a driver can take from this status, if any.
    pub fn next(&self) -> Option<DeliveryStatus> {
        match self {
            DeliveryStatus::Pending => Some(DeliveryStatus::Accepted),
            DeliveryStatus::Accepted => Some(DeliveryStatus::PickedUp),
            DeliveryStatus::PickedUp => Some(DeliveryStatus::InTransit),
            DeliveryStatus::InTransit => Some(DeliveryStatus::Delivered),
            DeliveryStatus::Delivered | DeliveryStatus::Cancelled => None,
        }
    }

    pub fn can_advance_to(&self, target: DeliveryStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        target == DeliveryStatus::Cancelled || self.next() == Some(target)
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decodes through [`DeliveryStatus::parse`], so `"accepted"` and
/// `"in-transit"` are read the same as their canonical spellings.
impl<'de> Deserialize<'de> for DeliveryStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        DeliveryStatus::parse(&value).ok_or_else(|| {
            de::Error::custom(format!("unknown delivery status: {}", value))
        })
    }
}

impl FromStr for DeliveryStatus {
    type Err = ErrorInfo;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        DeliveryStatus::parse(value).ok_or_else(|| {
            ErrorInfo::new("invalid_status", format!("unknown delivery status: {}", value))
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Delivery payloads
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RestaurantInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CustomerInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub name: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default)]
    pub price: Option<f64>,
}

fn default_quantity() -> u32 {
    1
}

/// A delivery visible to the driver but not yet accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryOffer {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub restaurant: Option<RestaurantInfo>,
    #[serde(default)]
    pub customer: Option<CustomerInfo>,
    #[serde(default)]
    pub delivery_fee: Option<f64>,
    #[serde(default)]
    pub pickup_address: Option<String>,
    #[serde(default)]
    pub delivery_address: Option<String>,
    #[serde(default)]
    pub pickup_location: Option<GeoPoint>,
    #[serde(default)]
    pub delivery_location: Option<GeoPoint>,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    #[serde(default)]
    pub total: Option<f64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl DeliveryOffer {
    pub fn validate(&self) -> Result<(), ErrorInfo> {
        require_id(&self.id, "order.id")
    }
}

/// The full record of an accepted delivery as the backend returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryRecord {
    #[serde(flatten)]
    pub offer: DeliveryOffer,
    pub status: DeliveryStatus,
    #[serde(default)]
    pub driver_id: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl DeliveryRecord {
    pub fn id(&self) -> &str {
        &self.offer.id
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Outbound messages
// ═══════════════════════════════════════════════════════════════════════════════

/// Position report. Optional readings are sent as explicit `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLocation {
    pub driver_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    pub order_id: Option<String>,
}

impl UpdateLocation {
    pub fn validate(&self) -> Result<(), ErrorInfo> {
        require_id(&self.driver_id, "driverId")?;
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(ErrorInfo::new(
                "invalid_coordinate",
                format!("latitude out of range: {}", self.latitude),
            ));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(ErrorInfo::new(
                "invalid_coordinate",
                format!("longitude out of range: {}", self.longitude),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinDriver {
    pub driver_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutboundEvent {
    UpdateLocation(UpdateLocation),
    JoinDriver(JoinDriver),
}

impl OutboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            OutboundEvent::UpdateLocation(_) => EVENT_UPDATE_LOCATION,
            OutboundEvent::JoinDriver(_) => EVENT_JOIN_DRIVER,
        }
    }

    pub fn payload(&self) -> Result<Value, ErrorInfo> {
        let value = match self {
            OutboundEvent::UpdateLocation(update) => {
                update.validate()?;
                serde_json::to_value(update)
            }
            OutboundEvent::JoinDriver(join) => {
                require_id(&join.driver_id, "driverId")?;
                serde_json::to_value(join)
            }
        };
        value.map_err(|err| ErrorInfo::new("serialize_failed", err.to_string()))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Inbound messages
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewAvailableDelivery {
    order: DeliveryOffer,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeliveryTaken {
    #[serde(alias = "deliveryId")]
    order_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderStatusUpdate {
    order_id: String,
    status: String,
    order: StatusUpdateRecord,
}

/// The record carried by `orderStatusUpdate`. Its own `status` is ignored;
/// the top-level one is authoritative and may be the only one present.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusUpdateRecord {
    #[serde(flatten)]
    offer: DeliveryOffer,
    #[serde(default)]
    driver_id: Option<String>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

/// A validated server push.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    NewAvailableDelivery(DeliveryOffer),
    DeliveryTaken {
        order_id: String,
    },
    OrderStatusUpdate {
        order_id: String,
        status: DeliveryStatus,
        order: DeliveryRecord,
    },
}

impl InboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            InboundEvent::NewAvailableDelivery(_) => EVENT_NEW_AVAILABLE_DELIVERY,
            InboundEvent::DeliveryTaken { .. } => EVENT_DELIVERY_TAKEN,
            InboundEvent::OrderStatusUpdate { .. } => EVENT_ORDER_STATUS_UPDATE,
        }
    }
}

pub fn parse_inbound(name: &str, payload: Value) -> Result<InboundEvent, ErrorInfo> {
    match name {
        EVENT_NEW_AVAILABLE_DELIVERY => {
            let message: NewAvailableDelivery = decode_payload(name, payload)?;
            message.order.validate()?;
            Ok(InboundEvent::NewAvailableDelivery(message.order))
        }
        EVENT_DELIVERY_TAKEN => {
            let message: DeliveryTaken = decode_payload(name, payload)?;
            require_id(&message.order_id, "orderId")?;
            Ok(InboundEvent::DeliveryTaken {
                order_id: message.order_id,
            })
        }
        EVENT_ORDER_STATUS_UPDATE => {
            let message: OrderStatusUpdate = decode_payload(name, payload)?;
            require_id(&message.order_id, "orderId")?;
            let status = message.status.parse::<DeliveryStatus>()?;
            let order = DeliveryRecord {
                offer: message.order.offer,
                status,
                driver_id: message.order.driver_id,
                updated_at: message.order.updated_at,
            };
            if order.id() != message.order_id {
                return Err(ErrorInfo::new(
                    "order_id_mismatch",
                    format!(
                        "orderId {} does not match order record {}",
                        message.order_id,
                        order.id()
                    ),
                ));
            }
            Ok(InboundEvent::OrderStatusUpdate {
                order_id: message.order_id,
                status,
                order,
            })
        }
        other => Err(ErrorInfo::new(
            "unknown_event",
            format!("unrecognized event: {}", other),
        )),
    }
}

fn decode_payload<T: serde::de::DeserializeOwned>(name: &str, payload: Value) -> Result<T, ErrorInfo> {
    serde_json::from_value(payload).map_err(|err| {
        ErrorInfo::new(
            "invalid_payload",
            format!("{} payload is invalid: {}", name, err),
        )
    })
}

fn require_id(value: &str, field: &str) -> Result<(), ErrorInfo> {
    if value.trim().is_empty() {
        return Err(ErrorInfo::new("missing_field", format!("{} is required", field)));
    }
    if value.len() > MAX_ID_LEN {
        return Err(ErrorInfo::new(
            "invalid_id",
            format!("{} must be {} characters or fewer", field, MAX_ID_LEN),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn offer_json(id: &str) -> Value {
        json!({
            "_id": id,
            "restaurant": { "name": "Taqueria Luz", "phone": "555-0101" },
            "customer": { "name": "Ana" },
            "deliveryFee": 4.5,
            "pickupAddress": "12 Market St",
            "deliveryAddress": "98 Elm Ave",
            "items": [{ "name": "Burrito", "quantity": 2, "price": 9.0 }]
        })
    }

    #[test]
    fn parses_new_offer_with_mongo_id() {
        let event = parse_inbound(
            EVENT_NEW_AVAILABLE_DELIVERY,
            json!({ "order": offer_json("ord-1") }),
        )
        .unwrap();
        match event {
            InboundEvent::NewAvailableDelivery(offer) => {
                assert_eq!(offer.id, "ord-1");
                assert_eq!(offer.delivery_fee, Some(4.5));
                assert_eq!(offer.items[0].quantity, 2);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn rejects_offer_with_blank_id() {
        let result = parse_inbound(
            EVENT_NEW_AVAILABLE_DELIVERY,
            json!({ "order": offer_json("  ") }),
        );
        assert_eq!(result.unwrap_err().code, "missing_field");
    }

    #[test]
    fn parses_delivery_taken() {
        let event = parse_inbound(EVENT_DELIVERY_TAKEN, json!({ "orderId": "ord-9" })).unwrap();
        assert_eq!(
            event,
            InboundEvent::DeliveryTaken {
                order_id: "ord-9".to_string()
            }
        );
    }

    #[test]
    fn parses_status_update_with_lenient_status() {
        let mut order = offer_json("ord-3");
        order["status"] = json!("IN_TRANSIT");
        let event = parse_inbound(
            EVENT_ORDER_STATUS_UPDATE,
            json!({ "orderId": "ord-3", "status": "in-transit", "order": order }),
        )
        .unwrap();
        match event {
            InboundEvent::OrderStatusUpdate { status, order, .. } => {
                assert_eq!(status, DeliveryStatus::InTransit);
                assert_eq!(order.status, DeliveryStatus::InTransit);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn status_update_without_record_status_uses_top_level() {
        let event = parse_inbound(
            EVENT_ORDER_STATUS_UPDATE,
            json!({ "orderId": "ord-1", "status": "PICKED_UP", "order": { "id": "ord-1" } }),
        )
        .unwrap();
        match event {
            InboundEvent::OrderStatusUpdate { status, order, .. } => {
                assert_eq!(status, DeliveryStatus::PickedUp);
                assert_eq!(order.status, DeliveryStatus::PickedUp);
                assert_eq!(order.id(), "ord-1");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn status_update_record_status_spelling_is_not_fatal() {
        let mut order = offer_json("ord-1");
        order["status"] = json!("picked_up");
        let event = parse_inbound(
            EVENT_ORDER_STATUS_UPDATE,
            json!({ "orderId": "ord-1", "status": "CANCELLED", "order": order }),
        )
        .unwrap();
        match event {
            InboundEvent::OrderStatusUpdate { order, .. } => {
                assert_eq!(order.status, DeliveryStatus::Cancelled);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn delivery_record_reads_lowercase_status() {
        let mut value = offer_json("ord-2");
        value["status"] = json!("accepted");
        let record: DeliveryRecord = serde_json::from_value(value).unwrap();
        assert_eq!(record.status, DeliveryStatus::Accepted);

        let mut value = offer_json("ord-2");
        value["status"] = json!("in-transit");
        let record: DeliveryRecord = serde_json::from_value(value).unwrap();
        assert_eq!(record.status, DeliveryStatus::InTransit);
        assert_eq!(serde_json::to_value(record.status).unwrap(), json!("IN_TRANSIT"));
    }

    #[test]
    fn delivery_record_rejects_unknown_status() {
        let mut value = offer_json("ord-2");
        value["status"] = json!("teleported");
        assert!(serde_json::from_value::<DeliveryRecord>(value).is_err());
    }

    #[test]
    fn rejects_status_update_for_mismatched_record() {
        let mut order = offer_json("ord-4");
        order["status"] = json!("PICKED_UP");
        let result = parse_inbound(
            EVENT_ORDER_STATUS_UPDATE,
            json!({ "orderId": "ord-5", "status": "PICKED_UP", "order": order }),
        );
        assert_eq!(result.unwrap_err().code, "order_id_mismatch");
    }

    #[test]
    fn rejects_unknown_status() {
        let mut order = offer_json("ord-6");
        order["status"] = json!("ACCEPTED");
        let result = parse_inbound(
            EVENT_ORDER_STATUS_UPDATE,
            json!({ "orderId": "ord-6", "status": "TELEPORTED", "order": order }),
        );
        assert_eq!(result.unwrap_err().code, "invalid_status");
    }

    #[test]
    fn rejects_unknown_event() {
        let result = parse_inbound("somethingElse", json!({}));
        assert_eq!(result.unwrap_err().code, "unknown_event");
    }

    #[test]
    fn update_location_serializes_nulls() {
        let event = OutboundEvent::UpdateLocation(UpdateLocation {
            driver_id: "drv-1".to_string(),
            latitude: 40.0,
            longitude: -3.7,
            accuracy: None,
            speed: Some(3.2),
            heading: None,
            order_id: None,
        });
        let payload = event.payload().unwrap();
        assert_eq!(event.name(), "updateLocation");
        assert_eq!(payload["driverId"], json!("drv-1"));
        assert!(payload["accuracy"].is_null());
        assert!(payload["orderId"].is_null());
        assert_eq!(payload["speed"], json!(3.2));
    }

    #[test]
    fn update_location_rejects_out_of_range_latitude() {
        let event = OutboundEvent::UpdateLocation(UpdateLocation {
            driver_id: "drv-1".to_string(),
            latitude: 91.0,
            longitude: 0.0,
            accuracy: None,
            speed: None,
            heading: None,
            order_id: None,
        });
        assert_eq!(event.payload().unwrap_err().code, "invalid_coordinate");
    }

    #[test]
    fn status_transitions_follow_driver_lifecycle() {
        assert!(DeliveryStatus::Accepted.can_advance_to(DeliveryStatus::PickedUp));
        assert!(DeliveryStatus::PickedUp.can_advance_to(DeliveryStatus::InTransit));
        assert!(DeliveryStatus::InTransit.can_advance_to(DeliveryStatus::Delivered));
        assert!(DeliveryStatus::InTransit.can_advance_to(DeliveryStatus::Cancelled));
        assert!(!DeliveryStatus::Accepted.can_advance_to(DeliveryStatus::Delivered));
        assert!(!DeliveryStatus::Delivered.can_advance_to(DeliveryStatus::Cancelled));
    }

    #[test]
    fn status_round_trips_through_wire_names() {
        let value = serde_json::to_value(DeliveryStatus::PickedUp).unwrap();
        assert_eq!(value, json!("PICKED_UP"));
        assert_eq!("canceled".parse::<DeliveryStatus>().unwrap(), DeliveryStatus::Cancelled);
    }
}
