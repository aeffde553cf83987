//! Terminal output. Text by default, one JSON document per item with `--json`.

use courier_core::{
    DeliveryHistoryEntry, DeliveryOffer, DeliveryRecord, DriverProfile, EarningsSummary,
    EngineNotice, EngineSnapshot, TrackingStatus,
};
use serde_json::{json, Value};

fn emit(value: Value) {
    println!("{}", value);
}

pub fn offer_line(offer: &DeliveryOffer) -> String {
    let restaurant = offer
        .restaurant
        .as_ref()
        .map(|restaurant| restaurant.name.as_str())
        .filter(|name| !name.is_empty())
        .unwrap_or("?");
    let fee = offer
        .delivery_fee
        .map(|fee| format!("{:.2}", fee))
        .unwrap_or_else(|| "-".to_string());
    let destination = offer.delivery_address.as_deref().unwrap_or("-");
    format!("{}  {}  fee {}  -> {}", offer.id, restaurant, fee, destination)
}

pub fn delivery_line(record: &DeliveryRecord) -> String {
    format!("{} [{}]", offer_line(&record.offer), record.status)
}

pub fn offers(offers: &[DeliveryOffer], json: bool) {
    if json {
        emit(json!(offers));
        return;
    }
    if offers.is_empty() {
        println!("No offers available");
        return;
    }
    for offer in offers {
        println!("{}", offer_line(offer));
    }
}

pub fn delivery(record: &DeliveryRecord, json: bool) {
    if json {
        emit(json!({ "event": "delivery", "delivery": record }));
    } else {
        println!("Active: {}", delivery_line(record));
    }
}

pub fn tracking(status: &TrackingStatus, json: bool) {
    if json {
        emit(json!({ "event": "tracking", "tracking": status }));
        return;
    }
    match status {
        TrackingStatus::Active { background: true } => println!("Tracking on (background)"),
        TrackingStatus::Active { background: false } => println!("Tracking on (foreground only)"),
        TrackingStatus::Inactive => println!("Tracking off"),
        TrackingStatus::PermissionDenied => println!("Tracking off: location permission denied"),
        TrackingStatus::Unavailable { reason } => println!("Tracking off: {}", reason),
    }
}

pub fn notice(notice: &EngineNotice, json: bool) {
    if json {
        let value = match notice {
            EngineNotice::NewOffer(offer) => json!({ "event": "newOffer", "offer": offer }),
            EngineNotice::OfferRemoved { offer_id } => {
                json!({ "event": "offerRemoved", "offerId": offer_id })
            }
            EngineNotice::StatusChanged {
                offer_id, status, ..
            } => json!({ "event": "statusChanged", "offerId": offer_id, "status": status }),
            EngineNotice::ChannelState(state) => json!({ "event": "channel", "state": state }),
            EngineNotice::TrackingUnavailable(status) => {
                json!({ "event": "tracking", "tracking": status })
            }
            EngineNotice::SessionExpired => json!({ "event": "sessionExpired" }),
        };
        emit(value);
        return;
    }
    match notice {
        EngineNotice::NewOffer(offer) => println!("+ {}", offer_line(offer)),
        EngineNotice::OfferRemoved { offer_id } => println!("- {}", offer_id),
        EngineNotice::StatusChanged {
            offer_id, status, ..
        } => println!("* {} is now {}", offer_id, status),
        EngineNotice::ChannelState(state) => println!("~ channel {}", state),
        EngineNotice::TrackingUnavailable(status) => tracking(status, false),
        EngineNotice::SessionExpired => println!("! session expired"),
    }
}

pub fn snapshot(snapshot: &EngineSnapshot, json: bool) {
    if json {
        emit(json!({ "event": "snapshot", "snapshot": snapshot }));
        return;
    }
    println!(
        "online: {}  channel: {}  offers: {}",
        snapshot.session.is_online,
        snapshot.channel,
        snapshot.offers.len()
    );
    match &snapshot.active_delivery {
        Some(record) => println!("Active: {}", delivery_line(record)),
        None => println!("No active delivery"),
    }
}

pub fn profile(profile: &DriverProfile, json: bool) {
    if json {
        emit(json!(profile));
        return;
    }
    println!("{} ({})", profile.name, profile.id);
    if let Some(vehicle) = &profile.vehicle_type {
        println!("vehicle: {}", vehicle);
    }
    if let Some(rating) = profile.rating {
        println!("rating: {:.1}", rating);
    }
}

pub fn earnings(earnings: &EarningsSummary, json: bool) {
    if json {
        emit(json!(earnings));
        return;
    }
    println!("today  {:>10.2}", earnings.today);
    println!("week   {:>10.2}", earnings.week);
    println!("month  {:>10.2}", earnings.month);
    println!("total  {:>10.2}", earnings.total);
    println!("deliveries completed: {}", earnings.deliveries_completed);
}

pub fn history(entries: &[DeliveryHistoryEntry], json: bool) {
    if json {
        emit(json!(entries));
        return;
    }
    if entries.is_empty() {
        println!("No deliveries yet");
        return;
    }
    for entry in entries {
        let when = entry
            .completed_at
            .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{}  {}", when, delivery_line(&entry.record));
    }
}
