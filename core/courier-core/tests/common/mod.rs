//! In-memory collaborators for engine tests, with call counters.

#![allow(dead_code)]

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use courier_core::{
    ConnectRequest, CourierConfig, CourierError, Credentials, DeliveryApi, DeliveryHistoryEntry,
    DeliveryOffer, DeliveryRecord, DeliveryStatus, DesiredAccuracy, DriverEngine, DriverProfile,
    EarningsSummary, EngineParts, EventSink, LocationSensor, OfferAlert, PermissionStatus,
    PositionSample, Result, SamplingPolicy, Transport, TransportEvent,
};
use courier_protocol::OutboundEvent;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

pub fn lock<T>(mutex: &Arc<Mutex<T>>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap()
}

pub fn creds(driver_id: &str) -> Credentials {
    Credentials {
        driver_id: driver_id.to_string(),
        token: format!("token-{}", driver_id),
    }
}

pub fn offer(id: &str) -> DeliveryOffer {
    serde_json::from_value(json!({
        "id": id,
        "restaurant": { "name": "Casa Lucio" },
        "deliveryFee": 3.5,
        "deliveryAddress": "Calle Mayor 1",
    }))
    .unwrap()
}

pub fn record(id: &str, status: DeliveryStatus) -> DeliveryRecord {
    DeliveryRecord {
        offer: offer(id),
        status,
        driver_id: Some("drv-1".to_string()),
        updated_at: None,
    }
}

pub fn sample(lat: f64, secs: i64) -> PositionSample {
    let base = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
    PositionSample::new(lat, -3.7038, base + ChronoDuration::seconds(secs))
}

// ─────────────────────────────────────────────────────────────────────────────
// Sensor
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct SensorLog {
    pub watch: usize,
    pub unwatch: usize,
    pub readings: VecDeque<PositionSample>,
}

pub struct MockSensor {
    pub permission: PermissionStatus,
    pub log: Arc<Mutex<SensorLog>>,
}

impl LocationSensor for MockSensor {
    fn request_foreground_permission(&mut self, _timeout: Duration) -> PermissionStatus {
        self.permission
    }

    fn request_background_permission(&mut self, _timeout: Duration) -> PermissionStatus {
        PermissionStatus::Denied
    }

    fn current_position(&mut self, _accuracy: DesiredAccuracy) -> Result<PositionSample> {
        Ok(sample(40.4168, 0))
    }

    fn watch(&mut self, _policy: &SamplingPolicy) -> Result<()> {
        lock(&self.log).watch += 1;
        Ok(())
    }

    fn poll(&mut self) -> Option<PositionSample> {
        lock(&self.log).readings.pop_front()
    }

    fn unwatch(&mut self) {
        lock(&self.log).unwatch += 1;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Transport
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct TransportLog {
    pub opens: Vec<ConnectRequest>,
    pub closes: usize,
    pub emitted: Vec<OutboundEvent>,
    pub sink: Option<EventSink>,
}

impl TransportLog {
    pub fn is_open(&self) -> bool {
        self.opens.len() > self.closes
    }

    pub fn location_updates(&self) -> Vec<&OutboundEvent> {
        self.emitted
            .iter()
            .filter(|event| matches!(event, OutboundEvent::UpdateLocation(_)))
            .collect()
    }
}

pub struct MockTransport {
    pub log: Arc<Mutex<TransportLog>>,
}

impl Transport for MockTransport {
    fn open(&mut self, request: ConnectRequest, sink: EventSink) -> Result<()> {
        let mut log = lock(&self.log);
        log.opens.push(request);
        log.sink = Some(sink);
        Ok(())
    }

    fn emit(&mut self, event: &OutboundEvent) -> Result<()> {
        lock(&self.log).emitted.push(event.clone());
        Ok(())
    }

    fn close(&mut self) {
        lock(&self.log).closes += 1;
    }
}

/// Pushes an event as the transport's worker would.
pub fn push(log: &Arc<Mutex<TransportLog>>, event: TransportEvent) {
    let sink = lock(log).sink.clone().expect("transport was opened");
    sink.send(event);
}

// ─────────────────────────────────────────────────────────────────────────────
// REST boundary
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Script {
    #[default]
    Succeed,
    Taken,
    NotFound,
    AuthExpired,
    NetworkDown,
}

impl Script {
    fn fail(self, offer_id: &str) -> Option<CourierError> {
        match self {
            Script::Succeed => None,
            Script::Taken => Some(CourierError::OfferAlreadyTaken {
                offer_id: offer_id.to_string(),
            }),
            Script::NotFound => Some(CourierError::OfferNotFound(offer_id.to_string())),
            Script::AuthExpired => Some(CourierError::AuthExpired),
            Script::NetworkDown => Some(CourierError::network("mock", "connection refused")),
        }
    }
}

#[derive(Default)]
pub struct ApiLog {
    pub accept: Script,
    pub status: Script,
    pub reads: Script,
    pub online: Script,
    pub available: Vec<DeliveryOffer>,
    pub calls: Vec<String>,
}

impl ApiLog {
    pub fn count(&self, name: &str) -> usize {
        self.calls.iter().filter(|call| call.starts_with(name)).count()
    }
}

pub struct MockApi {
    pub log: Arc<Mutex<ApiLog>>,
}

impl DeliveryApi for MockApi {
    fn fetch_available_deliveries(&self, _credentials: &Credentials) -> Result<Vec<DeliveryOffer>> {
        let mut log = lock(&self.log);
        log.calls.push("fetch_available".to_string());
        match log.reads.fail("") {
            Some(err) => Err(err),
            None => Ok(log.available.clone()),
        }
    }

    fn accept_delivery(&self, _credentials: &Credentials, offer_id: &str) -> Result<DeliveryRecord> {
        let mut log = lock(&self.log);
        log.calls.push(format!("accept:{}", offer_id));
        match log.accept.fail(offer_id) {
            Some(err) => Err(err),
            None => Ok(record(offer_id, DeliveryStatus::Accepted)),
        }
    }

    fn update_delivery_status(
        &self,
        _credentials: &Credentials,
        offer_id: &str,
        status: DeliveryStatus,
    ) -> Result<DeliveryRecord> {
        let mut log = lock(&self.log);
        log.calls.push(format!("status:{}:{}", offer_id, status));
        match log.status.fail(offer_id) {
            Some(err) => Err(err),
            None => Ok(record(offer_id, status)),
        }
    }

    fn set_driver_online(&self, _credentials: &Credentials, online: bool) -> Result<()> {
        let mut log = lock(&self.log);
        log.calls.push(format!("online:{}", online));
        match log.online.fail("") {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn update_driver_location(&self, _credentials: &Credentials, _sample: &PositionSample) -> Result<()> {
        lock(&self.log).calls.push("location".to_string());
        Ok(())
    }

    fn fetch_profile(&self, credentials: &Credentials) -> Result<DriverProfile> {
        let mut log = lock(&self.log);
        log.calls.push("profile".to_string());
        match log.reads.fail("") {
            Some(err) => Err(err),
            None => Ok(DriverProfile {
                id: credentials.driver_id.clone(),
                name: "Ana".to_string(),
                ..DriverProfile::default()
            }),
        }
    }

    fn fetch_earnings(&self, _credentials: &Credentials) -> Result<EarningsSummary> {
        let mut log = lock(&self.log);
        log.calls.push("earnings".to_string());
        match log.reads.fail("") {
            Some(err) => Err(err),
            None => Ok(EarningsSummary {
                today: 42.0,
                deliveries_completed: 7,
                ..EarningsSummary::default()
            }),
        }
    }

    fn fetch_history(&self, _credentials: &Credentials) -> Result<Vec<DeliveryHistoryEntry>> {
        let mut log = lock(&self.log);
        log.calls.push("history".to_string());
        match log.reads.fail("") {
            Some(err) => Err(err),
            None => Ok(vec![DeliveryHistoryEntry {
                record: record("old-1", DeliveryStatus::Delivered),
                completed_at: None,
            }]),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Alert
// ─────────────────────────────────────────────────────────────────────────────

pub struct MockAlert {
    pub fired: Arc<Mutex<Vec<String>>>,
}

impl OfferAlert for MockAlert {
    fn new_offer(&mut self, offer: &DeliveryOffer) {
        lock(&self.fired).push(offer.id.clone());
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Harness
// ─────────────────────────────────────────────────────────────────────────────

pub struct Harness {
    pub engine: DriverEngine,
    pub sensor: Arc<Mutex<SensorLog>>,
    pub transport: Arc<Mutex<TransportLog>>,
    pub api: Arc<Mutex<ApiLog>>,
    pub alerts: Arc<Mutex<Vec<String>>>,
}

pub fn harness() -> Harness {
    harness_with(Some(PermissionStatus::Granted))
}

/// `None` builds an engine on a host with no location provider.
pub fn harness_with(permission: Option<PermissionStatus>) -> Harness {
    let sensor_log = Arc::new(Mutex::new(SensorLog::default()));
    let transport_log = Arc::new(Mutex::new(TransportLog::default()));
    let api_log = Arc::new(Mutex::new(ApiLog::default()));
    let alerts = Arc::new(Mutex::new(Vec::new()));

    let sensor: Option<Box<dyn LocationSensor>> = permission.map(|permission| {
        Box::new(MockSensor {
            permission,
            log: Arc::clone(&sensor_log),
        }) as Box<dyn LocationSensor>
    });

    let config = CourierConfig {
        sampling: SamplingPolicy {
            minimum_time_interval_ms: 5_000,
            minimum_distance_meters: 10.0,
            desired_accuracy: DesiredAccuracy::High,
        },
        ..CourierConfig::default()
    };

    let engine = DriverEngine::new(
        config,
        EngineParts {
            sensor,
            transport: Box::new(MockTransport {
                log: Arc::clone(&transport_log),
            }),
            api: Box::new(MockApi {
                log: Arc::clone(&api_log),
            }),
            alert: Box::new(MockAlert {
                fired: Arc::clone(&alerts),
            }),
        },
    );

    Harness {
        engine,
        sensor: sensor_log,
        transport: transport_log,
        api: api_log,
        alerts,
    }
}

impl Harness {
    /// Logs in, goes online and completes the handshake.
    pub fn online(&mut self) {
        self.engine.login(creds("drv-1"));
        self.engine.go_online().unwrap();
        push(&self.transport, TransportEvent::Connected);
        self.engine.pump();
    }
}
