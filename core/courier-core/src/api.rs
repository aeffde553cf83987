//! REST boundary client.
//!
//! Every call carries the driver's bearer token. Authorization failures map
//! to [`CourierError::AuthExpired`] and are never retried here; losing an
//! accept race maps to [`CourierError::OfferAlreadyTaken`].
//!
//! Responses may be bare JSON or wrapped as `{"data": ...}`; list endpoints
//! also accept `{"deliveries": [...]}`.

use crate::error::{CourierError, Result};
use crate::types::{Credentials, DeliveryHistoryEntry, DriverProfile, EarningsSummary, PositionSample};
use courier_protocol::{DeliveryOffer, DeliveryRecord, DeliveryStatus};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;

const MAX_ERROR_BODY: usize = 512;

pub trait DeliveryApi: Send {
    fn fetch_available_deliveries(&self, credentials: &Credentials) -> Result<Vec<DeliveryOffer>>;

    fn accept_delivery(&self, credentials: &Credentials, offer_id: &str) -> Result<DeliveryRecord>;

    fn update_delivery_status(
        &self,
        credentials: &Credentials,
        offer_id: &str,
        status: DeliveryStatus,
    ) -> Result<DeliveryRecord>;

    fn set_driver_online(&self, credentials: &Credentials, online: bool) -> Result<()>;

    fn update_driver_location(&self, credentials: &Credentials, sample: &PositionSample) -> Result<()>;

    fn fetch_profile(&self, credentials: &Credentials) -> Result<DriverProfile>;

    fn fetch_earnings(&self, credentials: &Credentials) -> Result<EarningsSummary>;

    fn fetch_history(&self, credentials: &Credentials) -> Result<Vec<DeliveryHistoryEntry>>;
}

pub struct HttpDeliveryApi {
    base_url: String,
    client: Client,
}

impl HttpDeliveryApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| CourierError::network("building http client", err))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `/deliveries/{id}/{action}` with the id as one escaped path segment.
    fn delivery_url(&self, offer_id: &str, action: &str) -> Result<Url> {
        let invalid = |details: &str| {
            CourierError::network("building delivery url", format!("{}: {}", details, self.base_url))
        };
        let mut url = Url::parse(&self.base_url).map_err(|err| invalid(&err.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| invalid("base url cannot carry a path"))?
            .pop_if_empty()
            .push("deliveries")
            .push(offer_id)
            .push(action);
        Ok(url)
    }

    fn send(&self, context: &str, request: RequestBuilder, credentials: &Credentials) -> Result<Value> {
        let response = request
            .bearer_auth(&credentials.token)
            .send()
            .map_err(|err| CourierError::network(context, err))?;
        let status = response.status();
        let body = response
            .text()
            .map_err(|err| CourierError::network(context, err))?;

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            tracing::warn!(context, status = status.as_u16(), "Backend rejected credentials");
            return Err(CourierError::AuthExpired);
        }
        if !status.is_success() {
            return Err(CourierError::Http {
                status: status.as_u16(),
                body: truncate(&body),
            });
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|err| CourierError::Json {
            context: context.to_string(),
            source: err,
        })
    }

    fn decode<T: DeserializeOwned>(context: &str, value: Value) -> Result<T> {
        serde_json::from_value(unwrap_data(value)).map_err(|err| CourierError::Json {
            context: context.to_string(),
            source: err,
        })
    }

    fn decode_list<T: DeserializeOwned>(context: &str, value: Value) -> Result<Vec<T>> {
        let value = match unwrap_data(value) {
            Value::Object(mut map) => ["deliveries", "orders", "items"]
                .iter()
                .find_map(|key| map.remove(*key))
                .unwrap_or(Value::Array(Vec::new())),
            Value::Null => Value::Array(Vec::new()),
            other => other,
        };
        Self::decode(context, value)
    }
}

impl DeliveryApi for HttpDeliveryApi {
    fn fetch_available_deliveries(&self, credentials: &Credentials) -> Result<Vec<DeliveryOffer>> {
        let context = "fetching available deliveries";
        let value = self.send(
            context,
            self.client.get(self.url("/deliveries/available")),
            credentials,
        )?;
        Self::decode_list(context, value)
    }

    fn accept_delivery(&self, credentials: &Credentials, offer_id: &str) -> Result<DeliveryRecord> {
        let context = "accepting delivery";
        let request = self
            .client
            .post(self.delivery_url(offer_id, "accept")?)
            .json(&json!({ "driverId": credentials.driver_id }));
        match self.send(context, request, credentials) {
            Ok(value) => Self::decode(context, value),
            Err(CourierError::Http { status, body }) if is_taken_response(status, &body) => {
                tracing::info!(offer_id = %offer_id, "Accept lost to another driver");
                Err(CourierError::OfferAlreadyTaken {
                    offer_id: offer_id.to_string(),
                })
            }
            Err(CourierError::Http { status: 404, .. }) => {
                Err(CourierError::OfferNotFound(offer_id.to_string()))
            }
            Err(err) => Err(err),
        }
    }

    fn update_delivery_status(
        &self,
        credentials: &Credentials,
        offer_id: &str,
        status: DeliveryStatus,
    ) -> Result<DeliveryRecord> {
        let context = "updating delivery status";
        let request = self
            .client
            .patch(self.delivery_url(offer_id, "status")?)
            .json(&json!({ "status": status.as_str() }));
        match self.send(context, request, credentials) {
            Ok(value) => Self::decode(context, value),
            Err(CourierError::Http { status: 404, .. }) => {
                Err(CourierError::OfferNotFound(offer_id.to_string()))
            }
            Err(err) => Err(err),
        }
    }

    fn set_driver_online(&self, credentials: &Credentials, online: bool) -> Result<()> {
        let request = self
            .client
            .patch(self.url("/drivers/me/status"))
            .json(&json!({ "isOnline": online }));
        self.send("updating driver status", request, credentials)
            .map(|_| ())
    }

    fn update_driver_location(&self, credentials: &Credentials, sample: &PositionSample) -> Result<()> {
        let request = self
            .client
            .patch(self.url("/drivers/me/location"))
            .json(&json!({
                "latitude": sample.latitude,
                "longitude": sample.longitude,
            }));
        self.send("updating driver location", request, credentials)
            .map(|_| ())
    }

    fn fetch_profile(&self, credentials: &Credentials) -> Result<DriverProfile> {
        let context = "fetching profile";
        let value = self.send(context, self.client.get(self.url("/drivers/me")), credentials)?;
        Self::decode(context, value)
    }

    fn fetch_earnings(&self, credentials: &Credentials) -> Result<EarningsSummary> {
        let context = "fetching earnings";
        let value = self.send(
            context,
            self.client.get(self.url("/drivers/me/earnings")),
            credentials,
        )?;
        Self::decode(context, value)
    }

    fn fetch_history(&self, credentials: &Credentials) -> Result<Vec<DeliveryHistoryEntry>> {
        let context = "fetching delivery history";
        let value = self.send(
            context,
            self.client.get(self.url("/drivers/me/deliveries")),
            credentials,
        )?;
        Self::decode_list(context, value)
    }
}

fn unwrap_data(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// 409, or a 400 whose message says someone else already has the order.
fn is_taken_response(status: u16, body: &str) -> bool {
    if status == 409 {
        return true;
    }
    if status != 400 {
        return false;
    }
    let body = body.to_ascii_lowercase();
    body.contains("already") && ["taken", "assigned", "accepted"].iter().any(|word| body.contains(word))
}

fn truncate(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
