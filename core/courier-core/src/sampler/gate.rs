//! Threshold gate: decides which raw readings become emitted samples.

use crate::types::{PositionSample, SamplingPolicy};

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two samples, in meters.
pub fn distance_meters(a: &PositionSample, b: &PositionSample) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// The first reading always passes; later ones pass when either the distance
/// or the time threshold is met since the last emitted sample.
#[derive(Debug, Clone)]
pub struct SampleGate {
    policy: SamplingPolicy,
    last: Option<PositionSample>,
}

impl SampleGate {
    pub fn new(policy: SamplingPolicy) -> Self {
        Self { policy, last: None }
    }

    pub fn policy(&self) -> &SamplingPolicy {
        &self.policy
    }

    pub fn reset(&mut self, policy: SamplingPolicy) {
        self.policy = policy;
        self.last = None;
    }

    pub fn admit(&mut self, sample: &PositionSample) -> bool {
        let pass = match &self.last {
            None => true,
            Some(last) => {
                let moved = distance_meters(last, sample) >= self.policy.minimum_distance_meters;
                let elapsed_ms = sample
                    .timestamp
                    .signed_duration_since(last.timestamp)
                    .num_milliseconds();
                let waited = elapsed_ms >= 0
                    && elapsed_ms as u64 >= self.policy.minimum_time_interval_ms;
                moved || waited
            }
        };
        if pass {
            self.last = Some(sample.clone());
        }
        pass
    }
}
