//! Position sampler.
//!
//! Wraps a device location sensor behind [`LocationSensor`] and turns its raw
//! readings into a gated, restartable stream of [`PositionSample`]s.
//!
//! # Capability
//!
//! Whether the host has a location provider at all is decided once, when the
//! sampler is built: [`PositionSampler::resolve`] yields either a working
//! sampler or the explicit [`PositionSampler::Unavailable`] variant. Call sites
//! never probe for hardware themselves.
//!
//! # Lifecycle
//!
//! ```text
//! start(policy) ── permission ── initial fix ── watch ──▶ running
//!      │ denied / no fix / watch error: nothing emitted, Err returned
//! stop() / drop ── unwatch ──▶ stopped (pending readings discarded)
//! ```
//!
//! The OS subscription is held only while running and is always released by
//! `stop` or on drop, whichever comes first.

mod gate;
mod replay;

pub use gate::{distance_meters, SampleGate};
pub use replay::ReplaySensor;

use crate::error::{CourierError, Result};
use crate::types::{DesiredAccuracy, PositionSample, SamplingPolicy, TrackingStatus};
use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
    /// The prompt was dismissed or timed out.
    Undetermined,
}

/// Hardware seam for the device location provider.
///
/// Implementations must not block past the supplied timeouts; an unanswered
/// permission prompt reports [`PermissionStatus::Undetermined`].
pub trait LocationSensor: Send {
    fn request_foreground_permission(&mut self, timeout: Duration) -> PermissionStatus;

    fn request_background_permission(&mut self, timeout: Duration) -> PermissionStatus;

    fn current_position(&mut self, accuracy: DesiredAccuracy) -> Result<PositionSample>;

    /// Acquires the OS location subscription.
    fn watch(&mut self, policy: &SamplingPolicy) -> Result<()>;

    /// Next raw reading delivered since the last poll, if any. Never blocks.
    fn poll(&mut self) -> Option<PositionSample>;

    /// Releases the OS location subscription. Must be safe to call twice.
    fn unwatch(&mut self);
}

/// A sampler backed by a real sensor.
pub struct SensorSampler {
    sensor: Box<dyn LocationSensor>,
    gate: SampleGate,
    pending: VecDeque<PositionSample>,
    running: bool,
    background: bool,
    permission_timeout: Duration,
}

impl SensorSampler {
    fn new(sensor: Box<dyn LocationSensor>, permission_timeout: Duration) -> Self {
        Self {
            sensor,
            gate: SampleGate::new(SamplingPolicy::default()),
            pending: VecDeque::new(),
            running: false,
            background: false,
            permission_timeout,
        }
    }

    fn start(&mut self, policy: &SamplingPolicy) -> Result<TrackingStatus> {
        if self.running {
            return Ok(TrackingStatus::Active {
                background: self.background,
            });
        }

        match self
            .sensor
            .request_foreground_permission(self.permission_timeout)
        {
            PermissionStatus::Granted => {}
            status => {
                tracing::warn!(?status, "Foreground location permission not granted");
                return Err(CourierError::PermissionDenied);
            }
        }

        self.background = match self
            .sensor
            .request_background_permission(self.permission_timeout)
        {
            PermissionStatus::Granted => true,
            status => {
                tracing::info!(?status, "Background location unavailable; tracking foreground only");
                false
            }
        };

        let initial = self.sensor.current_position(policy.desired_accuracy)?;
        self.sensor.watch(policy)?;

        self.gate.reset(policy.clone());
        self.pending.clear();
        if self.gate.admit(&initial) {
            self.pending.push_back(initial);
        }
        self.running = true;
        tracing::info!(
            interval_ms = policy.minimum_time_interval_ms,
            distance_m = policy.minimum_distance_meters,
            background = self.background,
            "Position sampling started"
        );
        Ok(TrackingStatus::Active {
            background: self.background,
        })
    }

    fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.sensor.unwatch();
        self.running = false;
        self.pending.clear();
        tracing::info!("Position sampling stopped");
    }

    fn poll(&mut self) -> Option<PositionSample> {
        if !self.running {
            return None;
        }
        if let Some(sample) = self.pending.pop_front() {
            return Some(sample);
        }
        while let Some(raw) = self.sensor.poll() {
            if self.gate.admit(&raw) {
                return Some(raw);
            }
        }
        None
    }
}

impl Drop for SensorSampler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Position sampler, resolved once against the host's capabilities.
pub enum PositionSampler {
    Available(SensorSampler),
    Unavailable { reason: String },
}

impl PositionSampler {
    /// Resolves the sampler from an optional sensor.
    pub fn resolve(sensor: Option<Box<dyn LocationSensor>>, permission_timeout: Duration) -> Self {
        match sensor {
            Some(sensor) => {
                PositionSampler::Available(SensorSampler::new(sensor, permission_timeout))
            }
            None => PositionSampler::unavailable("no location provider on this host"),
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        PositionSampler::Unavailable {
            reason: reason.into(),
        }
    }

    /// Starts sampling. Idempotent: a running sampler keeps its subscription.
    pub fn start(&mut self, policy: &SamplingPolicy) -> Result<TrackingStatus> {
        match self {
            PositionSampler::Available(sampler) => sampler.start(policy),
            PositionSampler::Unavailable { reason } => Err(CourierError::SensorUnavailable {
                reason: reason.clone(),
            }),
        }
    }

    pub fn stop(&mut self) {
        if let PositionSampler::Available(sampler) = self {
            sampler.stop();
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, PositionSampler::Available(sampler) if sampler.running)
    }

    /// Next emitted sample, in generation order. `None` when nothing is due
    /// or the sampler is stopped.
    pub fn poll(&mut self) -> Option<PositionSample> {
        match self {
            PositionSampler::Available(sampler) => sampler.poll(),
            PositionSampler::Unavailable { .. } => None,
        }
    }

    /// Drains every sample currently due.
    pub fn samples(&mut self) -> Samples<'_> {
        Samples { sampler: self }
    }
}

pub struct Samples<'a> {
    sampler: &'a mut PositionSampler,
}

impl Iterator for Samples<'_> {
    type Item = PositionSample;

    fn next(&mut self) -> Option<Self::Item> {
        self.sampler.poll()
    }
}
