//! File-backed location provider for hosts without GPS hardware.
//!
//! Reads newline-delimited JSON readings and releases one per `pace` while
//! watched. Readings without a timestamp are stamped when released.
//!
//! ```text
//! {"latitude":40.4168,"longitude":-3.7038,"accuracy":5.0}
//! {"latitude":40.4171,"longitude":-3.7035,"speed":4.2,"heading":45.0}
//! ```

use super::{LocationSensor, PermissionStatus};
use crate::error::{CourierError, Result};
use crate::types::{DesiredAccuracy, PositionSample, SamplingPolicy};
use chrono::{DateTime, Utc};
use fs_err as fs;
use serde::Deserialize;
use std::path::Path;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Deserialize)]
struct ReplayReading {
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    accuracy: Option<f64>,
    #[serde(default)]
    speed: Option<f64>,
    #[serde(default)]
    heading: Option<f64>,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

impl ReplayReading {
    fn stamp(&self) -> PositionSample {
        PositionSample {
            latitude: self.latitude,
            longitude: self.longitude,
            accuracy: self.accuracy,
            speed: self.speed,
            heading: self.heading,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
        }
    }
}

pub struct ReplaySensor {
    readings: Vec<ReplayReading>,
    cursor: usize,
    pace: Duration,
    repeat: bool,
    watching: bool,
    next_release: Option<Instant>,
}

impl ReplaySensor {
    pub fn from_path(path: &Path, pace: Duration, repeat: bool) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|err| CourierError::Io {
            context: format!("reading replay file {}", path.display()),
            source: err,
        })?;
        Self::from_ndjson(&content, pace, repeat)
    }

    pub fn from_ndjson(content: &str, pace: Duration, repeat: bool) -> Result<Self> {
        let mut readings = Vec::new();
        for (index, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let reading: ReplayReading =
                serde_json::from_str(line).map_err(|err| CourierError::Json {
                    context: format!("replay line {}", index + 1),
                    source: err,
                })?;
            readings.push(reading);
        }
        if readings.is_empty() {
            return Err(CourierError::SensorUnavailable {
                reason: "replay file has no readings".to_string(),
            });
        }
        Ok(Self {
            readings,
            cursor: 0,
            pace,
            repeat,
            watching: false,
            next_release: None,
        })
    }

    fn take(&mut self) -> Option<PositionSample> {
        if self.cursor >= self.readings.len() {
            if !self.repeat {
                return None;
            }
            self.cursor = 0;
        }
        let sample = self.readings[self.cursor].stamp();
        self.cursor += 1;
        Some(sample)
    }
}

impl LocationSensor for ReplaySensor {
    fn request_foreground_permission(&mut self, _timeout: Duration) -> PermissionStatus {
        PermissionStatus::Granted
    }

    fn request_background_permission(&mut self, _timeout: Duration) -> PermissionStatus {
        PermissionStatus::Granted
    }

    fn current_position(&mut self, _accuracy: DesiredAccuracy) -> Result<PositionSample> {
        self.take().ok_or_else(|| CourierError::SensorUnavailable {
            reason: "replay exhausted".to_string(),
        })
    }

    fn watch(&mut self, _policy: &SamplingPolicy) -> Result<()> {
        self.watching = true;
        self.next_release = Some(Instant::now() + self.pace);
        Ok(())
    }

    fn poll(&mut self) -> Option<PositionSample> {
        if !self.watching {
            return None;
        }
        let due = self.next_release?;
        if Instant::now() < due {
            return None;
        }
        self.next_release = Some(due + self.pace);
        self.take()
    }

    fn unwatch(&mut self) {
        self.watching = false;
        self.next_release = None;
    }
}
