//! Sensor adapter.
//!
//! Turns whatever the presence detector returns into a canonical
//! [`SensorSample`]. The detector is a blocking call (camera read plus model
//! inference); the adapter runs it on the blocking pool under a timeout and
//! never lets two calls overlap.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::error::DetectorError;

/// Raw output of the external detection collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorReading {
    #[serde(alias = "personPresent")]
    pub person_present: bool,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default, alias = "postureScore")]
    pub posture_score: Option<f64>,
    #[serde(default, alias = "movementMagnitude")]
    pub movement_magnitude: f64,
}

impl DetectorReading {
    pub fn present(confidence: f64) -> Self {
        Self {
            person_present: true,
            confidence,
            posture_score: None,
            movement_magnitude: 0.0,
        }
    }

    pub fn absent() -> Self {
        Self {
            person_present: false,
            confidence: 0.0,
            posture_score: None,
            movement_magnitude: 0.0,
        }
    }

    pub fn with_posture(mut self, score: f64) -> Self {
        self.posture_score = Some(score);
        self
    }

    pub fn with_movement(mut self, magnitude: f64) -> Self {
        self.movement_magnitude = magnitude;
        self
    }
}

/// Source of presence readings. Implementations may block.
pub trait Detector: Send + Sync {
    fn detect(&self) -> Result<DetectorReading, DetectorError>;
}

impl<F> Detector for F
where
    F: Fn() -> Result<DetectorReading, DetectorError> + Send + Sync,
{
    fn detect(&self) -> Result<DetectorReading, DetectorError> {
        self()
    }
}

/// Why a sample carries no information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorFault {
    Failed(String),
    TimedOut,
}

impl fmt::Display for SensorFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorFault::Failed(message) => write!(f, "camera unavailable: {message}"),
            SensorFault::TimedOut => f.write_str("camera did not respond in time"),
        }
    }
}

impl From<DetectorError> for SensorFault {
    fn from(err: DetectorError) -> Self {
        SensorFault::Failed(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleStatus {
    Valid,
    SensorError(SensorFault),
}

/// One normalized observation.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorSample {
    pub timestamp: Instant,
    pub presence_raw: bool,
    /// 0.0 ..= 1.0
    pub confidence: f64,
    /// >= 0.0, unitless activity score
    pub movement_magnitude: f64,
    /// 0.0 ..= 100.0, `None` when no score is available.
    pub posture_score: Option<f64>,
    pub status: SampleStatus,
}

impl SensorSample {
    pub fn is_valid(&self) -> bool {
        self.status == SampleStatus::Valid
    }

    pub fn fault(&self) -> Option<&SensorFault> {
        match &self.status {
            SampleStatus::Valid => None,
            SampleStatus::SensorError(fault) => Some(fault),
        }
    }

    pub fn from_reading(reading: DetectorReading, at: Instant) -> Self {
        let confidence = finite_or_zero(reading.confidence).clamp(0.0, 1.0);
        let movement_magnitude = finite_or_zero(reading.movement_magnitude).max(0.0);
        let posture_score = if reading.person_present {
            reading
                .posture_score
                .filter(|s| s.is_finite())
                .map(|s| s.clamp(0.0, 100.0))
        } else {
            None
        };
        Self {
            timestamp: at,
            presence_raw: reading.person_present,
            confidence,
            movement_magnitude,
            posture_score,
            status: SampleStatus::Valid,
        }
    }

    pub fn sensor_error(fault: SensorFault, at: Instant) -> Self {
        Self {
            timestamp: at,
            presence_raw: false,
            confidence: 0.0,
            movement_magnitude: 0.0,
            posture_score: None,
            status: SampleStatus::SensorError(fault),
        }
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Clears the in-flight flag when the detector call really returns,
/// including by unwinding.
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Wraps a [`Detector`] with normalization, timeout and overlap protection.
#[derive(Clone)]
pub struct SensorAdapter {
    detector: Arc<dyn Detector>,
    timeout: Duration,
    in_flight: Arc<AtomicBool>,
}

impl SensorAdapter {
    pub fn new(detector: Arc<dyn Detector>, timeout: Duration) -> Self {
        Self {
            detector,
            timeout,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Applies to calls started from now on. Clones share the in-flight
    /// slot but not the timeout.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// A previous detector call has not returned yet.
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Normalize a detector result into a sample.
    pub fn normalize(result: Result<DetectorReading, SensorFault>, at: Instant) -> SensorSample {
        match result {
            Ok(reading) => SensorSample::from_reading(reading, at),
            Err(fault) => SensorSample::sensor_error(fault, at),
        }
    }

    /// Take one sample.
    ///
    /// Returns `None` without calling the detector when the previous call is
    /// still running. A call that exceeds the timeout yields a
    /// `SensorError(TimedOut)` sample; the detector keeps the in-flight slot
    /// until it actually returns.
    pub async fn sample(&self) -> Option<SensorSample> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }
        let guard = InFlightGuard(Arc::clone(&self.in_flight));
        let detector = Arc::clone(&self.detector);
        let at = tokio::time::Instant::now().into_std();

        let handle = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            detector.detect()
        });

        let result = match tokio::time::timeout(self.timeout, handle).await {
            Ok(Ok(Ok(reading))) => Ok(reading),
            Ok(Ok(Err(err))) => {
                warn!("detector failed: {err}");
                Err(SensorFault::from(err))
            }
            Ok(Err(join_err)) => {
                error!("detector task aborted: {join_err}");
                Err(SensorFault::Failed(format!("detector task aborted: {join_err}")))
            }
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "detector call timed out");
                Err(SensorFault::TimedOut)
            }
        };
        Some(Self::normalize(result, at))
    }
}
