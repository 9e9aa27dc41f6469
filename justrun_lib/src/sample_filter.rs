use serde::{Deserialize, Serialize};

use crate::{geodesic::distance_km, position::{Position, RawSample}};

pub const MAX_ACCURACY_M: f64 = 50.0;
pub const MIN_SEGMENT_KM: f64 = 0.005;
pub const MAX_SEGMENT_KM: f64 = 0.1;
/// Slack on the upper bound so a segment a few centimeters over the cap
/// is still counted as movement.
pub const SEGMENT_TOLERANCE_KM: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    pub max_accuracy_m: f64,
    pub min_segment_km: f64,
    pub max_segment_km: f64,
    pub segment_tolerance_km: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            max_accuracy_m: MAX_ACCURACY_M,
            min_segment_km: MIN_SEGMENT_KM,
            max_segment_km: MAX_SEGMENT_KM,
            segment_tolerance_km: SEGMENT_TOLERANCE_KM,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    Reject(RejectReason),
    AcceptAsFirst(Position),
    AcceptSegment { position: Position, distance_km: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    LowAccuracy,
    Jitter,
    Jump,
}

impl Decision {
    pub fn is_reject(&self) -> bool {
        matches!(self, Decision::Reject(_))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SampleFilter {
    config: FilterConfig,
}

impl SampleFilter {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Decides whether `candidate` extends the route ending at `prev`.
    /// Rules are applied in order: accuracy, first sample, jitter, jump.
    pub fn accept(&self, prev: Option<Position>, candidate: &RawSample) -> Decision {
        // NaN accuracy fails this comparison too, so it is rejected as noise.
        if !(candidate.accuracy_m <= self.config.max_accuracy_m) || !candidate.position.is_finite() {
            return Decision::Reject(RejectReason::LowAccuracy);
        }

        let Some(prev) = prev else {
            return Decision::AcceptAsFirst(candidate.position);
        };

        let d = distance_km(prev, candidate.position);

        if d < self.config.min_segment_km {
            return Decision::Reject(RejectReason::Jitter);
        }

        if d > self.config.max_segment_km + self.config.segment_tolerance_km {
            return Decision::Reject(RejectReason::Jump);
        }

        Decision::AcceptSegment {
            position: candidate.position,
            distance_km: d,
        }
    }
}
