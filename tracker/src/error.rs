use justrun_lib::tracking_session::SessionStatus;
use thiserror::Error;

use crate::platform::LocationError;

/// Everything that can go wrong at the session level. Sample-level problems
/// never show up here; the filter absorbs them.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrackingError {
    #[error("location services are not available on this device")]
    CapabilityUnavailable,
    #[error("location permission was denied")]
    PermissionDenied,
    #[error("GPS signal is degraded: {0}")]
    SignalDegraded(LocationError),
    #[error("need at least 2 points to save, have {points}")]
    InsufficientData { points: usize },
    #[error("saving the jog failed: {0}")]
    SaveFailed(String),
    #[error("cannot {operation} while {status:?}")]
    InvalidTransition { operation: &'static str, status: SessionStatus },
    #[error("tracker is not running")]
    TrackerGone,
}

impl From<LocationError> for TrackingError {
    fn from(error: LocationError) -> Self {
        match error {
            LocationError::PermissionDenied => TrackingError::PermissionDenied,
            other => TrackingError::SignalDegraded(other),
        }
    }
}
