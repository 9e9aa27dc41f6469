use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::position::Position;

/// Serialized mirror of an active session, used to recover after the process
/// was suspended or killed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedSessionSnapshot {
    pub is_tracking: bool,
    pub route: Vec<Position>,
    pub distance_km: f64,
    pub elapsed_seconds: u64,
    pub started_at_epoch_ms: i64,
    pub last_updated_at_epoch_ms: i64,
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("snapshot has invalid distance {0}")]
    InvalidDistance(f64),
    #[error("snapshot route contains a non-finite coordinate")]
    InvalidRoute,
    #[error("snapshot timestamps are out of range (started {started}, updated {updated})")]
    InvalidTimestamps { started: i64, updated: i64 },
}

impl PersistedSessionSnapshot {
    /// Builds the snapshot for a session that has been running for
    /// `elapsed_seconds`, anchoring its start to the wall clock.
    pub fn capture(route: Vec<Position>, distance_km: f64, elapsed_seconds: u64, now_ms: i64) -> Self {
        Self {
            is_tracking: true,
            route,
            distance_km,
            elapsed_seconds,
            started_at_epoch_ms: now_ms.saturating_sub((elapsed_seconds as i64).saturating_mul(1000)),
            last_updated_at_epoch_ms: now_ms,
        }
    }

    pub fn parse(raw: &str) -> Result<Self, SnapshotError> {
        let snapshot: Self = serde_json::from_str(raw)?;

        if !snapshot.distance_km.is_finite() || snapshot.distance_km < 0.0 {
            return Err(SnapshotError::InvalidDistance(snapshot.distance_km));
        }

        if !snapshot.route.iter().all(Position::is_finite) {
            return Err(SnapshotError::InvalidRoute);
        }

        let (started, updated) = (snapshot.started_at_epoch_ms, snapshot.last_updated_at_epoch_ms);
        if started < 0 || started > updated {
            return Err(SnapshotError::InvalidTimestamps { started, updated });
        }

        Ok(snapshot)
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Whole seconds between the anchored start and `now_ms`. A clock that
    /// went backwards yields zero.
    pub fn elapsed_at(&self, now_ms: i64) -> u64 {
        (now_ms.saturating_sub(self.started_at_epoch_ms) / 1000).max(0) as u64
    }
}
