use serde::{Deserialize, Serialize};

use crate::{jog::NewJog, position::Position, sample_filter::Decision};

/// Steps estimated per kilometer of tracked distance.
pub const STEPS_PER_KM: f64 = 1300.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Active,
    Stopped,
}

/// The run being recorded. Owned by the tracking controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingSession {
    pub route: Vec<Position>,
    pub total_distance_km: f64,
    pub elapsed_seconds: u64,
    pub status: SessionStatus,
}

impl Default for TrackingSession {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackingSession {
    pub fn new() -> Self {
        Self {
            route: Vec::new(),
            total_distance_km: 0.0,
            elapsed_seconds: 0,
            status: SessionStatus::Idle,
        }
    }

    /// Rebuilds an in-progress session from recovered state.
    pub fn recovered(route: Vec<Position>, total_distance_km: f64, elapsed_seconds: u64) -> Self {
        Self {
            route,
            total_distance_km,
            elapsed_seconds,
            status: SessionStatus::Active,
        }
    }

    pub fn last_position(&self) -> Option<Position> {
        self.route.last().copied()
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// Folds a filter decision into the session. Returns whether anything changed.
    pub fn apply(&mut self, decision: Decision) -> bool {
        match decision {
            Decision::Reject(_) => false,
            Decision::AcceptAsFirst(position) => {
                self.route = vec![position];
                true
            }
            Decision::AcceptSegment { position, distance_km } => {
                self.route.push(position);
                self.total_distance_km += distance_km;
                true
            }
        }
    }

    pub fn tick(&mut self) {
        self.elapsed_seconds += 1;
    }

    /// Clears route, distance and time, leaving the session Idle.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Minutes per kilometer, or `None` before any distance is covered.
    pub fn pace_min_per_km(&self) -> Option<f64> {
        pace_min_per_km(self.elapsed_seconds, self.total_distance_km)
    }

    pub fn to_new_jog(&self, steps_per_km: f64) -> NewJog {
        NewJog {
            route: self.route.clone(),
            distance_km: self.total_distance_km,
            duration_seconds: self.elapsed_seconds,
            steps: estimated_steps(self.total_distance_km, steps_per_km),
        }
    }
}

pub fn estimated_steps(distance_km: f64, steps_per_km: f64) -> u64 {
    (distance_km * steps_per_km).round().max(0.0) as u64
}

pub fn pace_min_per_km(elapsed_seconds: u64, distance_km: f64) -> Option<f64> {
    if distance_km > 0.0 {
        Some((elapsed_seconds as f64 / 60.0) / distance_km)
    } else {
        None
    }
}

/// `"0.00"` until a pace exists, then two decimals.
pub fn format_pace(pace: Option<f64>) -> String {
    format!("{:.2}", pace.unwrap_or(0.0))
}

/// `m:ss` below an hour, `h:mm:ss` above.
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample_filter::RejectReason;

    fn active_session() -> TrackingSession {
        let mut session = TrackingSession::new();
        session.status = SessionStatus::Active;
        session
    }

    #[test]
    fn reject_leaves_session_untouched() {
        let mut session = active_session();
        session.apply(Decision::AcceptAsFirst(Position::new(1.0, 2.0)));
        session.tick();
        let before = session.clone();

        for reason in [RejectReason::LowAccuracy, RejectReason::Jitter, RejectReason::Jump] {
            assert!(!session.apply(Decision::Reject(reason)));
        }
        assert_eq!(session, before);
    }

    #[test]
    fn first_then_segments() {
        let mut session = active_session();
        session.apply(Decision::AcceptAsFirst(Position::new(1.0, 2.0)));
        assert_eq!(session.route, vec![Position::new(1.0, 2.0)]);
        assert_eq!(session.total_distance_km, 0.0);

        session.apply(Decision::AcceptSegment {
            position: Position::new(1.0005, 2.0),
            distance_km: 0.055,
        });
        session.apply(Decision::AcceptSegment {
            position: Position::new(1.001, 2.0),
            distance_km: 0.055,
        });
        assert_eq!(session.route.len(), 3);
        assert!((session.total_distance_km - 0.11).abs() < 1e-12);
        assert_eq!(session.elapsed_seconds, 0);
    }

    #[test]
    fn pace_has_no_value_without_distance() {
        let mut session = active_session();
        for _ in 0..90 {
            session.tick();
        }
        assert_eq!(session.pace_min_per_km(), None);
        assert_eq!(format_pace(session.pace_min_per_km()), "0.00");

        session.total_distance_km = 0.25;
        assert_eq!(session.pace_min_per_km(), Some(6.0));
        assert_eq!(format_pace(session.pace_min_per_km()), "6.00");
    }

    #[test]
    fn steps_follow_distance() {
        let mut session = active_session();
        session.total_distance_km = 1.2345;
        assert_eq!(estimated_steps(session.total_distance_km, STEPS_PER_KM), 1605);
        assert_eq!(session.to_new_jog(STEPS_PER_KM).steps, 1605);
        assert_eq!(session.to_new_jog(2000.0).steps, 2469);
    }

    #[test]
    fn duration_formatting() {
        assert_eq!(format_duration(0), "0:00");
        assert_eq!(format_duration(65), "1:05");
        assert_eq!(format_duration(3599), "59:59");
        assert_eq!(format_duration(3723), "1:02:03");
    }

    #[test]
    fn reset_returns_to_idle() {
        let mut session = active_session();
        session.apply(Decision::AcceptAsFirst(Position::new(1.0, 2.0)));
        session.tick();
        session.reset();
        assert_eq!(session, TrackingSession::new());
    }
}
