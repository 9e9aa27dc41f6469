use chrono::{DateTime, Utc};
use geo_types::Point;
use serde::{Deserialize, Serialize};

/// A recorded coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    #[serde(rename = "lat")]
    pub latitude: f64,
    #[serde(rename = "lng")]
    pub longitude: f64,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }
}

impl From<Position> for Point {
    fn from(position: Position) -> Self {
        Point::new(position.longitude, position.latitude)
    }
}

impl From<Point> for Position {
    fn from(point: Point) -> Self {
        Position::new(point.y(), point.x())
    }
}

/// A fix as delivered by the location provider. Never persisted directly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    pub position: Position,
    /// Horizontal accuracy radius in meters.
    pub accuracy_m: f64,
    pub timestamp: DateTime<Utc>,
}

impl RawSample {
    pub fn new(position: Position, accuracy_m: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            position,
            accuracy_m,
            timestamp,
        }
    }
}
