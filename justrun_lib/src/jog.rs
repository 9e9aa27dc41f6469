use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "sqlx")]
use sqlx::{prelude::*, sqlite::SqliteRow};

use crate::position::Position;

/// A finished run, as handed to the jog store.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NewJog {
    pub route: Vec<Position>,
    pub distance_km: f64,
    pub duration_seconds: u64,
    pub steps: u64,
}

/// A stored run.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Jog {
    pub jog_id: i64,
    pub user_id: String,
    pub route: Vec<Position>,
    pub distance_km: f64,
    pub duration_seconds: u64,
    pub steps: u64,
    pub created_at: DateTime<Utc>,
}

impl Jog {
    pub fn new(jog_id: i64, user_id: String, jog: NewJog, created_at: DateTime<Utc>) -> Self {
        Self {
            jog_id,
            user_id,
            route: jog.route,
            distance_km: jog.distance_km,
            duration_seconds: jog.duration_seconds,
            steps: jog.steps,
            created_at,
        }
    }
}

pub fn route_to_blob(route: &[Position]) -> Result<Vec<u8>, bincode::Error> {
    bincode::serialize(route)
}

pub fn route_from_blob(blob: &[u8]) -> Result<Vec<Position>, bincode::Error> {
    if blob.is_empty() {
        return Ok(Vec::new());
    }
    bincode::deserialize(blob)
}

#[cfg(feature = "sqlx")]
impl FromRow<'_, SqliteRow> for Jog {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        let blob: Vec<u8> = row.try_get(2)?;
        let route = route_from_blob(&blob).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

        let duration_seconds: i64 = row.try_get(4)?;
        let steps: i64 = row.try_get(5)?;

        Ok(Self {
            jog_id: row.try_get(0)?,
            user_id: row.try_get(1)?,
            route,
            distance_km: row.try_get(3)?,
            duration_seconds: duration_seconds.max(0) as u64,
            steps: steps.max(0) as u64,
            created_at: row.try_get(6)?,
        })
    }
}

#[test]
fn route_blob_round_trip() {
    let route = vec![Position::new(55.1, 12.2), Position::new(55.1004, 12.2)];
    let blob = route_to_blob(&route).unwrap();
    assert_eq!(route_from_blob(&blob).unwrap(), route);
    assert!(route_from_blob(&[]).unwrap().is_empty());
}
