use justrun_lib::{clock::Clock, snapshot::PersistedSessionSnapshot, tracking_session::TrackingSession};

use crate::{local_store::KeyValueStore, DataManagerError};

pub const SESSION_SNAPSHOT_KEY: &str = "justrun_background_tracking";

/// Mirrors the active tracking session into the local store so it can be
/// recovered after the process is suspended or killed. The controller holds
/// the authoritative session; this only ever holds a copy.
pub struct SessionPersistence<K: KeyValueStore, C: Clock> {
    store: K,
    clock: C,
}

impl<K: KeyValueStore, C: Clock> SessionPersistence<K, C> {
    pub fn new(store: K, clock: C) -> Self {
        Self { store, clock }
    }

    /// Writes a snapshot of `session`. Does nothing unless the session is active.
    pub fn save(&mut self, session: &TrackingSession) -> Result<(), DataManagerError> {
        if !session.is_active() {
            return Ok(());
        }

        let snapshot = PersistedSessionSnapshot::capture(
            session.route.clone(),
            session.total_distance_km,
            session.elapsed_seconds,
            self.clock.now_ms(),
        );
        let json = snapshot
            .to_json()
            .map_err(|err| DataManagerError::Serialization(format!("Failed to serialize session snapshot: {}", err)))?;

        self.store.set(SESSION_SNAPSHOT_KEY, &json)
    }

    /// Reads back a snapshot of an in-progress session, with the elapsed time
    /// recomputed from the wall clock. Unreadable snapshots are deleted and
    /// treated as absent.
    pub fn restore(&mut self) -> Option<PersistedSessionSnapshot> {
        let raw = match self.store.get(SESSION_SNAPSHOT_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                tracing::warn!("Failed to read session snapshot: {err}");
                return None;
            }
        };

        let mut snapshot = match PersistedSessionSnapshot::parse(&raw) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                tracing::warn!("Discarding corrupt session snapshot: {err}");
                self.discard();
                return None;
            }
        };

        if !snapshot.is_tracking {
            self.discard();
            return None;
        }

        snapshot.elapsed_seconds = snapshot.elapsed_at(self.clock.now_ms());
        tracing::info!(
            "Recovered session with {} points, {:.3} km, {} s",
            snapshot.route.len(),
            snapshot.distance_km,
            snapshot.elapsed_seconds
        );

        Some(snapshot)
    }

    pub fn clear(&mut self) -> Result<(), DataManagerError> {
        self.store.remove(SESSION_SNAPSHOT_KEY)
    }

    fn discard(&mut self) {
        if let Err(err) = self.clear() {
            tracing::error!("Failed to remove session snapshot: {err}");
        }
    }
}
