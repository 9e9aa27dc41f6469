use justrun_data_management::{local_store::KeyValueStore, session_store::SessionPersistence};
use justrun_lib::{clock::Clock, jog::Jog, position::RawSample};
use tokio::{sync::{mpsc, oneshot}, task::JoinHandle};

use crate::{
    controller::{ControllerSettings, SessionReadout, TrackingController},
    error::TrackingError,
    jog_store::JogStore,
    platform::{LocationError, LocationProvider, TickHandle},
    runtime::TokioTicker,
};

const EVENT_QUEUE_SIZE: usize = 256;

pub type Reply<T> = oneshot::Sender<Result<T, TrackingError>>;

pub enum TrackerEvent {
    Sample(RawSample),
    LocationFailed(LocationError),
    Tick(TickHandle),
    Start(Reply<SessionReadout>),
    Stop(Reply<SessionReadout>),
    Save(Reply<Jog>),
    Discard(Reply<SessionReadout>),
    Locate(Reply<RawSample>),
    Readout(oneshot::Sender<SessionReadout>),
    /// Releases platform resources but keeps the snapshot for the next run.
    Shutdown,
}

/// Cheap, cloneable entry point to the tracker task.
#[derive(Clone)]
pub struct TrackerHandle {
    events: mpsc::Sender<TrackerEvent>,
}

/// Starts the tracker task. It owns the controller and handles one event at a
/// time until `Shutdown` arrives or every handle is dropped.
pub fn spawn_tracker<P, K, C, S>(
    provider: P,
    persistence: SessionPersistence<K, C>,
    settings: ControllerSettings,
    store: S,
) -> (TrackerHandle, JoinHandle<()>)
where
    P: LocationProvider + Send + 'static,
    K: KeyValueStore + Send + 'static,
    C: Clock + Send + 'static,
    S: JogStore + 'static,
{
    let (tx, rx) = mpsc::channel(EVENT_QUEUE_SIZE);
    let ticker = TokioTicker::new(tx.downgrade());

    let task = tokio::spawn(async move {
        let controller = TrackingController::new(provider, ticker, persistence, settings);
        run(controller, store, rx).await;
    });

    (TrackerHandle { events: tx }, task)
}

async fn run<P, K, C, S>(
    mut controller: TrackingController<P, TokioTicker, K, C>,
    store: S,
    mut events: mpsc::Receiver<TrackerEvent>,
) where
    P: LocationProvider,
    K: KeyValueStore,
    C: Clock,
    S: JogStore,
{
    tracing::info!("Tracker running");

    while let Some(event) = events.recv().await {
        match event {
            TrackerEvent::Sample(sample) => {
                controller.on_sample(sample);
            }
            TrackerEvent::LocationFailed(error) => controller.on_location_error(error),
            TrackerEvent::Tick(handle) => {
                controller.on_tick(handle);
            }
            TrackerEvent::Start(reply) => {
                let result = controller.start().map(|_| controller.readout());
                let _ = reply.send(result);
            }
            TrackerEvent::Stop(reply) => {
                let result = controller.stop().map(|_| controller.readout());
                let _ = reply.send(result);
            }
            TrackerEvent::Save(reply) => {
                let result = controller.save(&store).await;
                let _ = reply.send(result);
            }
            TrackerEvent::Discard(reply) => {
                let result = controller.discard().map(|_| controller.readout());
                let _ = reply.send(result);
            }
            TrackerEvent::Locate(reply) => {
                let _ = reply.send(controller.locate());
            }
            TrackerEvent::Readout(reply) => {
                let _ = reply.send(controller.readout());
            }
            TrackerEvent::Shutdown => {
                controller.suspend();
                break;
            }
        }
    }

    tracing::info!("Tracker stopped");
}

impl TrackerHandle {
    pub async fn send_sample(&self, sample: RawSample) -> Result<(), TrackingError> {
        self.send(TrackerEvent::Sample(sample)).await
    }

    pub async fn report_error(&self, error: LocationError) -> Result<(), TrackingError> {
        self.send(TrackerEvent::LocationFailed(error)).await
    }

    pub async fn start(&self) -> Result<SessionReadout, TrackingError> {
        self.request(TrackerEvent::Start).await
    }

    pub async fn stop(&self) -> Result<SessionReadout, TrackingError> {
        self.request(TrackerEvent::Stop).await
    }

    pub async fn save(&self) -> Result<Jog, TrackingError> {
        self.request(TrackerEvent::Save).await
    }

    pub async fn discard(&self) -> Result<SessionReadout, TrackingError> {
        self.request(TrackerEvent::Discard).await
    }

    pub async fn locate(&self) -> Result<RawSample, TrackingError> {
        self.request(TrackerEvent::Locate).await
    }

    pub async fn readout(&self) -> Result<SessionReadout, TrackingError> {
        let (tx, rx) = oneshot::channel();
        self.send(TrackerEvent::Readout(tx)).await?;
        rx.await.map_err(|_| TrackingError::TrackerGone)
    }

    pub async fn shutdown(&self) -> Result<(), TrackingError> {
        self.send(TrackerEvent::Shutdown).await
    }

    async fn send(&self, event: TrackerEvent) -> Result<(), TrackingError> {
        self.events.send(event).await.map_err(|_| TrackingError::TrackerGone)
    }

    async fn request<T>(&self, event: impl FnOnce(Reply<T>) -> TrackerEvent) -> Result<T, TrackingError> {
        let (tx, rx) = oneshot::channel();
        self.send(event(tx)).await?;
        rx.await.map_err(|_| TrackingError::TrackerGone)?
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use justrun_data_management::{local_store::MemoryStore, session_store::SESSION_SNAPSHOT_KEY, DataManager};
    use justrun_lib::{clock::ManualClock, position::Position, tracking_session::SessionStatus};

    use super::*;
    use crate::{jog_store::LocalJogStore, platform::ManualLocationProvider};

    fn sample(latitude: f64) -> RawSample {
        RawSample::new(Position::new(latitude, 10.0), 6.0, Utc::now())
    }

    async fn spawn_manual(store: MemoryStore) -> (TrackerHandle, JoinHandle<()>, ManualLocationProvider, DataManager) {
        let provider = ManualLocationProvider::default();
        let data_manager = DataManager::in_memory().await.unwrap();
        let (handle, task) = spawn_tracker(
            provider.clone(),
            SessionPersistence::new(store, ManualClock::new(1_700_000_000_000)),
            ControllerSettings::default(),
            LocalJogStore::new(data_manager.clone(), "runner"),
        );
        (handle, task, provider, data_manager)
    }

    #[tokio::test]
    async fn command_flow_saves_jog() {
        let (tracker, _task, _provider, data_manager) = spawn_manual(MemoryStore::new()).await;

        let readout = tracker.start().await.unwrap();
        assert_eq!(readout.status, SessionStatus::Active);

        tracker.send_sample(sample(50.0)).await.unwrap();
        tracker.send_sample(sample(50.0003)).await.unwrap();
        tracker.send_sample(sample(50.0006)).await.unwrap();

        let readout = tracker.stop().await.unwrap();
        assert_eq!(readout.status, SessionStatus::Stopped);
        assert_eq!(readout.route.len(), 3);

        let jog = tracker.save().await.unwrap();
        assert_eq!(jog.route.len(), 3);
        assert_eq!(data_manager.get_jogs("runner").await.unwrap().len(), 1);

        let readout = tracker.readout().await.unwrap();
        assert_eq!(readout.status, SessionStatus::Idle);
        assert!(readout.route.is_empty());
    }

    #[tokio::test]
    async fn errors_come_back_to_caller() {
        let (tracker, _task, _provider, _data_manager) = spawn_manual(MemoryStore::new()).await;

        assert!(matches!(tracker.stop().await, Err(TrackingError::InvalidTransition { .. })));
        assert_eq!(tracker.locate().await, Err(TrackingError::SignalDegraded(LocationError::PositionUnavailable)));

        tracker.start().await.unwrap();
        tracker.send_sample(sample(50.0)).await.unwrap();
        tracker.stop().await.unwrap();
        assert_eq!(tracker.save().await, Err(TrackingError::InsufficientData { points: 1 }));
    }

    #[tokio::test]
    async fn shutdown_keeps_snapshot_and_releases_subscription() {
        let store = MemoryStore::new();
        let (tracker, task, provider, _data_manager) = spawn_manual(store.clone()).await;

        tracker.start().await.unwrap();
        tracker.send_sample(sample(50.0)).await.unwrap();
        tracker.shutdown().await.unwrap();
        task.await.unwrap();

        assert_eq!(provider.unsubscribed().len(), 1);
        assert!(store.get(SESSION_SNAPSHOT_KEY).unwrap().is_some());
        assert_eq!(tracker.readout().await, Err(TrackingError::TrackerGone));
    }

    #[tokio::test]
    async fn dropping_last_handle_stops_tracking() {
        let (tracker, task, provider, _data_manager) = spawn_manual(MemoryStore::new()).await;

        tracker.start().await.unwrap();
        tracker.send_sample(sample(50.0)).await.unwrap();
        // Let at least one tick be in flight while the handle goes away
        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        drop(tracker);

        tokio::time::timeout(std::time::Duration::from_secs(3), task)
            .await
            .expect("tracker task should end once every handle is dropped")
            .unwrap();

        assert_eq!(provider.unsubscribed().len(), 1);
        assert_eq!(provider.active_subscription(), None);
    }
}
