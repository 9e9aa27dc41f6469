use std::time::Duration;

use justrun_data_management::{local_store::KeyValueStore, session_store::SessionPersistence};
use justrun_lib::{
    clock::Clock,
    jog::Jog,
    position::{Position, RawSample},
    sample_filter::{Decision, FilterConfig, SampleFilter},
    tracking_session::{estimated_steps, format_duration, format_pace, SessionStatus, TrackingSession, STEPS_PER_KM},
};
use serde::Serialize;

use crate::{
    error::TrackingError,
    jog_store::JogStore,
    platform::{Capability, LocationError, LocationProvider, SubscriptionId, TickHandle, Ticker, WatchOptions},
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerSettings {
    pub filter: FilterConfig,
    pub watch: WatchOptions,
    pub tick_interval: Duration,
    pub steps_per_km: f64,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            filter: FilterConfig::default(),
            watch: WatchOptions::default(),
            tick_interval: Duration::from_secs(1),
            steps_per_km: STEPS_PER_KM,
        }
    }
}

/// What the UI shows while tracking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionReadout {
    pub status: SessionStatus,
    pub route: Vec<Position>,
    pub distance_km: f64,
    pub elapsed_seconds: u64,
    pub duration: String,
    pub estimated_steps: u64,
    pub pace_min_per_km: Option<f64>,
    pub pace: String,
    pub current_fix: Option<RawSample>,
    pub last_error: Option<String>,
}

/// Drives one tracking session: owns the session, the position subscription
/// and the tick timer, and mirrors every change into the snapshot store.
///
/// Samples, location errors and ticks arrive through `on_sample`,
/// `on_location_error` and `on_tick`, one at a time.
pub struct TrackingController<P: LocationProvider, T: Ticker, K: KeyValueStore, C: Clock> {
    provider: P,
    ticker: T,
    persistence: SessionPersistence<K, C>,
    filter: SampleFilter,
    settings: ControllerSettings,
    session: TrackingSession,
    subscription: Option<SubscriptionId>,
    tick: Option<TickHandle>,
    current_fix: Option<RawSample>,
    last_error: Option<TrackingError>,
}

impl<P: LocationProvider, T: Ticker, K: KeyValueStore, C: Clock> TrackingController<P, T, K, C> {
    /// Builds the controller and resumes any session left behind by a
    /// previous run of the process.
    pub fn new(provider: P, ticker: T, persistence: SessionPersistence<K, C>, settings: ControllerSettings) -> Self {
        let mut controller = Self {
            provider,
            ticker,
            persistence,
            filter: SampleFilter::new(settings.filter),
            settings,
            session: TrackingSession::new(),
            subscription: None,
            tick: None,
            current_fix: None,
            last_error: None,
        };

        controller.recover();
        controller
    }

    pub fn session(&self) -> &TrackingSession {
        &self.session
    }

    pub fn status(&self) -> SessionStatus {
        self.session.status
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub fn tick_handle(&self) -> Option<TickHandle> {
        self.tick
    }

    pub fn readout(&self) -> SessionReadout {
        let pace = self.session.pace_min_per_km();
        SessionReadout {
            status: self.session.status,
            route: self.session.route.clone(),
            distance_km: self.session.total_distance_km,
            elapsed_seconds: self.session.elapsed_seconds,
            duration: format_duration(self.session.elapsed_seconds),
            estimated_steps: estimated_steps(self.session.total_distance_km, self.settings.steps_per_km),
            pace_min_per_km: pace,
            pace: format_pace(pace),
            current_fix: self.current_fix,
            last_error: self.last_error.as_ref().map(ToString::to_string),
        }
    }

    pub fn start(&mut self) -> Result<(), TrackingError> {
        self.expect_status("start", SessionStatus::Idle)?;

        let subscription = self.acquire_subscription().map_err(|err| self.surface(err))?;

        self.session = TrackingSession::new();
        self.session.status = SessionStatus::Active;
        self.subscription = Some(subscription);
        self.tick = Some(self.ticker.start(self.settings.tick_interval));
        self.last_error = None;
        self.persist();

        tracing::info!("Tracking started");
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), TrackingError> {
        self.expect_status("stop", SessionStatus::Active)?;
        self.halt();
        Ok(())
    }

    /// Releases the subscription and the timer but leaves the session and its
    /// snapshot in place, so the next process can pick the run up again.
    pub fn suspend(&mut self) {
        if self.session.is_active() {
            tracing::info!("Suspending active session at {} s", self.session.elapsed_seconds);
            self.persist();
        }
        self.release();
    }

    /// Hands the recorded run to `store`. On success the session is reset;
    /// on any failure it is left exactly as it was.
    pub async fn save<S: JogStore + ?Sized>(&mut self, store: &S) -> Result<Jog, TrackingError> {
        match self.session.status {
            SessionStatus::Stopped => {}
            SessionStatus::Idle if !self.session.route.is_empty() => {}
            status => return Err(TrackingError::InvalidTransition { operation: "save", status }),
        }

        let points = self.session.route.len();
        if points < 2 {
            return Err(self.surface(TrackingError::InsufficientData { points }));
        }

        let jog = self.session.to_new_jog(self.settings.steps_per_km);
        match store.save_jog(jog).await {
            Ok(saved) => {
                tracing::info!("Saved jog {} ({:.3} km, {} s)", saved.jog_id, saved.distance_km, saved.duration_seconds);
                self.clear_snapshot();
                self.session.reset();
                self.last_error = None;
                Ok(saved)
            }
            Err(err) => {
                tracing::error!("Failed to save jog: {err:?}");
                Err(self.surface(TrackingError::SaveFailed(err.to_string())))
            }
        }
    }

    pub fn discard(&mut self) -> Result<(), TrackingError> {
        match self.session.status {
            SessionStatus::Stopped => {}
            SessionStatus::Idle if !self.session.route.is_empty() => {}
            status => return Err(TrackingError::InvalidTransition { operation: "discard", status }),
        }

        self.clear_snapshot();
        self.session.reset();
        self.last_error = None;
        tracing::info!("Session discarded");
        Ok(())
    }

    /// One-shot fix for the position marker. Does not touch the session.
    pub fn locate(&mut self) -> Result<RawSample, TrackingError> {
        if self.provider.capability() == Capability::Unavailable {
            return Err(self.surface(TrackingError::CapabilityUnavailable));
        }

        match self.provider.request_once(&self.settings.watch) {
            Ok(sample) => {
                self.current_fix = Some(sample);
                Ok(sample)
            }
            Err(err) => Err(self.surface(err.into())),
        }
    }

    /// Runs a delivered sample through the filter and into the session.
    /// Returns the filter's verdict, or `None` when no session is running.
    pub fn on_sample(&mut self, sample: RawSample) -> Option<Decision> {
        self.current_fix = Some(sample);

        // A delivery may already have been queued when the subscription was cancelled
        if !self.session.is_active() {
            tracing::trace!("Ignoring sample while {:?}", self.session.status);
            return None;
        }

        let decision = self.filter.accept(self.session.last_position(), &sample);
        match decision {
            Decision::Reject(reason) => {
                tracing::trace!("Rejected sample at {:?} ({:?}, accuracy {} m)", sample.position, reason, sample.accuracy_m);
            }
            _ => {
                if matches!(self.last_error, Some(TrackingError::SignalDegraded(_))) {
                    self.last_error = None;
                }
            }
        }

        if self.session.apply(decision) {
            self.persist();
        }

        Some(decision)
    }

    /// Advances elapsed time by one second if `handle` is the live timer.
    pub fn on_tick(&mut self, handle: TickHandle) -> bool {
        if self.tick != Some(handle) || !self.session.is_active() {
            return false;
        }

        self.session.tick();
        self.persist();
        true
    }

    pub fn on_location_error(&mut self, error: LocationError) {
        match error {
            LocationError::PermissionDenied if self.session.is_active() => {
                tracing::warn!("Location permission revoked, stopping session");
                self.halt();
            }
            _ => tracing::warn!("Location error: {error}"),
        }

        self.last_error = Some(error.into());
    }

    fn recover(&mut self) {
        let Some(snapshot) = self.persistence.restore() else {
            return;
        };

        self.session = TrackingSession::recovered(snapshot.route, snapshot.distance_km, snapshot.elapsed_seconds);

        match self.acquire_subscription() {
            Ok(subscription) => {
                self.subscription = Some(subscription);
                self.tick = Some(self.ticker.start(self.settings.tick_interval));
                self.persist();
                tracing::info!("Resumed tracking at {} s", self.session.elapsed_seconds);
            }
            Err(err) => {
                tracing::warn!("Recovered session cannot resume tracking: {err}");
                self.session.status = SessionStatus::Stopped;
                self.clear_snapshot();
                self.last_error = Some(err);
            }
        }
    }

    fn acquire_subscription(&mut self) -> Result<SubscriptionId, TrackingError> {
        match self.provider.capability() {
            Capability::Available => {}
            Capability::Unavailable => return Err(TrackingError::CapabilityUnavailable),
            Capability::NeedsPermission => match self.provider.request_permission() {
                Capability::Available => {}
                Capability::Unavailable => return Err(TrackingError::CapabilityUnavailable),
                Capability::NeedsPermission => return Err(TrackingError::PermissionDenied),
            },
        }

        Ok(self.provider.subscribe(&self.settings.watch)?)
    }

    fn halt(&mut self) {
        self.release();
        self.session.status = SessionStatus::Stopped;
        self.clear_snapshot();
        tracing::info!(
            "Tracking stopped: {} points, {:.3} km, {} s",
            self.session.route.len(),
            self.session.total_distance_km,
            self.session.elapsed_seconds
        );
    }

    fn release(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            self.provider.unsubscribe(subscription);
        }
        if let Some(tick) = self.tick.take() {
            self.ticker.cancel(tick);
        }
    }

    fn persist(&mut self) {
        if let Err(err) = self.persistence.save(&self.session) {
            tracing::error!("Failed to write session snapshot: {err}");
        }
    }

    fn clear_snapshot(&mut self) {
        if let Err(err) = self.persistence.clear() {
            tracing::error!("Failed to clear session snapshot: {err}");
        }
    }

    fn expect_status(&self, operation: &'static str, expected: SessionStatus) -> Result<(), TrackingError> {
        if self.session.status == expected {
            Ok(())
        } else {
            Err(TrackingError::InvalidTransition { operation, status: self.session.status })
        }
    }

    fn surface(&mut self, error: TrackingError) -> TrackingError {
        self.last_error = Some(error.clone());
        error
    }
}

impl<P: LocationProvider, T: Ticker, K: KeyValueStore, C: Clock> Drop for TrackingController<P, T, K, C> {
    fn drop(&mut self) {
        if self.subscription.is_some() || self.tick.is_some() {
            self.halt();
        }
    }
}
