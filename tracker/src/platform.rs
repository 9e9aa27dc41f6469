use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use justrun_lib::position::RawSample;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Whether the device can deliver positions at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Available,
    NeedsPermission,
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchOptions {
    pub high_accuracy: bool,
    pub timeout_ms: u64,
    pub max_sample_age_ms: u64,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout_ms: 15_000,
            max_sample_age_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(rename_all = "snake_case")]
pub enum LocationError {
    #[error("permission denied")]
    PermissionDenied,
    #[error("position unavailable")]
    PositionUnavailable,
    #[error("timed out")]
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TickHandle(pub u64);

/// The device's positioning service. Samples and errors for a subscription
/// are delivered to the controller out of band, as events.
pub trait LocationProvider {
    fn capability(&self) -> Capability;

    /// Asks the user for access. Returns the capability afterwards.
    fn request_permission(&mut self) -> Capability;

    fn request_once(&mut self, options: &WatchOptions) -> Result<RawSample, LocationError>;

    fn subscribe(&mut self, options: &WatchOptions) -> Result<SubscriptionId, LocationError>;

    fn unsubscribe(&mut self, subscription: SubscriptionId);
}

/// Fixed-interval timer source. Ticks are delivered as events carrying the handle.
pub trait Ticker {
    fn start(&mut self, period: Duration) -> TickHandle;

    fn cancel(&mut self, handle: TickHandle);
}

fn lock<T>(state: &Mutex<T>) -> MutexGuard<'_, T> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
struct ManualProviderState {
    capability: Capability,
    permission_grant: Capability,
    fixes: VecDeque<Result<RawSample, LocationError>>,
    subscribe_error: Option<LocationError>,
    active: Option<SubscriptionId>,
    next_id: u64,
    subscribe_calls: usize,
    unsubscribed: Vec<SubscriptionId>,
}

/// A provider driven by hand. Clones share state, so a test or replay can keep
/// one to inspect subscriptions after handing the other to a controller.
#[derive(Debug, Clone)]
pub struct ManualLocationProvider {
    state: Arc<Mutex<ManualProviderState>>,
}

impl Default for ManualLocationProvider {
    fn default() -> Self {
        Self::new(Capability::Available)
    }
}

impl ManualLocationProvider {
    pub fn new(capability: Capability) -> Self {
        Self {
            state: Arc::new(Mutex::new(ManualProviderState {
                capability,
                permission_grant: Capability::Available,
                fixes: VecDeque::new(),
                subscribe_error: None,
                active: None,
                next_id: 1,
                subscribe_calls: 0,
                unsubscribed: Vec::new(),
            })),
        }
    }

    pub fn set_capability(&self, capability: Capability) {
        lock(&self.state).capability = capability;
    }

    /// What `request_permission` resolves to.
    pub fn grant_permission(&self, grant: Capability) {
        lock(&self.state).permission_grant = grant;
    }

    /// Queues the answer to the next `request_once`.
    pub fn push_fix(&self, fix: Result<RawSample, LocationError>) {
        lock(&self.state).fixes.push_back(fix);
    }

    pub fn fail_subscribe(&self, error: Option<LocationError>) {
        lock(&self.state).subscribe_error = error;
    }

    pub fn active_subscription(&self) -> Option<SubscriptionId> {
        lock(&self.state).active
    }

    pub fn subscribe_calls(&self) -> usize {
        lock(&self.state).subscribe_calls
    }

    pub fn unsubscribed(&self) -> Vec<SubscriptionId> {
        lock(&self.state).unsubscribed.clone()
    }
}

impl LocationProvider for ManualLocationProvider {
    fn capability(&self) -> Capability {
        lock(&self.state).capability
    }

    fn request_permission(&mut self) -> Capability {
        let mut state = lock(&self.state);
        if state.capability == Capability::NeedsPermission {
            state.capability = state.permission_grant;
        }
        state.capability
    }

    fn request_once(&mut self, _options: &WatchOptions) -> Result<RawSample, LocationError> {
        lock(&self.state).fixes.pop_front().unwrap_or(Err(LocationError::PositionUnavailable))
    }

    fn subscribe(&mut self, _options: &WatchOptions) -> Result<SubscriptionId, LocationError> {
        let mut state = lock(&self.state);
        state.subscribe_calls += 1;
        if let Some(error) = state.subscribe_error {
            return Err(error);
        }

        let id = SubscriptionId(state.next_id);
        state.next_id += 1;
        state.active = Some(id);
        Ok(id)
    }

    fn unsubscribe(&mut self, subscription: SubscriptionId) {
        let mut state = lock(&self.state);
        if state.active == Some(subscription) {
            state.active = None;
        }
        state.unsubscribed.push(subscription);
    }
}

#[derive(Debug, Default)]
struct ManualTickerState {
    active: Vec<TickHandle>,
    cancelled: Vec<TickHandle>,
    next_id: u64,
}

/// A ticker that never fires by itself. Whoever drives it calls the
/// controller's tick handler with `active()`.
#[derive(Debug, Clone, Default)]
pub struct ManualTicker {
    state: Arc<Mutex<ManualTickerState>>,
}

impl ManualTicker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<TickHandle> {
        lock(&self.state).active.last().copied()
    }

    pub fn cancelled(&self) -> Vec<TickHandle> {
        lock(&self.state).cancelled.clone()
    }
}

impl Ticker for ManualTicker {
    fn start(&mut self, _period: Duration) -> TickHandle {
        let mut state = lock(&self.state);
        state.next_id += 1;
        let handle = TickHandle(state.next_id);
        state.active.push(handle);
        handle
    }

    fn cancel(&mut self, handle: TickHandle) {
        let mut state = lock(&self.state);
        state.active.retain(|active| *active != handle);
        state.cancelled.push(handle);
    }
}
