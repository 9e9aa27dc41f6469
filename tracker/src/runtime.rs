use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use chrono::{TimeDelta, Utc};
use justrun_lib::position::RawSample;
use tokio::{sync::mpsc, task::JoinHandle, time::{interval_at, Instant, MissedTickBehavior}};

use crate::{
    actor::TrackerEvent,
    platform::{Capability, LocationError, LocationProvider, SubscriptionId, TickHandle, Ticker, WatchOptions},
};

/// Latest fix pushed by the device. Shared between the HTTP layer, which
/// writes it, and the `PushLocationProvider`, which answers one-shot requests
/// from it.
#[derive(Debug, Clone, Default)]
pub struct FixFeed {
    latest: Arc<Mutex<Option<RawSample>>>,
}

impl FixFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, sample: RawSample) {
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(sample);
    }

    pub fn latest(&self) -> Option<RawSample> {
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Positions come from a device that posts its fixes to the server. The
/// device owns the permission prompt, so the server side is always available.
#[derive(Debug)]
pub struct PushLocationProvider {
    feed: FixFeed,
    active: Option<SubscriptionId>,
    next_id: u64,
}

impl PushLocationProvider {
    pub fn new(feed: FixFeed) -> Self {
        Self {
            feed,
            active: None,
            next_id: 1,
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.active.is_some()
    }
}

impl LocationProvider for PushLocationProvider {
    fn capability(&self) -> Capability {
        Capability::Available
    }

    fn request_permission(&mut self) -> Capability {
        Capability::Available
    }

    fn request_once(&mut self, options: &WatchOptions) -> Result<RawSample, LocationError> {
        let sample = self.feed.latest().ok_or(LocationError::PositionUnavailable)?;

        let age = Utc::now() - sample.timestamp;
        if age > TimeDelta::milliseconds(options.timeout_ms as i64) {
            return Err(LocationError::Timeout);
        }

        Ok(sample)
    }

    fn subscribe(&mut self, _options: &WatchOptions) -> Result<SubscriptionId, LocationError> {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.active = Some(id);
        tracing::debug!("Subscribed to device fixes ({:?})", id);
        Ok(id)
    }

    fn unsubscribe(&mut self, subscription: SubscriptionId) {
        if self.active == Some(subscription) {
            self.active = None;
        }
        tracing::debug!("Unsubscribed from device fixes ({:?})", subscription);
    }
}

/// One interval task per handle, each feeding `TrackerEvent::Tick` into the
/// tracker's queue. Holds only a weak sender so it never keeps the queue open
/// once every `TrackerHandle` is gone.
pub struct TokioTicker {
    events: mpsc::WeakSender<TrackerEvent>,
    tasks: HashMap<TickHandle, JoinHandle<()>>,
    next_id: u64,
}

impl TokioTicker {
    pub fn new(events: mpsc::WeakSender<TrackerEvent>) -> Self {
        Self {
            events,
            tasks: HashMap::new(),
            next_id: 1,
        }
    }
}

impl Ticker for TokioTicker {
    fn start(&mut self, period: Duration) -> TickHandle {
        let handle = TickHandle(self.next_id);
        self.next_id += 1;

        let events = self.events.clone();
        let task = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
            loop {
                interval.tick().await;
                let Some(sender) = events.upgrade() else {
                    break;
                };
                if sender.send(TrackerEvent::Tick(handle)).await.is_err() {
                    break;
                }
            }
        });

        self.tasks.insert(handle, task);
        handle
    }

    fn cancel(&mut self, handle: TickHandle) {
        if let Some(task) = self.tasks.remove(&handle) {
            task.abort();
        }
    }
}

impl Drop for TokioTicker {
    fn drop(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use justrun_lib::position::Position;

    use super::*;

    #[test]
    fn one_shot_uses_latest_fresh_fix() {
        let feed = FixFeed::new();
        let mut provider = PushLocationProvider::new(feed.clone());
        let options = WatchOptions::default();

        assert_eq!(provider.request_once(&options), Err(LocationError::PositionUnavailable));

        let stale = RawSample::new(Position::new(1.0, 2.0), 5.0, Utc::now() - TimeDelta::minutes(5));
        feed.push(stale);
        assert_eq!(provider.request_once(&options), Err(LocationError::Timeout));

        let fresh = RawSample::new(Position::new(1.0, 2.0), 5.0, Utc::now());
        feed.push(fresh);
        assert_eq!(provider.request_once(&options), Ok(fresh));
    }

    #[test]
    fn subscription_follows_unsubscribe() {
        let mut provider = PushLocationProvider::new(FixFeed::new());
        let first = provider.subscribe(&WatchOptions::default()).unwrap();
        assert!(provider.is_subscribed());
        provider.unsubscribe(first);
        assert!(!provider.is_subscribed());
    }

    #[tokio::test]
    async fn ticks_stop_after_cancel() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut ticker = TokioTicker::new(tx.downgrade());

        let handle = ticker.start(Duration::from_millis(10));
        match rx.recv().await {
            Some(TrackerEvent::Tick(received)) => assert_eq!(received, handle),
            _ => panic!("expected a tick"),
        }

        ticker.cancel(handle);
        // Drain anything queued before the abort landed
        tokio::time::sleep(Duration::from_millis(30)).await;
        while rx.try_recv().is_ok() {}
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }
}
