use std::path::Path;

use justrun_data_management::{gpx_util::read_gpx_file, local_store::MemoryStore, session_store::SessionPersistence};
use justrun_lib::{clock::ManualClock, jog::Jog, position::RawSample, sample_filter::Decision};
use serde::Serialize;

use crate::{
    controller::{ControllerSettings, SessionReadout, TrackingController},
    jog_store::JogStore,
    platform::{ManualLocationProvider, ManualTicker},
};

/// Longest stretch of sample time one gap may fill with ticks. Longer gaps
/// count as a pause: the clock jumps ahead without advancing elapsed time.
pub const MAX_TICKS_PER_GAP: i64 = 6 * 60 * 60;

#[derive(Debug, Clone, Serialize)]
pub struct ReplaySummary {
    pub samples: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub session: SessionReadout,
    pub jog: Option<Jog>,
}

pub async fn replay_gpx_file<S: JogStore + ?Sized>(path: &Path, settings: ControllerSettings, store: Option<&S>) -> anyhow::Result<ReplaySummary> {
    let samples = read_gpx_file(path)?;
    tracing::info!("Replaying {} samples from {:?}", samples.len(), path);
    replay(&samples, settings, store).await
}

/// Runs recorded samples through a fresh controller as if they arrived live,
/// with one tick per elapsed second of sample time, then saves the result to
/// `store` when one is given.
pub async fn replay<S: JogStore + ?Sized>(samples: &[RawSample], settings: ControllerSettings, store: Option<&S>) -> anyhow::Result<ReplaySummary> {
    let Some(first) = samples.first() else {
        anyhow::bail!("Nothing to replay");
    };

    let start_ms = first.timestamp.timestamp_millis();
    let clock = ManualClock::new(start_ms);
    let ticker = ManualTicker::new();
    let mut controller = TrackingController::new(
        ManualLocationProvider::default(),
        ticker.clone(),
        SessionPersistence::new(MemoryStore::new(), clock.clone()),
        settings,
    );

    controller.start()?;

    let tick_ms = settings.tick_interval.as_millis().max(1) as i64;
    let mut ticks_fired: i64 = 0;
    let mut accepted = 0;
    let mut rejected = 0;

    for sample in samples {
        let offset_ms = sample.timestamp.timestamp_millis().saturating_sub(start_ms).max(0);
        let target = offset_ms / tick_ms;
        if target - ticks_fired > MAX_TICKS_PER_GAP {
            tracing::warn!("Skipping {} s gap before sample at {}", (target - ticks_fired) * tick_ms / 1000, sample.timestamp);
            ticks_fired = target - MAX_TICKS_PER_GAP;
        }
        while ticks_fired < target {
            ticks_fired += 1;
            clock.set(start_ms + ticks_fired * tick_ms);
            if let Some(handle) = ticker.active() {
                controller.on_tick(handle);
            }
        }

        match controller.on_sample(*sample) {
            Some(Decision::Reject(_)) => rejected += 1,
            Some(_) => accepted += 1,
            None => {}
        }
    }

    controller.stop()?;

    let jog = match store {
        Some(store) => Some(controller.save(store).await?),
        None => None,
    };

    Ok(ReplaySummary {
        samples: samples.len(),
        accepted,
        rejected,
        session: controller.readout(),
        jog,
    })
}
