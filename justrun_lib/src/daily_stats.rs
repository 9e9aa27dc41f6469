use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::jog::Jog;

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DailyStat {
    pub user_id: String,
    pub date: NaiveDate,
    pub steps: i64,
    pub distance_km: f64,
    pub jogs_count: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
pub struct JogTotals {
    pub total_distance_km: f64,
    pub total_steps: u64,
    pub total_jogs: usize,
}

impl JogTotals {
    pub fn from_jogs(jogs: &[Jog]) -> Self {
        Self {
            total_distance_km: jogs.iter().map(|jog| jog.distance_km).sum(),
            total_steps: jogs.iter().map(|jog| jog.steps).sum(),
            total_jogs: jogs.len(),
        }
    }
}

/// Number of consecutive active days ending today. A streak that ended
/// yesterday still counts, since today may simply not have a run yet.
pub fn current_streak(stats: &[DailyStat], today: NaiveDate) -> u32 {
    let mut days: Vec<NaiveDate> = stats.iter().map(|stat| stat.date).filter(|date| *date <= today).collect();
    days.sort_unstable_by(|a, b| b.cmp(a));
    days.dedup();

    let Some(&latest) = days.first() else {
        return 0;
    };

    let yesterday = today.pred_opt().unwrap_or(today);
    if latest != today && latest != yesterday {
        return 0;
    }

    let mut streak = 0;
    let mut expected = latest;
    for day in days {
        if day != expected {
            break;
        }
        streak += 1;
        match expected.checked_sub_days(Days::new(1)) {
            Some(previous) => expected = previous,
            None => break,
        }
    }

    streak
}
