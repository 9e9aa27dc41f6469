use std::path::{Path, PathBuf};

use chrono::{DateTime, Days, NaiveDate, Utc};
use justrun_lib::{daily_stats::{current_streak, DailyStat, JogTotals}, jog::{Jog, NewJog}};

use crate::{database::db::JogDatabase, DataManagerError, DATABASE_FILE, DATA_DIR};

#[derive(Clone)]
pub struct DataManager {
    pub(crate) database: JogDatabase,
}

/// The public interface for all stored jog data.
impl DataManager {
    /// Opens the database in the project's data directory.
    pub async fn start() -> Result<Self, DataManagerError> {
        Self::open(default_data_dir()?).await
    }

    pub async fn open(data_dir: impl AsRef<Path>) -> Result<Self, DataManagerError> {
        let data_dir = data_dir.as_ref();
        if !data_dir.exists() {
            std::fs::create_dir_all(data_dir)
                .map_err(|_| DataManagerError::Database(format!("Failed to create data directory: {:?}", data_dir)))?;
        }

        let database = JogDatabase::connect(&data_dir.join(DATABASE_FILE)).await?;
        tracing::debug!("Opened jog database in {:?}", data_dir);

        Ok(DataManager {
            database,
        })
    }

    pub async fn in_memory() -> Result<Self, DataManagerError> {
        Ok(DataManager {
            database: JogDatabase::in_memory().await?,
        })
    }

    pub async fn save_jog(&self, user_id: &str, jog: NewJog) -> Result<Jog, DataManagerError> {
        self.save_jog_at(user_id, jog, Utc::now()).await
    }

    /// Stores a jog and adds it to the daily stats of the (UTC) day it was created.
    pub async fn save_jog_at(&self, user_id: &str, jog: NewJog, created_at: DateTime<Utc>) -> Result<Jog, DataManagerError> {
        let jog = self.database.insert_jog(user_id, jog, created_at).await?;
        tracing::info!("Saved jog {} for {}: {:.3} km in {} s", jog.jog_id, user_id, jog.distance_km, jog.duration_seconds);
        Ok(jog)
    }

    pub async fn get_jog(&self, jog_id: i64) -> Result<Option<Jog>, DataManagerError> {
        self.database.get_jog(jog_id).await
    }

    pub async fn get_jogs(&self, user_id: &str) -> Result<Vec<Jog>, DataManagerError> {
        self.database.get_jogs(user_id).await
    }

    pub async fn delete_jog(&self, jog_id: i64) -> Result<bool, DataManagerError> {
        self.database.delete_jog(jog_id).await
    }

    pub async fn jog_totals(&self, user_id: &str) -> Result<JogTotals, DataManagerError> {
        let jogs = self.database.get_jogs(user_id).await?;
        Ok(JogTotals::from_jogs(&jogs))
    }

    /// Stats for the `days` days ending with `today`, newest first. Days without
    /// a jog have no row.
    pub async fn get_daily_stats(&self, user_id: &str, days: u32, today: NaiveDate) -> Result<Vec<DailyStat>, DataManagerError> {
        let since = today
            .checked_sub_days(Days::new(days.saturating_sub(1) as u64))
            .unwrap_or(NaiveDate::MIN);
        self.database.get_daily_stats(user_id, since).await
    }

    pub async fn current_streak(&self, user_id: &str, today: NaiveDate) -> Result<u32, DataManagerError> {
        let stats = self.database.get_all_daily_stats(user_id).await?;
        Ok(current_streak(&stats, today))
    }
}

pub fn default_data_dir() -> Result<PathBuf, DataManagerError> {
    let root = project_root::get_project_root()
        .map_err(|e| DataManagerError::Database(format!("Failed to locate project root: {}", e)))?;
    Ok(root.join(DATA_DIR))
}
