use std::{path::Path, str::FromStr};

use chrono::{DateTime, NaiveDate, Utc};
use const_format::concatcp;
use justrun_lib::{daily_stats::DailyStat, jog::{route_to_blob, Jog, NewJog}};
use sqlx::{query, query_as, sqlite::{SqliteConnectOptions, SqlitePoolOptions}, Executor, Pool, Sqlite, SqlitePool};

use crate::DataManagerError;

use super::constants::*;

const JOG_COLUMNS: &str = concatcp!(JOG_ID, ", ", USER_ID, ", ", ROUTE, ", ", DISTANCE_KM, ", ", DURATION_SECONDS, ", ", STEPS, ", ", CREATED_AT);
const DAILY_STAT_COLUMNS: &str = concatcp!(USER_ID, ", ", DATE, ", ", STEPS, ", ", DISTANCE_KM, ", ", JOGS_COUNT);

#[derive(Clone)]
pub struct JogDatabase {
    pool: Pool<Sqlite>,
}

impl JogDatabase {
    pub async fn connect(path: &Path) -> Result<Self, DataManagerError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePool::connect_with(options).await
            .map_err(|_| DataManagerError::Database(format!("Failed to connect to database: {:?}", path)))?;

        let db = Self {
            pool
        };

        db.init().await?;

        Ok(db)
    }

    /// A private database that lives as long as the returned handle.
    pub async fn in_memory() -> Result<Self, DataManagerError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|_| DataManagerError::Database("Invalid in-memory database url".to_string()))?;

        // Every connection to :memory: is its own database, so keep exactly one alive
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options).await
            .map_err(|_| DataManagerError::Database("Failed to open in-memory database".to_string()))?;

        let db = Self {
            pool
        };

        db.init().await?;

        Ok(db)
    }

    pub async fn init(&self) -> Result<(), DataManagerError> {
        self.pool.execute(concatcp!("
            CREATE TABLE IF NOT EXISTS ", JOGS_TABLE_NAME, "(",
                JOG_ID,           " INTEGER PRIMARY KEY AUTOINCREMENT,",
                USER_ID,          " TEXT NOT NULL,",
                ROUTE,            " BLOB NOT NULL,",
                DISTANCE_KM,      " REAL NOT NULL,",
                DURATION_SECONDS, " INTEGER NOT NULL,",
                STEPS,            " INTEGER NOT NULL,",
                CREATED_AT,       " TIMESTAMP NOT NULL);

            CREATE INDEX IF NOT EXISTS idx_jogs_user ON ", JOGS_TABLE_NAME, "(", USER_ID, ", ", CREATED_AT, ");

            CREATE TABLE IF NOT EXISTS ", DAILY_STATS_TABLE_NAME, "(",
                USER_ID,     " TEXT NOT NULL,",
                DATE,        " DATE NOT NULL,",
                STEPS,       " INTEGER NOT NULL DEFAULT 0,",
                DISTANCE_KM, " REAL NOT NULL DEFAULT 0,",
                JOGS_COUNT,  " INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY(", USER_ID, ", ", DATE, ")
            )")).await
            .map_err(|e| DataManagerError::Database(format!("Failed to create tables: {}", e)))
            .map(|_| ())
    }

    /// Stores the jog and folds it into the daily stats row for the UTC date
    /// of `created_at`, atomically.
    pub async fn insert_jog(&self, user_id: &str, jog: NewJog, created_at: DateTime<Utc>) -> Result<Jog, DataManagerError> {
        let date = created_at.date_naive();
        let blob = route_to_blob(&jog.route)
            .map_err(|e| DataManagerError::Serialization(format!("Failed to encode route: {}", e)))?;

        let mut tx = self.pool.begin().await
            .map_err(|_| DataManagerError::Database("Failed to begin transaction".to_string()))?;

        let jog_id = query_as::<_, (i64,)>(concatcp!("
            INSERT INTO ", JOGS_TABLE_NAME, "(", JOG_COLUMNS, ")
            VALUES (NULL, ?1, ?2, ?3, ?4, ?5, ?6) RETURNING ", JOG_ID))
                .bind(user_id)
                .bind(blob)
                .bind(jog.distance_km)
                .bind(jog.duration_seconds as i64)
                .bind(jog.steps as i64)
                .bind(created_at)
                .fetch_one(&mut *tx).await
                .map_err(|_| DataManagerError::Database("Failed to insert jog".to_string()))
                .map(|row| row.0)?;

        query(concatcp!("
            INSERT INTO ", DAILY_STATS_TABLE_NAME, "(", DAILY_STAT_COLUMNS, ")
            VALUES (?1, ?2, ?3, ?4, 1)
            ON CONFLICT(", USER_ID, ", ", DATE, ") DO UPDATE SET ",
                STEPS,       " = ", STEPS, " + excluded.", STEPS, ", ",
                DISTANCE_KM, " = ", DISTANCE_KM, " + excluded.", DISTANCE_KM, ", ",
                JOGS_COUNT,  " = ", JOGS_COUNT, " + 1"))
                .bind(user_id)
                .bind(date)
                .bind(jog.steps as i64)
                .bind(jog.distance_km)
                .execute(&mut *tx).await
                .map_err(|_| DataManagerError::Database(format!("Failed to update daily stats for {}", date)))?;

        tx.commit().await
            .map_err(|_| DataManagerError::Database("Failed to commit jog".to_string()))?;

        Ok(Jog::new(jog_id, user_id.to_string(), jog, created_at))
    }

    pub async fn get_jog(&self, jog_id: i64) -> Result<Option<Jog>, DataManagerError> {
        query_as::<_, Jog>(concatcp!("SELECT ", JOG_COLUMNS, " FROM ", JOGS_TABLE_NAME, " WHERE ", JOG_ID, " = ?1"))
            .bind(jog_id)
            .fetch_optional(&self.pool).await
            .map_err(|_| DataManagerError::Database(format!("Failed to get jog {}", jog_id)))
    }

    /// Newest first.
    pub async fn get_jogs(&self, user_id: &str) -> Result<Vec<Jog>, DataManagerError> {
        query_as::<_, Jog>(concatcp!(
            "SELECT ", JOG_COLUMNS, " FROM ", JOGS_TABLE_NAME,
            " WHERE ", USER_ID, " = ?1 ORDER BY ", CREATED_AT, " DESC, ", JOG_ID, " DESC"))
            .bind(user_id)
            .fetch_all(&self.pool).await
            .map_err(|_| DataManagerError::Database("Failed to get jogs".to_string()))
    }

    /// Removes the jog and takes it back out of its day's stats row,
    /// atomically. A day left without jogs loses its row.
    pub async fn delete_jog(&self, jog_id: i64) -> Result<bool, DataManagerError> {
        let mut tx = self.pool.begin().await
            .map_err(|_| DataManagerError::Database("Failed to begin transaction".to_string()))?;

        let deleted = query_as::<_, (String, i64, f64, DateTime<Utc>)>(concatcp!("
            DELETE FROM ", JOGS_TABLE_NAME, " WHERE ", JOG_ID, " = ?1
            RETURNING ", USER_ID, ", ", STEPS, ", ", DISTANCE_KM, ", ", CREATED_AT))
                .bind(jog_id)
                .fetch_optional(&mut *tx).await
                .map_err(|_| DataManagerError::Database(format!("Failed to delete jog {}", jog_id)))?;

        let Some((user_id, steps, distance_km, created_at)) = deleted else {
            return Ok(false);
        };
        let date = created_at.date_naive();

        query(concatcp!("
            UPDATE ", DAILY_STATS_TABLE_NAME, " SET ",
                STEPS,       " = MAX(", STEPS, " - ?3, 0), ",
                DISTANCE_KM, " = MAX(", DISTANCE_KM, " - ?4, 0), ",
                JOGS_COUNT,  " = ", JOGS_COUNT, " - 1
            WHERE ", USER_ID, " = ?1 AND ", DATE, " = ?2"))
                .bind(&user_id)
                .bind(date)
                .bind(steps)
                .bind(distance_km)
                .execute(&mut *tx).await
                .map_err(|_| DataManagerError::Database(format!("Failed to update daily stats for {}", date)))?;

        query(concatcp!("DELETE FROM ", DAILY_STATS_TABLE_NAME, " WHERE ", USER_ID, " = ?1 AND ", DATE, " = ?2 AND ", JOGS_COUNT, " <= 0"))
            .bind(&user_id)
            .bind(date)
            .execute(&mut *tx).await
            .map_err(|_| DataManagerError::Database(format!("Failed to prune daily stats for {}", date)))?;

        tx.commit().await
            .map_err(|_| DataManagerError::Database(format!("Failed to commit deletion of jog {}", jog_id)))?;

        Ok(true)
    }

    /// Rows dated `since` or later, newest first.
    pub async fn get_daily_stats(&self, user_id: &str, since: NaiveDate) -> Result<Vec<DailyStat>, DataManagerError> {
        query_as::<_, DailyStat>(concatcp!(
            "SELECT ", DAILY_STAT_COLUMNS, " FROM ", DAILY_STATS_TABLE_NAME,
            " WHERE ", USER_ID, " = ?1 AND ", DATE, " >= ?2 ORDER BY ", DATE, " DESC"))
            .bind(user_id)
            .bind(since)
            .fetch_all(&self.pool).await
            .map_err(|_| DataManagerError::Database("Failed to get daily stats".to_string()))
    }

    pub async fn get_all_daily_stats(&self, user_id: &str) -> Result<Vec<DailyStat>, DataManagerError> {
        query_as::<_, DailyStat>(concatcp!(
            "SELECT ", DAILY_STAT_COLUMNS, " FROM ", DAILY_STATS_TABLE_NAME,
            " WHERE ", USER_ID, " = ?1 ORDER BY ", DATE, " DESC"))
            .bind(user_id)
            .fetch_all(&self.pool).await
            .map_err(|_| DataManagerError::Database("Failed to get daily stats".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use justrun_lib::position::Position;

    use super::*;

    fn run(distance_km: f64, steps: u64) -> NewJog {
        NewJog {
            route: vec![Position::new(40.0, -74.0), Position::new(40.0009, -74.0)],
            distance_km,
            duration_seconds: 60,
            steps,
        }
    }

    #[tokio::test]
    async fn insert_and_read_back() {
        let db = JogDatabase::in_memory().await.unwrap();
        let created_at = Utc.with_ymd_and_hms(2024, 5, 10, 7, 30, 0).unwrap();

        let jog = db.insert_jog("runner", run(0.1, 130), created_at).await.unwrap();
        let stored = db.get_jog(jog.jog_id).await.unwrap().unwrap();

        assert_eq!(stored, jog);
        assert_eq!(stored.route.len(), 2);
        assert_eq!(db.get_jog(jog.jog_id + 1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn daily_stats_accumulate_per_day() {
        let db = JogDatabase::in_memory().await.unwrap();
        let morning = Utc.with_ymd_and_hms(2024, 5, 10, 7, 0, 0).unwrap();
        let evening = Utc.with_ymd_and_hms(2024, 5, 10, 19, 0, 0).unwrap();
        let next_day = Utc.with_ymd_and_hms(2024, 5, 11, 7, 0, 0).unwrap();

        db.insert_jog("runner", run(1.0, 1300), morning).await.unwrap();
        db.insert_jog("runner", run(2.0, 2600), evening).await.unwrap();
        db.insert_jog("runner", run(0.5, 650), next_day).await.unwrap();
        db.insert_jog("someone_else", run(9.0, 9), morning).await.unwrap();

        let stats = db.get_all_daily_stats("runner").await.unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].date, next_day.date_naive());
        assert_eq!(stats[1].jogs_count, 2);
        assert_eq!(stats[1].steps, 3900);
        assert!((stats[1].distance_km - 3.0).abs() < 1e-9);

        let recent = db.get_daily_stats("runner", next_day.date_naive()).await.unwrap();
        assert_eq!(recent.len(), 1);
    }

    #[tokio::test]
    async fn jogs_are_listed_newest_first() {
        let db = JogDatabase::in_memory().await.unwrap();
        let first = Utc.with_ymd_and_hms(2024, 5, 10, 7, 0, 0).unwrap();
        let second = Utc.with_ymd_and_hms(2024, 5, 12, 7, 0, 0).unwrap();

        db.insert_jog("runner", run(1.0, 1300), first).await.unwrap();
        let latest = db.insert_jog("runner", run(2.0, 2600), second).await.unwrap();

        let jogs = db.get_jogs("runner").await.unwrap();
        assert_eq!(jogs.len(), 2);
        assert_eq!(jogs[0].jog_id, latest.jog_id);

        assert!(db.delete_jog(latest.jog_id).await.unwrap());
        assert!(!db.delete_jog(latest.jog_id).await.unwrap());
        assert_eq!(db.get_jogs("runner").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn deleting_jog_takes_it_out_of_daily_stats() {
        let db = JogDatabase::in_memory().await.unwrap();
        let morning = Utc.with_ymd_and_hms(2024, 5, 10, 7, 0, 0).unwrap();
        let evening = Utc.with_ymd_and_hms(2024, 5, 10, 19, 0, 0).unwrap();
        let next_day = Utc.with_ymd_and_hms(2024, 5, 11, 7, 0, 0).unwrap();

        db.insert_jog("runner", run(1.0, 1300), morning).await.unwrap();
        let evening_jog = db.insert_jog("runner", run(2.0, 2600), evening).await.unwrap();
        let next_day_jog = db.insert_jog("runner", run(0.5, 650), next_day).await.unwrap();

        assert!(db.delete_jog(evening_jog.jog_id).await.unwrap());
        let stats = db.get_all_daily_stats("runner").await.unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[1].jogs_count, 1);
        assert_eq!(stats[1].steps, 1300);
        assert!((stats[1].distance_km - 1.0).abs() < 1e-9);

        assert!(db.delete_jog(next_day_jog.jog_id).await.unwrap());
        let stats = db.get_all_daily_stats("runner").await.unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].date, morning.date_naive());
    }
}
