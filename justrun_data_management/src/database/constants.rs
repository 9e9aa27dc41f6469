pub const JOGS_TABLE_NAME: &str = "Jogs";
pub const JOG_ID: &str = "jog_id";
pub const USER_ID: &str = "user_id";
pub const ROUTE: &str = "route";
pub const DISTANCE_KM: &str = "distance_km";
pub const DURATION_SECONDS: &str = "duration_seconds";
pub const STEPS: &str = "steps";
pub const CREATED_AT: &str = "created_at";

pub const DAILY_STATS_TABLE_NAME: &str = "DailyStats";
// User id
pub const DATE: &str = "date";
// Steps, distance
pub const JOGS_COUNT: &str = "jogs_count";
