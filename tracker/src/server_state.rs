use justrun_data_management::{local_store::FileStore, step_cache::DailyStepCache, DataManager};
use tokio::sync::Mutex;

use crate::{actor::TrackerHandle, runtime::FixFeed};

pub struct ServerState {
    pub tracker: TrackerHandle,
    pub fixes: FixFeed,
    pub data_manager: DataManager,
    pub step_cache: Mutex<DailyStepCache<FileStore>>,
    pub user_id: String,
}
