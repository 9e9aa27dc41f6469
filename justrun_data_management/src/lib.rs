use thiserror::Error;

pub mod database;
pub mod gpx_util;
pub mod local_store;
pub mod session_store;
pub mod step_cache;
mod data_manager;

pub use data_manager::*;

pub const DATA_DIR: &str = "data/";
pub const DATABASE_FILE: &str = "database.db";
pub const LOCAL_STORE_DIR: &str = "local_store";

#[derive(Debug, Error)]
pub enum DataManagerError {
    #[error("database error: {0}")]
    Database(String),
    #[error("local store error: {0}")]
    LocalStore(String),
    #[error("gpx error: {0}")]
    Gpx(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}
