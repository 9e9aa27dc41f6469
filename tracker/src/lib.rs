pub mod actor;
pub mod config;
pub mod controller;
pub mod error;
pub mod jog_store;
pub mod platform;
pub mod replay;
pub mod routes;
pub mod runtime;
pub mod server_state;
