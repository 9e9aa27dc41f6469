pub mod clock;
pub mod daily_stats;
pub mod geodesic;
pub mod jog;
pub mod position;
pub mod sample_filter;
pub mod snapshot;
pub mod tracking_session;
