pub mod prelude;

pub mod alert_history;
pub mod alerts;
pub mod award_cache;
pub mod email_configs;
pub mod fare_snapshots;
