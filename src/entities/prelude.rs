pub use super::alert_history::Entity as AlertHistory;
pub use super::alerts::Entity as Alerts;
pub use super::award_cache::Entity as AwardCache;
pub use super::email_configs::Entity as EmailConfigs;
pub use super::fare_snapshots::Entity as FareSnapshots;
