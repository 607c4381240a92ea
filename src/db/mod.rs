use anyhow::Result;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub mod cache_migrator;
pub mod migrator;
pub mod repositories;

pub use repositories::alerts::{AlertError, AlertRule, EmailConfig, FireRecord, NewAlertRule};
pub use repositories::cache::CacheInfo;
pub use repositories::history::{FareObservation, NewLowCheck, RouteStats, TrendPoint};

use crate::models::SearchResult;

async fn connect(db_url: &str, max_connections: u32, min_connections: u32) -> Result<DatabaseConnection> {
    if !db_url.contains(":memory:") {
        let path_str = db_url.trim_start_matches("sqlite:");
        if let Some(parent) = Path::new(path_str).parent() {
            tokio::fs::create_dir_all(parent).await.ok();
        }
        if !Path::new(path_str).exists() {
            std::fs::File::create(path_str)?;
        }
    }

    let mut opt = ConnectOptions::new(db_url.to_string());
    opt.max_connections(max_connections)
        .min_connections(min_connections)
        .connect_timeout(Duration::from_secs(10))
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(300))
        .max_lifetime(Duration::from_secs(600))
        .sqlx_logging(false);

    Ok(Database::connect(opt).await?)
}

/// Main datastore: alert rules, email configs, fire records, fare history.
#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        let conn = connect(db_url, max_connections, min_connections).await?;
        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    fn history_repo(&self) -> repositories::history::HistoryRepository {
        repositories::history::HistoryRepository::new(self.conn.clone())
    }

    fn alert_repo(&self) -> repositories::alerts::AlertRepository {
        repositories::alerts::AlertRepository::new(self.conn.clone())
    }

    // ========== Fare History ==========

    pub async fn record_fares(&self, observations: &[FareObservation]) -> Result<usize> {
        self.history_repo().record(observations).await
    }

    pub async fn fare_trend(
        &self,
        origin: &str,
        destination: &str,
        cabin: Option<&str>,
        lookback_days: i64,
    ) -> Result<Vec<TrendPoint>> {
        self.history_repo()
            .trend(origin, destination, cabin, lookback_days)
            .await
    }

    pub async fn fare_stats(
        &self,
        origin: &str,
        destination: &str,
        cabin: Option<&str>,
    ) -> Result<RouteStats> {
        self.history_repo().stats(origin, destination, cabin).await
    }

    pub async fn is_new_low(
        &self,
        origin: &str,
        destination: &str,
        cabin: &str,
        program: &str,
        candidate_miles: i64,
        lookback_days: i64,
    ) -> Result<NewLowCheck> {
        self.history_repo()
            .is_new_low(
                origin,
                destination,
                cabin,
                program,
                candidate_miles,
                lookback_days,
            )
            .await
    }

    pub async fn clear_history(&self, route: Option<(&str, &str)>) -> Result<u64> {
        self.history_repo().clear(route).await
    }

    // ========== Alert Rules ==========

    pub async fn add_alert(&self, rule: &NewAlertRule) -> Result<i64> {
        self.alert_repo().add_rule(rule).await
    }

    pub async fn get_alert(&self, id: i32) -> Result<Option<AlertRule>> {
        self.alert_repo().get_rule(id).await
    }

    pub async fn list_alerts(&self, include_disabled: bool) -> Result<Vec<AlertRule>> {
        self.alert_repo().list_rules(include_disabled).await
    }

    pub async fn remove_alert(&self, id: i32) -> Result<()> {
        self.alert_repo().remove_rule(id).await
    }

    pub async fn set_alert_enabled(&self, id: i32, enabled: bool) -> Result<()> {
        self.alert_repo().set_rule_enabled(id, enabled).await
    }

    // ========== Email Configs ==========

    pub async fn add_email_config(&self, config: &EmailConfig) -> Result<()> {
        self.alert_repo().add_config(config).await
    }

    pub async fn get_email_config(&self, name: &str) -> Result<Option<EmailConfig>> {
        self.alert_repo().get_config(name).await
    }

    pub async fn list_email_configs(&self) -> Result<Vec<EmailConfig>> {
        self.alert_repo().list_configs().await
    }

    pub async fn remove_email_config(&self, name: &str) -> Result<()> {
        self.alert_repo().remove_config(name).await
    }

    // ========== Fire Records ==========

    pub async fn record_alert_fire(&self, fire: &FireRecord) -> Result<()> {
        self.alert_repo().record_fire(fire).await
    }

    pub async fn alert_recently_fired(
        &self,
        alert_id: i32,
        fingerprint: &str,
        since: &str,
    ) -> Result<bool> {
        self.alert_repo()
            .recently_fired(alert_id, fingerprint, since)
            .await
    }

    pub async fn alert_fire_history(
        &self,
        alert_id: Option<i32>,
        limit: u64,
    ) -> Result<Vec<FireRecord>> {
        self.alert_repo().fire_history(alert_id, limit).await
    }
}

/// Search result cache, on its own disposable database so `cache clear`
/// or deleting the file never touches alert or history data.
#[derive(Clone)]
pub struct CacheStore {
    pub conn: DatabaseConnection,
    ttl: chrono::Duration,
}

impl CacheStore {
    pub async fn new(db_url: &str, ttl: chrono::Duration) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        let conn = connect(db_url, 5, 1).await?;
        cache_migrator::Migrator::up(&conn, None).await?;

        info!("Cache database connected & migrations applied");

        Ok(Self { conn, ttl })
    }

    fn cache_repo(&self) -> repositories::cache::CacheRepository {
        repositories::cache::CacheRepository::new(self.conn.clone(), self.ttl)
    }

    pub async fn get(&self, key: &str) -> Result<Option<SearchResult>> {
        self.cache_repo().get(key).await
    }

    pub async fn put(&self, key: &str, result: &SearchResult) -> Result<()> {
        self.cache_repo().put(key, result).await
    }

    pub async fn clear_expired(&self) -> Result<u64> {
        self.cache_repo().clear_expired().await
    }

    pub async fn clear_all(&self) -> Result<u64> {
        self.cache_repo().clear_all().await
    }

    pub async fn info(&self) -> Result<CacheInfo> {
        self.cache_repo().info().await
    }
}
