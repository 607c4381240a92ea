use anyhow::Result;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{Duration, interval};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::config::{Config, MonitorConfig};
use crate::db::{CacheStore, Store};
use crate::scrapers::ScraperSet;
use crate::services::engine::{AlertEngine, SweepOptions};
use crate::services::notify::HttpNotifier;
use crate::services::search::SearchService;

/// Shared handles for everything the CLI and monitor need.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Store,
    pub cache: CacheStore,
    pub search_service: Arc<SearchService>,
    pub engine: Arc<AlertEngine>,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self> {
        Self::with_scrapers(config, ScraperSet::new()).await
    }

    pub async fn with_scrapers(config: Config, scrapers: ScraperSet) -> Result<Self> {
        let store = Store::with_pool_options(
            &config.general.database_path,
            config.general.max_db_connections,
            config.general.min_db_connections,
        )
        .await?;

        let cache = CacheStore::new(
            &config.general.cache_database_path,
            chrono::Duration::hours(config.cache.ttl_hours),
        )
        .await?;

        let search_service = Arc::new(SearchService::new(
            Arc::new(scrapers),
            store.clone(),
            cache.clone(),
            config.history.lookback_days,
        ));

        let notifier = HttpNotifier::new(Duration::from_secs(
            config.alerts.webhook_timeout_seconds,
        ))?;

        let engine = Arc::new(AlertEngine::new(
            store.clone(),
            Arc::clone(&search_service),
            Arc::new(notifier),
        ));

        Ok(Self {
            config,
            store,
            cache,
            search_service,
            engine,
        })
    }

    #[must_use]
    pub fn sweep_options(&self, dry_run: bool) -> SweepOptions {
        SweepOptions {
            dry_run,
            lookahead_days: self.config.alerts.lookahead_days,
            dedup_window: chrono::Duration::hours(self.config.alerts.dedup_hours),
        }
    }
}

pub struct Scheduler {
    state: Arc<AppState>,
    config: MonitorConfig,
    running: Arc<RwLock<bool>>,
}

impl Scheduler {
    pub fn new(state: Arc<AppState>, config: MonitorConfig) -> Self {
        Self {
            state,
            config,
            running: Arc::new(RwLock::new(false)),
        }
    }

    pub async fn start(&self) -> Result<()> {
        if !self.config.enabled {
            info!("Monitor is disabled in config");
            return Ok(());
        }

        *self.running.write().await = true;
        info!("Starting background monitor");

        if let Some(cron_expr) = &self.config.cron_expression {
            self.run_with_cron(cron_expr).await
        } else {
            self.run_with_interval().await
        }
    }

    async fn run_with_cron(&self, cron_expr: &str) -> Result<()> {
        let mut sched = JobScheduler::new().await?;

        let state = Arc::clone(&self.state);
        let running = Arc::clone(&self.running);

        let job = Job::new_async(cron_expr, move |_uuid, _lock| {
            let state = Arc::clone(&state);
            let running = Arc::clone(&running);
            Box::pin(async move {
                if !*running.read().await {
                    return;
                }
                if let Err(e) = run_sweep(&state).await {
                    error!("Scheduled alert sweep failed: {}", e);
                }
            })
        })?;

        sched.add(job).await?;
        sched.start().await?;

        info!("Monitor running with cron: {}", cron_expr);

        loop {
            if !*self.running.read().await {
                break;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        sched.shutdown().await?;
        Ok(())
    }

    async fn run_with_interval(&self) -> Result<()> {
        let interval_mins = self.config.check_interval_minutes;
        info!("Monitor running every {} minutes", interval_mins);

        let mut sweep_interval = interval(Duration::from_secs(u64::from(interval_mins) * 60));

        loop {
            sweep_interval.tick().await;
            if !*self.running.read().await {
                break;
            }
            info!("Running scheduled alert sweep...");
            if let Err(e) = run_sweep(&self.state).await {
                error!("Scheduled alert sweep failed: {}", e);
            }
        }

        Ok(())
    }

    pub async fn stop(&self) {
        info!("Stopping monitor...");
        *self.running.write().await = false;
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    pub async fn run_once(&self) -> Result<()> {
        info!("Running manual sweep...");
        run_sweep(&self.state).await
    }
}

async fn run_sweep(state: &AppState) -> Result<()> {
    let options = state.sweep_options(false);
    let summary = state.engine.run_sweep(&options).await?;

    if summary.matches_found > 0 {
        info!(
            "Sweep fired {} match(es), {} notification(s) delivered",
            summary.matches_found, summary.notifications_sent
        );
    }
    Ok(())
}
