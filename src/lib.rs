pub mod cli;
pub mod config;
pub mod db;
pub mod entities;
pub mod models;
pub mod scheduler;
pub mod scrapers;
pub mod services;

use std::sync::Arc;
use tokio::signal;

use clap::Parser;
use cli::{AlertCommands, CacheCommands, Cli, Commands, EmailCommands, HistoryCommands, MonitorCommands};
pub use config::Config;
use db::{CacheStore, EmailConfig, NewAlertRule, Store};
use scheduler::{AppState, Scheduler};
use scrapers::AwardQuery;
use services::SearchOptions;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

pub async fn run() -> anyhow::Result<()> {
    let config = Config::load()?;
    config.validate()?;

    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));

    let fmt_layer = tracing_subscriber::fmt::layer();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Search {
            origin,
            destination,
            date,
            cabin,
            program,
            max_stops,
            skip_cache,
            no_history,
        }) => {
            let mut query = AwardQuery::new(&origin, &destination, &date);
            query.cabin = cabin;
            query.program = program;
            query.max_stops = max_stops;
            let options = SearchOptions {
                skip_cache,
                record_history: !no_history,
            };
            cmd_search(&config, &query, &options).await
        }

        Some(Commands::Cache { command }) => match command {
            CacheCommands::Info => cmd_cache_info(&config).await,
            CacheCommands::ClearExpired => cmd_cache_clear(&config, false).await,
            CacheCommands::Clear => cmd_cache_clear(&config, true).await,
        },

        Some(Commands::History { command }) => match command {
            HistoryCommands::Trend {
                origin,
                destination,
                cabin,
                days,
            } => {
                let days = days.unwrap_or(config.history.lookback_days);
                cmd_history_trend(&config, &origin, &destination, cabin.as_deref(), days).await
            }
            HistoryCommands::Stats {
                origin,
                destination,
                cabin,
            } => cmd_history_stats(&config, &origin, &destination, cabin.as_deref()).await,
            HistoryCommands::Clear {
                origin,
                destination,
            } => cmd_history_clear(&config, origin.as_deref(), destination.as_deref()).await,
        },

        Some(Commands::Alert { command }) => match command {
            AlertCommands::Add {
                origin,
                destination,
                cabin,
                program,
                max_miles,
                webhooks,
                emails,
                email_config,
            } => {
                let rule = NewAlertRule {
                    origin,
                    destination,
                    cabin,
                    program,
                    max_miles,
                    webhooks,
                    emails,
                    email_config,
                };
                cmd_alert_add(&config, &rule).await
            }
            AlertCommands::List { all } => cmd_alert_list(&config, all).await,
            AlertCommands::Remove { id } => cmd_alert_remove(&config, id).await,
            AlertCommands::Enable { id } => cmd_alert_set_enabled(&config, id, true).await,
            AlertCommands::Disable { id } => cmd_alert_set_enabled(&config, id, false).await,
            AlertCommands::History { id, limit } => cmd_alert_history(&config, id, limit).await,
            AlertCommands::Check { dry_run } => cmd_alert_check(config, dry_run).await,
        },

        Some(Commands::Email { command }) => match command {
            EmailCommands::Add {
                name,
                host,
                port,
                username,
                password,
                from,
                no_tls,
            } => {
                let email_config = EmailConfig {
                    name,
                    smtp_host: host,
                    smtp_port: port,
                    username,
                    password,
                    from_addr: from,
                    use_tls: !no_tls,
                };
                cmd_email_add(&config, &email_config).await
            }
            EmailCommands::List => cmd_email_list(&config).await,
            EmailCommands::Remove { name } => cmd_email_remove(&config, &name).await,
        },

        Some(Commands::Monitor { command }) => match command {
            MonitorCommands::Daemon => run_daemon(config).await,
            MonitorCommands::Run => cmd_alert_check(config, false).await,
        },

        Some(Commands::Init) => {
            Config::create_default_if_missing()?;
            println!("✓ Config file created. Edit config.toml and run again.");
            Ok(())
        }

        None => {
            println!("Run 'milewatch --help' for usage.");
            Ok(())
        }
    }
}

async fn cmd_search(
    config: &Config,
    query: &AwardQuery,
    options: &SearchOptions,
) -> anyhow::Result<()> {
    println!(
        "Searching {} -> {} on {}...",
        query.origin, query.destination, query.date
    );

    let state = AppState::new(config.clone()).await?;
    let outcome = state
        .search_service
        .search_with_cache(query, options)
        .await?;

    if outcome.cache_hit {
        println!("(cached result)");
    }
    println!();

    if outcome.result.flights.is_empty() {
        println!("No award availability found.");
    } else {
        println!("Flights ({} total)", outcome.result.flights.len());
        println!("{:-<70}", "");

        for flight in &outcome.result.flights {
            println!(
                "{} {} {} -> {} ({})",
                flight.flight_no,
                outcome.result.date,
                flight.origin,
                flight.destination,
                flight.format_duration()
            );
            for fare in &flight.fares {
                let saver = if fare.is_saver { " [SAVER]" } else { "" };
                println!(
                    "  {:>8} miles + ${:<7.2} {} via {}{}",
                    fare.miles, fare.cash, fare.cabin, fare.program, saver
                );
            }
            println!();
        }
    }

    for new_low in &outcome.new_lows {
        let prev = new_low
            .previous_min
            .map_or_else(|| "n/a".to_string(), |m| m.to_string());
        println!(
            "★ New low: {} ({}) at {} miles (was {})",
            new_low.cabin, new_low.program, new_low.miles, prev
        );
    }

    if !outcome.result.errors.is_empty() {
        println!();
        println!("Warnings:");
        for err in &outcome.result.errors {
            println!("  ⚠ {}", err);
        }
    }

    Ok(())
}

async fn cache_store(config: &Config) -> anyhow::Result<CacheStore> {
    CacheStore::new(
        &config.general.cache_database_path,
        chrono::Duration::hours(config.cache.ttl_hours),
    )
    .await
}

async fn cmd_cache_info(config: &Config) -> anyhow::Result<()> {
    let cache = cache_store(config).await?;
    let info = cache.info().await?;

    println!("Cache Info");
    println!("{:-<70}", "");
    println!("Entries:  {}", info.entries);
    println!("Size:     {} bytes", info.total_bytes);
    println!(
        "Oldest:   {}",
        info.oldest_created_at.as_deref().unwrap_or("-")
    );
    println!(
        "Newest:   {}",
        info.newest_created_at.as_deref().unwrap_or("-")
    );

    Ok(())
}

async fn cmd_cache_clear(config: &Config, all: bool) -> anyhow::Result<()> {
    let cache = cache_store(config).await?;
    let removed = if all {
        cache.clear_all().await?
    } else {
        cache.clear_expired().await?
    };

    println!(
        "✓ Removed {} {} cache entries",
        removed,
        if all { "total" } else { "expired" }
    );
    Ok(())
}

async fn cmd_history_trend(
    config: &Config,
    origin: &str,
    destination: &str,
    cabin: Option<&str>,
    days: i64,
) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_path).await?;
    let points = store.fare_trend(origin, destination, cabin, days).await?;

    if points.is_empty() {
        println!(
            "No fare history for {} -> {} in the last {} days.",
            origin.to_uppercase(),
            destination.to_uppercase(),
            days
        );
        return Ok(());
    }

    println!(
        "Price trend for {} -> {} (last {} days)",
        origin.to_uppercase(),
        destination.to_uppercase(),
        days
    );
    println!("{:-<70}", "");
    println!(
        "{:<12} {:<10} {:<10} {:>9} {:>10} {:>8}",
        "Date", "Cabin", "Program", "Min miles", "Avg taxes", "Samples"
    );

    for point in points {
        println!(
            "{:<12} {:<10} {:<10} {:>9} {:>10.2} {:>8}",
            point.flight_date,
            point.cabin,
            point.program,
            point.min_miles,
            point.avg_taxes,
            point.sample_count
        );
    }

    Ok(())
}

async fn cmd_history_stats(
    config: &Config,
    origin: &str,
    destination: &str,
    cabin: Option<&str>,
) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_path).await?;
    let stats = store.fare_stats(origin, destination, cabin).await?;

    println!(
        "Fare stats for {} -> {}",
        origin.to_uppercase(),
        destination.to_uppercase()
    );
    println!("{:-<70}", "");
    println!("Records:       {}", stats.total_records);

    if stats.total_records == 0 {
        println!("No fares recorded yet for this route.");
        return Ok(());
    }

    let fmt = |miles: Option<i64>| miles.map_or_else(|| "-".to_string(), |m| m.to_string());
    println!("Min miles:     {}", fmt(stats.min_miles));
    println!("Max miles:     {}", fmt(stats.max_miles));
    println!("Avg miles:     {}", fmt(stats.avg_miles));
    println!("Flight dates:  {}", stats.unique_flight_dates);
    println!("First seen:    {}", stats.first_seen.as_deref().unwrap_or("-"));
    println!("Last seen:     {}", stats.last_seen.as_deref().unwrap_or("-"));

    Ok(())
}

async fn cmd_history_clear(
    config: &Config,
    origin: Option<&str>,
    destination: Option<&str>,
) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_path).await?;

    let route = match (origin, destination) {
        (Some(o), Some(d)) => Some((o, d)),
        (None, None) => None,
        _ => {
            println!("Provide both origin and destination, or neither to clear everything.");
            return Ok(());
        }
    };

    if route.is_none() {
        println!("Clear ALL fare history? Enter 'y' to confirm:");
        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let removed = store.clear_history(route).await?;
    println!("✓ Removed {} fare records", removed);
    Ok(())
}

async fn cmd_alert_add(config: &Config, rule: &NewAlertRule) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_path).await?;
    let id = store.add_alert(rule).await?;

    println!("✓ Alert #{} created", id);
    println!(
        "  Route:    {} -> {}",
        rule.origin.to_uppercase(),
        rule.destination.to_uppercase()
    );
    if let Some(cabin) = &rule.cabin {
        println!("  Cabin:    {}", cabin);
    }
    if let Some(program) = &rule.program {
        println!("  Program:  {}", program);
    }
    if let Some(max) = rule.max_miles {
        println!("  Max:      {} miles", max);
    }
    println!(
        "  Channels: {} webhook(s), {} email(s)",
        rule.webhooks.len(),
        rule.emails.len()
    );
    if rule.webhooks.is_empty() && rule.emails.is_empty() {
        println!("  Note: no channels configured; matches will only be recorded.");
    }

    Ok(())
}

async fn cmd_alert_list(config: &Config, include_disabled: bool) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_path).await?;
    let rules = store.list_alerts(include_disabled).await?;

    if rules.is_empty() {
        println!("No alert rules configured.");
        println!();
        println!("Add one with: milewatch alert add SFO NRT --cabin business --max-miles 80000");
        return Ok(());
    }

    println!("Alert Rules ({} total)", rules.len());
    println!("{:-<70}", "");

    for rule in rules {
        let status = if rule.enabled { "✓" } else { "⏸" };
        println!("{} Alert #{}: {}", status, rule.id, rule.description());
        println!(
            "  Channels: {} webhook(s), {} email(s){}",
            rule.webhooks.len(),
            rule.emails.len(),
            rule.email_config
                .as_deref()
                .map(|c| format!(" via '{c}'"))
                .unwrap_or_default()
        );
    }

    println!();
    println!("Legend: ✓ Enabled | ⏸ Disabled");
    Ok(())
}

async fn cmd_alert_remove(config: &Config, id: i32) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_path).await?;
    store.remove_alert(id).await?;
    println!("✓ Removed alert #{}", id);
    Ok(())
}

async fn cmd_alert_set_enabled(config: &Config, id: i32, enabled: bool) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_path).await?;
    store.set_alert_enabled(id, enabled).await?;
    println!(
        "✓ Alert #{} {}",
        id,
        if enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}

async fn cmd_alert_history(config: &Config, id: Option<i32>, limit: u64) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_path).await?;
    let fires = store.alert_fire_history(id, limit).await?;

    if fires.is_empty() {
        println!("No alert fires recorded.");
        return Ok(());
    }

    println!("Alert Fires (last {})", fires.len());
    println!("{:-<70}", "");

    for fire in fires {
        let low = if fire.is_new_low { " ★ new low" } else { "" };
        println!(
            "• #{} | {} {} {} for {} miles{}",
            fire.alert_id,
            fire.flight_date,
            fire.flight_no.as_deref().unwrap_or("-"),
            fire.cabin,
            fire.miles,
            low
        );
        println!("  Program: {} | Fired: {}", fire.program, fire.fired_at);
    }

    Ok(())
}

async fn cmd_alert_check(config: Config, dry_run: bool) -> anyhow::Result<()> {
    let state = AppState::new(config).await?;
    let options = state.sweep_options(dry_run);
    let summary = state.engine.run_sweep(&options).await?;

    println!();
    println!("{:-<70}", "");
    println!("Sweep complete{}", if dry_run { " (dry run)" } else { "" });
    println!("  Rules evaluated:    {}", summary.rules_evaluated);
    println!("  Matches found:      {}", summary.matches_found);
    println!("  Suppressed (dedup): {}", summary.deduplicated);
    if !dry_run {
        println!("  Notifications sent: {}", summary.notifications_sent);
        if summary.channel_failures > 0 {
            println!("  Channel failures:   {}", summary.channel_failures);
        }
        if summary.no_channel_matches > 0 {
            println!("  Matches w/o channel:{}", summary.no_channel_matches);
        }
    }
    if summary.fetch_failures > 0 {
        println!("  Fetch failures:     {}", summary.fetch_failures);
    }

    Ok(())
}

async fn cmd_email_add(config: &Config, email_config: &EmailConfig) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_path).await?;
    store.add_email_config(email_config).await?;

    println!("✓ Email config '{}' saved", email_config.name);
    println!(
        "  SMTP: {}:{} ({})",
        email_config.smtp_host,
        email_config.smtp_port,
        if email_config.use_tls { "TLS" } else { "plain" }
    );
    println!("  From: {}", email_config.from_addr);
    Ok(())
}

async fn cmd_email_list(config: &Config) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_path).await?;
    let configs = store.list_email_configs().await?;

    if configs.is_empty() {
        println!("No email configs.");
        println!();
        println!("Add one with: milewatch email add gmail --host smtp.gmail.com ...");
        return Ok(());
    }

    println!("Email Configs ({} total)", configs.len());
    println!("{:-<70}", "");

    for c in configs {
        println!("• {}", c.name);
        println!(
            "  {}:{} | user: {} | from: {} | TLS: {}",
            c.smtp_host,
            c.smtp_port,
            c.username,
            c.from_addr,
            if c.use_tls { "yes" } else { "no" }
        );
    }

    Ok(())
}

async fn cmd_email_remove(config: &Config, name: &str) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_path).await?;
    store.remove_email_config(name).await?;
    println!("✓ Removed email config '{}'", name);
    Ok(())
}

async fn run_daemon(config: Config) -> anyhow::Result<()> {
    info!(
        "Milewatch v{} starting in daemon mode...",
        env!("CARGO_PKG_VERSION")
    );

    let monitor_config = config.monitor.clone();
    let state = Arc::new(AppState::new(config).await?);
    let scheduler = Arc::new(Scheduler::new(Arc::clone(&state), monitor_config));

    let scheduler_handle = {
        let sched = Arc::clone(&scheduler);
        tokio::spawn(async move {
            if let Err(e) = sched.start().await {
                error!("Monitor error: {}", e);
            }
        })
    };

    info!("Daemon running. Press Ctrl+C to stop.");

    match signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!("Error listening for shutdown: {}", e),
    }

    scheduler.stop().await;
    scheduler_handle.abort();
    info!("Daemon stopped");

    Ok(())
}
