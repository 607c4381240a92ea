//! CLI module - Command-line interface for Milewatch
//!
//! This module provides a structured CLI using clap for argument parsing.

use clap::{Parser, Subcommand};

/// Milewatch - Award Fare Tracker
/// Searches airline award availability, tracks fare history and fires alerts
#[derive(Parser)]
#[command(name = "milewatch")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Search award availability for a route and date
    #[command(alias = "s")]
    Search {
        /// Origin airport code
        origin: String,
        /// Destination airport code
        destination: String,
        /// Departure date (YYYY-MM-DD)
        date: String,
        /// Cabin filter (economy, business, first)
        #[arg(long)]
        cabin: Option<String>,
        /// Mileage program filter
        #[arg(long)]
        program: Option<String>,
        /// Maximum number of stops
        #[arg(long)]
        max_stops: Option<u8>,
        /// Bypass the result cache and fetch fresh
        #[arg(long)]
        skip_cache: bool,
        /// Do not record the fetched fares into history
        #[arg(long)]
        no_history: bool,
    },

    /// Manage the search result cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },

    /// Query recorded fare history
    History {
        #[command(subcommand)]
        command: HistoryCommands,
    },

    /// Manage fare alerts
    #[command(alias = "a")]
    Alert {
        #[command(subcommand)]
        command: AlertCommands,
    },

    /// Manage SMTP configs for email alerts
    Email {
        #[command(subcommand)]
        command: EmailCommands,
    },

    /// Run the alert monitor
    Monitor {
        #[command(subcommand)]
        command: MonitorCommands,
    },

    /// Create default config file
    #[command(alias = "--init")]
    Init,
}

#[derive(Subcommand)]
pub enum CacheCommands {
    /// Show cache entry count, age range and size
    Info,
    /// Delete expired cache entries
    ClearExpired,
    /// Delete every cache entry
    Clear,
}

#[derive(Subcommand)]
pub enum HistoryCommands {
    /// Show the price trend for a route
    Trend {
        /// Origin airport code
        origin: String,
        /// Destination airport code
        destination: String,
        /// Cabin filter
        #[arg(long)]
        cabin: Option<String>,
        /// How many days back to include
        #[arg(long)]
        days: Option<i64>,
    },
    /// Show summary statistics for a route
    Stats {
        /// Origin airport code
        origin: String,
        /// Destination airport code
        destination: String,
        /// Cabin filter
        #[arg(long)]
        cabin: Option<String>,
    },
    /// Delete fare history
    Clear {
        /// Origin airport code; omit together with destination to clear everything
        origin: Option<String>,
        /// Destination airport code
        destination: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum AlertCommands {
    /// Create an alert rule
    Add {
        /// Origin airport code
        origin: String,
        /// Destination airport code
        destination: String,
        /// Cabin the alert watches (any if omitted)
        #[arg(long)]
        cabin: Option<String>,
        /// Mileage program the alert watches (any if omitted)
        #[arg(long)]
        program: Option<String>,
        /// Fire only at or below this mileage price
        #[arg(long)]
        max_miles: Option<i64>,
        /// Webhook URL to notify (repeatable)
        #[arg(long = "webhook")]
        webhooks: Vec<String>,
        /// Email recipient to notify (repeatable)
        #[arg(long = "email")]
        emails: Vec<String>,
        /// Named SMTP config used for email recipients
        #[arg(long)]
        email_config: Option<String>,
    },
    /// List alert rules
    #[command(alias = "ls")]
    List {
        /// Include disabled rules
        #[arg(long)]
        all: bool,
    },
    /// Remove an alert rule
    #[command(alias = "rm")]
    Remove {
        /// Alert ID
        id: i32,
    },
    /// Enable an alert rule
    Enable {
        /// Alert ID
        id: i32,
    },
    /// Disable an alert rule
    Disable {
        /// Alert ID
        id: i32,
    },
    /// Show past alert fires
    History {
        /// Only fires for this alert ID
        #[arg(long)]
        id: Option<i32>,
        /// Number of entries to show
        #[arg(default_value = "50")]
        limit: u64,
    },
    /// Evaluate all rules once and notify matches
    Check {
        /// Match and dedup but do not notify or record
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand)]
pub enum EmailCommands {
    /// Add or update an SMTP config
    Add {
        /// Config name referenced by alert rules
        name: String,
        /// SMTP server hostname
        #[arg(long)]
        host: String,
        /// SMTP server port
        #[arg(long, default_value = "587")]
        port: u16,
        /// SMTP username
        #[arg(long)]
        username: String,
        /// SMTP password
        #[arg(long)]
        password: String,
        /// From address for outgoing mail
        #[arg(long)]
        from: String,
        /// Connect without TLS
        #[arg(long)]
        no_tls: bool,
    },
    /// List SMTP configs (passwords redacted)
    #[command(alias = "ls")]
    List,
    /// Remove an SMTP config
    #[command(alias = "rm")]
    Remove {
        /// Config name
        name: String,
    },
}

#[derive(Subcommand)]
pub enum MonitorCommands {
    /// Run as background daemon on the configured schedule
    #[command(alias = "-d", alias = "--daemon")]
    Daemon,
    /// Run a single sweep and exit
    Run,
}
