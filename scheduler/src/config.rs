//! Configuration management for the scheduler.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::alternatives::SearchOptions;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// `PostgreSQL` ledger configuration
    pub postgres: PostgresConfig,
    /// Scheduling defaults
    pub scheduling: SchedulingConfig,
    /// Logging and metrics
    pub observability: ObservabilityConfig,
}

/// `PostgreSQL` configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    /// `PostgreSQL` connection URL. Without one the scheduler runs on the
    /// in-memory ledger.
    pub url: Option<String>,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Seconds to wait for a free connection
    pub acquire_timeout: u64,
    /// Apply embedded migrations on startup
    pub run_migrations: bool,
}

impl PostgresConfig {
    /// Pool settings for [`PostgresLedger::connect`](gearbook_postgres::PostgresLedger::connect).
    #[must_use]
    pub const fn pool_settings(&self) -> gearbook_postgres::PoolSettings {
        gearbook_postgres::PoolSettings {
            max_connections: self.max_connections,
            acquire_timeout: Duration::from_secs(self.acquire_timeout),
        }
    }
}

/// Defaults applied by the catalog and the alternative slot search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingConfig {
    /// Check-in buffer for newly created facility configs, in minutes
    pub default_check_in_buffer_minutes: u32,
    /// Maximum session length for newly created facility configs, in minutes
    pub default_max_session_minutes: u32,
    /// First start time the slot search considers (facility local time)
    pub search_day_start: NaiveTime,
    /// Time every searched slot must end by (facility local time)
    pub search_day_end: NaiveTime,
    /// Distance between candidate start times, in minutes
    pub search_step_minutes: u32,
    /// Maximum number of slots a search returns
    pub search_max_results: usize,
}

impl SchedulingConfig {
    /// Search options built from these defaults.
    #[must_use]
    pub const fn search_options(&self) -> SearchOptions {
        SearchOptions {
            day_start: self.search_day_start,
            day_end: self.search_day_end,
            step_minutes: self.search_step_minutes,
            max_results: self.search_max_results,
        }
    }
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        let search = SearchOptions::default();
        Self {
            default_check_in_buffer_minutes: 15,
            default_max_session_minutes: 180,
            search_day_start: search.day_start,
            search_day_end: search.day_end,
            search_step_minutes: search.step_minutes,
            search_max_results: search.max_results,
        }
    }
}

/// Logging and metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log filter used when `RUST_LOG` is unset
    pub log_level: String,
    /// Install the Prometheus recorder on startup
    pub metrics_enabled: bool,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable variables fall back to their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let scheduling = SchedulingConfig::default();

        Self {
            postgres: PostgresConfig {
                url: env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
                max_connections: var("DATABASE_MAX_CONNECTIONS").unwrap_or(10),
                acquire_timeout: var("DATABASE_ACQUIRE_TIMEOUT").unwrap_or(5),
                run_migrations: var("DATABASE_RUN_MIGRATIONS").unwrap_or(true),
            },
            scheduling: SchedulingConfig {
                default_check_in_buffer_minutes: var("GEARBOOK_CHECK_IN_BUFFER_MINUTES")
                    .unwrap_or(scheduling.default_check_in_buffer_minutes),
                default_max_session_minutes: var("GEARBOOK_MAX_SESSION_MINUTES")
                    .unwrap_or(scheduling.default_max_session_minutes),
                search_day_start: time_var("GEARBOOK_SEARCH_DAY_START")
                    .unwrap_or(scheduling.search_day_start),
                search_day_end: time_var("GEARBOOK_SEARCH_DAY_END")
                    .unwrap_or(scheduling.search_day_end),
                search_step_minutes: var("GEARBOOK_SEARCH_STEP_MINUTES")
                    .unwrap_or(scheduling.search_step_minutes),
                search_max_results: var("GEARBOOK_SEARCH_MAX_RESULTS")
                    .unwrap_or(scheduling.search_max_results),
            },
            observability: ObservabilityConfig {
                log_level: env::var("RUST_LOG")
                    .unwrap_or_else(|_| "info,gearbook=debug,sqlx=warn".to_string()),
                metrics_enabled: var("METRICS_ENABLED").unwrap_or(true),
            },
        }
    }
}

fn var<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.parse().ok())
}

/// Parses `HH:MM` (or `HH:MM:SS`).
fn time_var(key: &str) -> Option<NaiveTime> {
    let raw = env::var(key).ok()?;
    NaiveTime::parse_from_str(&raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M:%S"))
        .ok()
}
