use std::net::SocketAddr;
use std::str::FromStr;

use chrono_tz::Tz;

/// Ten years.
const MAX_COOLDOWN_HOURS: u64 = 24 * 365 * 10;
/// One hundred years.
const MAX_RETENTION_DAYS: u64 = 365 * 100;
/// One day.
const MAX_RUN_TIMEOUT_SECS: u64 = 24 * 60 * 60;
/// Ten minutes.
const MAX_WEBHOOK_TIMEOUT_MS: u64 = 10 * 60 * 1000;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 10)
    pub db_max_connections: u32,

    /// Redis connection string. When set, pipeline runs are also serialized
    /// across processes through a Redis lock.
    pub redis_url: Option<String>,

    /// Address the HTTP server binds to (default: 0.0.0.0:3000)
    pub bind_addr: SocketAddr,

    /// Shared secret for the HTTP trigger endpoint
    pub trigger_secret: Option<String>,

    /// Scheduler token injected by the hosting platform
    pub cron_secret: Option<String>,

    /// Whether the in-process cron scheduler runs at all
    pub scheduler_enabled: bool,

    /// Six-field cron expression (with seconds) for the expiry check
    pub notify_schedule: String,

    /// Timezone the schedule and day arithmetic are evaluated in
    pub notify_timezone: Tz,

    /// Window in which a delivered (item, condition) alert is not repeated
    pub notify_cooldown_hours: u64,

    /// Per-request timeout for outbound webhooks in milliseconds
    pub webhook_timeout_ms: u64,

    /// Maximum number of webhook requests in flight during a run
    pub webhook_concurrency: usize,

    /// Upper bound on the duration of a whole pipeline run
    pub run_timeout_secs: u64,

    /// Notification log entries older than this are pruned (0 = keep forever)
    pub notify_log_retention_days: u64,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            db_max_connections: parse_var("DB_MAX_CONNECTIONS", "10")?,
            redis_url: non_empty_var("REDIS_URL"),
            bind_addr: parse_var("BIND_ADDR", "0.0.0.0:3000")?,
            trigger_secret: non_empty_var("TRIGGER_SECRET"),
            cron_secret: non_empty_var("CRON_SECRET"),
            scheduler_enabled: parse_var("SCHEDULER_ENABLED", "true")?,
            notify_schedule: std::env::var("NOTIFY_SCHEDULE")
                .unwrap_or_else(|_| "0 0 9 * * *".to_string()),
            notify_timezone: parse_var("NOTIFY_TIMEZONE", "UTC")?,
            notify_cooldown_hours: parse_var("NOTIFY_COOLDOWN_HOURS", "24")?,
            webhook_timeout_ms: parse_var("WEBHOOK_TIMEOUT_MS", "10000")?,
            webhook_concurrency: parse_var("WEBHOOK_CONCURRENCY", "8")?,
            run_timeout_secs: parse_var("RUN_TIMEOUT_SECS", "300")?,
            notify_log_retention_days: parse_var("NOTIFY_LOG_RETENTION_DAYS", "90")?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject durations that cannot be represented or make no sense.
    pub fn validate(&self) -> anyhow::Result<()> {
        check_range("NOTIFY_COOLDOWN_HOURS", self.notify_cooldown_hours, 0, MAX_COOLDOWN_HOURS)?;
        check_range(
            "NOTIFY_LOG_RETENTION_DAYS",
            self.notify_log_retention_days,
            0,
            MAX_RETENTION_DAYS,
        )?;
        check_range("RUN_TIMEOUT_SECS", self.run_timeout_secs, 1, MAX_RUN_TIMEOUT_SECS)?;
        check_range("WEBHOOK_TIMEOUT_MS", self.webhook_timeout_ms, 1, MAX_WEBHOOK_TIMEOUT_MS)?;
        Ok(())
    }

    /// Secrets accepted on the trigger endpoint, in configuration order.
    pub fn trigger_secrets(&self) -> Vec<&str> {
        [self.trigger_secret.as_deref(), self.cron_secret.as_deref()]
            .into_iter()
            .flatten()
            .collect()
    }
}

impl Default for AppConfig {
    /// Defaults matching `from_env` with no variables set (database URL empty).
    fn default() -> Self {
        Self {
            database_url: String::new(),
            db_max_connections: 10,
            redis_url: None,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            trigger_secret: None,
            cron_secret: None,
            scheduler_enabled: true,
            notify_schedule: "0 0 9 * * *".to_string(),
            notify_timezone: Tz::UTC,
            notify_cooldown_hours: 24,
            webhook_timeout_ms: 10_000,
            webhook_concurrency: 8,
            run_timeout_secs: 300,
            notify_log_retention_days: 90,
        }
    }
}

fn check_range(name: &str, value: u64, min: u64, max: u64) -> anyhow::Result<()> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(anyhow::anyhow!("{} must be between {} and {}, got {}", name, min, max, value))
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T>(name: &str, default: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = std::env::var(name).unwrap_or_else(|_| default.to_string());
    raw.trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("{} has an invalid value '{}': {}", name, raw, e))
}
