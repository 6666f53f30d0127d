use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u16(profile: &str, key: &str, default: u16) -> u16 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub scheduler: SchedulerConfig,
    pub queue: QueueConfig,
    pub aws: AwsConfig,
    pub postgres: PostgresConfig,
    pub server: ServerConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `HERALD_PROFILE`. When set (e.g. `PROD`), every
    /// key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("HERALD_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            scheduler: SchedulerConfig::from_env_profiled(p),
            queue: QueueConfig::from_env_profiled(p),
            aws: AwsConfig::from_env_profiled(p),
            postgres: PostgresConfig::from_env_profiled(p),
            server: ServerConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Reject settings the scheduler cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scheduler.validate()?;
        if self.queue.inbound_queue_url.is_empty() {
            return Err(ConfigError::Missing("INBOUND_QUEUE_URL"));
        }
        if self.queue.outbound_queue_url.is_empty() {
            return Err(ConfigError::Missing("OUTBOUND_QUEUE_URL"));
        }
        Ok(())
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  scheduler:   repeat={}ms, advance={}ms, cache_poll={}ms",
            self.scheduler.repeat_interval_ms,
            self.scheduler.advance_margin_ms,
            self.scheduler.cache_poll_interval_ms
        );
        tracing::info!("  queue:       in={}, out={}", self.queue.inbound_queue_url, self.queue.outbound_queue_url);
        tracing::info!("  aws:         region={}", self.aws.region);
        tracing::info!("  postgres:    host={}, db={}", self.postgres.host, self.postgres.database);
        tracing::info!("  server:      {}:{}", self.server.host, self.server.port);
    }

    /// Return a redacted view with no secrets.
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "scheduler": self.scheduler,
            "queue": self.queue,
            "aws": {
                "region": self.aws.region,
                "endpoint_url": self.aws.endpoint_url,
                "static_credentials": self.aws.has_static_credentials(),
            },
            "postgres": {
                "host": self.postgres.host,
                "port": self.postgres.port,
                "database": self.postgres.database,
                "max_connections": self.postgres.max_connections,
                "url_override": self.postgres.url.is_some(),
            },
            "server": { "host": self.server.host, "port": self.server.port },
        })
    }
}

// ── Scheduler timing ──────────────────────────────────────────

/// Upper bound for every scheduler interval: one day.
pub const MAX_INTERVAL_MS: u64 = 86_400_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Window rollover period.
    pub repeat_interval_ms: u64,
    /// How long before a window's end the next window is loaded.
    pub advance_margin_ms: u64,
    /// Period of the in-memory cache poll.
    pub cache_poll_interval_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            repeat_interval_ms: 5000,
            advance_margin_ms: 2000,
            cache_poll_interval_ms: 1000,
        }
    }
}

impl SchedulerConfig {
    fn from_env_profiled(p: &str) -> Self {
        let defaults = Self::default();
        Self {
            repeat_interval_ms: profiled_env_u64(p, "WINDOW_REPEAT_INTERVAL_MS", defaults.repeat_interval_ms),
            advance_margin_ms: profiled_env_u64(p, "WINDOW_ADVANCE_MARGIN_MS", defaults.advance_margin_ms),
            cache_poll_interval_ms: profiled_env_u64(p, "CACHE_POLL_INTERVAL_MS", defaults.cache_poll_interval_ms),
        }
    }

    pub fn repeat_interval(&self) -> Duration {
        Duration::from_millis(self.repeat_interval_ms)
    }

    pub fn advance_margin(&self) -> Duration {
        Duration::from_millis(self.advance_margin_ms)
    }

    pub fn cache_poll_interval(&self) -> Duration {
        Duration::from_millis(self.cache_poll_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, ms) in [
            ("WINDOW_REPEAT_INTERVAL_MS", self.repeat_interval_ms),
            ("WINDOW_ADVANCE_MARGIN_MS", self.advance_margin_ms),
            ("CACHE_POLL_INTERVAL_MS", self.cache_poll_interval_ms),
        ] {
            if ms > MAX_INTERVAL_MS {
                return Err(ConfigError::IntervalTooLarge {
                    name,
                    max_ms: MAX_INTERVAL_MS,
                });
            }
        }
        if self.repeat_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval("WINDOW_REPEAT_INTERVAL_MS"));
        }
        if self.cache_poll_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval("CACHE_POLL_INTERVAL_MS"));
        }
        if self.advance_margin_ms >= self.repeat_interval_ms {
            return Err(ConfigError::MarginExceedsInterval {
                advance_ms: self.advance_margin_ms,
                repeat_ms: self.repeat_interval_ms,
            });
        }
        Ok(())
    }
}

// ── Queues ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Queue carrying schedule/replace/cancel requests.
    pub inbound_queue_url: String,
    /// Queue receiving notifications and error envelopes.
    pub outbound_queue_url: String,
    pub max_batch_size: u32,
    pub wait_time_secs: u32,
    pub visibility_timeout_secs: u32,
    /// Pause after an empty poll.
    pub poll_interval_ms: u64,
}

impl QueueConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            inbound_queue_url: profiled_env_or(p, "INBOUND_QUEUE_URL", ""),
            outbound_queue_url: profiled_env_or(p, "OUTBOUND_QUEUE_URL", ""),
            max_batch_size: profiled_env_u32(p, "QUEUE_MAX_BATCH_SIZE", 10),
            wait_time_secs: profiled_env_u32(p, "QUEUE_WAIT_TIME_SECS", 20),
            visibility_timeout_secs: profiled_env_u32(p, "QUEUE_VISIBILITY_TIMEOUT_SECS", 30),
            poll_interval_ms: profiled_env_u64(p, "QUEUE_POLL_INTERVAL_MS", 100),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// ── AWS ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsConfig {
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    pub endpoint_url: Option<String>,
}

impl AwsConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            region: profiled_env_or(p, "AWS_REGION", "eu-central-1"),
            access_key_id: profiled_env_opt(p, "AWS_ACCESS_KEY_ID"),
            secret_access_key: profiled_env_opt(p, "AWS_SECRET_ACCESS_KEY"),
            session_token: profiled_env_opt(p, "AWS_SESSION_TOKEN"),
            endpoint_url: profiled_env_opt(p, "QUEUE_AWS_ENDPOINT_URL"),
        }
    }

    pub fn has_static_credentials(&self) -> bool {
        self.access_key_id.is_some() && self.secret_access_key.is_some()
    }
}

// ── PostgreSQL ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    /// Full `DATABASE_URL`; takes precedence over the individual parts.
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ssl_mode: String,
    pub max_connections: u32,
}

impl PostgresConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            url: profiled_env_opt(p, "DATABASE_URL"),
            host: profiled_env_or(p, "PG_HOST", "localhost"),
            port: profiled_env_u16(p, "PG_PORT", 5432),
            database: profiled_env_or(p, "PG_DATABASE", "herald"),
            username: profiled_env_opt(p, "PG_USERNAME"),
            password: profiled_env_opt(p, "PG_PASSWORD"),
            ssl_mode: profiled_env_or(p, "PG_SSL_MODE", "prefer"),
            max_connections: profiled_env_u32(p, "PG_MAX_CONNECTIONS", 10),
        }
    }

    pub fn connection_string(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }
        let user = self.username.as_deref().unwrap_or("postgres");
        let pass = self.password.as_deref().unwrap_or("");
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            user, pass, self.host, self.port, self.database, self.ssl_mode
        )
    }
}

// ── HTTP (health + metrics) ───────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "HOST", "0.0.0.0"),
            port: profiled_env_u16(p, "PORT", 8080),
        }
    }
}
