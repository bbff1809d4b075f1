use std::collections::HashMap;
use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::duration::parse_duration;
use crate::error::RadarError;

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

fn profiled_env_num<T: std::str::FromStr>(profile: &str, key: &str, default: T) -> Result<T, RadarError> {
    match profiled_env_opt(profile, key) {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| RadarError::Config(format!("invalid {}: '{}'", key, v))),
        None => Ok(default),
    }
}

/// Parse `Name=value` pairs separated by commas. Values may contain `=`.
fn parse_headers(key: &str, raw: &str) -> Result<HashMap<String, String>, RadarError> {
    let mut headers = HashMap::new();
    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match pair.split_once('=') {
            Some((name, value)) if !name.trim().is_empty() => {
                headers.insert(name.trim().to_string(), value.trim().to_string());
            }
            _ => {
                return Err(RadarError::Config(format!(
                    "invalid {}: expected Name=value, got '{}'",
                    key, pair
                )))
            }
        }
    }
    Ok(headers)
}

fn profiled_env_duration(profile: &str, key: &str, default: &str) -> Result<Duration, RadarError> {
    let raw = profiled_env_or(profile, key, default);
    parse_duration(&raw).ok_or_else(|| RadarError::Config(format!("invalid {}: '{}'", key, raw)))
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub database: DatabaseConfig,
    pub connpass: ConnpassConfig,
    pub discord: DiscordConfig,
    /// When set, notifications go to this webhook instead of Discord.
    pub webhook_url: Option<String>,
    /// Extra webhook request headers; values may reference `${VAR}`.
    #[serde(skip_serializing, default)]
    pub webhook_headers: HashMap<String, String>,
    pub scheduler: SchedulerConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `RADAR_PROFILE` env var. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Result<Self, RadarError> {
        let profile = env_or("RADAR_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Result<Self, RadarError> {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Ok(Self {
            profile: p.to_string(),
            database: DatabaseConfig::from_env_profiled(p)?,
            connpass: ConnpassConfig::from_env_profiled(p)?,
            discord: DiscordConfig::from_env_profiled(p),
            webhook_url: profiled_env_opt(p, "WEBHOOK_URL"),
            webhook_headers: parse_headers(
                "WEBHOOK_HEADERS",
                &profiled_env_or(p, "WEBHOOK_HEADERS", ""),
            )?,
            scheduler: SchedulerConfig::from_env_profiled(p)?,
        })
    }

    /// Check the keys the scheduler cannot start without.
    pub fn validate(&self) -> Result<(), RadarError> {
        if self.database.url.is_empty() {
            return Err(RadarError::Config("DATABASE_URL is required".to_string()));
        }
        if self.connpass.api_key.is_none() {
            return Err(RadarError::Config("CONNPASS_API_KEY is required".to_string()));
        }
        if self.discord.bot_token.is_none() && self.webhook_url.is_none() {
            return Err(RadarError::Config(
                "DISCORD_BOT_TOKEN is required (or WEBHOOK_URL)".to_string(),
            ));
        }
        if !(1..=100).contains(&self.scheduler.default_threshold) {
            return Err(RadarError::Config(format!(
                "NOTIFICATION_DEFAULT_THRESHOLD must be within 1..=100, got {}",
                self.scheduler.default_threshold
            )));
        }
        if self.connpass.page_size == 0 {
            return Err(RadarError::Config("CONNPASS_PAGE_SIZE must be positive".to_string()));
        }
        Ok(())
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  database:    max_connections={}", self.database.max_connections);
        tracing::info!(
            "  connpass:    url={}, interval={:?}, page_size={}, api_key={}",
            self.connpass.base_url,
            self.connpass.request_interval,
            self.connpass.page_size,
            if self.connpass.api_key.is_some() { "set" } else { "(none)" }
        );
        tracing::info!(
            "  discord:     api={}, bot_token={}",
            self.discord.api_base,
            if self.discord.bot_token.is_some() { "set" } else { "(none)" }
        );
        if let Some(url) = &self.webhook_url {
            let mut names: Vec<&str> = self.webhook_headers.keys().map(String::as_str).collect();
            names.sort_unstable();
            tracing::info!("  webhook:     {}, headers=[{}]", url, names.join(", "));
        }
        tracing::info!(
            "  scheduler:   poll={:?}, default_threshold={}",
            self.scheduler.poll_interval,
            self.scheduler.default_threshold
        );
        tracing::info!(
            "  retention:   snapshots={:?}, ledger={:?}, logs={:?}",
            self.scheduler.retention.snapshots,
            self.scheduler.retention.ledger,
            self.scheduler.retention.logs
        );
    }
}

// ── PostgreSQL ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_attempts: u32,
    pub connect_retry_interval: Duration,
}

impl DatabaseConfig {
    fn from_env_profiled(p: &str) -> Result<Self, RadarError> {
        Ok(Self {
            url: profiled_env_or(p, "DATABASE_URL", ""),
            max_connections: profiled_env_num(p, "DB_MAX_CONNECTIONS", 10)?,
            connect_attempts: profiled_env_num(p, "DB_CONNECT_ATTEMPTS", 10)?,
            connect_retry_interval: profiled_env_duration(p, "DB_CONNECT_RETRY_INTERVAL", "2s")?,
        })
    }
}

// ── connpass events API ───────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnpassConfig {
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Minimum gap between two outbound calls, process-wide.
    pub request_interval: Duration,
    pub page_size: u32,
    pub timeout: Duration,
}

impl ConnpassConfig {
    fn from_env_profiled(p: &str) -> Result<Self, RadarError> {
        Ok(Self {
            base_url: profiled_env_or(p, "CONNPASS_BASE_URL", "https://connpass.com/api/v2/events/"),
            api_key: profiled_env_opt(p, "CONNPASS_API_KEY"),
            request_interval: profiled_env_duration(p, "CONNPASS_REQUEST_INTERVAL", "1s")?,
            page_size: profiled_env_num(p, "CONNPASS_PAGE_SIZE", 20)?,
            timeout: profiled_env_duration(p, "CONNPASS_TIMEOUT", "10s")?,
        })
    }
}

// ── Discord ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    pub api_base: String,
    #[serde(skip_serializing)]
    pub bot_token: Option<String>,
}

impl DiscordConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            api_base: profiled_env_or(p, "DISCORD_API_BASE", "https://discord.com/api/v10"),
            bot_token: profiled_env_opt(p, "DISCORD_BOT_TOKEN"),
        }
    }
}

// ── Scheduler ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub poll_interval: Duration,
    /// Capacity percentage used by rules whose own threshold is 0.
    pub default_threshold: i32,
    pub retention: RetentionConfig,
}

impl SchedulerConfig {
    fn from_env_profiled(p: &str) -> Result<Self, RadarError> {
        Ok(Self {
            poll_interval: profiled_env_duration(p, "SCHEDULER_POLL_INTERVAL", "30m")?,
            default_threshold: profiled_env_num(p, "NOTIFICATION_DEFAULT_THRESHOLD", 80)?,
            retention: RetentionConfig::from_env_profiled(p)?,
        })
    }
}

/// How long each kind of history is kept before cleanup deletes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionConfig {
    pub snapshots: Duration,
    pub ledger: Duration,
    pub logs: Duration,
}

impl RetentionConfig {
    fn from_env_profiled(p: &str) -> Result<Self, RadarError> {
        Ok(Self {
            snapshots: profiled_env_duration(p, "SNAPSHOT_RETENTION", "14d")?,
            ledger: profiled_env_duration(p, "LEDGER_RETENTION", "14d")?,
            logs: profiled_env_duration(p, "LOG_RETENTION", "90d")?,
        })
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            snapshots: Duration::from_secs(14 * 86_400),
            ledger: Duration::from_secs(14 * 86_400),
            logs: Duration::from_secs(90 * 86_400),
        }
    }
}
