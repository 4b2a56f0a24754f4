//! Runtime configuration read from the environment
//!
//! `.env` is loaded by `main` before [`Config::from_env`] runs. Every value
//! has a default, so an empty environment gives a working local setup.

use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct Config {
    /// Server port number
    pub port: u16,

    /// Path to the database file
    pub database_url: String,

    /// Prefix of every short URL handed out, without trailing slash
    pub public_base_url: String,

    /// Expected `Authorization` header on `/api` routes; `None` disables the check
    pub authorization: Option<String>,

    /// Size of the runtime worker pool
    pub worker_threads: usize,

    /// Capacity of the reachability and QR queues
    pub queue_capacity: usize,

    /// Pause between runs of the probe, QR and ranking workers
    pub worker_delay: Duration,

    /// Pause between runs of the reachability refresh scheduler
    pub refresh_delay: Duration,

    /// Age after which a reachability result is probed again
    pub staleness: Duration,

    /// Timeout for a single outbound probe or oracle request
    pub probe_timeout: Duration,

    /// Google Safe Browsing API key
    pub safe_browsing_key: Option<String>,

    /// Hosts classified unsafe when no Safe Browsing key is configured
    pub safety_blocklist: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            database_url: "data.db".to_string(),
            public_base_url: "http://localhost:8080".to_string(),
            authorization: None,
            worker_threads: 20,
            queue_capacity: 1000,
            worker_delay: Duration::from_millis(500),
            refresh_delay: Duration::from_millis(5000),
            staleness: Duration::from_secs(5),
            probe_timeout: Duration::from_millis(2000),
            safe_browsing_key: None,
            safety_blocklist: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; `from_env` uses the process environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let text = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = parse_or(&lookup, "PORT", defaults.port);
        let public_base_url = text("PUBLIC_BASE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| format!("http://localhost:{}", port));

        Self {
            port,
            database_url: text("DATABASE_URL").unwrap_or(defaults.database_url),
            public_base_url,
            authorization: text("AUTHORIZATION"),
            worker_threads: parse_or(&lookup, "WORKER_THREADS", defaults.worker_threads).max(1),
            queue_capacity: parse_or(&lookup, "QUEUE_CAPACITY", defaults.queue_capacity).max(1),
            worker_delay: Duration::from_millis(parse_or(&lookup, "WORKER_DELAY_MS", 500)),
            refresh_delay: Duration::from_millis(parse_or(&lookup, "REFRESH_DELAY_MS", 5000)),
            staleness: Duration::from_secs(parse_or(&lookup, "STALENESS_SECS", 5)),
            probe_timeout: Duration::from_millis(parse_or(&lookup, "PROBE_TIMEOUT_MS", 2000)),
            safe_browsing_key: text("SAFE_BROWSING_KEY"),
            safety_blocklist: text("SAFETY_BLOCKLIST")
                .map(|list| list.split(',').map(|h| h.trim().to_string()).filter(|h| !h.is_empty()).collect())
                .unwrap_or_default(),
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Copy + std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{}={:?} is not valid, using {}", key, raw, default);
            default
        }),
        None => default,
    }
}
