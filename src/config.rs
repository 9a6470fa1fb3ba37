use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context};

use crate::tracker::{TrackerSettings, DEFAULT_LEDGER_RETENTION, DEFAULT_RECENT_LIMIT};

/// Largest accepted `ANALYTICS_LEDGER_RETENTION`.
pub const MAX_LEDGER_RETENTION: usize = 10_000_000;

/// Which `CallStore` backs the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Redis,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" | "mem" => Ok(Self::Memory),
            other => bail!("unknown store backend {other:?} (expected redis or memory)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: String,
    pub store: StoreBackend,
    pub redis_url: String,
    pub ledger_retention: usize,
    pub recent_limit: usize,
    pub atomic_record: bool,
    /// Deadline applied to every tracker call made on behalf of a request.
    pub store_timeout: Duration,
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:3000".to_string(),
            store: StoreBackend::Redis,
            redis_url: "redis://127.0.0.1:6379/".to_string(),
            ledger_retention: DEFAULT_LEDGER_RETENTION,
            recent_limit: DEFAULT_RECENT_LIMIT,
            atomic_record: true,
            store_timeout: Duration::from_millis(2_000),
            debug: false,
        }
    }
}

impl Config {
    pub fn tracker_settings(&self) -> TrackerSettings {
        TrackerSettings {
            ledger_retention: self.ledger_retention,
            recent_limit: self.recent_limit,
            atomic_record: self.atomic_record,
        }
    }

    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub fn log_filter(&self) -> &'static str {
        if self.debug {
            "call_analytics=debug"
        } else {
            "call_analytics=info"
        }
    }

    /// Builds a config from `lookup`, falling back to defaults for unset keys.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let listen_addr = lookup("ANALYTICS_LISTEN_ADDR").unwrap_or(defaults.listen_addr);
        let redis_url = lookup("ANALYTICS_REDIS_URL").unwrap_or(defaults.redis_url);

        let store = match lookup("ANALYTICS_STORE") {
            Some(v) => v.parse()?,
            None => defaults.store,
        };

        let ledger_retention = parse_or(
            &lookup,
            "ANALYTICS_LEDGER_RETENTION",
            defaults.ledger_retention,
        )?;
        if !(1..=MAX_LEDGER_RETENTION).contains(&ledger_retention) {
            bail!("ANALYTICS_LEDGER_RETENTION must be between 1 and {MAX_LEDGER_RETENTION}");
        }
        let recent_limit = parse_or(&lookup, "ANALYTICS_RECENT_LIMIT", defaults.recent_limit)?;

        let atomic_record = lookup("ANALYTICS_ATOMIC_RECORD")
            .map(|v| flag(&v))
            .unwrap_or(defaults.atomic_record);

        let timeout_ms: u64 = parse_or(
            &lookup,
            "ANALYTICS_STORE_TIMEOUT_MS",
            defaults.store_timeout.as_millis() as u64,
        )?;

        let debug = lookup("DEBUG").is_some();

        Ok(Self {
            listen_addr,
            store,
            redis_url,
            ledger_retention,
            recent_limit,
            atomic_record,
            store_timeout: Duration::from_millis(timeout_ms),
            debug,
        })
    }
}

pub fn load_config() -> anyhow::Result<Config> {
    Config::from_lookup(|key| std::env::var(key).ok())
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        None => Ok(default),
    }
}

fn flag(v: &str) -> bool {
    v == "1" || v.eq_ignore_ascii_case("true")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> anyhow::Result<Config> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn test_defaults_when_unset() {
        let cfg = from_pairs(&[]).unwrap();
        assert_eq!(cfg.listen_addr, "0.0.0.0:3000");
        assert_eq!(cfg.store, StoreBackend::Redis);
        assert_eq!(cfg.ledger_retention, 1000);
        assert_eq!(cfg.recent_limit, 10);
        assert!(cfg.atomic_record);
        assert_eq!(cfg.store_timeout, Duration::from_secs(2));
        assert!(!cfg.debug);
    }

    #[test]
    fn test_overrides() {
        let cfg = from_pairs(&[
            ("ANALYTICS_STORE", "memory"),
            ("ANALYTICS_LEDGER_RETENTION", "50"),
            ("ANALYTICS_ATOMIC_RECORD", "false"),
            ("ANALYTICS_STORE_TIMEOUT_MS", "250"),
            ("DEBUG", "1"),
        ])
        .unwrap();
        assert_eq!(cfg.store, StoreBackend::Memory);
        assert_eq!(cfg.tracker_settings().ledger_retention, 50);
        assert!(!cfg.tracker_settings().atomic_record);
        assert_eq!(cfg.store_timeout, Duration::from_millis(250));
        assert!(cfg.debug);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(from_pairs(&[("ANALYTICS_STORE", "postgres")]).is_err());
        assert!(from_pairs(&[("ANALYTICS_LEDGER_RETENTION", "lots")]).is_err());
        assert!(from_pairs(&[("ANALYTICS_LEDGER_RETENTION", "0")]).is_err());
    }

    #[test]
    fn test_log_filter_names_only_this_crate() {
        assert_eq!(Config::default().log_filter(), "call_analytics=info");
        let cfg = from_pairs(&[("DEBUG", "1")]).unwrap();
        assert_eq!(cfg.log_filter(), "call_analytics=debug");
    }

    #[test]
    fn test_bounds_ledger_retention() {
        let max = MAX_LEDGER_RETENTION.to_string();
        let over = (MAX_LEDGER_RETENTION + 1).to_string();
        let huge = usize::MAX.to_string();

        let cfg = from_pairs(&[("ANALYTICS_LEDGER_RETENTION", max.as_str())]).unwrap();
        assert_eq!(cfg.ledger_retention, MAX_LEDGER_RETENTION);
        assert!(from_pairs(&[("ANALYTICS_LEDGER_RETENTION", over.as_str())]).is_err());
        assert!(from_pairs(&[("ANALYTICS_LEDGER_RETENTION", huge.as_str())]).is_err());
        assert!(from_pairs(&[("ANALYTICS_LEDGER_RETENTION", "9223372036854775808")]).is_err());
    }
}
