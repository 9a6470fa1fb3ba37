//! Per-endpoint API call analytics on top of a `CallStore`.
//!
//! Each `(endpoint, method)` pair owns two keys: an all-time counter and a
//! ledger of call timestamps (sorted set, timestamp as both member and
//! score) trimmed to the newest `ledger_retention` entries. Windowed counts
//! are `ZCOUNT`s over the ledger, so they can never exceed what the ledger
//! still holds; a pair with more than `ledger_retention` calls inside a
//! window reports the retention limit for that window while `totalCalls`
//! keeps counting.
//!
//! Nothing here is transactional across keys unless `atomic_record` is on:
//! a stepwise record that fails after the increment leaves the counter one
//! ahead of the ledger.

pub mod clock;
pub mod keys;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat};
use serde::Serialize;

use crate::store::{trim_stop, CallStore, StoreError};

pub use clock::{Clock, ManualClock, SystemClock};

// ─── Configuration ───────────────────────────────────────────────

pub const DEFAULT_LEDGER_RETENTION: usize = 1000;
pub const DEFAULT_RECENT_LIMIT: usize = 10;

pub const MINUTE_MS: i64 = 60_000;
pub const HOUR_MS: i64 = 3_600_000;
pub const DAY_MS: i64 = 86_400_000;

#[derive(Debug, Clone)]
pub struct TrackerSettings {
    /// Newest ledger entries kept per `(endpoint, method)`.
    pub ledger_retention: usize,
    /// How many timestamps `query_endpoint` returns per method.
    pub recent_limit: usize,
    /// Run increment, insert and trim as one store transaction.
    pub atomic_record: bool,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            ledger_retention: DEFAULT_LEDGER_RETENTION,
            recent_limit: DEFAULT_RECENT_LIMIT,
            atomic_record: true,
        }
    }
}

// ─── Errors ──────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
}

pub type TrackerResult<T> = Result<T, TrackerError>;

// ─── Query results ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodStats {
    pub total_calls: u64,
    pub last_minute: u64,
    pub last_hour: u64,
    pub last_day: u64,
    /// Newest first, ISO-8601 UTC.
    pub recent_timestamps: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallTotal {
    pub total_calls: u64,
}

/// method → stats, only for methods with at least one call.
pub type EndpointStats = BTreeMap<String, MethodStats>;

/// endpoint → method → all-time total.
pub type CallSnapshot = BTreeMap<String, BTreeMap<String, CallTotal>>;

// ─── Tracker ─────────────────────────────────────────────────────

pub struct CallTracker {
    store: Arc<dyn CallStore>,
    clock: Arc<dyn Clock>,
    settings: TrackerSettings,
}

impl CallTracker {
    pub fn new(
        store: Arc<dyn CallStore>,
        clock: Arc<dyn Clock>,
        settings: TrackerSettings,
    ) -> Self {
        Self {
            store,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &TrackerSettings {
        &self.settings
    }

    pub async fn ping(&self) -> TrackerResult<()> {
        Ok(self.store.ping().await?)
    }

    /// Counts one call and returns the new all-time total for the pair.
    pub async fn record(&self, endpoint: &str, method: &str) -> TrackerResult<u64> {
        if endpoint.is_empty() {
            return Err(TrackerError::InvalidInput("endpoint must not be empty"));
        }
        if method.is_empty() {
            return Err(TrackerError::InvalidInput("method must not be empty"));
        }

        let counter = keys::counter_key(endpoint, method);
        let ledger = keys::ledger_key(endpoint, method);
        let now = self.clock.now_ms();
        // Checked before any write so a bad retention never half-applies
        let stop = trim_stop(self.settings.ledger_retention)?;
        let retain = self.settings.ledger_retention;

        let total = if self.settings.atomic_record {
            self.store
                .record_batch(&counter, &ledger, now, retain)
                .await?
        } else {
            let total = self.store.incr(&counter).await?;
            self.store.zadd(&ledger, now, &now.to_string()).await?;
            let evicted = self
                .store
                .zremrange_by_rank(&ledger, 0, stop)
                .await?;
            if evicted > 0 {
                tracing::trace!(%ledger, evicted, "ledger trimmed");
            }
            total
        };

        tracing::debug!(endpoint, method, total, "call recorded");
        Ok(total.max(0) as u64)
    }

    /// Per-method totals, windowed counts and recent timestamps.
    pub async fn query_endpoint(&self, endpoint: &str) -> TrackerResult<EndpointStats> {
        let now = self.clock.now_ms();
        let mut stats = EndpointStats::new();

        for method in self.recorded_methods(endpoint, false).await? {
            let counter = keys::counter_key(endpoint, &method);
            let total = match self.store.get_count(&counter).await? {
                Some(n) if n > 0 => n as u64,
                _ => continue,
            };

            let ledger = keys::ledger_key(endpoint, &method);
            let last_minute = self.store.zcount(&ledger, now - MINUTE_MS, now).await?;
            let last_hour = self.store.zcount(&ledger, now - HOUR_MS, now).await?;
            let last_day = self.store.zcount(&ledger, now - DAY_MS, now).await?;

            let recent_timestamps = self
                .store
                .zrevrange_by_score(&ledger, now, 0, self.settings.recent_limit)
                .await?
                .iter()
                .filter_map(|member| iso_timestamp(member))
                .collect();

            stats.insert(
                method,
                MethodStats {
                    total_calls: total,
                    last_minute,
                    last_hour,
                    last_day,
                    recent_timestamps,
                },
            );
        }

        Ok(stats)
    }

    /// All-time totals for every tracked endpoint.
    ///
    /// A plain scan: writes racing with it may or may not be reflected.
    pub async fn query_all(&self) -> TrackerResult<CallSnapshot> {
        let mut snapshot = CallSnapshot::new();

        for key in self.store.scan_prefix(keys::COUNTER_PREFIX).await? {
            if keys::is_ledger_key(&key) {
                continue;
            }
            let Some((endpoint, method)) = keys::parse_counter_key(&key) else {
                tracing::debug!(%key, "skipping unparseable counter key");
                continue;
            };
            // The key may have been cleared since the scan
            let total = match self.store.get_count(&key).await? {
                Some(n) if n > 0 => n as u64,
                _ => continue,
            };
            snapshot
                .entry(endpoint)
                .or_default()
                .insert(method, CallTotal { total_calls: total });
        }

        Ok(snapshot)
    }

    /// Deletes every counter and ledger of `endpoint`; returns how many
    /// keys actually existed.
    pub async fn clear(&self, endpoint: &str) -> TrackerResult<u64> {
        let mut deleted = 0;
        for method in self.recorded_methods(endpoint, true).await? {
            for key in [
                keys::counter_key(endpoint, &method),
                keys::ledger_key(endpoint, &method),
            ] {
                if self.store.del(&key).await? {
                    deleted += 1;
                }
            }
        }

        tracing::info!(endpoint, deleted, "endpoint analytics cleared");
        Ok(deleted)
    }

    /// Methods with a counter under `endpoint`, plus those that only have a
    /// ledger left when `include_ledgers` is set.
    async fn recorded_methods(
        &self,
        endpoint: &str,
        include_ledgers: bool,
    ) -> TrackerResult<BTreeSet<String>> {
        let counter_prefix = keys::endpoint_counter_prefix(endpoint);
        let counter_keys = self.store.scan_prefix(&counter_prefix).await?;
        let mut methods = keys::methods_under(&counter_prefix, &counter_keys);

        if include_ledgers {
            let ledger_prefix = keys::endpoint_ledger_prefix(endpoint);
            let ledger_keys = self.store.scan_prefix(&ledger_prefix).await?;
            methods.extend(keys::methods_under(&ledger_prefix, &ledger_keys));
        }

        Ok(methods)
    }
}

/// `"1714564800000"` → `"2024-05-01T12:00:00.000Z"`
fn iso_timestamp(member: &str) -> Option<String> {
    let ms: i64 = member.parse().ok()?;
    DateTime::from_timestamp_millis(ms).map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
}
