pub mod memory;
pub mod redis;

use async_trait::async_trait;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

// ─── Errors ──────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redis: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt value at '{key}': {reason}")]
    Corrupt { key: String, reason: String },

    #[error("ledger retention {0} is out of range")]
    RetentionOutOfRange(usize),
}

pub type StoreResult<T> = Result<T, StoreError>;

// ─── Port ────────────────────────────────────────────────────────

/// The key-value primitives the call tracker is built on.
///
/// Each method maps onto one store round trip. Scores are milliseconds
/// since epoch; ranks follow Redis conventions (ascending by score,
/// negative indices count from the end).
#[async_trait]
pub trait CallStore: Send + Sync {
    /// `INCR key`
    async fn incr(&self, key: &str) -> StoreResult<i64>;

    /// `GET key`, parsed as an integer counter.
    async fn get_count(&self, key: &str) -> StoreResult<Option<i64>>;

    /// `ZADD key score member`
    async fn zadd(&self, key: &str, score: i64, member: &str) -> StoreResult<()>;

    /// `ZCOUNT key min max`, both bounds inclusive.
    async fn zcount(&self, key: &str, min: i64, max: i64) -> StoreResult<u64>;

    /// `ZREVRANGEBYSCORE key max min LIMIT 0 limit`
    async fn zrevrange_by_score(
        &self,
        key: &str,
        max: i64,
        min: i64,
        limit: usize,
    ) -> StoreResult<Vec<String>>;

    /// `ZREMRANGEBYRANK key start stop`
    async fn zremrange_by_rank(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> StoreResult<u64>;

    /// `DEL key`; true when the key existed.
    async fn del(&self, key: &str) -> StoreResult<bool>;

    /// Every key starting with `prefix`, taken literally.
    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<String>>;

    /// `INCR counter`, `ZADD ledger ts ts` and a trim down to the newest
    /// `retain` ledger entries, applied as one atomic unit.
    async fn record_batch(
        &self,
        counter_key: &str,
        ledger_key: &str,
        timestamp_ms: i64,
        retain: usize,
    ) -> StoreResult<i64>;

    async fn ping(&self) -> StoreResult<()>;
}

/// Stop index for `ZREMRANGEBYRANK 0 <stop>` that keeps the newest `retain`.
///
/// Fails instead of wrapping: a wrapped index would trim the ledger to
/// nothing on every record.
pub fn trim_stop(retain: usize) -> StoreResult<isize> {
    isize::try_from(retain)
        .ok()
        .and_then(|r| r.checked_neg())
        .and_then(|r| r.checked_sub(1))
        .ok_or(StoreError::RetentionOutOfRange(retain))
}

pub(crate) fn parse_count(key: &str, raw: &str) -> StoreResult<i64> {
    raw.parse().map_err(|_| StoreError::Corrupt {
        key: key.to_owned(),
        reason: format!("expected integer, found {raw:?}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trim_stop_keeps_the_newest_entries() {
        assert_eq!(trim_stop(1000).unwrap(), -1001);
        assert_eq!(trim_stop(0).unwrap(), -1);
    }

    #[test]
    fn trim_stop_rejects_retention_beyond_isize() {
        assert!(matches!(
            trim_stop(usize::MAX),
            Err(StoreError::RetentionOutOfRange(usize::MAX))
        ));
        assert!(trim_stop(1 << 63).is_err());
        assert!(trim_stop(isize::MAX as usize).is_err());
    }
}
