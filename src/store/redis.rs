use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::{parse_count, trim_stop, CallStore, StoreResult};

/// Opens a `ConnectionManager` that auto-reconnects on failure.
///
/// `ConnectionManager` is cheaply cloneable and every clone shares the same
/// multiplexed TCP connection, so one is enough for the whole service.
pub async fn connect(url: &str) -> StoreResult<ConnectionManager> {
    let client = redis::Client::open(url)?;
    let conn = ConnectionManager::new(client).await?;
    Ok(conn)
}

/// Redis-backed `CallStore`.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    pub async fn open(url: &str) -> StoreResult<Self> {
        Ok(Self::new(connect(url).await?))
    }
}

#[async_trait]
impl CallStore for RedisStore {
    async fn incr(&self, key: &str) -> StoreResult<i64> {
        let mut conn = self.conn.clone();
        Ok(conn.incr(key, 1i64).await?)
    }

    async fn get_count(&self, key: &str) -> StoreResult<Option<i64>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(key).await?;
        raw.map(|v| parse_count(key, &v)).transpose()
    }

    async fn zadd(&self, key: &str, score: i64, member: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.zadd(key, member, score).await?;
        Ok(())
    }

    async fn zcount(&self, key: &str, min: i64, max: i64) -> StoreResult<u64> {
        let mut conn = self.conn.clone();
        Ok(conn.zcount(key, min, max).await?)
    }

    async fn zrevrange_by_score(
        &self,
        key: &str,
        max: i64,
        min: i64,
        limit: usize,
    ) -> StoreResult<Vec<String>> {
        let mut conn = self.conn.clone();
        Ok(conn
            .zrevrangebyscore_limit(key, max, min, 0, limit as isize)
            .await?)
    }

    async fn zremrange_by_rank(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> StoreResult<u64> {
        let mut conn = self.conn.clone();
        Ok(conn.zremrangebyrank(key, start, stop).await?)
    }

    async fn del(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let pattern = format!("{}*", escape_glob(prefix));

        // SCAN instead of KEYS so a large keyspace never blocks the server
        let mut iter = conn.scan_match::<_, String>(pattern).await?;
        let mut keys = Vec::new();
        while let Some(key) = iter.next_item().await {
            keys.push(key);
        }
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn record_batch(
        &self,
        counter_key: &str,
        ledger_key: &str,
        timestamp_ms: i64,
        retain: usize,
    ) -> StoreResult<i64> {
        let stop = trim_stop(retain)?;
        let mut conn = self.conn.clone();
        let member = timestamp_ms.to_string();

        // MULTI … EXEC
        let (count,): (i64,) = redis::pipe()
            .atomic()
            .incr(counter_key, 1i64)
            .zadd(ledger_key, member, timestamp_ms)
            .ignore()
            .zremrangebyrank(ledger_key, 0, stop)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(count)
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

/// Escapes Redis glob metacharacters so `s` matches itself in `MATCH`.
pub fn escape_glob(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
