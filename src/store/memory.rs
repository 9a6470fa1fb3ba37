use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{trim_stop, CallStore, StoreError, StoreResult};

/// In-process `CallStore` with Redis semantics.
///
/// Used for tests and for running the service without a Redis server.
/// Every primitive takes the lock once, so each call is atomic on its own
/// exactly like the Redis command it mirrors.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

enum Entry {
    Counter(i64),
    /// member → score
    Sorted(HashMap<String, i64>),
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of members in the sorted set at `key` (`ZCARD`).
    pub fn zcard(&self, key: &str) -> usize {
        match self.entries.lock().get(key) {
            Some(Entry::Sorted(set)) => set.len(),
            _ => 0,
        }
    }

    /// `SET key value` for a counter.
    pub fn set_count(&self, key: &str, value: i64) {
        self.entries
            .lock()
            .insert(key.to_owned(), Entry::Counter(value));
    }

    pub fn key_count(&self) -> usize {
        self.entries.lock().len()
    }
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::Corrupt {
        key: key.to_owned(),
        reason: "operation against a key holding the wrong kind of value".into(),
    }
}

/// Members ordered the way Redis ranks them: by score, then by member.
fn ranked(set: &HashMap<String, i64>) -> Vec<(&String, i64)> {
    let mut members: Vec<_> = set.iter().map(|(m, s)| (m, *s)).collect();
    members.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));
    members
}

fn incr_locked(entries: &mut HashMap<String, Entry>, key: &str) -> StoreResult<i64> {
    let entry = entries.entry(key.to_owned()).or_insert(Entry::Counter(0));
    match entry {
        Entry::Counter(n) => {
            *n += 1;
            Ok(*n)
        }
        Entry::Sorted(_) => Err(wrong_type(key)),
    }
}

fn zadd_locked(
    entries: &mut HashMap<String, Entry>,
    key: &str,
    score: i64,
    member: &str,
) -> StoreResult<()> {
    let entry = entries
        .entry(key.to_owned())
        .or_insert_with(|| Entry::Sorted(HashMap::new()));
    match entry {
        Entry::Sorted(set) => {
            set.insert(member.to_owned(), score);
            Ok(())
        }
        Entry::Counter(_) => Err(wrong_type(key)),
    }
}

fn zremrange_locked(
    entries: &mut HashMap<String, Entry>,
    key: &str,
    start: isize,
    stop: isize,
) -> StoreResult<u64> {
    let set = match entries.get_mut(key) {
        None => return Ok(0),
        Some(Entry::Counter(_)) => return Err(wrong_type(key)),
        Some(Entry::Sorted(set)) => set,
    };

    let len = set.len() as isize;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if start > stop || start >= len {
        return Ok(0);
    }

    let doomed: Vec<String> = ranked(set)[start as usize..=stop as usize]
        .iter()
        .map(|(m, _)| (*m).clone())
        .collect();
    for member in &doomed {
        set.remove(member);
    }
    // Redis drops empty sorted sets
    if set.is_empty() {
        entries.remove(key);
    }
    Ok(doomed.len() as u64)
}

#[async_trait]
impl CallStore for MemoryStore {
    async fn incr(&self, key: &str) -> StoreResult<i64> {
        incr_locked(&mut self.entries.lock(), key)
    }

    async fn get_count(&self, key: &str) -> StoreResult<Option<i64>> {
        match self.entries.lock().get(key) {
            None => Ok(None),
            Some(Entry::Counter(n)) => Ok(Some(*n)),
            Some(Entry::Sorted(_)) => Err(wrong_type(key)),
        }
    }

    async fn zadd(&self, key: &str, score: i64, member: &str) -> StoreResult<()> {
        zadd_locked(&mut self.entries.lock(), key, score, member)
    }

    async fn zcount(&self, key: &str, min: i64, max: i64) -> StoreResult<u64> {
        match self.entries.lock().get(key) {
            None => Ok(0),
            Some(Entry::Counter(_)) => Err(wrong_type(key)),
            Some(Entry::Sorted(set)) => Ok(set
                .values()
                .filter(|s| (min..=max).contains(*s))
                .count() as u64),
        }
    }

    async fn zrevrange_by_score(
        &self,
        key: &str,
        max: i64,
        min: i64,
        limit: usize,
    ) -> StoreResult<Vec<String>> {
        match self.entries.lock().get(key) {
            None => Ok(Vec::new()),
            Some(Entry::Counter(_)) => Err(wrong_type(key)),
            Some(Entry::Sorted(set)) => Ok(ranked(set)
                .into_iter()
                .rev()
                .filter(|(_, s)| (min..=max).contains(s))
                .take(limit)
                .map(|(m, _)| m.clone())
                .collect()),
        }
    }

    async fn zremrange_by_rank(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> StoreResult<u64> {
        zremrange_locked(&mut self.entries.lock(), key, start, stop)
    }

    async fn del(&self, key: &str) -> StoreResult<bool> {
        Ok(self.entries.lock().remove(key).is_some())
    }

    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let mut keys: Vec<String> = self
            .entries
            .lock()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
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
        let mut entries = self.entries.lock();
        // Type-check both keys up front so a failure leaves nothing applied
        if matches!(entries.get(counter_key), Some(Entry::Sorted(_))) {
            return Err(wrong_type(counter_key));
        }
        if matches!(entries.get(ledger_key), Some(Entry::Counter(_))) {
            return Err(wrong_type(ledger_key));
        }

        let count = incr_locked(&mut entries, counter_key)?;
        zadd_locked(&mut entries, ledger_key, timestamp_ms, &timestamp_ms.to_string())?;
        zremrange_locked(&mut entries, ledger_key, 0, stop)?;
        Ok(count)
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn filled(key: &str, scores: impl IntoIterator<Item = i64>) -> MemoryStore {
        let store = MemoryStore::new();
        for s in scores {
            store.zadd(key, s, &s.to_string()).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn incr_creates_then_counts() {
        let store = MemoryStore::new();
        assert_eq!(store.get_count("c").await.unwrap(), None);
        assert_eq!(store.incr("c").await.unwrap(), 1);
        assert_eq!(store.incr("c").await.unwrap(), 2);
        assert_eq!(store.get_count("c").await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn zadd_same_member_updates_score() {
        let store = MemoryStore::new();
        store.zadd("z", 10, "a").await.unwrap();
        store.zadd("z", 20, "a").await.unwrap();
        assert_eq!(store.zcard("z"), 1);
        assert_eq!(store.zcount("z", 15, 25).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn zcount_bounds_are_inclusive() {
        let store = filled("z", [10, 20, 30]).await;
        assert_eq!(store.zcount("z", 10, 30).await.unwrap(), 3);
        assert_eq!(store.zcount("z", 11, 29).await.unwrap(), 1);
        assert_eq!(store.zcount("z", 30, 10).await.unwrap(), 0);
        assert_eq!(store.zcount("missing", 0, 100).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn zrevrange_is_descending_and_limited() {
        let store = filled("z", [10, 20, 30, 40]).await;
        let top = store.zrevrange_by_score("z", 35, 0, 2).await.unwrap();
        assert_eq!(top, vec!["30".to_string(), "20".to_string()]);
    }

    #[tokio::test]
    async fn negative_stop_keeps_the_newest_entries() {
        let store = filled("z", 1..=10).await;
        // ZREMRANGEBYRANK z 0 -4 keeps the three highest scores
        assert_eq!(store.zremrange_by_rank("z", 0, -4).await.unwrap(), 7);
        let left = store.zrevrange_by_score("z", 100, 0, 10).await.unwrap();
        assert_eq!(left, vec!["10", "9", "8"]);
    }

    #[tokio::test]
    async fn negative_stop_past_the_start_removes_nothing() {
        let store = filled("z", 1..=3).await;
        let stop = trim_stop(5).unwrap();
        assert_eq!(store.zremrange_by_rank("z", 0, stop).await.unwrap(), 0);
        assert_eq!(store.zcard("z"), 3);
    }

    #[tokio::test]
    async fn trimming_everything_drops_the_key() {
        let store = filled("z", 1..=3).await;
        assert_eq!(store.zremrange_by_rank("z", 0, -1).await.unwrap(), 3);
        assert_eq!(store.key_count(), 0);
    }

    #[tokio::test]
    async fn wrong_type_is_reported() {
        let store = MemoryStore::new();
        store.incr("k").await.unwrap();
        assert!(matches!(
            store.zadd("k", 1, "1").await,
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[tokio::test]
    async fn record_batch_trims_to_retention() {
        let store = MemoryStore::new();
        for ts in 1..=8 {
            store.record_batch("c", "l", ts, 5).await.unwrap();
        }
        assert_eq!(store.get_count("c").await.unwrap(), Some(8));
        assert_eq!(store.zcard("l"), 5);
        assert_eq!(store.zcount("l", 0, 3).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn record_batch_with_oversized_retention_applies_nothing() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.record_batch("c", "l", 1, usize::MAX).await,
            Err(StoreError::RetentionOutOfRange(usize::MAX))
        ));
        assert_eq!(store.key_count(), 0);
    }

    #[tokio::test]
    async fn scan_prefix_is_literal_and_sorted() {
        let store = MemoryStore::new();
        store.incr("api:calls:/b:GET").await.unwrap();
        store.incr("api:calls:/a:GET").await.unwrap();
        store.incr("other").await.unwrap();
        let keys = store.scan_prefix("api:calls:").await.unwrap();
        assert_eq!(keys, vec!["api:calls:/a:GET", "api:calls:/b:GET"]);
        assert!(store.scan_prefix("api:calls:*").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn del_reports_existence() {
        let store = MemoryStore::new();
        store.incr("k").await.unwrap();
        assert!(store.del("k").await.unwrap());
        assert!(!store.del("k").await.unwrap());
    }
}
