use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use relay_common::config::ExchangeConfig;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeEntry {
    pub payload: Value,
    pub stored_at: DateTime<Utc>,
}

/// Short-lived payloads keyed by a caller-chosen correlation id.
///
/// Once the store holds `max_entries`, each insert first evicts everything
/// older than `max_age`. Lookups never return an entry older than `max_age`,
/// whether or not it has been evicted yet.
pub struct ExchangeStore {
    entries: DashMap<String, ExchangeEntry>,
    max_entries: usize,
    max_age: Duration,
}

impl ExchangeStore {
    pub fn new(max_entries: usize, max_age: std::time::Duration) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries,
            max_age: Duration::from_std(max_age).unwrap_or(Duration::MAX),
        }
    }

    pub fn from_config(config: &ExchangeConfig) -> Self {
        Self::new(
            config.max_entries,
            std::time::Duration::from_secs(config.max_age_secs),
        )
    }

    pub fn insert(&self, id: String, payload: Value) {
        self.insert_at(id, payload, Utc::now());
    }

    pub fn insert_at(&self, id: String, payload: Value, now: DateTime<Utc>) {
        if self.entries.len() >= self.max_entries {
            let before = self.entries.len();
            self.entries.retain(|_, entry| now - entry.stored_at <= self.max_age);
            debug!(evicted = before - self.entries.len(), "pruned exchange store");
        }
        self.entries.insert(
            id,
            ExchangeEntry {
                payload,
                stored_at: now,
            },
        );
    }

    pub fn get(&self, id: &str) -> Option<ExchangeEntry> {
        self.get_at(id, Utc::now())
    }

    pub fn get_at(&self, id: &str, now: DateTime<Utc>) -> Option<ExchangeEntry> {
        self.entries
            .get(id)
            .filter(|entry| now - entry.stored_at <= self.max_age)
            .map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> ExchangeStore {
        ExchangeStore::new(2, std::time::Duration::from_secs(300))
    }

    #[test]
    fn test_stale_entries_miss() {
        let store = store();
        let t0 = Utc::now();
        store.insert_at("a".into(), json!("sig"), t0);

        assert_eq!(store.get_at("a", t0 + Duration::seconds(300)).unwrap().payload, json!("sig"));
        assert!(store.get_at("a", t0 + Duration::seconds(301)).is_none());
        assert!(store.get_at("missing", t0).is_none());
    }

    #[test]
    fn test_eviction_only_when_full() {
        let store = store();
        let t0 = Utc::now();
        store.insert_at("old".into(), json!(1), t0);
        // below the threshold nothing is pruned, even if stale
        store.insert_at("new".into(), json!(2), t0 + Duration::minutes(10));
        assert_eq!(store.len(), 2);

        store.insert_at("newest".into(), json!(3), t0 + Duration::minutes(11));
        assert_eq!(store.len(), 2);
        assert!(store.get_at("new", t0 + Duration::minutes(11)).is_some());
    }

    #[test]
    fn test_full_store_keeps_fresh_entries() {
        let store = store();
        let t0 = Utc::now();
        store.insert_at("a".into(), json!(1), t0);
        store.insert_at("b".into(), json!(2), t0);
        store.insert_at("c".into(), json!(3), t0 + Duration::seconds(10));
        assert_eq!(store.len(), 3);
    }
}
