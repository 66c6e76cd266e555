use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use relay_common::credential::Credential;
use std::collections::HashMap;

/// Normalized credentials keyed by their raw form.
///
/// Entries live for a fixed TTL from insertion; reads never extend it and an
/// expired entry is dropped by the read that finds it.
pub struct CredentialCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Credential, DateTime<Utc>)>>,
}

impl CredentialCache {
    pub fn new(ttl: std::time::Duration) -> Self {
        Self {
            ttl: Duration::from_std(ttl).unwrap_or(Duration::MAX),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<Credential> {
        self.get_at(key, Utc::now())
    }

    pub fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<Credential> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some((credential, stored_at)) if now - *stored_at < self.ttl => Some(credential.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: &str, credential: Credential) {
        self.insert_at(key, credential, Utc::now());
    }

    /// Expired entries are pruned before the new one goes in.
    pub fn insert_at(&self, key: &str, credential: Credential, now: DateTime<Utc>) {
        let mut entries = self.entries.lock();
        entries.retain(|_, (_, stored_at)| now - *stored_at < self.ttl);
        entries.insert(key.to_string(), (credential, now));
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hard_ttl() {
        let cache = CredentialCache::new(std::time::Duration::from_secs(600));
        let t0 = Utc::now();
        cache.insert_at("raw", Credential::new("id", "sig", "phrase"), t0);

        assert!(cache.get_at("raw", t0 + Duration::seconds(599)).is_some());
        // a hit does not refresh the entry
        assert!(cache.get_at("raw", t0 + Duration::seconds(600)).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_insert_prunes_expired_entries() {
        let cache = CredentialCache::new(std::time::Duration::from_secs(600));
        let t0 = Utc::now();
        cache.insert_at("first", Credential::new("a", "s", "p"), t0);
        cache.insert_at("second", Credential::new("b", "s", "p"), t0 + Duration::seconds(300));
        assert_eq!(cache.len(), 2);

        cache.insert_at("third", Credential::new("c", "s", "p"), t0 + Duration::seconds(700));
        assert_eq!(cache.len(), 2);
        assert!(cache.get_at("first", t0 + Duration::seconds(700)).is_none());
        assert!(cache.get_at("second", t0 + Duration::seconds(700)).is_some());
    }

    #[test]
    fn test_miss_on_unknown_key() {
        let cache = CredentialCache::new(std::time::Duration::from_secs(1));
        assert!(cache.get("nope").is_none());
    }
}
