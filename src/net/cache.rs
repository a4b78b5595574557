use std::collections::HashMap;
use std::time::{Duration, Instant};

struct CacheEntry<V> {
    data: V,
    expires: Instant,
}

/// Small in-memory cache with per-entry expiry.
pub struct Cache<V> {
    entries: HashMap<String, CacheEntry<V>>,
    max_entries: usize,
    default_ttl: Duration,
}

impl<V: Clone> Cache<V> {
    pub fn new() -> Self {
        Self::with_limits(100, Duration::from_secs(300))
    }

    pub fn with_limits(max_entries: usize, default_ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            max_entries,
            default_ttl,
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    fn get_at(&self, key: &str, now: Instant) -> Option<V> {
        self.entries
            .get(key)
            .filter(|entry| entry.expires > now)
            .map(|entry| entry.data.clone())
    }

    pub fn insert(&mut self, key: String, data: V) {
        self.insert_with_ttl(key, data, self.default_ttl);
    }

    pub fn insert_with_ttl(&mut self, key: String, data: V, ttl: Duration) {
        if self.entries.len() >= self.max_entries {
            self.evict_expired();
        }
        // Still full of live entries: drop the one closest to expiry.
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(&key) {
            let soonest = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.expires)
                .map(|(k, _)| k.clone());
            if let Some(soonest) = soonest {
                self.entries.remove(&soonest);
            }
        }

        self.entries.insert(
            key,
            CacheEntry {
                data,
                expires: Instant::now() + ttl,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_expired(&mut self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.expires > now);
    }
}

impl<V: Clone> Default for Cache<V> {
    fn default() -> Self {
        Self::new()
    }
}
