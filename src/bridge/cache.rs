//! Bounded cache of translation results.
//!
//! Keyed by (source protocol, target protocol, artifact kind, structural
//! fingerprint). Entries never expire -- a shape-level mapping does not
//! decay -- but the cache is capacity-bounded with least-recently-used
//! eviction. Process-local; only the bridge writes to it.

use std::collections::HashMap;

use serde_json::Value;

/// Default number of distinct (pair, shape) entries retained.
pub const DEFAULT_CAPACITY: usize = 256;

struct CacheEntry {
    value: Value,
    stored_at: String,
    last_used: u64,
}

/// LRU-bounded translation cache.
pub struct TranslationCache {
    capacity: usize,
    tick: u64,
    entries: HashMap<String, CacheEntry>,
    hits: u64,
    misses: u64,
}

/// Cache diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
}

impl TranslationCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            tick: 0,
            entries: HashMap::new(),
            hits: 0,
            misses: 0,
        }
    }

    /// Compose the cache key for a protocol pair, artifact kind, and
    /// structural fingerprint.
    pub fn key(source: &str, target: &str, kind: &str, fingerprint: &str) -> String {
        format!("{}>{}:{}:{}", source, target, kind, fingerprint)
    }

    pub fn get(&mut self, key: &str) -> Option<Value> {
        self.tick += 1;
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.last_used = self.tick;
                self.hits += 1;
                Some(entry.value.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn insert(&mut self, key: String, value: Value) {
        self.tick += 1;
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            self.evict_lru();
        }
        self.entries.insert(
            key,
            CacheEntry {
                value,
                stored_at: now_iso(),
                last_used: self.tick,
            },
        );
    }

    fn evict_lru(&mut self) {
        if let Some(oldest) = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.last_used)
            .map(|(k, _)| k.clone())
        {
            self.entries.remove(&oldest);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// When the entry under `key` was stored, if present.
    pub fn stored_at(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|e| e.stored_at.as_str())
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            capacity: self.capacity,
            hits: self.hits,
            misses: self.misses,
        }
    }
}

impl Default for TranslationCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hit_and_miss_accounting() {
        let mut cache = TranslationCache::new(4);
        let key = TranslationCache::key("A2A", "MCP", "message", "abc");

        assert!(cache.get(&key).is_none());
        cache.insert(key.clone(), json!({"type": "user_message"}));
        assert_eq!(cache.get(&key).unwrap(), json!({"type": "user_message"}));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_capacity_evicts_least_recently_used() {
        let mut cache = TranslationCache::new(2);
        cache.insert("a".to_string(), json!(1));
        cache.insert("b".to_string(), json!(2));

        // Touch "a" so "b" becomes the eviction candidate.
        cache.get("a");
        cache.insert("c".to_string(), json!(3));

        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn test_reinsert_overwrites_without_eviction() {
        let mut cache = TranslationCache::new(2);
        cache.insert("a".to_string(), json!(1));
        cache.insert("b".to_string(), json!(2));
        cache.insert("a".to_string(), json!(10));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a").unwrap(), json!(10));
        assert!(cache.get("b").is_some());
    }

    #[test]
    fn test_key_separates_pairs_and_kinds() {
        let m = TranslationCache::key("A2A", "MCP", "message", "f1");
        let t = TranslationCache::key("A2A", "MCP", "tool", "f1");
        let r = TranslationCache::key("MCP", "A2A", "message", "f1");
        assert_ne!(m, t);
        assert_ne!(m, r);
    }
}
