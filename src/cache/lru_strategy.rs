use std::num::NonZeroUsize;

use lru::LruCache;

use super::CacheStrategy;
use crate::value::Value;

/// Capacity-bounded cache built directly on the `lru` crate, storing decoded
/// `Value`s keyed by their cache key.
pub struct LruStrategy {
    inner: LruCache<String, Value>,
}

impl LruStrategy {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        LruStrategy {
            inner: LruCache::new(capacity),
        }
    }
}

impl CacheStrategy for LruStrategy {
    fn try_get(&mut self, key: &str) -> Option<Value> {
        self.inner.get(key).cloned()
    }

    fn put(&mut self, key: String, value: Value) {
        self.inner.put(key, value);
    }

    fn invalidate(&mut self, key: &str) {
        self.inner.pop(key);
    }

    fn invalidate_all(&mut self) {
        self.inner.clear();
    }

    fn contains(&mut self, key: &str) -> bool {
        self.inner.contains(key)
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_least_recently_used_at_capacity() {
        let mut cache = LruStrategy::new(2);
        cache.put("a".to_string(), Value::from("1"));
        cache.put("b".to_string(), Value::from("2"));
        cache.put("c".to_string(), Value::from("3"));
        assert!(!cache.contains("a"));
        assert!(cache.contains("b"));
        assert!(cache.contains("c"));
    }

    #[test]
    fn get_promotes_to_most_recently_used() {
        let mut cache = LruStrategy::new(2);
        cache.put("a".to_string(), Value::from("1"));
        cache.put("b".to_string(), Value::from("2"));
        // touch "a" so it is no longer the LRU entry
        let _ = cache.try_get("a");
        cache.put("c".to_string(), Value::from("3"));
        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
    }
}
