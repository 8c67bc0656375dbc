use std::collections::HashMap;

use super::CacheStrategy;
use crate::value::Value;

/// A cache with no eviction: suitable when the working set is bounded by
/// caller discipline rather than by the cache itself.
pub struct UnboundedStrategy {
    map: HashMap<String, Value>,
}

impl UnboundedStrategy {
    pub fn new() -> Self {
        UnboundedStrategy {
            map: HashMap::new(),
        }
    }
}

impl Default for UnboundedStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStrategy for UnboundedStrategy {
    fn try_get(&mut self, key: &str) -> Option<Value> {
        self.map.get(key).cloned()
    }

    fn put(&mut self, key: String, value: Value) {
        self.map.insert(key, value);
    }

    fn invalidate(&mut self, key: &str) {
        self.map.remove(key);
    }

    fn invalidate_all(&mut self) {
        self.map.clear();
    }

    fn contains(&mut self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    fn len(&self) -> usize {
        self.map.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_evicts() {
        let mut cache = UnboundedStrategy::new();
        for i in 0..1000 {
            cache.put(format!("k{i}"), Value::from(i as i64));
        }
        assert_eq!(cache.len(), 1000);
        assert!(cache.contains("k0"));
        assert!(cache.contains("k999"));
    }

    #[test]
    fn invalidate_removes_single_entry() {
        let mut cache = UnboundedStrategy::new();
        cache.put("a".to_string(), Value::from("1"));
        cache.invalidate("a");
        assert!(!cache.contains("a"));
    }
}
