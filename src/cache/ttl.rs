use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::CacheStrategy;
use crate::value::Value;

struct Entry {
    value: Value,
    inserted_at: Instant,
}

/// Time-bounded cache: entries carry an insertion timestamp and are treated
/// as a miss (and lazily invalidated) once their age exceeds `ttl`.
pub struct TtlStrategy {
    map: HashMap<String, Entry>,
    ttl: Duration,
}

impl TtlStrategy {
    pub fn new(ttl: Duration) -> Self {
        TtlStrategy {
            map: HashMap::new(),
            ttl,
        }
    }

    fn is_stale(&self, entry: &Entry) -> bool {
        entry.inserted_at.elapsed() > self.ttl
    }
}

impl CacheStrategy for TtlStrategy {
    fn try_get(&mut self, key: &str) -> Option<Value> {
        let stale = match self.map.get(key) {
            Some(entry) => self.is_stale(entry),
            None => return None,
        };
        if stale {
            self.map.remove(key);
            return None;
        }
        self.map.get(key).map(|e| e.value.clone())
    }

    fn put(&mut self, key: String, value: Value) {
        self.map.insert(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    fn invalidate(&mut self, key: &str) {
        self.map.remove(key);
    }

    fn invalidate_all(&mut self) {
        self.map.clear();
    }

    fn contains(&mut self, key: &str) -> bool {
        self.try_get(key).is_some()
    }

    fn len(&self) -> usize {
        self.map.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn fresh_entry_hits() {
        let mut cache = TtlStrategy::new(Duration::from_secs(60));
        cache.put("a".to_string(), Value::from("1"));
        assert!(cache.try_get("a").is_some());
    }

    #[test]
    fn expired_entry_misses_and_is_evicted() {
        let mut cache = TtlStrategy::new(Duration::from_millis(10));
        cache.put("a".to_string(), Value::from("1"));
        sleep(Duration::from_millis(30));
        assert!(cache.try_get("a").is_none());
        assert_eq!(cache.len(), 0);
    }
}
