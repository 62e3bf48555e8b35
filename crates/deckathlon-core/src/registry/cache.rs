// ── Query cache ──
//
// TTL cache of unwrapped query payloads, keyed by URL, method and the
// canonical form of the request payload. Expired entries are swept on
// every cached call rather than by a background timer.

use std::collections::HashMap;
use std::time::Duration;

use deckathlon_api::Method;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::time::Instant;

/// How long a query result stays cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    Seconds(u64),
    /// Until `cache_clear()`.
    Forever,
}

impl CachePolicy {
    fn expiry(self, now: Instant) -> Option<Instant> {
        match self {
            Self::Seconds(secs) => Some(now + Duration::from_secs(secs)),
            Self::Forever => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct CacheKey {
    url: String,
    method: Method,
    payload: String,
}

impl CacheKey {
    pub(crate) fn new(url: &str, method: Method, data: Option<&Value>) -> Self {
        Self {
            url: url.to_owned(),
            method,
            payload: data.map(canonical_json).unwrap_or_default(),
        }
    }
}

#[derive(Debug)]
struct CacheEntry {
    /// `None` never expires.
    expires: Option<Instant>,
    value: Value,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires.is_none_or(|at| at > now)
    }
}

#[derive(Debug, Default)]
pub(crate) struct QueryCache {
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl QueryCache {
    /// Drop expired entries, then return a live value for `key`.
    pub(crate) fn lookup(&self, key: &CacheKey) -> Option<Value> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        entries.retain(|_, entry| entry.is_live(now));
        entries.get(key).map(|entry| entry.value.clone())
    }

    pub(crate) fn store(&self, key: CacheKey, value: Value, policy: CachePolicy) {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        entries.retain(|_, entry| entry.is_live(now));
        entries.insert(
            key,
            CacheEntry {
                expires: policy.expiry(now),
                value,
            },
        );
    }

    pub(crate) fn clear(&self) {
        self.entries.lock().clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

/// JSON text with object keys sorted at every level, so payloads built
/// in different key orders share a cache slot.
fn canonical_json(value: &Value) -> String {
    fn sorted(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                Value::Object(
                    keys.into_iter()
                        .map(|k| (k.clone(), sorted(&map[k])))
                        .collect(),
                )
            }
            Value::Array(values) => Value::Array(values.iter().map(sorted).collect()),
            other => other.clone(),
        }
    }
    sorted(value).to_string()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn canonical_form_ignores_key_order() {
        let a = CacheKey::new("u", Method::Get, Some(&json!({"a": 1, "b": {"x": 1, "y": 2}})));
        let b = CacheKey::new("u", Method::Get, Some(&json!({"b": {"y": 2, "x": 1}, "a": 1})));
        assert_eq!(a, b);
        assert_ne!(a, CacheKey::new("u", Method::Post, Some(&json!({"a": 1}))));
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_and_are_swept() {
        let cache = QueryCache::default();
        let short = CacheKey::new("short", Method::Get, None);
        let forever = CacheKey::new("forever", Method::Get, None);

        cache.store(short.clone(), json!(1), CachePolicy::Seconds(5));
        cache.store(forever.clone(), json!(2), CachePolicy::Forever);
        assert_eq!(cache.lookup(&short), Some(json!(1)));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(cache.lookup(&short), None);
        assert_eq!(cache.lookup(&forever), Some(json!(2)));
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert_eq!(cache.lookup(&forever), None);
    }
}
