use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    pub data: Bytes,
    pub expiration: Option<Instant>,
}

impl Value {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expiration, Some(expiration) if now >= expiration)
    }
}

/// Expiring key/value map shared by every connection.
///
/// Expired entries are evicted lazily, on the first read that observes them.
#[derive(Debug, Default)]
pub struct KeyValueStore {
    entries: DashMap<Bytes, Value>,
}

impl KeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: Bytes, data: Bytes, time_to_live: Option<Duration>) {
        let expiration = time_to_live.map(|ttl| Instant::now() + ttl);
        self.entries.insert(key, Value { data, expiration });
    }

    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        let now = Instant::now();

        if let Some(value) = self.entries.get(key) {
            if !value.is_expired(now) {
                return Some(value.data.clone());
            }
        }

        self.entries
            .remove_if(key, |_, value| value.is_expired(now));

        None
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
