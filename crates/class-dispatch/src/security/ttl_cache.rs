use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
struct Expiring<V> {
    value: V,
    expires_at: DateTime<Utc>,
}

/// Keyed store whose entries carry their own expiry. Every update replaces one entry in place
/// under the map lock, so a concurrent [`TtlCache::sweep`] sees either the old or the new value.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    entries: Mutex<HashMap<K, Expiring<V>>>,
}

impl<K, V> Default for TtlCache<K, V> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, Expiring<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Live value for `key`; expired entries read as absent.
    pub fn get(&self, key: &K, now: DateTime<Utc>) -> Option<V> {
        self.lock()
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value.clone())
    }

    /// Atomically replaces the entry for `key` with whatever `apply` returns. `apply` sees
    /// `None` for a missing or expired entry; returning `None` removes the entry.
    pub fn update<F>(&self, key: K, now: DateTime<Utc>, apply: F) -> Option<V>
    where
        F: FnOnce(Option<&V>) -> Option<(V, DateTime<Utc>)>,
    {
        let mut entries = self.lock();
        let current = entries
            .get(&key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| &entry.value);

        match apply(current) {
            Some((value, expires_at)) => {
                entries.insert(
                    key,
                    Expiring {
                        value: value.clone(),
                        expires_at,
                    },
                );
                Some(value)
            }
            None => {
                entries.remove(&key);
                None
            }
        }
    }

    /// Drops every entry that expired at or before `now`, returning how many were removed.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
