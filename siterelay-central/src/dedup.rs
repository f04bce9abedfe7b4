//! Bounded, time-windowed key set for alarm suppression.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;

/// Default number of keys remembered at once.
pub const DEFAULT_CAPACITY: usize = 50_000;

/// Default lifetime of a key after insertion.
pub const DEFAULT_TTL: Duration = Duration::from_secs(15);

/// A fixed-capacity set whose entries expire `ttl` after insertion.
///
/// When full, the least recently inserted key is evicted. Membership checks
/// never refresh an entry, so a key repeatedly seen inside its window still
/// expires on schedule.
#[derive(Debug)]
pub struct DedupCache {
    entries: Mutex<LruCache<String, Instant>>,
    ttl: Duration,
}

impl DedupCache {
    /// A cache holding at most `capacity` keys (at least one).
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Insert `key` unless a live entry for it exists.
    ///
    /// Returns `true` if the key was inserted (first sighting within the
    /// window) and `false` if it was already present. Check and insert
    /// happen under one lock, so concurrent callers with the same key see
    /// exactly one `true`.
    pub fn insert_if_absent(&self, key: &str) -> bool {
        self.insert_if_absent_at(key, Instant::now())
    }

    fn insert_if_absent_at(&self, key: &str, now: Instant) -> bool {
        let mut entries = self.entries.lock();

        if let Some(inserted) = entries.peek(key) {
            if now.saturating_duration_since(*inserted) < self.ttl {
                return false;
            }
        }

        entries.put(key.to_string(), now);
        true
    }

    /// Number of keys held, including expired ones not yet replaced.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_TTL)
    }
}
