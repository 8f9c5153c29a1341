//! Response cache with a fixed TTL and a bounded entry count.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use hickory_proto::rr::Record;
use lru::LruCache;

/// How long a stored answer stays valid.
pub const DEFAULT_TTL: Duration = Duration::from_secs(10 * 60);

/// Maximum number of cached names.
pub const DEFAULT_CAPACITY: usize = 1000;

struct CacheEntry {
    answers: Arc<[Record]>,
    expires_at: Instant,
}

/// Caches answer records by query name.
///
/// Keys are the query name exactly as received. Expired entries are
/// removed when looked up; the LRU bound takes care of the rest.
pub struct ResponseCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_CAPACITY, DEFAULT_TTL)
    }

    pub fn with_limits(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Cached answers for `name`, if present and not expired.
    pub fn lookup(&self, name: &str) -> Option<Arc<[Record]>> {
        let Ok(mut entries) = self.entries.lock() else {
            return None;
        };
        let entry = entries.get(name)?;
        if Instant::now() < entry.expires_at {
            return Some(entry.answers.clone());
        }
        entries.pop(name);
        None
    }

    /// Store answers for `name`. Empty answer sets are ignored.
    pub fn store(&self, name: &str, answers: &[Record]) {
        if answers.is_empty() {
            return;
        }
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        entries.put(
            name.to_string(),
            CacheEntry {
                answers: Arc::from(answers),
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Drop every entry, expired or not.
    pub fn purge_all(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}
