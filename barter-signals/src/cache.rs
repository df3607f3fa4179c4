//! Time-to-live response cache for layers serving analytics over a request/response API.
//!
//! The analytics themselves are pure; the cache is an injected collaborator so callers decide
//! whether (and how long) results are reused.

use chrono::{DateTime, TimeDelta, Utc};
use fnv::FnvHashMap;
use itertools::Itertools;
use parking_lot::Mutex;
use tracing::debug;

/// Keyed store of previously computed responses.
pub trait ResponseCache<V> {
    /// Fresh value stored under `key`, if any.
    fn get(&self, key: &str) -> Option<V>;

    /// Store `value` under `key`, replacing any previous entry.
    fn set(&self, key: String, value: V);

    fn invalidate(&self, key: &str);
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: DateTime<Utc>,
}

/// [`ResponseCache`] whose entries expire `ttl` after they were written.
///
/// Expiry is evaluated against the wall clock at read time; stale entries are evicted lazily
/// by [`TtlCache::get_at`] or in bulk by [`TtlCache::purge_expired_at`].
#[derive(Debug)]
pub struct TtlCache<V> {
    ttl: TimeDelta,
    entries: Mutex<FnvHashMap<String, CacheEntry<V>>>,
}

impl<V> TtlCache<V>
where
    V: Clone,
{
    pub fn new(ttl: TimeDelta) -> Self {
        Self {
            ttl,
            entries: Mutex::new(FnvHashMap::default()),
        }
    }

    pub fn ttl(&self) -> TimeDelta {
        self.ttl
    }

    /// Value stored under `key` if it has not expired at `now`.
    pub fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<V> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if now < entry.expires_at => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                debug!(key, "evicted expired cache entry");
                None
            }
            None => None,
        }
    }

    /// Store `value` as written at `now`.
    pub fn set_at(&self, key: String, value: V, now: DateTime<Utc>) {
        let expires_at = now + self.ttl;
        self.entries
            .lock()
            .insert(key, CacheEntry { value, expires_at });
    }

    /// Drop every entry expired at `now`, returning how many were removed.
    pub fn purge_expired_at(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| now < entry.expires_at);
        let purged = before - entries.len();
        if purged > 0 {
            debug!(purged, remaining = entries.len(), "purged expired cache entries");
        }
        purged
    }

    /// Number of stored entries, including any not yet evicted after expiry.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl<V> ResponseCache<V> for TtlCache<V>
where
    V: Clone,
{
    fn get(&self, key: &str) -> Option<V> {
        self.get_at(key, Utc::now())
    }

    fn set(&self, key: String, value: V) {
        self.set_at(key, value, Utc::now())
    }

    fn invalidate(&self, key: &str) {
        self.entries.lock().remove(key);
    }
}

/// Derive a cache key from an endpoint and its query parameters.
///
/// Parameters are sorted by name so the key does not depend on argument order.
///
/// ```
/// use barter_signals::cache::cache_key;
///
/// let key = cache_key("open-interest", &[("symbol", "BTCUSDT"), ("interval", "1h")]);
/// assert_eq!(key, "open-interest?interval=1h&symbol=BTCUSDT");
/// ```
pub fn cache_key(endpoint: &str, params: &[(&str, &str)]) -> String {
    if params.is_empty() {
        return endpoint.to_string();
    }

    let query = params
        .iter()
        .sorted()
        .map(|(name, value)| format!("{name}={value}"))
        .join("&");

    format!("{endpoint}?{query}")
}
