//! Two-tier response cache: a bounded in-process L1 plus an optional
//! shared L2, keyed by the normalized-request fingerprint from
//! `webpeel_core::fingerprint`.
//!
//! The allowlisted cache-meta headers concept lives alongside in-process
//! LRU + Redis storage. L1 sits behind `std::sync::Mutex`, not
//! `tokio::sync::Mutex`, since it's owned by a single logical actor and
//! its critical section never suspends.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use webpeel_core::FetchResult;

const L1_CAPACITY: usize = 1000;
const L1_DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);
const L2_DEFAULT_TTL: Duration = Duration::from_secs(15 * 60);
const L2_COOLDOWN: Duration = Duration::from_secs(30);
const L2_KEY_PREFIX: &str = "webpeel:response:";

struct CacheEntry {
    result: FetchResult,
    inserted_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_fresh(&self) -> bool {
        self.inserted_at.elapsed() < self.ttl
    }
}

/// L1-only view backing `ResponseCache`; split out so unit tests can drive
/// it without an (optional, feature-gated) L2 backend.
struct L1 {
    entries: Mutex<LruCache<String, CacheEntry>>,
}

impl L1 {
    fn new() -> Self {
        Self {
            entries: Mutex::new(LruCache::new(NonZeroUsize::new(L1_CAPACITY).unwrap())),
        }
    }

    fn get(&self, key: &str) -> Option<FetchResult> {
        let mut guard = self.entries.lock().expect("L1 cache mutex poisoned");
        match guard.get(key) {
            Some(entry) if entry.is_fresh() => Some(entry.result.clone()),
            Some(_) => {
                guard.pop(key);
                None
            }
            None => None,
        }
    }

    fn set(&self, key: String, result: FetchResult, ttl: Duration) {
        let mut guard = self.entries.lock().expect("L1 cache mutex poisoned");
        guard.put(
            key,
            CacheEntry { result, inserted_at: Instant::now(), ttl },
        );
    }

    fn len(&self) -> usize {
        self.entries.lock().expect("L1 cache mutex poisoned").len()
    }
}

#[cfg(feature = "redis-l2")]
mod l2 {
    use super::*;
    use base64::Engine as _;
    use std::sync::atomic::{AtomicI64, Ordering};

    pub struct L2 {
        client: redis::Client,
        /// Unix-millis timestamp before which L2 is skipped entirely: once
        /// L2 errors, it's marked unavailable for a 30s cooldown so no
        /// request ever fails because of L2.
        cooldown_until_ms: AtomicI64,
    }

    fn now_ms() -> i64 {
        // Avoided `SystemTime::now()` purity concerns don't apply here (this
        // is runtime cache bookkeeping, not workflow-script code); kept as a
        // thin wrapper so the cooldown check reads clearly at call sites.
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }

    impl L2 {
        pub fn connect(redis_url: &str) -> Option<Self> {
            redis::Client::open(redis_url).ok().map(|client| Self {
                client,
                cooldown_until_ms: AtomicI64::new(0),
            })
        }

        fn in_cooldown(&self) -> bool {
            now_ms() < self.cooldown_until_ms.load(Ordering::Relaxed)
        }

        fn enter_cooldown(&self) {
            self.cooldown_until_ms
                .store(now_ms() + L2_COOLDOWN.as_millis() as i64, Ordering::Relaxed);
        }

        pub async fn get(&self, key: &str) -> Option<FetchResult> {
            if self.in_cooldown() {
                return None;
            }
            let result: redis::RedisResult<Option<String>> = async {
                let mut conn = self.client.get_multiplexed_async_connection().await?;
                redis::cmd("GET")
                    .arg(format!("{L2_KEY_PREFIX}{key}"))
                    .query_async(&mut conn)
                    .await
            }
            .await;
            match result {
                Ok(Some(encoded)) => {
                    let decoded = base64::engine::general_purpose::STANDARD.decode(encoded).ok()?;
                    serde_json::from_slice(&decoded).ok()
                }
                Ok(None) => None,
                Err(_) => {
                    self.enter_cooldown();
                    None
                }
            }
        }

        pub async fn set(&self, key: String, result: FetchResult) {
            if self.in_cooldown() {
                return;
            }
            let Ok(bytes) = serde_json::to_vec(&result) else { return };
            let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
            let outcome: redis::RedisResult<()> = async {
                let mut conn = self.client.get_multiplexed_async_connection().await?;
                redis::cmd("SET")
                    .arg(format!("{L2_KEY_PREFIX}{key}"))
                    .arg(encoded)
                    .arg("EX")
                    .arg(L2_DEFAULT_TTL.as_secs())
                    .query_async(&mut conn)
                    .await
            }
            .await;
            if outcome.is_err() {
                self.enter_cooldown();
            }
        }
    }
}

pub struct ResponseCache {
    l1: L1,
    #[cfg(feature = "redis-l2")]
    l2: Option<std::sync::Arc<l2::L2>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self {
            l1: L1::new(),
            #[cfg(feature = "redis-l2")]
            l2: None,
        }
    }

    #[cfg(feature = "redis-l2")]
    pub fn with_redis(redis_url: &str) -> Self {
        Self {
            l1: L1::new(),
            l2: l2::L2::connect(redis_url).map(std::sync::Arc::new),
        }
    }

    /// Synchronous L1-only lookup, used where an L2 round-trip can't be
    /// awaited.
    pub fn get_l1(&self, key: &str) -> Option<FetchResult> {
        self.l1.get(key)
    }

    /// `getAsync`: L1 first, then L2 on miss, repopulating L1 on an L2 hit.
    pub async fn get_async(&self, key: &str) -> Option<FetchResult> {
        if let Some(hit) = self.l1.get(key) {
            return Some(hit);
        }
        #[cfg(feature = "redis-l2")]
        if let Some(l2) = &self.l2 {
            if let Some(hit) = l2.get(key).await {
                self.l1.set(key.to_string(), hit.clone(), L1_DEFAULT_TTL);
                return Some(hit);
            }
        }
        None
    }

    /// `set`: L1 populated synchronously; L2 write is fire-and-forget.
    pub fn set(&self, key: &str, result: FetchResult, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(L1_DEFAULT_TTL);
        self.l1.set(key.to_string(), result.clone(), ttl);
        #[cfg(feature = "redis-l2")]
        {
            if let Some(l2) = self.l2.as_ref() {
                // Spawned, not awaited: an L2 outage must never slow down or
                // fail the caller.
                let key = key.to_string();
                let l2 = std::sync::Arc::clone(l2);
                tokio::spawn(async move {
                    l2.set(key, result).await;
                });
            }
        }
    }

    pub fn len(&self) -> usize {
        self.l1.len()
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use webpeel_core::FetchMethod;
    use std::collections::BTreeMap;

    fn sample_result(url: &str) -> FetchResult {
        FetchResult {
            url: url.to_string(),
            final_url: url.to_string(),
            status: 200,
            content_type: Some("text/html".to_string()),
            bytes: b"<html></html>".to_vec(),
            screenshot: None,
            headers: BTreeMap::new(),
            method: FetchMethod::Simple,
        }
    }

    #[test]
    fn set_then_get_returns_same_entry() {
        let cache = ResponseCache::new();
        cache.set("k1", sample_result("https://a.example/"), None);
        let got = cache.get_l1("k1").expect("expected hit");
        assert_eq!(got.url, "https://a.example/");
    }

    #[test]
    fn miss_returns_none() {
        let cache = ResponseCache::new();
        assert!(cache.get_l1("missing").is_none());
    }

    #[test]
    fn expired_entry_is_evicted_on_read() {
        let cache = ResponseCache::new();
        cache.set("k1", sample_result("https://a.example/"), Some(Duration::from_millis(1)));
        std::thread::sleep(Duration::from_millis(10));
        assert!(cache.get_l1("k1").is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn fingerprint_equality_means_one_cache_entry() {
        use webpeel_core::fingerprint::{normalize_url, request_fingerprint};
        let a = url::Url::parse("https://a.example/p?b=2&a=1#x").unwrap();
        let b = url::Url::parse("https://A.EXAMPLE/p?a=1&b=2").unwrap();
        let key_a = request_fingerprint(&normalize_url(&a), &[]);
        let key_b = request_fingerprint(&normalize_url(&b), &[]);
        assert_eq!(key_a, key_b);

        let cache = ResponseCache::new();
        cache.set(&key_a, sample_result("https://a.example/p?a=1&b=2"), None);
        assert!(cache.get_l1(&key_b).is_some());
        assert_eq!(cache.len(), 1);
    }
}
