//! Shared resource wiring: one set of long-lived singletons (response
//! cache, validator cache, page pool) assembled into a fully wired
//! [`Escalator`] for the process's lifetime.
//!
//! A constructor that reads `REDIS_URL`-style environment to decide which
//! backing stores to build, rather than threading config through every
//! call site.

use crate::browser::{BrowserFetcher, PagePool};
use crate::cache::ResponseCache;
use crate::http_fetcher::SimpleHttpFetcher;
use crate::tls_sidecar::TlsSidecarFetcher;
use crate::validators::ValidatorCache;
use crate::Escalator;
use std::sync::Arc;

/// Environment variable enabling the Redis-backed L2 cache tier.
const REDIS_URL_ENV: &str = "REDIS_URL";

/// Everything a running gateway process needs to fetch, shared across
/// every request instead of rebuilt per call.
pub struct EnginePools {
    pub cache: Arc<ResponseCache>,
    pub validators: Arc<ValidatorCache>,
    pub pages: Arc<PagePool>,
    pub escalator: Arc<Escalator>,
}

impl EnginePools {
    /// Build the default production wiring: `REDIS_URL` (if set) enables
    /// the L2 cache tier, one shared `PagePool` backs both browser rungs,
    /// and the simple-HTTP rung shares the same cache handle the escalator
    /// writes through so 304 revalidation can be served from L1.
    pub fn new() -> Self {
        let cache = Arc::new(match std::env::var(REDIS_URL_ENV) {
            Ok(url) if !url.trim().is_empty() => ResponseCache::with_redis(&url),
            _ => ResponseCache::new(),
        });
        let validators = Arc::new(ValidatorCache::new());
        let pages = Arc::new(PagePool::new());

        let simple = Arc::new(SimpleHttpFetcher::with_cache(validators.clone(), cache.clone()));
        let browser = Arc::new(BrowserFetcher::headless(pages.clone()));
        let stealth = Arc::new(BrowserFetcher::stealth(pages.clone()));
        let tls = Arc::new(TlsSidecarFetcher::new());

        let escalator = Arc::new(Escalator::new(cache.clone(), simple, browser, stealth, tls));

        Self { cache, validators, pages, escalator }
    }
}

impl Default for EnginePools {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_wires_every_rung_without_panicking() {
        let pools = EnginePools::new();
        assert_eq!(pools.cache.len(), 0);
        assert_eq!(pools.pages.in_use(), 0);
    }
}
