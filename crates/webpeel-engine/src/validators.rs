//! Conditional-request validator cache: remembers `etag` / `last-modified`
//! per normalized URL so the simple HTTP fetcher can send
//! `If-None-Match` / `If-Modified-Since` on the next request.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

const CAPACITY: usize = 2000;

#[derive(Debug, Clone, Default)]
pub struct Validators {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl Validators {
    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }
}

pub struct ValidatorCache {
    entries: Mutex<LruCache<String, Validators>>,
}

impl ValidatorCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(LruCache::new(NonZeroUsize::new(CAPACITY).unwrap())),
        }
    }

    pub fn get(&self, normalized_url: &str) -> Option<Validators> {
        self.entries
            .lock()
            .expect("validator cache mutex poisoned")
            .get(normalized_url)
            .cloned()
    }

    /// Called on every 2xx response to remember conditional-request validators.
    pub fn record(&self, normalized_url: &str, validators: Validators) {
        if validators.is_empty() {
            return;
        }
        self.entries
            .lock()
            .expect("validator cache mutex poisoned")
            .put(normalized_url.to_string(), validators);
    }
}

impl Default for ValidatorCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_retrieves_validators() {
        let cache = ValidatorCache::new();
        cache.record(
            "https://example.com/",
            Validators { etag: Some("\"abc\"".into()), last_modified: None },
        );
        let got = cache.get("https://example.com/").unwrap();
        assert_eq!(got.etag.as_deref(), Some("\"abc\""));
    }

    #[test]
    fn empty_validators_are_not_recorded() {
        let cache = ValidatorCache::new();
        cache.record("https://example.com/", Validators::default());
        assert!(cache.get("https://example.com/").is_none());
    }

    #[test]
    fn miss_returns_none() {
        let cache = ValidatorCache::new();
        assert!(cache.get("https://nope.example/").is_none());
    }
}
