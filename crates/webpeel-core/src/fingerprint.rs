//! Deterministic fingerprinting: request fingerprints (cache keys) and
//! content fingerprints (change-tracking), both SHA-256-based.
//!
//! Field-delimited hashing with explicit separators between fields, so
//! e.g. `None` vs `Some(0)` never collide.

use sha2::{Digest, Sha256};

/// Normalize a URL for cache-key purposes: lowercase host, strip default
/// port, empty path becomes `/`, strip fragment, sort query params.
pub fn normalize_url(url: &url::Url) -> String {
    let mut u = url.clone();
    let _ = u.set_fragment(None);

    if let Some(host) = u.host_str() {
        let lower = host.to_ascii_lowercase();
        let _ = u.set_host(Some(&lower));
    }

    let default_port = match u.scheme() {
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    };
    if u.port() == default_port {
        let _ = u.set_port(None);
    }

    if u.path().is_empty() {
        u.set_path("/");
    }

    let mut pairs: Vec<(String, String)> = u
        .query_pairs()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    pairs.sort();
    if pairs.is_empty() {
        u.set_query(None);
    } else {
        let mut qp = u.query_pairs_mut();
        qp.clear();
        for (k, v) in &pairs {
            qp.append_pair(k, v);
        }
        drop(qp);
    }

    u.to_string()
}

/// Cache-key fingerprint for a normalized URL + the options that affect the
/// fetched bytes (format/selector do not — they affect distillation, which
/// happens after the cache layer, so they are deliberately excluded).
pub fn request_fingerprint(normalized_url: &str, extra: &[(&str, &str)]) -> String {
    let mut h = Sha256::new();
    h.update(b"url:");
    h.update(normalized_url.as_bytes());
    for (k, v) in extra {
        h.update(b"\n");
        h.update(k.as_bytes());
        h.update(b"=");
        h.update(v.as_bytes());
    }
    hex::encode(h.finalize())
}

/// Content fingerprint for change-tracking: stable across repeated fetches
/// of byte-identical content, so callers can diff against a prior result
/// without comparing full bodies.
pub fn content_fingerprint(content: &str) -> String {
    let mut h = Sha256::new();
    h.update(content.as_bytes());
    hex::encode(h.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_lowercases_host_and_sorts_query() {
        let a = url::Url::parse("https://A.EXAMPLE/p?a=1&b=2").unwrap();
        let b = url::Url::parse("https://a.example/p?b=2&a=1#frag").unwrap();
        assert_eq!(normalize_url(&a), normalize_url(&b));
    }

    #[test]
    fn normalize_strips_default_port() {
        let a = url::Url::parse("https://example.com:443/x").unwrap();
        let b = url::Url::parse("https://example.com/x").unwrap();
        assert_eq!(normalize_url(&a), normalize_url(&b));
    }

    #[test]
    fn normalize_empty_path_becomes_slash() {
        let a = url::Url::parse("https://example.com").unwrap();
        assert!(normalize_url(&a).ends_with('/'));
    }

    #[test]
    fn content_fingerprint_is_stable() {
        let a = content_fingerprint("hello world");
        let b = content_fingerprint("hello world");
        assert_eq!(a, b);
        let c = content_fingerprint("hello world!");
        assert_ne!(a, c);
    }
}
