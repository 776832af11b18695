//! The single place that turns a `PeelRequest` into the cache-key
//! fingerprint used by both the response cache (rung 1) and the simple
//! HTTP fetcher's conditional-request 304 handling (rung 3) — kept in one
//! spot so the two never compute it differently.

use webpeel_core::fingerprint::{normalize_url, request_fingerprint};
use webpeel_core::PeelRequest;

/// Options that affect the *bytes* a fetcher returns (and therefore must be
/// part of the cache key) — format/selector/budget only affect distillation,
/// which runs after the cache layer, so they're deliberately excluded.
pub fn request_cache_key(req: &PeelRequest) -> String {
    let normalized = normalize_url(&req.url);
    let render = req.options.forces_render().to_string();
    let mut headers: Vec<(&str, &str)> = req
        .options
        .headers
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    headers.sort();
    let mut extra: Vec<(&str, &str)> = vec![("render", render.as_str())];
    extra.extend(headers);
    request_fingerprint(&normalized, &extra)
}

#[cfg(test)]
mod tests {
    use super::*;
    use webpeel_core::PeelOptions;

    #[test]
    fn same_normalized_url_and_options_produce_same_key() {
        let a = webpeel_core::PeelRequest::new("https://A.EXAMPLE/p?b=2&a=1", PeelOptions::default()).unwrap();
        let b = webpeel_core::PeelRequest::new("https://a.example/p?a=1&b=2#frag", PeelOptions::default()).unwrap();
        assert_eq!(request_cache_key(&a), request_cache_key(&b));
    }

    #[test]
    fn render_flag_changes_the_key() {
        let plain = webpeel_core::PeelRequest::new("https://a.example/", PeelOptions::default()).unwrap();
        let mut opts = PeelOptions::default();
        opts.render = true;
        let rendered = webpeel_core::PeelRequest::new("https://a.example/", opts).unwrap();
        assert_ne!(request_cache_key(&plain), request_cache_key(&rendered));
    }
}
