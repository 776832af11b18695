//! The strategy escalator: drives a request through the ladder of cache
//! probe → domain-API shortcut → simple HTTP → browser → stealth browser →
//! TLS-spoofed sidecar, advancing only on an escalatable error (a
//! `Blocked` challenge/empty-shell signal), and falling back to a
//! domain-API retry if every rendering rung ultimately fails.
//!
//! Try-then-fall-through over an ordered list of fetchers, each wrapped so
//! its own error class decides whether to keep going.

use crate::cache::ResponseCache;
use crate::domain;
use crate::keys::request_cache_key;
use std::sync::Arc;
use std::time::Instant;
use webpeel_core::{DomainExtractResult, Error, FetchMethod, FetchResult, Fetcher, PeelRequest, PeelResult, Result};

pub struct Escalator {
    cache: Arc<ResponseCache>,
    simple: Arc<dyn Fetcher>,
    browser: Arc<dyn Fetcher>,
    stealth: Arc<dyn Fetcher>,
    tls: Arc<dyn Fetcher>,
    extractors: Vec<Box<dyn webpeel_core::DomainExtractor>>,
}

impl Escalator {
    pub fn new(
        cache: Arc<ResponseCache>,
        simple: Arc<dyn Fetcher>,
        browser: Arc<dyn Fetcher>,
        stealth: Arc<dyn Fetcher>,
        tls: Arc<dyn Fetcher>,
    ) -> Self {
        Self { cache, simple, browser, stealth, tls, extractors: domain::registered_extractors() }
    }

    fn extractor_for(&self, url: &url::Url) -> Option<&dyn webpeel_core::DomainExtractor> {
        domain::extractor_for(&self.extractors, url)
    }

    async fn try_domain_extract(&self, req: &PeelRequest) -> Option<DomainExtractResult> {
        let extractor = self.extractor_for(&req.url)?;
        let result = extractor.extract(&req.url, domain::EXTRACT_TIMEOUT).await?;
        result.is_high_signal().then_some(result)
    }

    fn domain_result(&self, req: &PeelRequest, extracted: DomainExtractResult, method: FetchMethod, timings_ms: webpeel_core::Timings) -> PeelResult {
        let fingerprint = webpeel_core::fingerprint::content_fingerprint(&extracted.clean_content);
        let tokens = crate::extract::budget::estimate_tokens(&extracted.clean_content);
        PeelResult {
            url: req.url.to_string(),
            title: None,
            content: extracted.clean_content,
            tokens,
            metadata: webpeel_core::PageMetadata::default(),
            domain_payload: Some(extracted.structured),
            extracted: None,
            screenshot_base64: None,
            fingerprint,
            timings_ms,
            method,
            image_urls: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Cache-maybe-populating fetch through one rung, recording the
    /// result into the cache on success unless the caller opted out.
    async fn run_rung(&self, fetcher: &Arc<dyn Fetcher>, req: &PeelRequest, cache_key: &str) -> Result<FetchResult> {
        let result = fetcher.fetch(req).await?;
        if req.options.cache.store_in_cache && !req.options.cache.no_cache {
            let ttl = req.options.cache.cache_ttl_s.map(std::time::Duration::from_secs);
            self.cache.set(cache_key, result.clone(), ttl);
        }
        Ok(result)
    }

    /// Distill a rung's raw output and, if the caller asked for inline-LLM
    /// extraction, run that stage too. The single place every rung's
    /// success path funnels through so LLM extract applies regardless of
    /// which rung answered the request.
    async fn finish(&self, fetch: &FetchResult, req: &PeelRequest) -> Result<PeelResult> {
        let mut result = crate::extract::distill(fetch, &req.options)?;
        if req.options.extract.is_some() {
            req.race(crate::extract::distill_with_llm_extract(&mut result, &req.options)).await??;
        }
        Ok(result)
    }

    /// Run the full ladder for one request.
    pub async fn fetch(&self, req: &PeelRequest) -> Result<PeelResult> {
        let started = Instant::now();
        let cache_key = request_cache_key(req);

        // Rung 1: cache probe. Raced against cancellation since an L2 (Redis)
        // lookup is a real network round-trip.
        if !req.options.cache.no_cache {
            if let Some(cached) = req.race(self.cache.get_async(&cache_key)).await? {
                return self.finish(&cached, req).await;
            }
        }

        // Rung 2: domain-API shortcut.
        if let Some(extracted) = self.try_domain_extract(req).await {
            let mut timings = webpeel_core::Timings::new();
            timings.insert("total_ms".to_string(), started.elapsed().as_millis());
            return Ok(self.domain_result(req, extracted, FetchMethod::DomainApi, timings));
        }

        let mut last_err: Option<Error> = None;

        // `cloaked` and `stealth` opt directly into their rung, bypassing
        // every cheaper rung (including the plain headless browser) rather
        // than merely skipping rung 3.
        if req.options.cloaked {
            if req.is_expired() {
                return Err(Error::Timeout("deadline exceeded before rung 6".to_string()));
            }
            return match self.run_rung(&self.tls, req, &cache_key).await {
                Ok(fetch) => self.finish(&fetch, req).await,
                Err(e) => Err(e),
            };
        }
        if req.options.stealth {
            if req.is_expired() {
                return Err(Error::Timeout("deadline exceeded before rung 5".to_string()));
            }
            return match self.run_rung(&self.stealth, req, &cache_key).await {
                Ok(fetch) => self.finish(&fetch, req).await,
                Err(e) => Err(e),
            };
        }

        let skip_to_browser = req.options.forces_render();

        // Rung 3: simple HTTP (skipped when render/actions/screenshot force rendering).
        if !skip_to_browser {
            if req.is_expired() {
                return Err(Error::Timeout("deadline exceeded before rung 3".to_string()));
            }
            match self.run_rung(&self.simple, req, &cache_key).await {
                Ok(fetch) => {
                    if Self::should_escalate_ok(&fetch) {
                        tracing::debug!(url = %req.url, "simple fetch returned an empty shell, escalating to browser");
                        last_err = Some(Error::Blocked("simple fetch returned an empty shell".to_string()));
                    } else {
                        return self.finish(&fetch, req).await;
                    }
                }
                Err(e) => {
                    if !e.is_escalatable() {
                        return Err(e);
                    }
                    tracing::debug!(url = %req.url, error = %e, "simple fetch blocked, escalating to browser");
                    last_err = Some(e);
                }
            }
        }

        // Rung 4: headless browser.
        if req.is_expired() {
            return Err(last_err.unwrap_or(Error::Timeout("deadline exceeded before rung 4".to_string())));
        }
        match self.run_rung(&self.browser, req, &cache_key).await {
            Ok(fetch) => {
                if Self::should_escalate_ok(&fetch) {
                    last_err = Some(Error::Blocked("browser render returned an empty shell".to_string()));
                } else {
                    return self.finish(&fetch, req).await;
                }
            }
            Err(e) => {
                if !e.is_escalatable() {
                    return Err(e);
                }
                tracing::debug!(url = %req.url, error = %e, "browser render blocked, escalating to stealth");
                last_err = Some(e);
            }
        }

        // Rung 5: stealth browser.
        if req.is_expired() {
            return Err(last_err.unwrap_or(Error::Timeout("deadline exceeded before rung 5".to_string())));
        }
        match self.run_rung(&self.stealth, req, &cache_key).await {
            Ok(fetch) => {
                if Self::should_escalate_ok(&fetch) {
                    last_err = Some(Error::Blocked("stealth render returned an empty shell".to_string()));
                } else {
                    return self.finish(&fetch, req).await;
                }
            }
            Err(e) => {
                if !e.is_escalatable() {
                    return Err(e);
                }
                tracing::debug!(url = %req.url, error = %e, "stealth render blocked, escalating to TLS sidecar");
                last_err = Some(e);
            }
        }

        // Rung 6: TLS-spoofed sidecar.
        if req.is_expired() {
            return Err(last_err.unwrap_or(Error::Timeout("deadline exceeded before rung 6".to_string())));
        }
        match self.run_rung(&self.tls, req, &cache_key).await {
            Ok(fetch) => return self.finish(&fetch, req).await,
            Err(e) => {
                last_err = Some(e);
            }
        }

        // Domain-API fallback: every rendering rung failed; retry the
        // extractor once more in case it succeeds via its own API surface.
        if let Some(extracted) = self.try_domain_extract(req).await {
            let mut timings = webpeel_core::Timings::new();
            timings.insert("total_ms".to_string(), started.elapsed().as_millis());
            return Ok(self.domain_result(req, extracted, FetchMethod::DomainApiFallback, timings));
        }

        Err(last_err.unwrap_or_else(|| Error::Network("all fetch strategies failed".to_string())))
    }

    /// A fetch that nominally succeeded but returned an empty or too-small
    /// HTML body should still escalate to the next rung.
    fn should_escalate_ok(fetch: &FetchResult) -> bool {
        let is_html = fetch.content_type.as_deref().map(|ct| ct.contains("html")).unwrap_or(false);
        is_html && fetch.bytes.len() < 100
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubFetcher {
        method: FetchMethod,
        outcome: std::sync::Mutex<Option<Result<FetchResult>>>,
    }

    #[async_trait::async_trait]
    impl Fetcher for StubFetcher {
        fn method(&self) -> FetchMethod {
            self.method
        }
        async fn fetch(&self, req: &PeelRequest) -> Result<FetchResult> {
            let mut guard = self.outcome.lock().unwrap();
            match guard.take() {
                Some(Ok(mut fetch)) => {
                    fetch.url = req.url.to_string();
                    Ok(fetch)
                }
                Some(Err(e)) => Err(e),
                None => Err(Error::Network("stub exhausted".to_string())),
            }
        }
    }

    fn html_result(body: &str, method: FetchMethod) -> FetchResult {
        FetchResult {
            url: String::new(),
            final_url: "https://example.com/".to_string(),
            status: 200,
            content_type: Some("text/html".to_string()),
            bytes: body.as_bytes().to_vec(),
            screenshot: None,
            headers: std::collections::BTreeMap::new(),
            method,
        }
    }

    fn build_escalator(
        simple: Result<FetchResult>,
        browser: Result<FetchResult>,
        stealth: Result<FetchResult>,
        tls: Result<FetchResult>,
    ) -> Escalator {
        Escalator::new(
            Arc::new(ResponseCache::new()),
            Arc::new(StubFetcher { method: FetchMethod::Simple, outcome: std::sync::Mutex::new(Some(simple)) }),
            Arc::new(StubFetcher { method: FetchMethod::Browser, outcome: std::sync::Mutex::new(Some(browser)) }),
            Arc::new(StubFetcher { method: FetchMethod::Stealth, outcome: std::sync::Mutex::new(Some(stealth)) }),
            Arc::new(StubFetcher { method: FetchMethod::Tls, outcome: std::sync::Mutex::new(Some(tls)) }),
        )
    }

    #[tokio::test]
    async fn simple_success_short_circuits_ladder() {
        let esc = build_escalator(
            Ok(html_result(&"hello world ".repeat(20), FetchMethod::Simple)),
            Err(Error::Network("unused".into())),
            Err(Error::Network("unused".into())),
            Err(Error::Network("unused".into())),
        );
        let req = PeelRequest::new("https://unmatched-host.example/", webpeel_core::PeelOptions::default()).unwrap();
        let result = esc.fetch(&req).await.unwrap();
        assert_eq!(result.method, FetchMethod::Simple);
    }

    #[tokio::test]
    async fn blocked_simple_escalates_to_browser() {
        let esc = build_escalator(
            Err(Error::Blocked("challenge".into())),
            Ok(html_result(&"rendered content here ".repeat(20), FetchMethod::Browser)),
            Err(Error::Network("unused".into())),
            Err(Error::Network("unused".into())),
        );
        let req = PeelRequest::new("https://unmatched-host.example/", webpeel_core::PeelOptions::default()).unwrap();
        let result = esc.fetch(&req).await.unwrap();
        assert_eq!(result.method, FetchMethod::Browser);
    }

    #[tokio::test]
    async fn network_error_does_not_escalate() {
        let esc = build_escalator(
            Err(Error::Network("dns failure".into())),
            Err(Error::Network("unused".into())),
            Err(Error::Network("unused".into())),
            Err(Error::Network("unused".into())),
        );
        let req = PeelRequest::new("https://unmatched-host.example/", webpeel_core::PeelOptions::default()).unwrap();
        let err = esc.fetch(&req).await.unwrap_err();
        assert!(matches!(err, Error::Network(_)));
    }

    #[tokio::test]
    async fn stealth_option_routes_directly_to_stealth_rung() {
        let esc = build_escalator(
            Ok(html_result("should never be used", FetchMethod::Simple)),
            Ok(html_result("should never be used either", FetchMethod::Browser)),
            Ok(html_result(&"stealth content here ".repeat(20), FetchMethod::Stealth)),
            Err(Error::Network("unused".into())),
        );
        let mut opts = webpeel_core::PeelOptions::default();
        opts.stealth = true;
        let req = PeelRequest::new("https://unmatched-host.example/", opts).unwrap();
        let result = esc.fetch(&req).await.unwrap();
        assert_eq!(result.method, FetchMethod::Stealth);
    }

    #[tokio::test]
    async fn cloaked_option_routes_directly_to_tls_rung() {
        let esc = build_escalator(
            Ok(html_result("should never be used", FetchMethod::Simple)),
            Ok(html_result("should never be used either", FetchMethod::Browser)),
            Ok(html_result("nor this one", FetchMethod::Stealth)),
            Ok(html_result(&"tls sidecar content here ".repeat(20), FetchMethod::Tls)),
        );
        let mut opts = webpeel_core::PeelOptions::default();
        opts.cloaked = true;
        let req = PeelRequest::new("https://unmatched-host.example/", opts).unwrap();
        let result = esc.fetch(&req).await.unwrap();
        assert_eq!(result.method, FetchMethod::Tls);
    }

    #[tokio::test]
    async fn render_option_skips_simple_rung() {
        let esc = build_escalator(
            Ok(html_result("should never be used", FetchMethod::Simple)),
            Ok(html_result(&"rendered content here ".repeat(20), FetchMethod::Browser)),
            Err(Error::Network("unused".into())),
            Err(Error::Network("unused".into())),
        );
        let mut opts = webpeel_core::PeelOptions::default();
        opts.render = true;
        let req = PeelRequest::new("https://unmatched-host.example/", opts).unwrap();
        let result = esc.fetch(&req).await.unwrap();
        assert_eq!(result.method, FetchMethod::Browser);
    }
}
