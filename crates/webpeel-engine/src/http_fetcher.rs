//! Rung 3 of the escalator: a plain pooled HTTP/2 fetch with manual
//! redirect handling, SSRF re-validation per hop, conditional requests, and
//! a hard body-size cap.
//!
//! Streamed read with `max_bytes` truncation and a cache-meta headers
//! allowlist; redirects are followed manually hop-by-hop (rather than via
//! `reqwest::redirect::Policy::default()`) so each hop's target can be
//! re-validated against the SSRF policy.

use crate::cache::ResponseCache;
use crate::challenge::{detect_challenge, CONFIDENCE_THRESHOLD};
use crate::keys::request_cache_key;
use crate::ssrf;
use crate::validators::{ValidatorCache, Validators};
use futures_util::StreamExt;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use webpeel_core::{Error, FetchMethod, FetchResult, PeelRequest, Result};

const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;
const MAX_REDIRECTS: usize = 10;

const TEXT_CONTENT_TYPES: &[&str] = &[
    "text/html",
    "application/xhtml+xml",
    "text/plain",
    "text/markdown",
    "text/csv",
    "application/json",
    "text/xml",
    "application/xml",
    "application/rss+xml",
    "application/atom+xml",
    "application/javascript",
    "text/javascript",
    "text/css",
];

const BINARY_CONTENT_TYPES: &[&str] = &[
    "application/pdf",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

fn content_type_allowed(content_type: Option<&str>, url: &url::Url) -> bool {
    let base = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|s| s.trim().to_ascii_lowercase());
    let suffix_says_pdf = url.path().to_ascii_lowercase().ends_with(".pdf");
    let suffix_says_docx = url.path().to_ascii_lowercase().ends_with(".docx");

    match base.as_deref() {
        Some(ct) if TEXT_CONTENT_TYPES.contains(&ct) => true,
        Some(ct) if BINARY_CONTENT_TYPES.contains(&ct) => true,
        Some(_) if suffix_says_pdf || suffix_says_docx => true,
        None => suffix_says_pdf || suffix_says_docx,
        _ => false,
    }
}

pub struct SimpleHttpFetcher {
    client: reqwest::Client,
    validators: Arc<ValidatorCache>,
    /// Present when this fetcher sits behind an escalator with a response
    /// cache — needed to resolve a 304 into the previously-cached body.
    /// On 304, returns the L1-cached body tagged with status 304 if
    /// present; fails with `NetworkError` otherwise.
    cache: Option<Arc<ResponseCache>>,
}

impl SimpleHttpFetcher {
    pub fn new(validators: Arc<ValidatorCache>) -> Self {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .pool_max_idle_per_host(32)
            .build()
            .expect("failed to build reqwest client");
        Self { client, validators, cache: None }
    }

    pub fn with_cache(validators: Arc<ValidatorCache>, cache: Arc<ResponseCache>) -> Self {
        let mut this = Self::new(validators);
        this.cache = Some(cache);
        this
    }

    /// `origin_normalized` is always the *original* (pre-redirect) request
    /// URL's normalized form, even when `url` is a later redirect hop:
    /// validators are recorded and looked up per original URL, never
    /// substituted by the final redirect target.
    fn build_request(&self, url: &url::Url, req: &PeelRequest, origin_normalized: &str) -> reqwest::RequestBuilder {
        let profile = crate::ua::random_profile();
        let mut builder = self
            .client
            .get(url.as_str())
            .header("User-Agent", profile.user_agent.clone())
            .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .header("Accept-Language", "en-US,en;q=0.9");

        if !profile.sec_ch_ua.is_empty() {
            builder = builder
                .header("Sec-CH-UA", profile.sec_ch_ua.clone())
                .header("Sec-CH-UA-Mobile", profile.sec_ch_ua_mobile)
                .header("Sec-CH-UA-Platform", profile.sec_ch_ua_platform);
        }
        for (name, value) in crate::ua::sec_fetch_headers() {
            builder = builder.header(*name, *value);
        }
        for (k, v) in &req.options.headers {
            builder = builder.header(k.as_str(), v.as_str());
        }

        if let Some(validators) = self.validators.get(origin_normalized) {
            if let Some(etag) = &validators.etag {
                builder = builder.header("If-None-Match", etag.as_str());
            }
            if let Some(lm) = &validators.last_modified {
                builder = builder.header("If-Modified-Since", lm.as_str());
            }
        }
        builder
    }

    async fn read_body_capped(&self, resp: reqwest::Response) -> Result<(Vec<u8>, bool)> {
        let mut stream = resp.bytes_stream();
        let mut buf = Vec::new();
        let mut truncated = false;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::Network(format!("body read failed: {e}")))?;
            if buf.len() + chunk.len() > MAX_BODY_BYTES {
                let remaining = MAX_BODY_BYTES.saturating_sub(buf.len());
                buf.extend_from_slice(&chunk[..remaining.min(chunk.len())]);
                truncated = true;
                break;
            }
            buf.extend_from_slice(&chunk);
        }
        Ok((buf, truncated))
    }
}

#[async_trait::async_trait]
impl webpeel_core::Fetcher for SimpleHttpFetcher {
    fn method(&self) -> FetchMethod {
        FetchMethod::Simple
    }

    async fn fetch(&self, req: &PeelRequest) -> Result<FetchResult> {
        ssrf::validate_url(&req.url)?;

        let mut current = req.url.clone();
        let mut seen = HashSet::new();
        let mut hops = 0usize;
        let origin_normalized = webpeel_core::fingerprint::normalize_url(&req.url);

        let (resp, final_url) = loop {
            if hops > MAX_REDIRECTS {
                return Err(Error::Network(format!(
                    "redirect limit ({MAX_REDIRECTS}) exceeded"
                )));
            }
            if !seen.insert(current.to_string()) {
                return Err(Error::Network("redirect cycle detected".to_string()));
            }
            if hops > 0 {
                ssrf::validate_url(&current)?;
            }

            let remaining = req.remaining();
            if remaining.is_zero() {
                return Err(Error::Timeout("deadline exceeded before dispatch".to_string()));
            }

            let resp = req
                .race(
                    self.build_request(&current, req, &origin_normalized)
                        .timeout(remaining.min(Duration::from_secs(60)))
                        .send(),
                )
                .await?
                .map_err(|e| {
                    if e.is_timeout() {
                        Error::Timeout(format!("request to {current} timed out"))
                    } else {
                        Error::Network(format!("request to {current} failed: {e}"))
                    }
                })?;

            let status = resp.status();
            if status.is_redirection() {
                if let Some(location) = resp.headers().get(reqwest::header::LOCATION) {
                    let location = location
                        .to_str()
                        .map_err(|_| Error::Network("invalid Location header".to_string()))?;
                    let next = current
                        .join(location)
                        .map_err(|e| Error::Network(format!("invalid redirect target: {e}")))?;
                    current = next;
                    hops += 1;
                    continue;
                }
            }
            break (resp, current.clone());
        };

        let status = resp.status().as_u16();

        if status == 304 {
            if let Some(cache) = &self.cache {
                let key = request_cache_key(req);
                if let Some(mut cached) = cache.get_l1(&key) {
                    cached.status = 304;
                    return Ok(cached);
                }
            }
            return Err(Error::Network(
                "received 304 but no L1 entry was cached for this request".to_string(),
            ));
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        if !content_type_allowed(content_type.as_deref(), &final_url) {
            return Err(Error::Blocked(format!(
                "unsupported content-type for {final_url}: {content_type:?}"
            )));
        }

        let mut headers = BTreeMap::new();
        for (name, value) in resp.headers().iter() {
            if let Ok(v) = value.to_str() {
                headers.insert(name.as_str().to_ascii_lowercase(), v.to_string());
            }
        }

        if status == 403 || status == 503 {
            return Err(Error::Blocked(format!("upstream returned status {status}")));
        }

        let (bytes, _truncated) = req.race(self.read_body_capped(resp)).await??;

        let is_html = content_type
            .as_deref()
            .map(|ct| ct.contains("html"))
            .unwrap_or(true);
        if is_html {
            let text = String::from_utf8_lossy(&bytes);
            let detection = detect_challenge(&text, status);
            if detection.is_challenge && detection.confidence >= CONFIDENCE_THRESHOLD {
                return Err(Error::Blocked(format!(
                    "challenge detected: {} (confidence {:.2})",
                    detection.challenge_type.as_str(),
                    detection.confidence
                )));
            }
            if text.trim().len() < 100 {
                return Err(Error::Blocked("response body is suspiciously small".to_string()));
            }
        }

        if status >= 200 && status < 300 {
            self.validators.record(
                &origin_normalized,
                Validators {
                    etag: headers.get("etag").cloned(),
                    last_modified: headers.get("last-modified").cloned(),
                },
            );
        }

        Ok(FetchResult {
            url: req.url.to_string(),
            final_url: final_url.to_string(),
            status,
            content_type,
            bytes,
            screenshot: None,
            headers,
            method: FetchMethod::Simple,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Router};
    use webpeel_core::PeelOptions;

    async fn spawn_server(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn fetches_plain_html_successfully() {
        let router = Router::new().route(
            "/",
            get(|| async {
                (
                    [(axum::http::header::CONTENT_TYPE, "text/html")],
                    "<html><body>".to_string() + &"hello world ".repeat(20) + "</body></html>",
                )
            }),
        );
        let base = spawn_server(router).await;
        let fetcher = SimpleHttpFetcher::new(Arc::new(ValidatorCache::new()));
        let req = PeelRequest::new(&base, PeelOptions::default()).unwrap();
        let result = webpeel_core::Fetcher::fetch(&fetcher, &req).await.unwrap();
        assert_eq!(result.status, 200);
        assert!(result.text_lossy().contains("hello world"));
    }

    #[tokio::test]
    async fn rejects_unsafe_redirect_target() {
        let router = Router::new().route(
            "/",
            get(|| async {
                axum::response::Redirect::to("http://127.0.0.1:1/internal")
            }),
        );
        let base = spawn_server(router).await;
        let fetcher = SimpleHttpFetcher::new(Arc::new(ValidatorCache::new()));
        let req = PeelRequest::new(&base, PeelOptions::default()).unwrap();
        let err = webpeel_core::Fetcher::fetch(&fetcher, &req).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn small_body_is_blocked_for_escalation() {
        let router = Router::new().route(
            "/",
            get(|| async { ([(axum::http::header::CONTENT_TYPE, "text/html")], "<p>hi</p>") }),
        );
        let base = spawn_server(router).await;
        let fetcher = SimpleHttpFetcher::new(Arc::new(ValidatorCache::new()));
        let req = PeelRequest::new(&base, PeelOptions::default()).unwrap();
        let err = webpeel_core::Fetcher::fetch(&fetcher, &req).await.unwrap_err();
        assert!(err.is_escalatable());
    }

    #[tokio::test]
    async fn unsupported_content_type_is_blocked() {
        let router = Router::new().route(
            "/",
            get(|| async {
                (
                    [(axum::http::header::CONTENT_TYPE, "application/octet-stream")],
                    vec![0u8; 10],
                )
            }),
        );
        let base = spawn_server(router).await;
        let fetcher = SimpleHttpFetcher::new(Arc::new(ValidatorCache::new()));
        let req = PeelRequest::new(&base, PeelOptions::default()).unwrap();
        let err = webpeel_core::Fetcher::fetch(&fetcher, &req).await.unwrap_err();
        assert!(matches!(err, Error::Blocked(_)));
    }
}
