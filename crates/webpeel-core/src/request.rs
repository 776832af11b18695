use crate::options::PeelOptions;
use crate::{Error, Result};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// An immutable, normalized request.
///
/// `PeelRequest::new` performs URL parsing only; SSRF validation and
/// redirect re-validation live in `webpeel_engine::ssrf` (kept out of
/// `webpeel-core` so the core crate stays free of network/IP-range
/// concerns).
///
/// Carries two independent stop signals: `deadline`, a point in time
/// checked cheaply before starting new work, and `cancel`, a
/// `CancellationToken` raced against every in-flight I/O call so a caller
/// that drops interest in a request can abort it mid-suspension instead of
/// waiting for the current operation to finish on its own.
#[derive(Debug, Clone)]
pub struct PeelRequest {
    pub url: url::Url,
    pub raw_url: String,
    pub options: PeelOptions,
    deadline: Instant,
    cancel: CancellationToken,
}

impl PeelRequest {
    pub fn new(raw_url: &str, options: PeelOptions) -> Result<Self> {
        if raw_url.len() > 2048 {
            return Err(Error::Validation("url exceeds 2048 characters".to_string()));
        }
        if raw_url.chars().any(|c| c.is_control()) {
            return Err(Error::Validation("url contains control characters".to_string()));
        }
        let url = url::Url::parse(raw_url).map_err(|e| Error::Validation(format!("invalid url: {e}")))?;
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(Error::Validation(format!(
                    "unsupported scheme: {other} (only http/https are allowed)"
                )))
            }
        }
        if options.headers.keys().any(|k| k.eq_ignore_ascii_case("host")) {
            return Err(Error::Validation(
                "overriding the Host header is not allowed".to_string(),
            ));
        }
        let deadline = Instant::now() + options.timeout();
        Ok(Self {
            url,
            raw_url: raw_url.to_string(),
            options,
            deadline,
            cancel: CancellationToken::new(),
        })
    }

    /// Build a request that reports cancellation through `cancel` instead
    /// of an implicit fresh token, so a caller holding the request (a
    /// `fetch_many` fan-out, a server handler reacting to a dropped client
    /// connection) can cancel it from the outside.
    pub fn with_cancellation(raw_url: &str, options: PeelOptions, cancel: CancellationToken) -> Result<Self> {
        let mut req = Self::new(raw_url, options)?;
        req.cancel = cancel;
        Ok(req)
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// The token every suspension point in the fetch pipeline races
    /// against, independent of the deadline check.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Race `fut` against this request's cancellation token. Used at every
    /// await point a fetcher suspends on (DNS/TCP/TLS/HTTP read, browser
    /// navigation, action execution, sidecar IPC, L2 cache I/O) so a
    /// cancelled request aborts mid-suspension instead of running the
    /// current rung to completion first.
    pub async fn race<F, T>(&self, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = T>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Aborted("request was cancelled".to_string())),
            out = fut => Ok(out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_overlong_url() {
        let long = format!("https://example.com/{}", "a".repeat(2048));
        let err = PeelRequest::new(&long, PeelOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn rejects_non_http_scheme() {
        let err = PeelRequest::new("file:///etc/passwd", PeelOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn rejects_host_header_override() {
        let mut opts = PeelOptions::default();
        opts.headers.insert("Host".to_string(), "evil.example".to_string());
        let err = PeelRequest::new("https://example.com/", opts).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn accepts_plain_https_url() {
        let req = PeelRequest::new("https://example.com/path?q=1", PeelOptions::default()).unwrap();
        assert_eq!(req.url.host_str(), Some("example.com"));
    }

    #[tokio::test]
    async fn race_returns_aborted_once_cancelled() {
        let token = CancellationToken::new();
        let req = PeelRequest::with_cancellation("https://example.com/", PeelOptions::default(), token.clone()).unwrap();
        token.cancel();
        let err = req.race(std::future::pending::<()>()).await.unwrap_err();
        assert!(matches!(err, Error::Aborted(_)));
    }

    #[tokio::test]
    async fn race_passes_through_when_not_cancelled() {
        let req = PeelRequest::new("https://example.com/", PeelOptions::default()).unwrap();
        let out = req.race(async { 42 }).await.unwrap();
        assert_eq!(out, 42);
    }
}
