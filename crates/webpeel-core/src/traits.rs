use crate::model::{FetchMethod, FetchResult};
use crate::request::PeelRequest;
use crate::Result;
use serde::{Deserialize, Serialize};

/// A single rung of the strategy escalation ladder: one fetcher per
/// strategy, behind a small shared interface. An `Err(Error::Blocked(_))`
/// signals the escalator may advance to the next rung; any other `Err`
/// surfaces immediately, matching `Error::is_escalatable`.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    fn method(&self) -> FetchMethod;
    async fn fetch(&self, req: &PeelRequest) -> Result<FetchResult>;
}

/// Result of a domain-specific API shortcut.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainExtractResult {
    pub structured: serde_json::Value,
    pub clean_content: String,
}

impl DomainExtractResult {
    /// A shortcut counts as high-signal once its clean content exceeds a
    /// small threshold (~50 chars); below that it's treated as no shortcut.
    pub fn is_high_signal(&self) -> bool {
        self.clean_content.trim().chars().count() > 50
    }
}

/// A per-hostname-family domain API shortcut. Implementations must never
/// throw: any parse failure / 404-class marker / empty payload is
/// `Ok(None)`, so the escalator can treat it as "no shortcut" uniformly.
#[async_trait::async_trait]
pub trait DomainExtractor: Send + Sync {
    /// Stable family name, used for logging/metrics (e.g. "github", "hn").
    fn family(&self) -> &'static str;

    fn matches(&self, url: &url::Url) -> bool;

    async fn extract(&self, url: &url::Url, timeout: std::time::Duration) -> Option<DomainExtractResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_signal_threshold_is_exclusive_of_fifty() {
        let short = DomainExtractResult {
            structured: serde_json::json!({}),
            clean_content: "x".repeat(50),
        };
        assert!(!short.is_high_signal());
        let long = DomainExtractResult {
            structured: serde_json::json!({}),
            clean_content: "x".repeat(51),
        };
        assert!(long.is_high_signal());
    }
}
