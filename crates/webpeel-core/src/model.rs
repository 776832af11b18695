use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which fetcher produced a `FetchResult`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchMethod {
    Simple,
    Browser,
    Stealth,
    Tls,
    DomainApi,
    DomainApiFallback,
}

impl FetchMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            FetchMethod::Simple => "simple",
            FetchMethod::Browser => "browser",
            FetchMethod::Stealth => "stealth",
            FetchMethod::Tls => "tls",
            FetchMethod::DomainApi => "domain-api",
            FetchMethod::DomainApiFallback => "domain-api-fallback",
        }
    }
}

/// Raw response from a single fetcher rung.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResult {
    pub url: String,
    pub final_url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
    pub screenshot: Option<Vec<u8>>,
    pub headers: BTreeMap<String, String>,
    pub method: FetchMethod,
}

impl FetchResult {
    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.bytes).to_string()
    }

    pub fn etag(&self) -> Option<&str> {
        self.headers.get("etag").map(|s| s.as_str())
    }

    pub fn last_modified(&self) -> Option<&str> {
        self.headers.get("last-modified").map(|s| s.as_str())
    }
}

/// Open-graph / schema.org style page metadata surfaced on `PeelResult`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageMetadata {
    pub og_title: Option<String>,
    pub og_description: Option<String>,
    pub og_image: Option<String>,
    pub og_type: Option<String>,
    pub schema_org_type: Option<String>,
    pub canonical_url: Option<String>,
    pub language: Option<String>,
}

/// Per-stage timings in milliseconds (cache lookup, network fetch, parse,
/// distill, ...), keyed by stage name. Kept as a BTreeMap (stable
/// iteration/serialization order).
pub type Timings = BTreeMap<String, u128>;

/// Public output of a `fetch()` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeelResult {
    pub url: String,
    pub title: Option<String>,
    pub content: String,
    pub tokens: u64,
    pub metadata: PageMetadata,
    pub domain_payload: Option<serde_json::Value>,
    pub extracted: Option<serde_json::Value>,
    pub screenshot_base64: Option<String>,
    pub fingerprint: String,
    pub timings_ms: Timings,
    pub method: FetchMethod,
    pub image_urls: Vec<String>,
    pub warnings: Vec<&'static str>,
}
