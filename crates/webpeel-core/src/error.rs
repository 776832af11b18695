use serde::Serialize;

/// The taxonomy every failure in this workspace maps to: client-side
/// validation, network-layer failure, deadline expiry, and bot-block
/// detection are each their own variant so callers can decide what to
/// retry and what to surface, rather than pattern-matching error strings.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Client-side validation: invalid URL, disallowed scheme, SSRF target,
    /// Host-header override, oversize URL/body, invalid option. Fatal, no
    /// retry. Surfaces as an HTTP 400-class failure to callers.
    #[error("invalid request: {0}")]
    Validation(String),
    /// Connect refused/reset, DNS failure, TLS handshake failure, incomplete
    /// response. Surfaces as HTTP 502/504; not retried automatically.
    #[error("network error: {0}")]
    Network(String),
    /// Per-rung, per-action, or queue deadline elapsed. Surfaces as HTTP 504.
    #[error("timed out: {0}")]
    Timeout(String),
    /// HTTP 403/503, a detected bot challenge, or a suspiciously small body.
    /// Recoverable by the escalator (advance one rung); surfaces only if the
    /// final rung also raises it. Surfaces as HTTP 403.
    #[error("blocked: {0}")]
    Blocked(String),
    /// In-flight operation observed cancellation.
    #[error("aborted: {0}")]
    Aborted(String),
    #[error("cache error: {0}")]
    Cache(String),
    #[error("not configured: {0}")]
    NotConfigured(String),
    #[error("not supported: {0}")]
    NotSupported(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// The taxonomy code used in the wire-visible `UserError.type` field.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(m) if m.to_ascii_lowercase().contains("ssrf") => "SSRF_BLOCKED",
            Error::Validation(_) => "INVALID_URL",
            Error::Network(_) => "NETWORK",
            Error::Timeout(_) => "TIMEOUT",
            Error::Blocked(_) => "BLOCKED",
            Error::Aborted(_) => "ABORTED",
            Error::Cache(_) => "INTERNAL",
            Error::NotConfigured(_) => "INTERNAL",
            Error::NotSupported(_) => "INTERNAL",
        }
    }

    /// True if the strategy escalator should advance to the next rung on
    /// this error, rather than surfacing it immediately.
    pub fn is_escalatable(&self) -> bool {
        matches!(self, Error::Blocked(_))
    }
}

/// Sanitize a message for display to callers: strip characters that could be
/// used to break out of a surrounding HTML/JSON context.
fn sanitize_message(msg: &str) -> String {
    msg.chars().filter(|c| !matches!(c, '<' | '>' | '"' | '\'')).collect()
}

/// The public, wire-visible failure shape returned to API callers.
#[derive(Debug, Clone, Serialize)]
pub struct UserError {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs: Option<String>,
    pub request_id: String,
}

impl UserError {
    pub fn from_error(err: &Error, request_id: impl Into<String>) -> Self {
        Self {
            kind: err.code(),
            message: sanitize_message(&err.to_string()),
            hint: default_hint(err),
            docs: None,
            request_id: request_id.into(),
        }
    }
}

fn default_hint(err: &Error) -> Option<String> {
    match err {
        Error::Blocked(_) => Some(
            "The target responded with a bot challenge or a block signal. \
             Retrying with `render=true` or `stealth=true` may help."
                .to_string(),
        ),
        Error::Timeout(_) => Some("Increase `timeout` or retry later.".to_string()),
        Error::Validation(m) if m.to_ascii_lowercase().contains("ssrf") => Some(
            "This URL resolves to a non-public address and cannot be fetched.".to_string(),
        ),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_angle_brackets_and_quotes() {
        let e = Error::Validation("bad <script>\"'</script> url".to_string());
        let u = UserError::from_error(&e, "req-1");
        assert!(!u.message.contains(['<', '>', '"', '\'']));
    }

    #[test]
    fn blocked_is_escalatable_others_are_not() {
        assert!(Error::Blocked("x".into()).is_escalatable());
        assert!(!Error::Network("x".into()).is_escalatable());
        assert!(!Error::Timeout("x".into()).is_escalatable());
        assert!(!Error::Validation("x".into()).is_escalatable());
    }

    #[test]
    fn ssrf_validation_gets_specific_code() {
        let e = Error::Validation("SSRF target rejected: loopback".to_string());
        assert_eq!(e.code(), "SSRF_BLOCKED");
    }
}
