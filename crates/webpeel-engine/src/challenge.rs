//! Bot-challenge classification: detects known challenge pages and reports
//! them with the same warning vocabulary used elsewhere in the envelope
//! (`blocked_by_js_challenge`, `main_content_low_signal`).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeType {
    EmptyShell,
    Cloudflare,
    PerimeterX,
    DataDome,
    Captcha,
    Unknown,
}

impl ChallengeType {
    pub fn as_str(self) -> &'static str {
        match self {
            ChallengeType::EmptyShell => "empty-shell",
            ChallengeType::Cloudflare => "cloudflare",
            ChallengeType::PerimeterX => "perimeterx",
            ChallengeType::DataDome => "datadome",
            ChallengeType::Captcha => "captcha",
            ChallengeType::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ChallengeDetection {
    pub is_challenge: bool,
    pub challenge_type: ChallengeType,
    pub confidence: f32,
}

/// Confidence at/above which the escalator treats a non-empty-shell
/// challenge as a hard `BlockedError` rather than a soft signal.
pub const CONFIDENCE_THRESHOLD: f32 = 0.6;

const MIN_BODY_LEN_FOR_REAL_PAGE: usize = 100;

struct Marker {
    needle: &'static str,
    challenge_type: ChallengeType,
    confidence: f32,
}

const MARKERS: &[Marker] = &[
    Marker { needle: "cf-browser-verification", challenge_type: ChallengeType::Cloudflare, confidence: 0.95 },
    Marker { needle: "cf-chl", challenge_type: ChallengeType::Cloudflare, confidence: 0.9 },
    Marker { needle: "just a moment", challenge_type: ChallengeType::Cloudflare, confidence: 0.85 },
    Marker { needle: "checking your browser", challenge_type: ChallengeType::Cloudflare, confidence: 0.85 },
    Marker { needle: "_px-cdn", challenge_type: ChallengeType::PerimeterX, confidence: 0.9 },
    Marker { needle: "perimeterx", challenge_type: ChallengeType::PerimeterX, confidence: 0.85 },
    Marker { needle: "px-captcha", challenge_type: ChallengeType::PerimeterX, confidence: 0.9 },
    Marker { needle: "datadome", challenge_type: ChallengeType::DataDome, confidence: 0.9 },
    Marker { needle: "geo.captcha-delivery.com", challenge_type: ChallengeType::DataDome, confidence: 0.9 },
    Marker { needle: "hcaptcha.com", challenge_type: ChallengeType::Captcha, confidence: 0.8 },
    Marker { needle: "recaptcha", challenge_type: ChallengeType::Captcha, confidence: 0.75 },
    Marker { needle: "g-recaptcha", challenge_type: ChallengeType::Captcha, confidence: 0.8 },
];

/// Does this look like an SPA shell that hasn't hydrated yet: a `<div
/// id="root">`/`<div id="app">` mount point with essentially no text
/// content? Distinct from a bot challenge — the escalator's response is to
/// render, not to treat it as blocked.
fn looks_like_empty_shell(html_lower: &str, visible_text_len: usize) -> bool {
    let has_mount_point = html_lower.contains("id=\"root\"")
        || html_lower.contains("id=\"app\"")
        || html_lower.contains("id='root'")
        || html_lower.contains("id='app'");
    has_mount_point && visible_text_len < MIN_BODY_LEN_FOR_REAL_PAGE
}

/// Rough visible-text length estimate: strip tags, count remaining
/// non-whitespace. Good enough for the empty-shell heuristic; the real
/// readability pass happens in the distillation pipeline.
fn approx_visible_text_len(html: &str) -> usize {
    let mut len = 0;
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag && !c.is_whitespace() => len += 1,
            _ => {}
        }
    }
    len
}

/// Classify a fetched HTML body + status code.
pub fn detect_challenge(html: &str, status: u16) -> ChallengeDetection {
    let lower = html.to_ascii_lowercase();
    let visible = approx_visible_text_len(html);

    if let Some(marker) = MARKERS.iter().find(|m| lower.contains(m.needle)) {
        return ChallengeDetection {
            is_challenge: true,
            challenge_type: marker.challenge_type,
            confidence: marker.confidence,
        };
    }

    if looks_like_empty_shell(&lower, visible) {
        return ChallengeDetection {
            is_challenge: true,
            challenge_type: ChallengeType::EmptyShell,
            confidence: 0.7,
        };
    }

    if status == 403 || status == 503 {
        return ChallengeDetection {
            is_challenge: true,
            challenge_type: ChallengeType::Unknown,
            confidence: 0.65,
        };
    }

    if html.trim().len() < MIN_BODY_LEN_FOR_REAL_PAGE {
        return ChallengeDetection {
            is_challenge: true,
            challenge_type: ChallengeType::EmptyShell,
            confidence: 0.55,
        };
    }

    ChallengeDetection { is_challenge: false, challenge_type: ChallengeType::Unknown, confidence: 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_cloudflare_verification_marker() {
        let html = "<html><body>cf-browser-verification checking...</body></html>";
        let d = detect_challenge(html, 200);
        assert!(d.is_challenge);
        assert_eq!(d.challenge_type, ChallengeType::Cloudflare);
    }

    #[test]
    fn detects_datadome_marker() {
        let html = "<script src=\"https://geo.captcha-delivery.com/x.js\"></script>";
        let d = detect_challenge(html, 200);
        assert_eq!(d.challenge_type, ChallengeType::DataDome);
    }

    #[test]
    fn detects_empty_shell_spa() {
        let html = "<html><body><div id=\"root\"></div><script src=\"bundle.js\"></script></body></html>";
        let d = detect_challenge(html, 200);
        assert!(d.is_challenge);
        assert_eq!(d.challenge_type, ChallengeType::EmptyShell);
    }

    #[test]
    fn status_403_is_a_challenge() {
        let html = "<html><body>a real looking page with plenty of visible text content here</body></html>";
        let d = detect_challenge(html, 403);
        assert!(d.is_challenge);
    }

    #[test]
    fn normal_page_is_not_a_challenge() {
        let html = "<html><body><article>A long article with plenty of real content and paragraphs of meaningful text that a reader would actually want.</article></body></html>";
        let d = detect_challenge(html, 200);
        assert!(!d.is_challenge);
    }
}
