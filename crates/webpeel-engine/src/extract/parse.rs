//! HTML/PDF parsing and block segmentation.
//!
//! Script/style stripping before segmentation, plus `pdf_to_text` for
//! binary documents. Blocks distinguish heading/paragraph/list_item/code,
//! built directly against `scraper` (already a shared dependency).

use html_scraper::{ElementRef, Html, Selector};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockKind {
    Heading(u8),
    Paragraph,
    ListItem,
    Code,
    Blockquote,
    TableRow,
}

#[derive(Debug, Clone)]
pub struct Block {
    pub kind: BlockKind,
    pub text: String,
}

fn strip_script_and_style(html: &str) -> String {
    let document = Html::parse_document(html);
    let selector = Selector::parse("script, style, noscript").unwrap();
    let mut out = html.to_string();
    // scraper has no in-place removal API; re-serialize the body minus those
    // nodes by walking the parsed tree and rebuilding text content instead.
    // For the narrow purpose here (feeding html2text / block extraction) we
    // just blank out matched subtrees' source ranges.
    for el in document.select(&selector) {
        let fragment = el.html();
        if !fragment.is_empty() {
            out = out.replace(&fragment, "");
        }
    }
    out
}

/// Narrow the document to a CSS selector's subtree.
pub fn narrow_to_selector(html: &str, selector: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let sel = Selector::parse(selector).ok()?;
    document.select(&sel).next().map(|el| el.html())
}

/// Remove every subtree matching any of `excludes`.
pub fn remove_excluded(html: &str, excludes: &[String]) -> String {
    if excludes.is_empty() {
        return html.to_string();
    }
    let document = Html::parse_document(html);
    let mut out = html.to_string();
    for raw_selector in excludes {
        let Ok(sel) = Selector::parse(raw_selector) else { continue };
        for el in document.select(&sel) {
            let fragment = el.html();
            if !fragment.is_empty() {
                out = out.replace(&fragment, "");
            }
        }
    }
    out
}

/// Readable-mode extraction: keep only the main content tree, preferring
/// `<article>`, then `<main>`, then falling back to `<body>`.
pub fn readable_main_content(html: &str) -> String {
    let document = Html::parse_document(html);
    for selector in ["article", "main", "[role=main]", "body"] {
        if let Ok(sel) = Selector::parse(selector) {
            if let Some(el) = document.select(&sel).next() {
                return el.html();
            }
        }
    }
    html.to_string()
}

fn heading_level(tag: &str) -> Option<u8> {
    match tag {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" => Some(4),
        "h5" => Some(5),
        "h6" => Some(6),
        _ => None,
    }
}

fn collect_text(el: ElementRef) -> String {
    el.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Segment a (possibly narrowed) HTML fragment into ordered content
/// blocks, used by both format conversion and BM25 question filtering.
pub fn parse_blocks(html: &str) -> Vec<Block> {
    let cleaned = strip_script_and_style(html);
    let document = Html::parse_fragment(&cleaned);
    let selector = Selector::parse(
        "h1, h2, h3, h4, h5, h6, p, li, pre, code, blockquote, tr",
    )
    .unwrap();

    let mut blocks = Vec::new();
    for el in document.select(&selector) {
        let tag = el.value().name();
        let text = collect_text(el);
        if text.trim().is_empty() {
            continue;
        }
        let kind = if let Some(level) = heading_level(tag) {
            BlockKind::Heading(level)
        } else {
            match tag {
                "li" => BlockKind::ListItem,
                "pre" | "code" => BlockKind::Code,
                "blockquote" => BlockKind::Blockquote,
                "tr" => BlockKind::TableRow,
                _ => BlockKind::Paragraph,
            }
        };
        blocks.push(Block { kind, text });
    }
    blocks
}

/// Document title: first `<title>` or first `<h1>`.
pub fn extract_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let title_sel = Selector::parse("title").unwrap();
    if let Some(el) = document.select(&title_sel).next() {
        let t = collect_text(el);
        if !t.is_empty() {
            return Some(t);
        }
    }
    let h1_sel = Selector::parse("h1").unwrap();
    document.select(&h1_sel).next().map(collect_text).filter(|s| !s.is_empty())
}

/// Binary-document text extraction (PDF).
pub fn pdf_to_text(bytes: &[u8]) -> Result<String, String> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| e.to_string())
}

/// Open-graph / schema.org page metadata surfaced on `PeelResult::metadata`.
pub fn extract_metadata(html: &str) -> webpeel_core::PageMetadata {
    let document = Html::parse_document(html);
    let meta_sel = Selector::parse("meta").unwrap();
    let link_sel = Selector::parse("link[rel=canonical]").unwrap();
    let html_sel = Selector::parse("html").unwrap();

    let mut meta = webpeel_core::PageMetadata::default();
    for el in document.select(&meta_sel) {
        let value = el.value();
        let content = value.attr("content").map(|s| s.to_string());
        let Some(content) = content else { continue };
        match value.attr("property").or_else(|| value.attr("name")) {
            Some("og:title") => meta.og_title = Some(content),
            Some("og:description") | Some("description") => {
                if meta.og_description.is_none() {
                    meta.og_description = Some(content);
                }
            }
            Some("og:image") => meta.og_image = Some(content),
            Some("og:type") => meta.og_type = Some(content),
            _ => {}
        }
    }
    if let Some(el) = document.select(&link_sel).next() {
        meta.canonical_url = el.value().attr("href").map(|s| s.to_string());
    }
    if let Some(el) = document.select(&html_sel).next() {
        meta.language = el.value().attr("lang").map(|s| s.to_string());
    }

    let ld_json_sel = Selector::parse(r#"script[type="application/ld+json"]"#).unwrap();
    for el in document.select(&ld_json_sel) {
        let text = el.text().collect::<String>();
        if let Ok(v) = serde_json::from_str::<serde_json::Value>(&text) {
            if let Some(t) = v.get("@type").and_then(|t| t.as_str()) {
                meta.schema_org_type = Some(t.to_string());
                break;
            }
        }
    }
    meta
}

/// Absolute image URLs in document order, feeding `PeelResult.image_urls`.
pub fn extract_image_urls(html: &str, base: &url::Url) -> Vec<String> {
    let document = Html::parse_document(html);
    let sel = Selector::parse("img").unwrap();
    document
        .select(&sel)
        .filter_map(|el| el.value().attr("src"))
        .filter_map(|src| base.join(src).ok())
        .map(|u| u.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_headings_and_paragraphs_in_order() {
        let html = "<h1>Title</h1><p>First paragraph.</p><h2>Sub</h2><p>Second.</p>";
        let blocks = parse_blocks(html);
        assert_eq!(blocks.len(), 4);
        assert_eq!(blocks[0].kind, BlockKind::Heading(1));
        assert_eq!(blocks[1].kind, BlockKind::Paragraph);
        assert_eq!(blocks[2].kind, BlockKind::Heading(2));
    }

    #[test]
    fn empty_elements_are_skipped() {
        let html = "<p></p><p>real content here</p>";
        let blocks = parse_blocks(html);
        assert_eq!(blocks.len(), 1);
    }

    #[test]
    fn readable_main_content_prefers_article() {
        let html = "<body><nav>skip</nav><article><p>keep me</p></article></body>";
        let main = readable_main_content(html);
        assert!(main.contains("keep me"));
    }

    #[test]
    fn extract_title_falls_back_to_h1() {
        let html = "<body><h1>Heading Title</h1></body>";
        assert_eq!(extract_title(html).as_deref(), Some("Heading Title"));
    }

    #[test]
    fn extracts_open_graph_metadata() {
        let html = r#"<html lang="en"><head>
            <meta property="og:title" content="A Title">
            <meta property="og:image" content="https://example.com/img.png">
            <link rel="canonical" href="https://example.com/canonical">
        </head><body></body></html>"#;
        let meta = extract_metadata(html);
        assert_eq!(meta.og_title.as_deref(), Some("A Title"));
        assert_eq!(meta.canonical_url.as_deref(), Some("https://example.com/canonical"));
        assert_eq!(meta.language.as_deref(), Some("en"));
    }

    #[test]
    fn extracts_absolute_image_urls() {
        let html = r#"<img src="/pic.png"><img src="https://other.example/full.jpg">"#;
        let base = url::Url::parse("https://example.com/page").unwrap();
        let urls = extract_image_urls(html, &base);
        assert_eq!(urls, vec!["https://example.com/pic.png", "https://other.example/full.jpg"]);
    }
}
