//! Content distillation pipeline: parse → readable → format → budget →
//! BM25 question filter → schema/LLM extract → metrics.
//!
//! HTML→text, chunk scoring, and token estimation, over block-structured
//! parsing and real BM25 per the submodules in this directory.

pub mod bm25;
pub mod budget;
pub mod format;
pub mod llm;
pub mod parse;
pub mod schema;

use parse::Block;
use std::time::Instant;
use webpeel_core::{Error, FetchResult, PageMetadata, PeelOptions, PeelResult, Result, Timings};

const WORDS_PER_MINUTE: f64 = 200.0;
const PDF_CONTENT_TYPE_MARKERS: &[&str] = &["application/pdf"];

fn is_pdf(fetch: &FetchResult) -> bool {
    fetch.content_type.as_deref().map(|ct| PDF_CONTENT_TYPE_MARKERS.iter().any(|m| ct.contains(m))).unwrap_or(false)
        || fetch.final_url.to_ascii_lowercase().ends_with(".pdf")
}

fn word_count(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}

fn reading_time_minutes(words: u64) -> f64 {
    (words as f64 / WORDS_PER_MINUTE).max(0.1)
}

/// Run the full distillation pipeline against one fetcher rung's raw
/// output, producing the caller-facing `PeelResult`.
pub fn distill(fetch: &FetchResult, options: &PeelOptions) -> Result<PeelResult> {
    let started = Instant::now();
    let mut timings: Timings = Timings::new();
    let mut warnings: Vec<&'static str> = Vec::new();

    // Stage 1: parse
    let parse_start = Instant::now();
    let (body_html, title, metadata, image_urls) = if is_pdf(fetch) {
        let text = parse::pdf_to_text(&fetch.bytes).map_err(|e| Error::Validation(format!("pdf extraction failed: {e}")))?;
        (format!("<p>{}</p>", html_escape_for_fragment(&text)), None, PageMetadata::default(), Vec::new())
    } else {
        let raw = fetch.text_lossy();
        let base = url::Url::parse(&fetch.final_url).ok();
        let title = parse::extract_title(&raw);
        let metadata = parse::extract_metadata(&raw);
        let image_urls = if options.images {
            base.as_ref().map(|b| parse::extract_image_urls(&raw, b)).unwrap_or_default()
        } else {
            Vec::new()
        };

        let mut narrowed = raw;
        if let Some(selector) = &options.selector {
            match parse::narrow_to_selector(&narrowed, selector) {
                Some(n) => narrowed = n,
                None => warnings.push("selector matched no elements"),
            }
        }
        if !options.exclude.is_empty() {
            narrowed = parse::remove_excluded(&narrowed, &options.exclude);
        }
        (narrowed, title, metadata, image_urls)
    };
    timings.insert("parse_ms".to_string(), parse_start.elapsed().as_millis());

    // Stage 2: readable mode
    let readable_start = Instant::now();
    let content_html = if options.readable || options.only_main_content {
        parse::readable_main_content(&body_html)
    } else {
        body_html
    };
    timings.insert("readable_ms".to_string(), readable_start.elapsed().as_millis());

    let mut blocks = parse::parse_blocks(&content_html);
    if blocks.is_empty() && !content_html.trim().is_empty() {
        // non-HTML or malformed content: treat the whole body as one block
        blocks.push(Block { kind: parse::BlockKind::Paragraph, text: content_html.trim().to_string() });
    }

    // Stage 5: question filter (BM25), applied before formatting so the
    // rendered output only contains the selected blocks.
    let filter_start = Instant::now();
    if let Some(question) = &options.question {
        let selected = bm25::select_relevant_blocks(&blocks, question);
        blocks = selected.into_iter().map(|s| s.block.clone()).collect();
    }
    timings.insert("question_filter_ms".to_string(), filter_start.elapsed().as_millis());

    // Stage 4: budget pruning
    let budget_start = Instant::now();
    if let Some(budget_tokens) = options.budget.resolved_budget() {
        let before = blocks.len();
        blocks = budget::prune_to_budget(blocks, budget_tokens);
        if blocks.len() < before {
            warnings.push("content truncated to fit token budget");
        }
    }
    timings.insert("budget_ms".to_string(), budget_start.elapsed().as_millis());

    // Stage 3: format
    let format_start = Instant::now();
    let content = format::render(&blocks, options.format);
    timings.insert("format_ms".to_string(), format_start.elapsed().as_millis());

    // Stage 6: schema / inline-LLM extract
    let extracted = if let Some(selector) = &options.schema {
        Some(schema::extract_schema(&blocks, selector))
    } else {
        None
    };

    // Stage 7: metrics
    let words = word_count(&content);
    let tokens = budget::estimate_tokens(&content);
    let fingerprint = webpeel_core::fingerprint::content_fingerprint(&content);
    timings.insert("reading_time_min".to_string(), reading_time_minutes(words).round() as u128);
    timings.insert("total_ms".to_string(), started.elapsed().as_millis());

    let screenshot_base64 = fetch.screenshot.as_ref().map(|bytes| {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(bytes)
    });

    Ok(PeelResult {
        url: fetch.url.clone(),
        title,
        content,
        tokens,
        metadata,
        domain_payload: None,
        extracted,
        screenshot_base64,
        fingerprint,
        timings_ms: timings,
        method: fetch.method,
        image_urls,
        warnings,
    })
}

/// Run the inline-LLM extract stage against already-distilled content.
/// Kept separate from `distill` since it's async (network call) while the
/// rest of the pipeline is synchronous.
pub async fn distill_with_llm_extract(result: &mut PeelResult, options: &PeelOptions) -> Result<()> {
    let Some(llm_opts) = &options.extract else { return Ok(()) };
    let client = llm::OpenAiCompatClient::from_options(reqwest::Client::new(), llm_opts)?;
    let value = llm::extract_with_llm(&client, &result.content, &llm_opts.prompt, options.timeout_ms).await?;
    result.extracted = Some(value);
    Ok(())
}

fn html_escape_for_fragment(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use webpeel_core::{FetchMethod, OutputFormat};

    fn fetch_result(html: &str) -> FetchResult {
        FetchResult {
            url: "https://example.com/page".to_string(),
            final_url: "https://example.com/page".to_string(),
            status: 200,
            content_type: Some("text/html".to_string()),
            bytes: html.as_bytes().to_vec(),
            screenshot: None,
            headers: BTreeMap::new(),
            method: FetchMethod::Simple,
        }
    }

    #[test]
    fn distills_basic_html_to_markdown() {
        let html = "<html><head><title>My Page</title></head><body><h1>Hi</h1><p>Some content here.</p></body></html>";
        let fetch = fetch_result(html);
        let opts = PeelOptions::default();
        let result = distill(&fetch, &opts).unwrap();
        assert_eq!(result.title.as_deref(), Some("My Page"));
        assert!(result.content.contains("Hi"));
        assert!(result.content.contains("Some content here."));
    }

    #[test]
    fn question_filter_narrows_to_relevant_blocks() {
        let html = "<body><p>Completely unrelated gardening content about tomatoes.</p>\
                    <p>Rust memory safety guarantees prevent data races at compile time.</p></body>";
        let fetch = fetch_result(html);
        let mut opts = PeelOptions::default();
        opts.question = Some("rust memory safety".to_string());
        let result = distill(&fetch, &opts).unwrap();
        assert!(result.content.contains("memory safety"));
    }

    #[test]
    fn budget_pruning_sets_warning() {
        let html = format!("<body><h1>Title</h1><p>{}</p></body>", "word ".repeat(5000));
        let fetch = fetch_result(&html);
        let mut opts = PeelOptions::default();
        opts.budget.max_tokens = Some(50);
        let result = distill(&fetch, &opts).unwrap();
        assert!(result.warnings.contains(&"content truncated to fit token budget"));
    }

    #[test]
    fn text_format_has_no_markdown_markup() {
        let html = "<body><h1>Heading</h1><p>Body.</p></body>";
        let fetch = fetch_result(html);
        let mut opts = PeelOptions::default();
        opts.format = OutputFormat::Text;
        let result = distill(&fetch, &opts).unwrap();
        assert!(!result.content.contains('#'));
    }
}
