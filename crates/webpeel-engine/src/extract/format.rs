//! Render blocks into the requested output format: markdown/text/html/clean.
//!
//! Rendering is block-structured rather than a flat text-conversion pass,
//! since by this stage the document has already been segmented (see
//! `parse.rs`).

use super::parse::{Block, BlockKind};
use webpeel_core::OutputFormat;

fn heading_prefix(level: u8) -> String {
    "#".repeat(level.clamp(1, 6) as usize)
}

/// Render blocks to GitHub-flavored markdown, one blank line between
/// blocks, list items prefixed with `-`, code blocks fenced.
pub fn render_markdown(blocks: &[Block]) -> String {
    let mut out = String::new();
    for block in blocks {
        match &block.kind {
            BlockKind::Heading(level) => {
                out.push_str(&format!("{} {}\n\n", heading_prefix(*level), block.text));
            }
            BlockKind::ListItem => out.push_str(&format!("- {}\n", block.text)),
            BlockKind::Code => out.push_str(&format!("```\n{}\n```\n\n", block.text)),
            BlockKind::Blockquote => out.push_str(&format!("> {}\n\n", block.text)),
            BlockKind::TableRow => out.push_str(&format!("| {} |\n", block.text)),
            BlockKind::Paragraph => out.push_str(&format!("{}\n\n", block.text)),
        }
    }
    out.trim_end().to_string()
}

/// Plain text: just the block text, one per line, no markup.
pub fn render_text(blocks: &[Block]) -> String {
    blocks.iter().map(|b| b.text.as_str()).collect::<Vec<_>>().join("\n\n")
}

/// "Clean" format: markdown with list/table markup stripped down to bare
/// lines.
pub fn render_clean(blocks: &[Block]) -> String {
    let mut out = String::new();
    for block in blocks {
        if matches!(block.kind, BlockKind::Heading(_)) {
            out.push_str(&block.text.to_uppercase());
        } else {
            out.push_str(&block.text);
        }
        out.push_str("\n\n");
    }
    out.trim_end().to_string()
}

/// Minimal semantic HTML reconstruction from blocks.
pub fn render_html(blocks: &[Block]) -> String {
    let mut out = String::new();
    for block in blocks {
        match &block.kind {
            BlockKind::Heading(level) => out.push_str(&format!("<h{level}>{}</h{level}>\n", escape(&block.text))),
            BlockKind::ListItem => out.push_str(&format!("<li>{}</li>\n", escape(&block.text))),
            BlockKind::Code => out.push_str(&format!("<pre><code>{}</code></pre>\n", escape(&block.text))),
            BlockKind::Blockquote => out.push_str(&format!("<blockquote>{}</blockquote>\n", escape(&block.text))),
            BlockKind::TableRow => out.push_str(&format!("<tr><td>{}</td></tr>\n", escape(&block.text))),
            BlockKind::Paragraph => out.push_str(&format!("<p>{}</p>\n", escape(&block.text))),
        }
    }
    out
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

pub fn render(blocks: &[Block], format: OutputFormat) -> String {
    match format {
        OutputFormat::Markdown => render_markdown(blocks),
        OutputFormat::Text => render_text(blocks),
        OutputFormat::Html => render_html(blocks),
        OutputFormat::Clean => render_clean(blocks),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocks() -> Vec<Block> {
        vec![
            Block { kind: BlockKind::Heading(1), text: "Title".into() },
            Block { kind: BlockKind::Paragraph, text: "Body text.".into() },
            Block { kind: BlockKind::ListItem, text: "item one".into() },
        ]
    }

    #[test]
    fn markdown_includes_heading_marker_and_list_dash() {
        let md = render_markdown(&blocks());
        assert!(md.contains("# Title"));
        assert!(md.contains("- item one"));
    }

    #[test]
    fn text_has_no_markup() {
        let txt = render_text(&blocks());
        assert!(!txt.contains('#'));
        assert!(!txt.contains('-'));
    }

    #[test]
    fn html_escapes_entities() {
        let b = vec![Block { kind: BlockKind::Paragraph, text: "a < b & c".into() }];
        let html = render_html(&b);
        assert!(html.contains("&lt;"));
        assert!(html.contains("&amp;"));
    }
}
