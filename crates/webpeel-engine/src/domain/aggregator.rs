//! Aggregator-item family: story with comment tree, front
//! page, user — via Hacker News's public Firebase-backed API, which needs
//! no authentication and maps cleanly onto "data-plane JSON, not the
//! rendered page."

use webpeel_core::{DomainExtractResult, DomainExtractor};

const API_BASE: &str = "https://hacker-news.firebaseio.com/v0";
const MAX_COMMENT_DEPTH: u32 = 2;
const MAX_TOP_COMMENTS: usize = 8;

pub struct AggregatorExtractor {
    client: reqwest::Client,
}

impl AggregatorExtractor {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }
}

impl Default for AggregatorExtractor {
    fn default() -> Self {
        Self::new()
    }
}

async fn get_item(client: &reqwest::Client, id: u64, timeout: std::time::Duration) -> Option<serde_json::Value> {
    let resp = client
        .get(format!("{API_BASE}/item/{id}.json"))
        .timeout(timeout)
        .send()
        .await
        .ok()?;
    let v: serde_json::Value = resp.json().await.ok()?;
    if v.is_null() {
        None
    } else {
        Some(v)
    }
}

fn render_comment(item: &serde_json::Value, depth: u32) -> String {
    let author = item.get("by").and_then(|v| v.as_str()).unwrap_or("unknown");
    let text = item.get("text").and_then(|v| v.as_str()).unwrap_or("");
    let indent = "  ".repeat(depth as usize);
    format!("{indent}- **{author}**: {}\n", html_escape_strip(text))
}

fn html_escape_strip(s: &str) -> String {
    s.replace("<p>", "\n\n").replace("&#x27;", "'").replace("&quot;", "\"")
}

#[async_trait::async_trait]
impl DomainExtractor for AggregatorExtractor {
    fn family(&self) -> &'static str {
        "aggregator"
    }

    fn matches(&self, url: &url::Url) -> bool {
        matches!(url.host_str(), Some("news.ycombinator.com"))
    }

    async fn extract(&self, url: &url::Url, timeout: std::time::Duration) -> Option<DomainExtractResult> {
        let query: std::collections::HashMap<_, _> = url.query_pairs().collect();

        if url.path() == "/item" {
            let id: u64 = query.get("id")?.parse().ok()?;
            let item = get_item(&self.client, id, timeout).await?;
            let title = item.get("title").and_then(|v| v.as_str()).unwrap_or("");
            let author = item.get("by").and_then(|v| v.as_str()).unwrap_or("");
            let score = item.get("score").and_then(|v| v.as_u64()).unwrap_or(0);
            let story_url = item.get("url").and_then(|v| v.as_str()).unwrap_or("");

            let mut content = format!("# {title}\n\n**{score} points** by {author}\n\n{story_url}\n\n## Comments\n\n");
            if let Some(kids) = item.get("kids").and_then(|v| v.as_array()) {
                for kid in kids.iter().take(MAX_TOP_COMMENTS) {
                    let Some(kid_id) = kid.as_u64() else { continue };
                    let Some(comment) = get_item(&self.client, kid_id, timeout).await else { continue };
                    content.push_str(&render_comment(&comment, 0));
                    if let Some(replies) = comment.get("kids").and_then(|v| v.as_array()) {
                        for reply_id in replies.iter().take(3) {
                            let Some(reply_id) = reply_id.as_u64() else { continue };
                            if let Some(reply) = get_item(&self.client, reply_id, timeout).await {
                                content.push_str(&render_comment(&reply, 1.min(MAX_COMMENT_DEPTH)));
                            }
                        }
                    }
                }
            }

            let result = DomainExtractResult {
                structured: serde_json::json!({"kind": "story", "title": title, "author": author, "score": score, "url": story_url}),
                clean_content: content,
            };
            return result.is_high_signal().then_some(result);
        }

        if url.path() == "/user" {
            let id = query.get("id")?.to_string();
            let resp = self
                .client
                .get(format!("{API_BASE}/user/{id}.json"))
                .timeout(timeout)
                .send()
                .await
                .ok()?;
            let v: serde_json::Value = resp.json().await.ok()?;
            if v.is_null() {
                return None;
            }
            let karma = v.get("karma").and_then(|k| k.as_u64()).unwrap_or(0);
            let about = v.get("about").and_then(|a| a.as_str()).unwrap_or("");
            let content = format!("# {id}\n\n**Karma:** {karma}\n\n{}", html_escape_strip(about));
            let result = DomainExtractResult {
                structured: serde_json::json!({"kind": "user", "id": id, "karma": karma}),
                clean_content: content,
            };
            return result.is_high_signal().then_some(result);
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_hacker_news_only() {
        let ex = AggregatorExtractor::new();
        assert!(ex.matches(&url::Url::parse("https://news.ycombinator.com/item?id=1").unwrap()));
        assert!(!ex.matches(&url::Url::parse("https://reddit.com/r/rust").unwrap()));
    }

    #[test]
    fn comment_render_strips_html_paragraph_markers() {
        let item = serde_json::json!({"by": "pg", "text": "hello<p>world"});
        let rendered = render_comment(&item, 0);
        assert!(rendered.contains("hello"));
        assert!(rendered.contains("world"));
        assert!(!rendered.contains("<p>"));
    }
}
