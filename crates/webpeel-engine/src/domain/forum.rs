//! Community-forum family: post + comment tree with replies
//! up to depth 2 — via Reddit's public JSON API (`<permalink>.json`),
//! which needs no API key and returns the full listing + comment tree in
//! one call.

use webpeel_core::{DomainExtractResult, DomainExtractor};

const MAX_TOP_COMMENTS: usize = 10;
const MAX_DEPTH: u32 = 2;

pub struct ForumExtractor {
    client: reqwest::Client,
}

impl ForumExtractor {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }
}

impl Default for ForumExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn render_comment_tree(node: &serde_json::Value, depth: u32, out: &mut String) {
    if depth > MAX_DEPTH {
        return;
    }
    let Some(data) = node.get("data") else { return };
    let author = data.get("author").and_then(|v| v.as_str()).unwrap_or("unknown");
    let body = data.get("body").and_then(|v| v.as_str()).unwrap_or("");
    if !body.is_empty() {
        out.push_str(&format!("{}- **{author}**: {body}\n", "  ".repeat(depth as usize)));
    }
    if let Some(replies) = data.pointer("/replies/data/children").and_then(|v| v.as_array()) {
        for reply in replies {
            render_comment_tree(reply, depth + 1, out);
        }
    }
}

#[async_trait::async_trait]
impl DomainExtractor for ForumExtractor {
    fn family(&self) -> &'static str {
        "forum"
    }

    fn matches(&self, url: &url::Url) -> bool {
        matches!(url.host_str(), Some("www.reddit.com") | Some("reddit.com") | Some("old.reddit.com"))
            && url.path().contains("/comments/")
    }

    async fn extract(&self, url: &url::Url, timeout: std::time::Duration) -> Option<DomainExtractResult> {
        let mut api_url = url.clone();
        let _ = api_url.set_host(Some("www.reddit.com"));
        let path = api_url.path().trim_end_matches('/');
        api_url.set_path(&format!("{path}.json"));

        let resp = self
            .client
            .get(api_url.as_str())
            .header("User-Agent", "webpeel/0.1 (content gateway)")
            .timeout(timeout)
            .send()
            .await
            .ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let listing: serde_json::Value = resp.json().await.ok()?;
        let post = listing.get(0)?.pointer("/data/children/0/data")?;
        let title = post.get("title").and_then(|v| v.as_str()).unwrap_or("");
        let author = post.get("author").and_then(|v| v.as_str()).unwrap_or("");
        let selftext = post.get("selftext").and_then(|v| v.as_str()).unwrap_or("");
        let score = post.get("score").and_then(|v| v.as_i64()).unwrap_or(0);

        let mut content = format!("# {title}\n\nby u/{author} ({score} points)\n\n{selftext}\n\n## Comments\n\n");
        if let Some(comments) = listing.get(1).and_then(|c| c.pointer("/data/children")).and_then(|c| c.as_array()) {
            for comment in comments.iter().take(MAX_TOP_COMMENTS) {
                render_comment_tree(comment, 0, &mut content);
            }
        }

        let result = DomainExtractResult {
            structured: serde_json::json!({"kind": "forum_post", "title": title, "author": author, "score": score}),
            clean_content: content,
        };
        result.is_high_signal().then_some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_reddit_comment_threads_only() {
        let ex = ForumExtractor::new();
        assert!(ex.matches(&url::Url::parse("https://www.reddit.com/r/rust/comments/abc123/title/").unwrap()));
        assert!(!ex.matches(&url::Url::parse("https://www.reddit.com/r/rust/").unwrap()));
    }

    #[test]
    fn comment_tree_respects_max_depth() {
        let deep = serde_json::json!({
            "data": {
                "author": "a",
                "body": "top",
                "replies": {"data": {"children": [
                    {"data": {"author": "b", "body": "mid", "replies": {"data": {"children": [
                        {"data": {"author": "c", "body": "leaf", "replies": {"data": {"children": [
                            {"data": {"author": "d", "body": "too-deep"}}
                        ]}}}}
                    ]}}}}
                ]}}
            }
        });
        let mut out = String::new();
        render_comment_tree(&deep, 0, &mut out);
        assert!(out.contains("top"));
        assert!(out.contains("mid"));
        assert!(out.contains("leaf"));
        assert!(!out.contains("too-deep"));
    }
}
