//! Social-post/profile family: matches the Mastodon
//! `/@user` and `/@user/<id>` URL shape used by every instance in the
//! fediverse and calls that instance's own public REST API (no auth
//! required for public posts/profiles) rather than parsing HTML.

use webpeel_core::{DomainExtractResult, DomainExtractor};

pub struct SocialExtractor {
    client: reqwest::Client,
}

impl SocialExtractor {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }
}

impl Default for SocialExtractor {
    fn default() -> Self {
        Self::new()
    }
}

enum Resource {
    Status { handle: String, id: String },
    Profile { handle: String },
}

fn parse_path(url: &url::Url) -> Option<Resource> {
    let segs: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();
    match segs.as_slice() {
        [handle] if handle.starts_with('@') => Some(Resource::Profile { handle: handle[1..].to_string() }),
        [handle, id] if handle.starts_with('@') => {
            Some(Resource::Status { handle: handle[1..].to_string(), id: id.to_string() })
        }
        _ => None,
    }
}

async fn account_id_by_handle(
    client: &reqwest::Client,
    base: &str,
    handle: &str,
    timeout: std::time::Duration,
) -> Option<serde_json::Value> {
    let resp = client
        .get(format!("{base}/api/v1/accounts/lookup"))
        .query(&[("acct", handle)])
        .timeout(timeout)
        .send()
        .await
        .ok()?;
    if !resp.status().is_success() {
        return None;
    }
    resp.json().await.ok()
}

fn strip_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_tag = false;
    for c in s.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

#[async_trait::async_trait]
impl DomainExtractor for SocialExtractor {
    fn family(&self) -> &'static str {
        "social"
    }

    fn matches(&self, url: &url::Url) -> bool {
        parse_path(url).is_some()
    }

    async fn extract(&self, url: &url::Url, timeout: std::time::Duration) -> Option<DomainExtractResult> {
        let resource = parse_path(url)?;
        let base = format!("{}://{}", url.scheme(), url.host_str()?);

        match resource {
            Resource::Status { id, .. } => {
                let resp = self
                    .client
                    .get(format!("{base}/api/v1/statuses/{id}"))
                    .timeout(timeout)
                    .send()
                    .await
                    .ok()?;
                if !resp.status().is_success() {
                    return None;
                }
                let v: serde_json::Value = resp.json().await.ok()?;
                let author = v.pointer("/account/display_name").and_then(|a| a.as_str()).unwrap_or("");
                let acct = v.pointer("/account/acct").and_then(|a| a.as_str()).unwrap_or("");
                let content = v.get("content").and_then(|c| c.as_str()).unwrap_or("");
                let favs = v.get("favourites_count").and_then(|c| c.as_u64()).unwrap_or(0);
                let reblogs = v.get("reblogs_count").and_then(|c| c.as_u64()).unwrap_or(0);
                let text = strip_html(content);

                let result = DomainExtractResult {
                    structured: serde_json::json!({"kind": "post", "author": author, "acct": acct, "favourites": favs, "reblogs": reblogs}),
                    clean_content: format!("**{author}** (@{acct})\n\n{text}\n\n_{favs} favourites, {reblogs} boosts_"),
                };
                result.is_high_signal().then_some(result)
            }
            Resource::Profile { handle } => {
                let account = account_id_by_handle(&self.client, &base, &handle, timeout).await?;
                let display_name = account.get("display_name").and_then(|v| v.as_str()).unwrap_or(&handle);
                let note = account.get("note").and_then(|v| v.as_str()).unwrap_or("");
                let followers = account.get("followers_count").and_then(|v| v.as_u64()).unwrap_or(0);
                let text = strip_html(note);

                let result = DomainExtractResult {
                    structured: serde_json::json!({"kind": "profile", "displayName": display_name, "followers": followers}),
                    clean_content: format!("# {display_name}\n\n{text}\n\n**Followers:** {followers}"),
                };
                result.is_high_signal().then_some(result)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_mastodon_style_handles() {
        let ex = SocialExtractor::new();
        assert!(ex.matches(&url::Url::parse("https://mastodon.social/@rustlang").unwrap()));
        assert!(ex.matches(&url::Url::parse("https://mastodon.social/@rustlang/112233").unwrap()));
        assert!(!ex.matches(&url::Url::parse("https://example.com/about").unwrap()));
    }

    #[test]
    fn strip_html_removes_tags_only() {
        assert_eq!(strip_html("<p>hello <b>world</b></p>"), "hello world");
    }
}
