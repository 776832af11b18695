//! Code-host family: repository metadata + README, issue, pull request,
//! user profile — via the GitHub REST API, dispatched by path family
//! (`github_blob_raw_candidates`, `github_issue_api_candidates`, ...) into
//! full structured-API extraction.

use webpeel_core::{DomainExtractResult, DomainExtractor};

const API_BASE: &str = "https://api.github.com";

pub struct CodeHostExtractor {
    client: reqwest::Client,
}

impl CodeHostExtractor {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }
}

impl Default for CodeHostExtractor {
    fn default() -> Self {
        Self::new()
    }
}

enum Resource {
    Repo { owner: String, repo: String },
    Issue { owner: String, repo: String, number: String },
    Pr { owner: String, repo: String, number: String },
    User { login: String },
}

fn parse_path(url: &url::Url) -> Option<Resource> {
    let segs: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();
    match segs.as_slice() {
        [owner, repo] => Some(Resource::Repo { owner: owner.to_string(), repo: repo.to_string() }),
        [owner, repo, "issues", number] => Some(Resource::Issue {
            owner: owner.to_string(),
            repo: repo.to_string(),
            number: number.to_string(),
        }),
        [owner, repo, "pull", number] => Some(Resource::Pr {
            owner: owner.to_string(),
            repo: repo.to_string(),
            number: number.to_string(),
        }),
        [login] => Some(Resource::User { login: login.to_string() }),
        _ => None,
    }
}

async fn get_json(client: &reqwest::Client, url: &str, timeout: std::time::Duration) -> Option<serde_json::Value> {
    let resp = client
        .get(url)
        .header("User-Agent", "webpeel")
        .header("Accept", "application/vnd.github+json")
        .timeout(timeout)
        .send()
        .await
        .ok()?;
    if !resp.status().is_success() {
        return None;
    }
    resp.json().await.ok()
}

#[async_trait::async_trait]
impl DomainExtractor for CodeHostExtractor {
    fn family(&self) -> &'static str {
        "codehost"
    }

    fn matches(&self, url: &url::Url) -> bool {
        matches!(url.host_str(), Some("github.com") | Some("www.github.com"))
    }

    async fn extract(&self, url: &url::Url, timeout: std::time::Duration) -> Option<DomainExtractResult> {
        let resource = parse_path(url)?;
        match resource {
            Resource::Repo { owner, repo } => {
                let meta = get_json(&self.client, &format!("{API_BASE}/repos/{owner}/{repo}"), timeout).await?;
                let readme = get_json(
                    &self.client,
                    &format!("{API_BASE}/repos/{owner}/{repo}/readme"),
                    timeout,
                )
                .await;
                let readme_text = readme
                    .as_ref()
                    .and_then(|r| r.get("content"))
                    .and_then(|c| c.as_str())
                    .and_then(|b64| {
                        use base64::Engine as _;
                        base64::engine::general_purpose::STANDARD
                            .decode(b64.replace('\n', ""))
                            .ok()
                    })
                    .map(|bytes| String::from_utf8_lossy(&bytes).to_string())
                    .unwrap_or_default();

                let name = meta.get("full_name").and_then(|v| v.as_str()).unwrap_or(&repo);
                let description = meta.get("description").and_then(|v| v.as_str()).unwrap_or("");
                let stars = meta.get("stargazers_count").and_then(|v| v.as_u64()).unwrap_or(0);
                let mut content = format!("# {name}\n\n{description}\n\n**Stars:** {stars}\n\n");
                if !readme_text.trim().is_empty() {
                    content.push_str("## README\n\n");
                    content.push_str(&readme_text);
                }
                let result = DomainExtractResult {
                    structured: serde_json::json!({
                        "kind": "repository",
                        "fullName": name,
                        "description": description,
                        "stars": stars,
                    }),
                    clean_content: content,
                };
                result.is_high_signal().then_some(result)
            }
            Resource::Issue { owner, repo, number } => {
                let v = get_json(
                    &self.client,
                    &format!("{API_BASE}/repos/{owner}/{repo}/issues/{number}"),
                    timeout,
                )
                .await?;
                build_issue_like_result(&v, "issue")
            }
            Resource::Pr { owner, repo, number } => {
                let v = get_json(
                    &self.client,
                    &format!("{API_BASE}/repos/{owner}/{repo}/pulls/{number}"),
                    timeout,
                )
                .await?;
                build_issue_like_result(&v, "pull_request")
            }
            Resource::User { login } => {
                let v = get_json(&self.client, &format!("{API_BASE}/users/{login}"), timeout).await?;
                let name = v.get("name").and_then(|n| n.as_str()).unwrap_or(&login);
                let bio = v.get("bio").and_then(|n| n.as_str()).unwrap_or("");
                let repos = v.get("public_repos").and_then(|n| n.as_u64()).unwrap_or(0);
                let content = format!("# {name} (@{login})\n\n{bio}\n\n**Public repos:** {repos}");
                let result = DomainExtractResult {
                    structured: serde_json::json!({"kind": "user", "login": login, "name": name, "bio": bio}),
                    clean_content: content,
                };
                result.is_high_signal().then_some(result)
            }
        }
    }
}

fn build_issue_like_result(v: &serde_json::Value, kind: &str) -> Option<DomainExtractResult> {
    let title = v.get("title").and_then(|t| t.as_str()).unwrap_or("");
    let body = v.get("body").and_then(|b| b.as_str()).unwrap_or("");
    let state = v.get("state").and_then(|s| s.as_str()).unwrap_or("");
    let author = v.pointer("/user/login").and_then(|u| u.as_str()).unwrap_or("");
    let content = format!("# {title}\n\n_by @{author}, {state}_\n\n{body}");
    let result = DomainExtractResult {
        structured: serde_json::json!({"kind": kind, "title": title, "state": state, "author": author}),
        clean_content: content,
    };
    result.is_high_signal().then_some(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_github_hosts_only() {
        let ex = CodeHostExtractor::new();
        assert!(ex.matches(&url::Url::parse("https://github.com/rust-lang/rust").unwrap()));
        assert!(!ex.matches(&url::Url::parse("https://gitlab.com/rust-lang/rust").unwrap()));
    }

    #[test]
    fn parses_repo_path() {
        let url = url::Url::parse("https://github.com/rust-lang/rust").unwrap();
        assert!(matches!(parse_path(&url), Some(Resource::Repo { .. })));
    }

    #[test]
    fn parses_issue_path() {
        let url = url::Url::parse("https://github.com/rust-lang/rust/issues/42").unwrap();
        assert!(matches!(parse_path(&url), Some(Resource::Issue { .. })));
    }

    #[test]
    fn unrecognized_path_shape_returns_none() {
        let url = url::Url::parse("https://github.com/rust-lang/rust/issues/42/comments").unwrap();
        assert!(parse_path(&url).is_none());
    }
}
