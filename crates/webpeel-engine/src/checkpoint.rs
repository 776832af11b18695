//! Crawl-resume checkpoint persistence:
//! `~/.webpeel/checkpoints/<jobId>.json` snapshots of an in-progress
//! multi-page crawl, so a killed or restarted job can pick up where it
//! left off instead of re-walking completed URLs.
//!
//! `fs::create_dir_all` the parent, `serde_json::to_vec`/`fs::write` the
//! body, keyed by a SHA-256-derived job id.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use webpeel_core::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedEntry {
    pub status: u16,
    pub content_length: usize,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlCheckpoint {
    pub job_id: String,
    pub start_url: String,
    pub completed: std::collections::BTreeMap<String, CompletedEntry>,
    pub pending: Vec<String>,
    pub discovered: Vec<String>,
    pub options: serde_json::Value,
    pub started_at: u64,
    pub last_checkpoint: u64,
    pub max_pages: Option<u32>,
}

/// `jobId` is SHA-256(16 hex chars) of `{url, maxPages, maxDepth,
/// includes, excludes}`.
pub fn job_id(url: &str, max_pages: Option<u32>, max_depth: Option<u32>, includes: &[String], excludes: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"url:");
    hasher.update(url.as_bytes());
    hasher.update(b"|maxPages:");
    hasher.update(max_pages.map(|n| n.to_string()).unwrap_or_default().as_bytes());
    hasher.update(b"|maxDepth:");
    hasher.update(max_depth.map(|n| n.to_string()).unwrap_or_default().as_bytes());
    hasher.update(b"|includes:");
    for i in includes {
        hasher.update(i.as_bytes());
        hasher.update(b",");
    }
    hasher.update(b"|excludes:");
    for e in excludes {
        hasher.update(e.as_bytes());
        hasher.update(b",");
    }
    let digest = hasher.finalize();
    hex::encode(digest)[..16].to_string()
}

fn checkpoints_dir() -> PathBuf {
    match std::env::var_os("WEBPEEL_CHECKPOINT_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => dirs::home_dir().unwrap_or_else(std::env::temp_dir).join(".webpeel").join("checkpoints"),
    }
}

fn checkpoint_path(job_id: &str) -> PathBuf {
    checkpoints_dir().join(format!("{job_id}.json"))
}

/// Persist a checkpoint, creating the containing directory if needed.
pub fn save(checkpoint: &CrawlCheckpoint) -> Result<()> {
    let dir = checkpoints_dir();
    std::fs::create_dir_all(&dir).map_err(|e| Error::Cache(format!("failed to create checkpoint dir: {e}")))?;
    let bytes = serde_json::to_vec_pretty(checkpoint).map_err(|e| Error::Cache(format!("failed to serialize checkpoint: {e}")))?;
    std::fs::write(checkpoint_path(&checkpoint.job_id), bytes).map_err(|e| Error::Cache(format!("failed to write checkpoint: {e}")))
}

/// Load a previously saved checkpoint, if one exists for `job_id`.
pub fn load(job_id: &str) -> Result<Option<CrawlCheckpoint>> {
    let path = checkpoint_path(job_id);
    match std::fs::read(&path) {
        Ok(bytes) => {
            let checkpoint = serde_json::from_slice(&bytes).map_err(|e| Error::Cache(format!("failed to parse checkpoint: {e}")))?;
            Ok(Some(checkpoint))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::Cache(format!("failed to read checkpoint: {e}"))),
    }
}

/// Remove a checkpoint once its crawl completes.
pub fn remove(job_id: &str) -> Result<()> {
    match std::fs::remove_file(checkpoint_path(job_id)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::Cache(format!("failed to remove checkpoint: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("webpeel-checkpoint-test-{name}-{}", std::process::id()))
    }

    #[test]
    fn job_id_is_stable_and_distinguishes_inputs() {
        let a = job_id("https://example.com/", Some(10), Some(2), &[], &[]);
        let b = job_id("https://example.com/", Some(10), Some(2), &[], &[]);
        let c = job_id("https://example.com/", Some(20), Some(2), &[], &[]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = test_dir("roundtrip");
        std::env::set_var("WEBPEEL_CHECKPOINT_DIR", &dir);

        let checkpoint = CrawlCheckpoint {
            job_id: "abc123".to_string(),
            start_url: "https://example.com/".to_string(),
            completed: std::collections::BTreeMap::new(),
            pending: vec!["https://example.com/a".to_string()],
            discovered: vec![],
            options: serde_json::json!({}),
            started_at: 1000,
            last_checkpoint: 1001,
            max_pages: Some(50),
        };
        save(&checkpoint).unwrap();
        let loaded = load("abc123").unwrap().expect("checkpoint should exist");
        assert_eq!(loaded.start_url, "https://example.com/");
        assert_eq!(loaded.pending, vec!["https://example.com/a".to_string()]);

        remove("abc123").unwrap();
        assert!(load("abc123").unwrap().is_none());

        std::fs::remove_dir_all(&dir).ok();
        std::env::remove_var("WEBPEEL_CHECKPOINT_DIR");
    }

    #[test]
    fn load_missing_returns_none() {
        let dir = test_dir("missing");
        std::env::set_var("WEBPEEL_CHECKPOINT_DIR", &dir);
        assert!(load("does-not-exist").unwrap().is_none());
        std::env::remove_var("WEBPEEL_CHECKPOINT_DIR");
    }
}
