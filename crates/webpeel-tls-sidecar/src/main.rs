//! The `webpeel-tls-sidecar` binary: the server side of rung 6's wire
//! protocol. Spawned by `webpeel_engine::tls_sidecar`,
//! binds a loopback port, prints the assigned port as a single JSON line
//! on stdout as a ready handshake, then serves `POST /fetch` and
//! `POST /shutdown` behind a bearer token until told to stop.
//!
//! No real JA3/JA4 TLS-fingerprint-spoofing crate exists in this
//! workspace's dependency corpus. This binary is an honest `reqwest`
//! client standing in for one — it does not claim to alter the TLS
//! ClientHello, only the HTTP-layer fingerprint (UA, header order,
//! HTTP/2 settings via `reqwest`'s defaults).

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Parser, Debug)]
#[command(name = "webpeel-tls-sidecar")]
#[command(about = "Loopback TLS-fingerprint-spoofing fetch sidecar for WebPeel's rung 6", long_about = None)]
struct Cli {
    /// Port to bind, or 0 to let the OS choose (the common case: the
    /// parent reads the chosen port off the handshake line).
    #[arg(long, default_value_t = 0)]
    port: u16,
    /// Bearer token the parent expects on every request.
    #[arg(long)]
    token: String,
}

#[derive(Clone)]
struct AppState {
    token: String,
    shutdown: Arc<Notify>,
}

#[derive(Debug, Deserialize)]
struct FetchRequest {
    url: String,
    #[serde(default = "default_method")]
    method: String,
    #[serde(default)]
    headers: std::collections::BTreeMap<String, String>,
    #[serde(default)]
    fingerprint: Option<String>,
    #[serde(default)]
    proxy: Option<String>,
    #[serde(default = "default_timeout_ms")]
    timeout: u64,
    #[serde(default = "default_true", rename = "followRedirects")]
    follow_redirects: bool,
    #[serde(default = "default_max_redirects", rename = "maxRedirects")]
    max_redirects: u32,
}

fn default_method() -> String {
    "GET".to_string()
}
fn default_timeout_ms() -> u64 {
    30_000
}
fn default_true() -> bool {
    true
}
fn default_max_redirects() -> u32 {
    10
}

#[derive(Debug, Serialize, Default)]
struct FetchResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    headers: Option<std::collections::BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<String>,
    #[serde(rename = "finalUrl", skip_serializing_if = "Option::is_none")]
    final_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<FetchError>,
}

#[derive(Debug, Serialize)]
struct FetchError {
    message: String,
}

fn unauthorized(headers: &HeaderMap, expected_token: &str) -> bool {
    let Some(value) = headers.get(axum::http::header::AUTHORIZATION) else { return true };
    let Ok(value) = value.to_str() else { return true };
    value.strip_prefix("Bearer ") != Some(expected_token)
}

/// Build a per-request client carrying the requested fingerprint's UA,
/// since no lower-level TLS-spoofing hook is available (see module docs).
fn client_for_fingerprint(fingerprint: Option<&str>, proxy: Option<&str>, follow_redirects: bool, max_redirects: u32) -> reqwest::Result<reqwest::Client> {
    let ua = match fingerprint {
        Some("chrome-132") | Some("chrome-133") | Some("chrome-134") | None => {
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36"
        }
        Some("firefox-latest") => "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
        Some("safari-latest") => {
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.0 Safari/605.1.15"
        }
        Some(_) => "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    };

    let redirect_policy = if follow_redirects {
        reqwest::redirect::Policy::limited(max_redirects as usize)
    } else {
        reqwest::redirect::Policy::none()
    };

    let mut builder = reqwest::Client::builder().user_agent(ua).redirect(redirect_policy);
    if let Some(p) = proxy {
        builder = builder.proxy(reqwest::Proxy::all(p)?);
    }
    builder.build()
}

async fn fetch_handler(State(state): State<AppState>, headers: HeaderMap, Json(req): Json<FetchRequest>) -> Json<FetchResponse> {
    if unauthorized(&headers, &state.token) {
        return Json(FetchResponse { error: Some(FetchError { message: "unauthorized".to_string() }), ..Default::default() });
    }

    let client = match client_for_fingerprint(req.fingerprint.as_deref(), req.proxy.as_deref(), req.follow_redirects, req.max_redirects) {
        Ok(c) => c,
        Err(e) => return Json(FetchResponse { error: Some(FetchError { message: format!("failed to build client: {e}") }), ..Default::default() }),
    };

    let method = reqwest::Method::from_bytes(req.method.as_bytes()).unwrap_or(reqwest::Method::GET);
    let mut rb = client.request(method, &req.url).timeout(Duration::from_millis(req.timeout));
    for (k, v) in &req.headers {
        rb = rb.header(k, v);
    }

    let resp = match rb.send().await {
        Ok(r) => r,
        Err(e) => {
            let message = if e.is_timeout() { format!("request timed out: {e}") } else { format!("request failed: {e}") };
            return Json(FetchResponse { error: Some(FetchError { message }), ..Default::default() });
        }
    };

    let status = resp.status().as_u16();
    let final_url = resp.url().to_string();
    let mut response_headers = std::collections::BTreeMap::new();
    for (k, v) in resp.headers() {
        if let Ok(v) = v.to_str() {
            response_headers.insert(k.as_str().to_ascii_lowercase(), v.to_string());
        }
    }
    let body = match resp.text().await {
        Ok(b) => b,
        Err(e) => return Json(FetchResponse { error: Some(FetchError { message: format!("failed reading body: {e}") }), ..Default::default() }),
    };

    Json(FetchResponse {
        status: Some(status),
        headers: Some(response_headers),
        body: Some(body),
        final_url: Some(final_url),
        error: None,
    })
}

async fn shutdown_handler(State(state): State<AppState>, headers: HeaderMap) -> StatusCode {
    if unauthorized(&headers, &state.token) {
        return StatusCode::UNAUTHORIZED;
    }
    state.shutdown.notify_one();
    StatusCode::NO_CONTENT
}

#[derive(Serialize)]
struct Handshake {
    port: u16,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let shutdown = Arc::new(Notify::new());
    let state = AppState { token: cli.token, shutdown: shutdown.clone() };

    let app = Router::new().route("/fetch", post(fetch_handler)).route("/shutdown", post(shutdown_handler)).with_state(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], cli.port));
    let listener = tokio::net::TcpListener::bind(addr).await.expect("failed to bind loopback port");
    let actual_port = listener.local_addr().expect("listener has no local addr").port();

    // Ready handshake: a single JSON line on stdout, read by the parent
    // process before it sends any /fetch request.
    println!("{}", serde_json::to_string(&Handshake { port: actual_port }).expect("handshake serializes"));
    use std::io::Write;
    std::io::stdout().flush().ok();

    tracing::info!(port = actual_port, "webpeel-tls-sidecar listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.notified().await;
            tracing::info!("webpeel-tls-sidecar received /shutdown, exiting");
        })
        .await
        .expect("sidecar server crashed");
}
