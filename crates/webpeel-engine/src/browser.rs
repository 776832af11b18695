//! Rungs 4 and 5 of the escalator: headless and stealth browser rendering.
//!
//! A Node + Playwright child process, args passed over stdin as JSON, a
//! single JSON line read from stdout, and — critically — `child.wait()`
//! itself wrapped in `tokio::time::timeout` rather than checking elapsed
//! time after the fact. A page-pool concurrency cap bounds how many
//! browser pages can be in flight at once.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Semaphore, SemaphorePermit};
use webpeel_core::{Error, FetchMethod, FetchResult, Fetcher, PeelRequest, Result};

pub const MAX_CONCURRENT_PAGES: usize = 5;
pub const POOL_WAIT: Duration = Duration::from_secs(30);

/// Caps concurrent in-use pages and tracks how many of the warm-page
/// budget are currently checked out, mirroring `riptide_browser`'s
/// `BrowserPool`/`PoolEvent` bookkeeping even though the underlying
/// implementation is a spawn-per-checkout child process, not a long-lived
/// browser instance with real page objects.
pub struct PagePool {
    slots: Arc<Semaphore>,
    warm_in_use: AtomicUsize,
}

impl PagePool {
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Semaphore::new(MAX_CONCURRENT_PAGES)),
            warm_in_use: AtomicUsize::new(0),
        }
    }

    /// Blocks until a slot is free or `POOL_WAIT` elapses.
    pub async fn checkout(&self) -> Result<PageCheckout<'_>> {
        let permit = tokio::time::timeout(POOL_WAIT, self.slots.acquire())
            .await
            .map_err(|_| Error::Timeout("timed out waiting for a browser page slot".to_string()))?
            .map_err(|_| Error::Aborted("page pool is shutting down".to_string()))?;
        self.warm_in_use.fetch_add(1, Ordering::SeqCst);
        Ok(PageCheckout { _permit: permit, pool: self })
    }

    pub fn in_use(&self) -> usize {
        self.warm_in_use.load(Ordering::SeqCst)
    }
}

impl Default for PagePool {
    fn default() -> Self {
        Self::new()
    }
}

/// A page returned to the pool must be observationally indistinguishable
/// from a fresh page. Each checkout maps to a fresh child-process
/// invocation, so sanitize-on-release (cookies/routes/viewport reset) is
/// satisfied unconditionally rather than by an explicit cleanup step.
pub struct PageCheckout<'a> {
    _permit: SemaphorePermit<'a>,
    pool: &'a PagePool,
}

impl Drop for PageCheckout<'_> {
    fn drop(&mut self) {
        self.pool.warm_in_use.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub final_url: String,
    pub status: Option<u16>,
    pub html: String,
    pub console_error_count: u64,
    pub screenshot: Option<Vec<u8>>,
    pub auto_scroll: Option<crate::actions::AutoScrollResult>,
}

const MAX_HTML_CHARS: usize = 2_000_000;

fn node_bin() -> String {
    std::env::var("WEBPEEL_NODE_PATH").unwrap_or_else(|_| "node".to_string())
}

/// The embedded render script: an inline `node -e` payload that reads one
/// JSON line of args from stdin, writes one JSON line
/// of either `{ok:true,...}` or `{ok:false,error:{code,message}}` to
/// stdout. Blocks `image`/`font`/`media`/`stylesheet` unless
/// `blockResources` is false (screenshot or stealth requests).
const RENDER_SCRIPT: &str = r#"
const { chromium } = require('playwright');
function ok(obj) { process.stdout.write(JSON.stringify(obj)); }
function bad(code, message) { ok({ ok: false, error: { code, message } }); }
let chunks = [];
process.stdin.on('data', (d) => chunks.push(d));
process.stdin.on('end', async () => {
  let req;
  try { req = JSON.parse(Buffer.concat(chunks).toString('utf8')); }
  catch (e) { return bad('invalid_params', 'bad JSON args'); }
  let browser;
  try {
    browser = await chromium.launch({ headless: true });
    const context = await browser.newContext({
      viewport: req.viewport || { width: 1280, height: 800 },
      userAgent: req.userAgent,
      locale: req.locale || 'en-US',
    });
    const page = await context.newPage();
    if (req.blockResources) {
      await page.route('**/*', (route) => {
        const type = route.request().resourceType();
        if (['image', 'font', 'media', 'stylesheet'].includes(type)) return route.abort();
        return route.continue();
      });
    }
    let consoleErrors = 0;
    page.on('console', (msg) => { if (msg.type() === 'error') consoleErrors++; });
    const resp = await page.goto(req.url, { waitUntil: 'domcontentloaded', timeout: req.timeoutMs });
    let html = await page.content();
    if (html.replace(/<[^>]+>/g, '').trim().length < 500) {
      try { await page.waitForLoadState('networkidle', { timeout: 2000 }); html = await page.content(); } catch (e) {}
    }
    if (req.stealthDelayMs) await page.waitForTimeout(req.stealthDelayMs);
    let screenshotBuffer = null;
    let autoScrollResult = null;
    for (const action of (req.actions || [])) {
      const result = await runAction(page, action);
      if (Buffer.isBuffer(result)) screenshotBuffer = result;
      else if (result && typeof result === 'object') autoScrollResult = result;
    }
    ok({
      ok: true,
      finalUrl: page.url(),
      status: resp ? resp.status() : null,
      html,
      consoleErrorCount: consoleErrors,
      screenshot: screenshotBuffer ? screenshotBuffer.toString('base64') : undefined,
      autoScroll: autoScrollResult || undefined,
    });
  } catch (e) {
    bad('fetch_failed', String(e && e.message || e));
  } finally {
    if (browser) await browser.close().catch(() => {});
  }
});
async function runAction(page, action) {
  const timeout = action.timeoutMs || 5000;
  switch (action.type) {
    case 'wait': return page.waitForTimeout(action.ms);
    case 'click': return page.click(action.selector, { timeout });
    case 'type': return page.type(action.selector, action.text, { timeout });
    case 'fill': return page.fill(action.selector, action.text, { timeout });
    case 'select': return page.selectOption(action.selector, action.value, { timeout });
    case 'hover': return page.hover(action.selector, { timeout });
    case 'press': return action.selector ? page.press(action.selector, action.key, { timeout }) : page.keyboard.press(action.key);
    case 'scroll': return runScroll(page, action);
    case 'waitforselector': return page.waitForSelector(action.selector, { timeout });
    case 'screenshot': return page.screenshot({ type: action.format, fullPage: action.fullPage });
    default: return;
  }
}
async function runScroll(page, action) {
  const to = action.to;
  if (action.autoScroll) {
    const maxIterations = action.autoScrollMaxIterations || 20;
    const stableProbes = action.autoScrollStableProbes || 2;
    const deadline = Date.now() + (action.autoScrollTimeoutMs || 30000);
    const startHeight = await page.evaluate(() => document.body.scrollHeight);
    let lastHeight = startHeight;
    let stable = 0;
    let iterations = 0;
    while (iterations < maxIterations && stable < stableProbes && Date.now() < deadline) {
      await page.evaluate(() => window.scrollTo(0, document.body.scrollHeight));
      await page.waitForTimeout(300);
      const height = await page.evaluate(() => document.body.scrollHeight);
      iterations++;
      stable = height === lastHeight ? stable + 1 : 0;
      lastHeight = height;
    }
    return { scrollCount: iterations, finalHeight: lastHeight, contentGrew: lastHeight > startHeight };
  }
  if (to && typeof to === 'object' && 'direction' in to && 'amount' in to) {
    const dx = to.direction === 'left' ? -to.amount : to.direction === 'right' ? to.amount : 0;
    const dy = to.direction === 'up' ? -to.amount : to.direction === 'down' ? to.amount : 0;
    return page.evaluate(([x, y]) => window.scrollBy(x, y), [dx, dy]);
  }
  if (to === 'top') {
    return page.evaluate(() => window.scrollTo(0, 0));
  }
  if (to && typeof to === 'object' && 'x' in to && 'y' in to) {
    return page.evaluate(([x, y]) => window.scrollTo(x, y), [to.x, to.y]);
  }
  return page.evaluate(() => window.scrollTo(0, document.body.scrollHeight));
}
"#;

/// Drives one render through the embedded script, wrapping `child.wait()`
/// in a timeout, plus cancellation: if `deadline` elapses first, the child
/// is killed and an `Aborted` error surfaces instead of a timeout.
async fn run_render_script(
    args: serde_json::Value,
    timeout: Duration,
) -> Result<RenderedPage> {
    let mut cmd = tokio::process::Command::new(node_bin());
    cmd.arg("-e")
        .arg(RENDER_SCRIPT)
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped());

    let mut child = cmd
        .spawn()
        .map_err(|e| Error::NotConfigured(format!("failed to launch node for rendering: {e}")))?;

    if let Some(mut stdin) = child.stdin.take() {
        let payload = serde_json::to_vec(&args).unwrap_or_default();
        let _ = stdin.write_all(&payload).await;
        let _ = stdin.shutdown().await;
    }

    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::Network("missing stdout pipe from render process".to_string()))?;
    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = tokio::io::AsyncReadExt::read_to_end(&mut stdout, &mut buf).await;
        buf
    });

    let hard_timeout = timeout + Duration::from_secs(10);
    match tokio::time::timeout(hard_timeout, child.wait()).await {
        Ok(Ok(_status)) => {}
        Ok(Err(e)) => {
            stdout_task.abort();
            return Err(Error::Network(format!("render process wait failed: {e}")));
        }
        Err(_) => {
            let _ = child.kill().await;
            let _ = child.wait().await;
            stdout_task.abort();
            return Err(Error::Aborted("render process exceeded its deadline".to_string()));
        }
    }

    let raw = stdout_task.await.unwrap_or_default();
    let text = String::from_utf8_lossy(&raw);
    let text = text.trim();
    if text.is_empty() {
        return Err(Error::Network("render process produced no output".to_string()));
    }
    let truncated = if text.len() > MAX_HTML_CHARS { &text[..MAX_HTML_CHARS] } else { text };
    let v: serde_json::Value = serde_json::from_str(truncated)
        .map_err(|e| Error::Network(format!("render process returned invalid JSON: {e}")))?;

    if v.get("ok").and_then(serde_json::Value::as_bool) != Some(true) {
        let code = v.pointer("/error/code").and_then(|c| c.as_str()).unwrap_or("fetch_failed");
        let message = v.pointer("/error/message").and_then(|m| m.as_str()).unwrap_or("render failed");
        return Err(match code {
            "not_configured" => Error::NotConfigured(message.to_string()),
            "invalid_params" => Error::Validation(message.to_string()),
            _ => Error::Blocked(message.to_string()),
        });
    }

    let html = v.get("html").and_then(|h| h.as_str()).unwrap_or_default();
    if html.trim().is_empty() {
        return Err(Error::Blocked("render returned empty HTML".to_string()));
    }
    let html = if html.len() > MAX_HTML_CHARS { html[..MAX_HTML_CHARS].to_string() } else { html.to_string() };

    let screenshot = v.get("screenshot").and_then(|s| s.as_str()).and_then(|encoded| {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.decode(encoded).ok()
    });

    let auto_scroll = v.get("autoScroll").map(|a| crate::actions::AutoScrollResult {
        scroll_count: a.get("scrollCount").and_then(|c| c.as_u64()).unwrap_or(0) as u32,
        final_height: a.get("finalHeight").and_then(|h| h.as_u64()).unwrap_or(0),
        content_grew: a.get("contentGrew").and_then(|g| g.as_bool()).unwrap_or(false),
    });

    Ok(RenderedPage {
        final_url: v.get("finalUrl").and_then(|u| u.as_str()).unwrap_or_default().to_string(),
        status: v.get("status").and_then(|s| s.as_u64()).map(|s| s as u16),
        html,
        console_error_count: v.get("consoleErrorCount").and_then(|c| c.as_u64()).unwrap_or(0),
        screenshot,
        auto_scroll,
    })
}

/// The caller-requested timeout for one action, if that variant carries one.
fn action_timeout(action: &webpeel_core::Action) -> Option<Duration> {
    use webpeel_core::Action;
    let ms = match action {
        Action::Click { timeout_ms, .. }
        | Action::Type { timeout_ms, .. }
        | Action::Fill { timeout_ms, .. }
        | Action::Select { timeout_ms, .. }
        | Action::Press { timeout_ms, .. }
        | Action::Hover { timeout_ms, .. }
        | Action::WaitForSelector { timeout_ms, .. } => *timeout_ms,
        Action::Wait { .. } | Action::Scroll { .. } | Action::Screenshot { .. } => None,
    };
    ms.map(Duration::from_millis)
}

fn is_binary_document(url: &url::Url) -> bool {
    let path = url.path().to_ascii_lowercase();
    path.ends_with(".pdf") || path.ends_with(".docx")
}

pub struct BrowserFetcher {
    pool: Arc<PagePool>,
    stealth: bool,
    method: FetchMethod,
}

impl BrowserFetcher {
    pub fn headless(pool: Arc<PagePool>) -> Self {
        Self { pool, stealth: false, method: FetchMethod::Browser }
    }

    pub fn stealth(pool: Arc<PagePool>) -> Self {
        Self { pool, stealth: true, method: FetchMethod::Stealth }
    }
}

#[async_trait::async_trait]
impl webpeel_core::Fetcher for BrowserFetcher {
    fn method(&self) -> FetchMethod {
        self.method
    }

    async fn fetch(&self, req: &PeelRequest) -> Result<FetchResult> {
        crate::ssrf::validate_url(&req.url)?;

        if is_binary_document(&req.url) {
            // Binary document navigation: skip the browser entirely and
            // read raw bytes directly.
            return crate::http_fetcher::SimpleHttpFetcher::new(Arc::new(
                crate::validators::ValidatorCache::new(),
            ))
            .fetch(req)
            .await
            .map(|mut r| {
                r.method = self.method;
                r
            });
        }

        let _checkout = req.race(self.pool.checkout()).await??;

        let profile = crate::ua::random_profile();
        let block_resources = !self.stealth && !req.options.screenshot;
        let stealth_delay_ms = if self.stealth {
            use rand::Rng;
            rand::thread_rng().gen_range(500..=2000)
        } else {
            0
        };

        let mut actions_json = Vec::new();
        let mut actions_budget = crate::actions::TOTAL_ACTIONS_DEADLINE;
        for action in &req.options.actions {
            let mut value = serde_json::to_value(action).unwrap_or(serde_json::Value::Null);
            let clamped = crate::actions::clamp_action_timeout(action_timeout(action), actions_budget);
            actions_budget = actions_budget.saturating_sub(clamped);
            if let serde_json::Value::Object(ref mut obj) = value {
                obj.insert("timeoutMs".to_string(), serde_json::json!(clamped.as_millis() as u64));
                if matches!(
                    action,
                    webpeel_core::Action::Scroll {
                        to: webpeel_core::ScrollTarget::Named(webpeel_core::ScrollNamed::Bottom)
                    }
                ) {
                    obj.insert("autoScroll".to_string(), serde_json::json!(true));
                    obj.insert(
                        "autoScrollMaxIterations".to_string(),
                        serde_json::json!(crate::actions::AUTO_SCROLL_MAX_ITERATIONS),
                    );
                    obj.insert(
                        "autoScrollStableProbes".to_string(),
                        serde_json::json!(crate::actions::AUTO_SCROLL_STABLE_PROBES),
                    );
                    obj.insert(
                        "autoScrollTimeoutMs".to_string(),
                        serde_json::json!(crate::actions::AUTO_SCROLL_TIMEOUT.as_millis() as u64),
                    );
                }
            }
            if let serde_json::Value::Object(ref mut obj) = value {
                if let Some(full_page) = obj.remove("full_page") {
                    obj.insert("fullPage".to_string(), full_page);
                }
            }
            actions_json.push(value);
        }

        // `options.screenshot` without an explicit screenshot action means
        // "capture one at the end of the action list".
        let has_explicit_screenshot = req.options.actions.iter().any(|a| matches!(a, webpeel_core::Action::Screenshot { .. }));
        if req.options.screenshot && !has_explicit_screenshot {
            actions_json.push(serde_json::json!({
                "type": "screenshot",
                "format": "png",
                "fullPage": req.options.full_page,
            }));
        }

        let args = serde_json::json!({
            "url": req.url.as_str(),
            "userAgent": profile.user_agent,
            "viewport": req.options.viewport.map(|v| serde_json::json!({"width": v.width, "height": v.height})),
            "blockResources": block_resources,
            "stealthDelayMs": stealth_delay_ms,
            "timeoutMs": req.remaining().as_millis().min(30_000) as u64,
            "actions": actions_json,
        });

        let rendered = req
            .race(run_render_script(args, req.remaining().min(Duration::from_secs(30))))
            .await??;

        let mut headers = std::collections::BTreeMap::new();
        headers.insert("x-webpeel-console-errors".to_string(), rendered.console_error_count.to_string());
        if let Some(auto_scroll) = rendered.auto_scroll {
            headers.insert("x-webpeel-auto-scroll-count".to_string(), auto_scroll.scroll_count.to_string());
            headers.insert("x-webpeel-auto-scroll-grew".to_string(), auto_scroll.content_grew.to_string());
        }

        let screenshot = rendered.screenshot;
        Ok(FetchResult {
            url: req.url.to_string(),
            final_url: if rendered.final_url.is_empty() { req.url.to_string() } else { rendered.final_url },
            status: rendered.status.unwrap_or(200),
            content_type: Some("text/html".to_string()),
            bytes: rendered.html.into_bytes(),
            screenshot,
            headers,
            method: self.method,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn page_pool_caps_concurrent_checkouts() {
        let pool = PagePool::new();
        let mut guards = Vec::new();
        for _ in 0..MAX_CONCURRENT_PAGES {
            guards.push(pool.checkout().await.unwrap());
        }
        assert_eq!(pool.in_use(), MAX_CONCURRENT_PAGES);
        drop(guards);
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn binary_document_detection() {
        let pdf = url::Url::parse("https://example.com/paper.pdf").unwrap();
        let html = url::Url::parse("https://example.com/paper").unwrap();
        assert!(is_binary_document(&pdf));
        assert!(!is_binary_document(&html));
    }

    #[test]
    fn action_timeout_reads_the_right_variant_field() {
        let click = webpeel_core::Action::Click { selector: "#x".to_string(), timeout_ms: Some(1500) };
        assert_eq!(action_timeout(&click), Some(Duration::from_millis(1500)));
        let wait = webpeel_core::Action::Wait { ms: 200 };
        assert_eq!(action_timeout(&wait), None);
    }
}
