//! WebPeel's public facade: re-exports `webpeel-core`'s types and
//! `webpeel-engine`'s escalator/pools behind one crate, plus a single
//! convenience entry point (`fetch`) for embedders who don't want to wire
//! up an `EnginePools` themselves. This is the thin process-facing layer
//! over `webpeel-core`/`webpeel-engine`.

pub use webpeel_core::*;
pub use webpeel_engine::{actions, EnginePools, Escalator};

use std::sync::OnceLock;
use tokio::sync::Semaphore;

static POOLS: OnceLock<EnginePools> = OnceLock::new();

fn pools() -> &'static EnginePools {
    POOLS.get_or_init(EnginePools::new)
}

const DEFAULT_FETCH_MANY_CONCURRENCY: usize = 5;

/// Fetch one URL through the full strategy ladder using a process-lifetime
/// shared pool of fetchers/caches. Equivalent to
/// `EnginePools::new().escalator.fetch(..)` but without paying
/// pool-construction cost on every call.
pub async fn fetch(url: &str, options: PeelOptions) -> Result<PeelResult> {
    let req = PeelRequest::new(url, options)?;
    pools().escalator.fetch(&req).await
}

/// Fetch many URLs against the same shared pool, bounded by
/// `options.concurrency` (falling back to a small default). Every URL runs
/// the same `options` against its own `PeelRequest`; a per-URL failure
/// (bad URL, fetch error) surfaces as an `Err` at that URL's position
/// rather than aborting the rest of the batch.
pub async fn fetch_many(urls: &[&str], options: PeelOptions) -> Vec<Result<PeelResult>> {
    let limit = options.concurrency.filter(|c| *c > 0).unwrap_or(DEFAULT_FETCH_MANY_CONCURRENCY);
    let semaphore = Semaphore::new(limit);

    let fetches = urls.iter().map(|url| {
        let options = options.clone();
        let semaphore = &semaphore;
        async move {
            let _permit = semaphore.acquire().await.expect("semaphore is never closed");
            let req = PeelRequest::new(url, options)?;
            pools().escalator.fetch(&req).await
        }
    });

    futures_util::future::join_all(fetches).await
}
