//! The WebPeel fetch pipeline: the strategy escalator, every individual
//! fetcher rung, the two-tier cache, domain-API shortcuts, the content
//! distillation pipeline, and the process-lifetime resource pools that
//! wire them all together.
//!
//! Module layout is one file per concern, declared flat off the crate
//! root rather than nested further.

pub mod actions;
pub mod browser;
pub mod cache;
pub mod challenge;
pub mod checkpoint;
pub mod domain;
pub mod escalator;
pub mod extract;
pub mod http_fetcher;
pub mod keys;
pub mod pools;
pub mod ssrf;
pub mod textprep;
pub mod tls_sidecar;
pub mod ua;
pub mod validators;

pub use escalator::Escalator;
pub use pools::EnginePools;
