//! Backend-agnostic types, error taxonomy, and traits for WebPeel's fetch
//! pipeline. This crate has no network/filesystem/browser dependencies,
//! only the shapes every other crate in the workspace agrees on.

pub mod error;
pub mod fingerprint;
pub mod model;
pub mod options;
pub mod request;
pub mod traits;

pub use error::{Error, Result, UserError};
pub use model::{FetchMethod, FetchResult, PageMetadata, PeelResult, Timings};
pub use options::{
    Action, BudgetOptions, CacheOptions, LlmExtractOptions, OutputFormat, PeelOptions,
    SchemaSelector, SchemaTemplate, ScreenshotFormat, ScrollDirection, ScrollNamed, ScrollTarget,
    Viewport, WaitUntil,
};
pub use request::PeelRequest;
pub use traits::{DomainExtractResult, DomainExtractor, Fetcher};
