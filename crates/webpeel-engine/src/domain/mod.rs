//! Domain-aware API shortcuts. Each family calls the target site's public
//! data-plane JSON API directly rather than the rendered page, dispatched
//! by hostname family.

pub mod aggregator;
pub mod codehost;
pub mod forum;
pub mod social;

pub use aggregator::AggregatorExtractor;
pub use codehost::CodeHostExtractor;
pub use forum::ForumExtractor;
pub use social::SocialExtractor;

use std::time::Duration;
use webpeel_core::DomainExtractor;

pub const EXTRACT_TIMEOUT: Duration = Duration::from_secs(15);

/// The registered extractor families, consulted in order by the escalator
/// as its domain-API shortcut rung.
pub fn registered_extractors() -> Vec<Box<dyn DomainExtractor>> {
    vec![
        Box::new(CodeHostExtractor::new()),
        Box::new(AggregatorExtractor::new()),
        Box::new(ForumExtractor::new()),
        Box::new(SocialExtractor::new()),
    ]
}

/// First matching extractor for `url`, if any.
pub fn extractor_for<'a>(
    extractors: &'a [Box<dyn DomainExtractor>],
    url: &url::Url,
) -> Option<&'a dyn DomainExtractor> {
    extractors.iter().find(|e| e.matches(url)).map(|e| e.as_ref())
}
