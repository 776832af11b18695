use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Target output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Markdown,
    Text,
    Html,
    Clean,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitUntil {
    DomContentLoaded,
    Load,
    NetworkIdle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScreenshotFormat {
    Png,
    Jpeg,
}

/// One entry in an action list. This is the *normalized* shape —
/// `webpeel_engine::actions::normalize` is responsible for collapsing the
/// competing naming conventions (`ms` vs `milliseconds`, `text` vs `value`,
/// relative vs absolute scroll) into this enum.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Action {
    Wait { ms: u64 },
    Click { selector: String, timeout_ms: Option<u64> },
    Type { selector: String, text: String, timeout_ms: Option<u64> },
    Fill { selector: String, text: String, timeout_ms: Option<u64> },
    Select { selector: String, value: String, timeout_ms: Option<u64> },
    Press { selector: Option<String>, key: String, timeout_ms: Option<u64> },
    Hover { selector: String, timeout_ms: Option<u64> },
    Scroll { to: ScrollTarget },
    WaitForSelector { selector: String, timeout_ms: Option<u64> },
    Screenshot { format: ScreenshotFormat, full_page: bool, quality: Option<u8> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScrollTarget {
    Named(ScrollNamed),
    Pixels { x: i64, y: i64 },
    Relative { direction: ScrollDirection, amount: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollNamed {
    Top,
    Bottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for ScrollTarget {
    fn default() -> Self {
        ScrollTarget::Named(ScrollNamed::Bottom)
    }
}

/// Inline-LLM extraction knobs, kept behind a small adapter interface so
/// provider selection stays swappable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmExtractOptions {
    pub prompt: String,
    pub provider: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
}

/// Cache-control knobs (`noCache`/`cacheTtl`/`storeInCache`/`maxAge` on the wire).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheOptions {
    pub no_cache: bool,
    pub cache_ttl_s: Option<u64>,
    pub store_in_cache: bool,
    pub max_age_s: Option<u64>,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            no_cache: false,
            cache_ttl_s: None,
            store_in_cache: true,
            max_age_s: None,
        }
    }
}

/// Token-budget / lite-mode knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BudgetOptions {
    pub max_tokens: Option<u64>,
    pub lite: bool,
    pub raw: bool,
}

impl Default for BudgetOptions {
    fn default() -> Self {
        Self { max_tokens: None, lite: false, raw: false }
    }
}

impl BudgetOptions {
    /// Resolved token budget: defaults to 4000 tokens unless `lite`/`raw`
    /// opt out of budgeting entirely, or an explicit `max_tokens=Some(0)`
    /// opts out.
    pub fn resolved_budget(&self) -> Option<u64> {
        if self.lite || self.raw {
            return None;
        }
        match self.max_tokens {
            Some(0) => None,
            Some(n) => Some(n),
            None => Some(4000),
        }
    }
}

/// The full recognized option surface, modeled as a single struct with
/// every option enumerated rather than a loose key-value bag.
/// `deny_unknown_fields` makes a typo'd or removed option name a hard
/// deserialization error instead of a silently ignored no-op.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PeelOptions {
    pub format: OutputFormat,
    pub render: bool,
    pub stealth: bool,
    pub cloaked: bool,
    pub wait_ms: u64,
    pub timeout_ms: u64,
    pub selector: Option<String>,
    pub exclude: Vec<String>,
    pub include_tags: Vec<String>,
    pub exclude_tags: Vec<String>,
    pub only_main_content: bool,
    pub actions: Vec<Action>,
    pub screenshot: bool,
    pub full_page: bool,
    pub viewport: Option<Viewport>,
    pub device: Option<String>,
    pub images: bool,
    pub budget: BudgetOptions,
    pub question: Option<String>,
    pub readable: bool,
    pub schema: Option<SchemaSelector>,
    pub extract: Option<LlmExtractOptions>,
    pub location: Option<String>,
    pub languages: Vec<String>,
    pub proxies: Vec<String>,
    pub block_resources: bool,
    pub wait_until: WaitUntil,
    pub wait_selector: Option<String>,
    pub cache: CacheOptions,
    pub chunk: bool,
    pub headers: BTreeMap<String, String>,
    /// How many URLs `fetch_many` may run in flight at once for this batch.
    /// Ignored by a single `fetch` call; `None` lets the caller fall back
    /// to its own default.
    pub concurrency: Option<usize>,
}

impl Default for PeelOptions {
    fn default() -> Self {
        Self {
            format: OutputFormat::Markdown,
            render: false,
            stealth: false,
            cloaked: false,
            wait_ms: 0,
            timeout_ms: 30_000,
            selector: None,
            exclude: Vec::new(),
            include_tags: Vec::new(),
            exclude_tags: Vec::new(),
            only_main_content: false,
            actions: Vec::new(),
            screenshot: false,
            full_page: true,
            viewport: None,
            device: None,
            images: false,
            budget: BudgetOptions::default(),
            question: None,
            readable: false,
            schema: None,
            extract: None,
            location: None,
            languages: Vec::new(),
            proxies: Vec::new(),
            block_resources: true,
            wait_until: WaitUntil::DomContentLoaded,
            wait_selector: None,
            cache: CacheOptions::default(),
            chunk: false,
            headers: BTreeMap::new(),
            concurrency: None,
        }
    }
}

impl PeelOptions {
    /// A non-empty `actions` list auto-enables rendering; `render`/`stealth`
    /// force the browser rungs directly.
    pub fn forces_render(&self) -> bool {
        self.render || self.stealth || self.cloaked || !self.actions.is_empty() || self.screenshot
    }

    pub fn wait(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.wait_ms.min(60_000))
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms)
    }
}

/// A schema-template extraction request: either a named built-in template,
/// or an inline field->question map.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SchemaSelector {
    Named(SchemaTemplate),
    Custom(BTreeMap<String, String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaTemplate {
    Product,
    Article,
    Listing,
    Contact,
    Event,
    Recipe,
    Job,
    Review,
}

impl SchemaTemplate {
    /// Field -> question map, used to drive BM25 extraction.
    pub fn field_questions(self) -> &'static [(&'static str, &'static str)] {
        match self {
            SchemaTemplate::Product => &[
                ("name", "What is the product name?"),
                ("price", "What is the price?"),
                ("currency", "What currency is the price in?"),
                ("availability", "Is the product in stock?"),
                ("brand", "What is the brand?"),
            ],
            SchemaTemplate::Article => &[
                ("headline", "What is the headline or title?"),
                ("author", "Who is the author?"),
                ("published_date", "When was this published?"),
                ("summary", "What is this article about?"),
            ],
            SchemaTemplate::Listing => &[
                ("title", "What is the listing title?"),
                ("price", "What is the price?"),
                ("location", "Where is this located?"),
                ("description", "What is the description?"),
            ],
            SchemaTemplate::Contact => &[
                ("name", "What is the contact name or company name?"),
                ("email", "What is the email address?"),
                ("phone", "What is the phone number?"),
                ("address", "What is the mailing address?"),
            ],
            SchemaTemplate::Event => &[
                ("title", "What is the event name?"),
                ("date", "When does the event take place?"),
                ("location", "Where does the event take place?"),
                ("organizer", "Who is organizing the event?"),
            ],
            SchemaTemplate::Recipe => &[
                ("title", "What is the recipe name?"),
                ("ingredients", "What are the ingredients?"),
                ("steps", "What are the preparation steps?"),
                ("servings", "How many servings does this make?"),
            ],
            SchemaTemplate::Job => &[
                ("title", "What is the job title?"),
                ("company", "What is the company name?"),
                ("location", "Where is the job located?"),
                ("salary", "What is the salary or compensation?"),
            ],
            SchemaTemplate::Review => &[
                ("subject", "What is being reviewed?"),
                ("rating", "What is the rating?"),
                ("author", "Who wrote the review?"),
                ("summary", "What is the review summary?"),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_budget_is_4000() {
        let b = BudgetOptions::default();
        assert_eq!(b.resolved_budget(), Some(4000));
    }

    #[test]
    fn lite_opts_out_of_budget() {
        let b = BudgetOptions { lite: true, ..Default::default() };
        assert_eq!(b.resolved_budget(), None);
    }

    #[test]
    fn explicit_zero_opts_out_of_budget() {
        let b = BudgetOptions { max_tokens: Some(0), ..Default::default() };
        assert_eq!(b.resolved_budget(), None);
    }

    #[test]
    fn actions_force_render() {
        let mut o = PeelOptions::default();
        assert!(!o.forces_render());
        o.actions.push(Action::Wait { ms: 10 });
        assert!(o.forces_render());
    }

    #[test]
    fn concurrency_defaults_to_none() {
        let o = PeelOptions::default();
        assert_eq!(o.concurrency, None);
    }
}
