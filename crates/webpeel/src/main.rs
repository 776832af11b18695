//! `webpeel` CLI: a thin process wrapper over the [`webpeel`] library for
//! smoke-testing the escalator end to end.

use anyhow::Result;
use clap::{Parser, Subcommand};
use webpeel::{
    BudgetOptions, CacheOptions, OutputFormat, PeelOptions, SchemaSelector, SchemaTemplate,
};

#[derive(Parser, Debug)]
#[command(name = "webpeel")]
#[command(about = "Fetch a URL through WebPeel's escalating strategy ladder", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch one URL and print the resulting PeelResult as JSON.
    Fetch(FetchCmd),
    /// Fetch several URLs concurrently and print a JSON array of results.
    FetchMany(FetchManyCmd),
}

#[derive(clap::Args, Debug)]
struct FetchCmd {
    /// URL to fetch.
    url: String,
    /// Output format.
    #[arg(long, value_enum, default_value = "markdown")]
    format: CliFormat,
    /// Force the headless-browser rung.
    #[arg(long)]
    render: bool,
    /// Force the stealth-browser rung.
    #[arg(long)]
    stealth: bool,
    /// Go straight to the TLS-spoofed sidecar rung.
    #[arg(long)]
    cloaked: bool,
    /// Article-only extraction.
    #[arg(long)]
    readable: bool,
    /// BM25-filter blocks to this question before rendering.
    #[arg(long)]
    question: Option<String>,
    /// Named schema template to extract (product, article, listing, ...).
    #[arg(long)]
    schema: Option<String>,
    /// Token budget (0 disables budgeting).
    #[arg(long)]
    max_tokens: Option<u64>,
    /// Skip token budgeting entirely.
    #[arg(long)]
    lite: bool,
    /// Extract absolute image URLs.
    #[arg(long)]
    images: bool,
    /// Bypass the response cache for this request.
    #[arg(long)]
    no_cache: bool,
    /// Per-rung timeout, milliseconds.
    #[arg(long, default_value_t = 30_000)]
    timeout_ms: u64,
    /// A JSON array of action objects, e.g. `[{"type":"wait","ms":500}]`.
    /// Accepts either naming convention (`ms`/`milliseconds`, `text`/`value`).
    #[arg(long)]
    actions: Option<String>,
}

#[derive(clap::Args, Debug)]
struct FetchManyCmd {
    /// URLs to fetch.
    #[arg(required = true)]
    urls: Vec<String>,
    /// Output format.
    #[arg(long, value_enum, default_value = "markdown")]
    format: CliFormat,
    /// How many URLs to fetch in flight at once.
    #[arg(long)]
    concurrency: Option<usize>,
    /// Per-rung timeout, milliseconds.
    #[arg(long, default_value_t = 30_000)]
    timeout_ms: u64,
}

fn parse_actions(raw: &str) -> anyhow::Result<Vec<webpeel::Action>> {
    let values: Vec<serde_json::Value> = serde_json::from_str(raw)
        .map_err(|e| anyhow::anyhow!("--actions is not a JSON array: {e}"))?;
    values
        .iter()
        .map(|v| webpeel::actions::normalize_action(v).map_err(|e| anyhow::anyhow!(e.to_string())))
        .collect()
}

#[derive(clap::ValueEnum, Debug, Clone, Copy)]
enum CliFormat {
    Markdown,
    Text,
    Html,
    Clean,
}

impl From<CliFormat> for OutputFormat {
    fn from(f: CliFormat) -> Self {
        match f {
            CliFormat::Markdown => OutputFormat::Markdown,
            CliFormat::Text => OutputFormat::Text,
            CliFormat::Html => OutputFormat::Html,
            CliFormat::Clean => OutputFormat::Clean,
        }
    }
}

fn parse_schema(name: &str) -> Option<SchemaSelector> {
    let template = match name.to_ascii_lowercase().as_str() {
        "product" => SchemaTemplate::Product,
        "article" => SchemaTemplate::Article,
        "listing" => SchemaTemplate::Listing,
        "contact" => SchemaTemplate::Contact,
        "event" => SchemaTemplate::Event,
        "recipe" => SchemaTemplate::Recipe,
        "job" => SchemaTemplate::Job,
        "review" => SchemaTemplate::Review,
        _ => return None,
    };
    Some(SchemaSelector::Named(template))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Fetch(cmd) => run_fetch(cmd).await,
        Commands::FetchMany(cmd) => run_fetch_many(cmd).await,
    }
}

async fn run_fetch(cmd: FetchCmd) -> Result<()> {
    let mut options = PeelOptions {
        format: cmd.format.into(),
        render: cmd.render,
        stealth: cmd.stealth,
        cloaked: cmd.cloaked,
        readable: cmd.readable,
        question: cmd.question,
        images: cmd.images,
        timeout_ms: cmd.timeout_ms,
        ..PeelOptions::default()
    };
    if let Some(name) = &cmd.schema {
        options.schema = parse_schema(name);
        if options.schema.is_none() {
            anyhow::bail!("unknown schema template: {name}");
        }
    }
    options.budget = BudgetOptions { max_tokens: cmd.max_tokens, lite: cmd.lite, raw: false };
    options.cache = CacheOptions { no_cache: cmd.no_cache, ..CacheOptions::default() };
    if let Some(raw) = &cmd.actions {
        options.actions = parse_actions(raw)?;
    }

    let result = webpeel::fetch(&cmd.url, options)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    if !result.warnings.is_empty() {
        for w in &result.warnings {
            tracing::warn!("{w}");
        }
    }
    Ok(())
}

async fn run_fetch_many(cmd: FetchManyCmd) -> Result<()> {
    let options = PeelOptions {
        format: cmd.format.into(),
        timeout_ms: cmd.timeout_ms,
        concurrency: cmd.concurrency,
        ..PeelOptions::default()
    };

    let urls: Vec<&str> = cmd.urls.iter().map(String::as_str).collect();
    let results = webpeel::fetch_many(&urls, options).await;

    let printable: Vec<serde_json::Value> = results
        .into_iter()
        .map(|r| match r {
            Ok(result) => serde_json::to_value(result).unwrap_or(serde_json::Value::Null),
            Err(e) => serde_json::json!({ "error": e.to_string() }),
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&printable)?);
    Ok(())
}
