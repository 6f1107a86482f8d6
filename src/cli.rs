//! CLI parsing and orchestration. Parses args, builds the API client from flags,
//! environment, and config, runs one subcommand, and maps errors to exit codes.

use crate::api::{ApiClient, ApiError, SearchApi};
use crate::config::{self, Config};
use crate::export::{render_table, write_csv, write_json, ExportError, ExportFormat};
use crate::page::is_404_page;
use crate::query::{AdType, OwnerType, SearchQuery, SortBy, SortOrder, DEFAULT_SITE_URL};
use crate::scan::{scan_categories, Aggregation, ScanOptions, DEFAULT_MAX_CAT, DEFAULT_MAX_JUMP};
use clap::{ArgAction, Parser, Subcommand};
use reqwest::Url;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_CATALOG_STEM: &str = "leboncoin_categories";

/// CLI error carrying exit code and message.
#[derive(Debug, Error)]
pub enum CliRunError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Api(#[from] ApiError),

    #[error("{0}")]
    Export(#[from] ExportError),
}

impl CliRunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliRunError::InvalidInput(_) => 1,
            CliRunError::Api(ApiError::MissingApiKey | ApiError::InvalidApiKey) => 1,
            CliRunError::Api(_) => 2,
            CliRunError::Export(_) => 3,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "lbcscan")]
#[command(about = "Crawl, render, and search Leboncoin through the Piloterr API, and discover its category catalog")]
#[command(
    after_help = "Config file keys (api_key, base_url, site_url, user_agent, timeout_secs, request_delay_secs, max_jump, max_cat, output_dir) are read from ./lbcscan.toml or the user config dir. The API key can also be set with PILOTERR_API_KEY. CLI flags override config."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// API key (overrides PILOTERR_API_KEY and config).
    #[arg(long, global = true)]
    pub api_key: Option<String>,

    /// API root URL (overrides config; default https://piloterr.com/api/v2).
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Request timeout in seconds (overrides config; default 30).
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Minimum delay between requests in seconds (overrides config; default 0).
    #[arg(long, global = true)]
    pub delay: Option<u64>,

    /// Suppress progress and log output (errors only).
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// More log output; repeat for trace level. Also prints the error cause chain.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch a page through the generic crawler and print its HTML.
    Crawl {
        url: String,
        /// Write the HTML here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Render a page in the remote browser, optionally scrolling, and print its HTML.
    Render {
        url: String,
        /// Seconds the renderer waits before capturing.
        #[arg(long, default_value_t = 5)]
        wait: u32,
        /// Number of 2000px scroll steps to perform before capturing.
        #[arg(long, default_value_t = 0)]
        scroll: u32,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run a marketplace search and print the raw JSON. Pass a full
    /// https://www.leboncoin.fr/recherche?... URL, or build one from the filter flags.
    Search {
        /// Full search URL; cannot be combined with the filter flags.
        #[arg(conflicts_with_all = ["category", "ad_type", "urgent", "owner_type", "sort", "order", "site"])]
        query: Option<String>,
        #[command(flatten)]
        filters: SearchFilters,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Scan category IDs and build the category catalog.
    Categories {
        /// all: every ad, distinct categories sorted by ID. first: first ad of each page, in scan order.
        #[arg(long, default_value = "all", value_parser = parse_strategy)]
        strategy: Aggregation,
        /// Consecutive failed pages that stop the scan (overrides config; default 5).
        #[arg(long)]
        max_jump: Option<u32>,
        /// Highest category ID to scan (overrides config; default 100).
        #[arg(long)]
        max_cat: Option<u32>,
        /// Marketplace root URL (overrides config; default https://www.leboncoin.fr).
        #[arg(long)]
        site: Option<String>,
        /// Output format: table, csv, or json.
        #[arg(long, default_value = "table", value_parser = parse_export_format)]
        format: ExportFormat,
        /// Output path. Default for csv/json: {output_dir}/leboncoin_categories.{ext}. Tables go to stdout unless set.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check a saved HTML file for the marketplace's 404 page.
    #[command(name = "is-404")]
    Is404 { file: PathBuf },
}

fn parse_strategy(s: &str) -> Result<Aggregation, String> {
    match s.to_lowercase().as_str() {
        "all" | "collect-all" => Ok(Aggregation::CollectAll),
        "first" | "collect-first" => Ok(Aggregation::CollectFirst),
        _ => Err(format!(
            "Invalid --strategy value: '{}'. Use all or first.",
            s
        )),
    }
}

fn parse_export_format(s: &str) -> Result<ExportFormat, String> {
    match s.to_lowercase().as_str() {
        "csv" => Ok(ExportFormat::Csv),
        "json" => Ok(ExportFormat::Json),
        "table" | "txt" => Ok(ExportFormat::Table),
        _ => Err(format!(
            "Invalid --format value: '{}'. Use table, csv, or json.",
            s
        )),
    }
}

/// Search filters for `search` when no query URL is given.
#[derive(clap::Args, Debug, Default)]
pub struct SearchFilters {
    /// Category ID.
    #[arg(long)]
    pub category: Option<u32>,
    /// offer or demand.
    #[arg(long, value_parser = parse_ad_type)]
    pub ad_type: Option<AdType>,
    /// Only urgent listings.
    #[arg(long)]
    pub urgent: bool,
    /// private or pro.
    #[arg(long, value_parser = parse_owner_type)]
    pub owner_type: Option<OwnerType>,
    /// relevance (default), time, or price.
    #[arg(long, value_parser = parse_sort)]
    pub sort: Option<SortBy>,
    /// asc or desc.
    #[arg(long, value_parser = parse_order)]
    pub order: Option<SortOrder>,
    /// Marketplace root URL (overrides config; default https://www.leboncoin.fr).
    #[arg(long)]
    pub site: Option<String>,
}

impl SearchFilters {
    fn to_query(&self) -> SearchQuery {
        SearchQuery {
            category: self.category,
            ad_type: self.ad_type,
            urgent: self.urgent,
            owner_type: self.owner_type,
            sort: self.sort.unwrap_or_default(),
            order: self.order,
        }
    }
}

fn parse_ad_type(s: &str) -> Result<AdType, String> {
    match s.to_lowercase().as_str() {
        "offer" => Ok(AdType::Offer),
        "demand" => Ok(AdType::Demand),
        _ => Err(format!(
            "Invalid --ad-type value: '{}'. Use offer or demand.",
            s
        )),
    }
}

fn parse_owner_type(s: &str) -> Result<OwnerType, String> {
    match s.to_lowercase().as_str() {
        "private" => Ok(OwnerType::Private),
        "pro" => Ok(OwnerType::Pro),
        _ => Err(format!(
            "Invalid --owner-type value: '{}'. Use private or pro.",
            s
        )),
    }
}

fn parse_sort(s: &str) -> Result<SortBy, String> {
    match s.to_lowercase().as_str() {
        "relevance" => Ok(SortBy::Relevance),
        "time" => Ok(SortBy::Time),
        "price" => Ok(SortBy::Price),
        _ => Err(format!(
            "Invalid --sort value: '{}'. Use relevance, time, or price.",
            s
        )),
    }
}

fn parse_order(s: &str) -> Result<SortOrder, String> {
    match s.to_lowercase().as_str() {
        "asc" => Ok(SortOrder::Asc),
        "desc" => Ok(SortOrder::Desc),
        _ => Err(format!(
            "Invalid --order value: '{}'. Use asc or desc.",
            s
        )),
    }
}

/// Site root: flag, then config, then the default marketplace.
fn resolve_site_url(flag: Option<&str>, config: Option<&Config>) -> Result<String, CliRunError> {
    let site = flag
        .map(String::from)
        .or_else(|| config.and_then(|c| c.site_url.clone()))
        .unwrap_or_else(|| DEFAULT_SITE_URL.to_string());
    validate_site_url(&site)?;
    Ok(site)
}

fn extension_for_format(format: ExportFormat) -> &'static str {
    match format {
        ExportFormat::Csv => "csv",
        ExportFormat::Json => "json",
        ExportFormat::Table => "txt",
    }
}

/// Ensure output path parent exists.
fn validate_output_path(path: &Path) -> Result<(), CliRunError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            return Err(CliRunError::InvalidInput(format!(
                "Cannot write output: {}: parent directory does not exist.",
                path.display()
            )));
        }
    }
    Ok(())
}

fn validate_site_url(site: &str) -> Result<(), CliRunError> {
    let url = Url::parse(site).map_err(|e| {
        CliRunError::InvalidInput(format!("Invalid site URL {}: {}", site, e))
    })?;
    if url.host_str().is_none() {
        return Err(CliRunError::InvalidInput(format!(
            "Invalid site URL {}: URL has no host",
            site
        )));
    }
    Ok(())
}

/// Print `text` to stdout, or write it to `output`.
fn emit(text: &str, output: Option<&Path>) -> Result<(), CliRunError> {
    match output {
        Some(path) => {
            validate_output_path(path)?;
            std::fs::write(path, text).map_err(|e| {
                CliRunError::Export(ExportError::Io {
                    path: path.to_path_buf(),
                    source: e,
                })
            })?;
            tracing::info!(path = %path.display(), "Wrote output");
            Ok(())
        }
        None => {
            println!("{}", text);
            Ok(())
        }
    }
}

fn build_client(args: &Args, config: Option<&Config>) -> Result<ApiClient, CliRunError> {
    const DEFAULT_TIMEOUT_SECS: u64 = 30;
    const DEFAULT_DELAY_SECS: u64 = 0;

    let env_key = std::env::var(config::API_KEY_ENV).ok();
    let api_key = config::resolve_api_key(args.api_key.as_deref(), env_key.as_deref(), config)
        .ok_or(ApiError::MissingApiKey)?;
    let timeout_secs = args
        .timeout
        .or_else(|| config.and_then(|c| c.timeout_secs))
        .unwrap_or(DEFAULT_TIMEOUT_SECS);
    let delay_secs = args
        .delay
        .or_else(|| config.and_then(|c| c.request_delay_secs))
        .unwrap_or(DEFAULT_DELAY_SECS);

    let mut builder = ApiClient::builder()
        .api_key(api_key)
        .timeout_secs(timeout_secs)
        .delay_secs(delay_secs);
    if let Some(base) = args
        .base_url
        .clone()
        .or_else(|| config.and_then(|c| c.base_url.clone()))
    {
        builder = builder.base_url(base);
    }
    if let Some(ua) = config.and_then(|c| c.user_agent.clone()) {
        builder = builder.user_agent(ua);
    }
    Ok(builder.build()?)
}

/// Load config and build the API client for the subcommands that talk to the API.
fn connect(args: &Args) -> Result<(Option<Config>, ApiClient), CliRunError> {
    let config = config::load_config().map_err(CliRunError::InvalidInput)?;
    let client = build_client(args, config.as_ref())?;
    Ok((config, client))
}

fn check_404(file: &Path) -> Result<(), CliRunError> {
    let html = std::fs::read_to_string(file).map_err(|e| {
        CliRunError::InvalidInput(format!("Cannot read {}: {}", file.display(), e))
    })?;
    println!("{}", if is_404_page(&html) { "404" } else { "ok" });
    Ok(())
}

/// Entry point for the CLI. Returns Ok(()) on success; Err with exit code and message on failure.
pub fn run(args: &Args) -> Result<(), CliRunError> {
    match &args.command {
        Command::Is404 { file } => check_404(file),
        Command::Crawl { url, output } => {
            let (_, mut client) = connect(args)?;
            let html = client.crawl(url)?;
            emit(&html, output.as_deref())
        }
        Command::Render {
            url,
            wait,
            scroll,
            output,
        } => {
            let (_, mut client) = connect(args)?;
            let html = client.render(url, *wait, *scroll)?;
            emit(&html, output.as_deref())
        }
        Command::Search {
            query,
            filters,
            output,
        } => {
            let (config, mut client) = connect(args)?;
            let url = match query {
                Some(q) => q.clone(),
                None => filters
                    .to_query()
                    .to_url(&resolve_site_url(filters.site.as_deref(), config.as_ref())?),
            };
            let raw = client.search(&url)?;
            if !raw.is_success() {
                tracing::warn!(status = raw.status, "Search returned a non-success status");
            }
            emit(&raw.body, output.as_deref())
        }
        Command::Categories {
            strategy,
            max_jump,
            max_cat,
            site,
            format,
            output,
        } => {
            let (config, mut client) = connect(args)?;
            run_categories(
                args.quiet,
                config.as_ref(),
                &mut client,
                CategoriesArgs {
                    strategy: *strategy,
                    max_jump: *max_jump,
                    max_cat: *max_cat,
                    site: site.as_deref(),
                    format: *format,
                    output: output.as_deref(),
                },
            )
        }
    }
}

struct CategoriesArgs<'a> {
    strategy: Aggregation,
    max_jump: Option<u32>,
    max_cat: Option<u32>,
    site: Option<&'a str>,
    format: ExportFormat,
    output: Option<&'a Path>,
}

/// Effective scan settings after merging flags, config, and defaults.
#[derive(Debug, PartialEq, Eq)]
struct ScanSettings {
    site_url: String,
    max_jump: u32,
    max_cat: u32,
    /// None: print a table to stdout.
    output_path: Option<PathBuf>,
}

fn scan_settings(
    cat: &CategoriesArgs<'_>,
    config: Option<&Config>,
) -> Result<ScanSettings, CliRunError> {
    let site_url = resolve_site_url(cat.site, config)?;
    let max_jump = cat
        .max_jump
        .or_else(|| config.and_then(|c| c.max_jump))
        .unwrap_or(DEFAULT_MAX_JUMP);
    let max_cat = cat
        .max_cat
        .or_else(|| config.and_then(|c| c.max_cat))
        .unwrap_or(DEFAULT_MAX_CAT);

    let output_path: Option<PathBuf> = match (cat.output, cat.format) {
        (Some(p), _) => Some(p.to_path_buf()),
        (None, ExportFormat::Table) => None,
        (None, format) => {
            let dir = config
                .and_then(|c| c.output_dir.clone())
                .unwrap_or_else(|| PathBuf::from("."));
            Some(dir.join(format!(
                "{}.{}",
                DEFAULT_CATALOG_STEM,
                extension_for_format(format)
            )))
        }
    };
    if let Some(ref p) = output_path {
        validate_output_path(p)?;
    }
    Ok(ScanSettings {
        site_url,
        max_jump,
        max_cat,
        output_path,
    })
}

fn run_categories(
    quiet: bool,
    config: Option<&Config>,
    client: &mut dyn SearchApi,
    cat: CategoriesArgs<'_>,
) -> Result<(), CliRunError> {
    // Resolved before scanning so a bad site or output path fails fast.
    let ScanSettings {
        site_url,
        max_jump,
        max_cat,
        output_path,
    } = scan_settings(&cat, config)?;

    let progress_state: RefCell<Option<indicatif::ProgressBar>> = RefCell::new(None);
    let progress_cb = |n: u32, total: u32| {
        let mut state = progress_state.borrow_mut();
        let pb = state.get_or_insert_with(|| {
            let bar = indicatif::ProgressBar::new(u64::from(total));
            if let Ok(style) = indicatif::ProgressStyle::default_bar()
                .template("{spinner} {msg} [{bar:40}] {pos}/{len} ({elapsed})")
            {
                bar.set_style(
                    style
                        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
                        .progress_chars("█▉▊▋▌▍▎▏ "),
                );
            }
            bar.enable_steady_tick(Duration::from_millis(80));
            bar
        });
        pb.set_position(u64::from(n));
        pb.set_message(format!("Category {}/{}", n, total));
    };
    let progress: Option<&dyn Fn(u32, u32)> = if quiet || max_cat == 0 {
        None
    } else {
        Some(&progress_cb)
    };

    let options = ScanOptions {
        max_jump,
        max_cat,
        aggregation: cat.strategy,
        site_url: &site_url,
        progress,
    };
    let categories = scan_categories(client, &options);

    if let Some(pb) = progress_state.borrow_mut().take() {
        pb.disable_steady_tick();
        pb.finish_and_clear();
    }

    match (cat.format, output_path.as_deref()) {
        (ExportFormat::Csv, Some(p)) => write_csv(&categories, p)?,
        (ExportFormat::Json, Some(p)) => write_json(&categories, p)?,
        (_, out) => emit(render_table(&categories).trim_end(), out)?,
    }
    if let Some(p) = output_path {
        if !quiet {
            eprintln!("Exported {} categories to {}", categories.len(), p.display());
        }
    }
    Ok(())
}
