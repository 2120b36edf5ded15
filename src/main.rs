use anyhow::Result;
use bienicifinder::config::{
    location_code, location_names, ContractType, PropertyKind, ScraperConfig, DEFAULT_MAX_WORKERS,
};
use bienicifinder::models::PropertyRecord;
use bienicifinder::scraper::{BieniciScraper, ScrapingOptions, SearchQuery};
use bienicifinder::utils::export_to_csv;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use regex::Regex;
use std::io::{self, IsTerminal, Write};
use std::process::ExitCode;
use std::sync::LazyLock;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

static RAW_LOCATION_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d{5}").unwrap());

#[derive(Parser, Debug)]
#[clap(author, version, about = "Bienicifinder - Property Scraper for bienici.com")]
struct Args {
    /// City to search (or a raw location code such as "vannes-56000")
    #[clap(short, long, default_value = "paris", value_parser = parse_location)]
    location: String,

    /// Type of contract
    #[clap(short, long, value_enum, default_value = "buy")]
    contract: ContractType,

    /// Type of property
    #[clap(short, long, value_enum, default_value = "all")]
    property: PropertyKind,

    /// Path to output CSV file
    #[clap(short, long, default_value = "properties.csv")]
    output: String,

    /// Maximum number of properties to keep (0 = no limit)
    #[clap(long)]
    limit: Option<usize>,

    /// Maximum number of index pages to scrape (0 = no limit)
    #[clap(long)]
    max_pages: Option<usize>,

    /// Maximum number of concurrent requests
    #[clap(short = 'w', long, default_value_t = DEFAULT_MAX_WORKERS)]
    max_workers: usize,

    /// Skip fetching detail pages (faster, fewer fields)
    #[clap(long)]
    no_details: bool,

    /// ScrapingAnt API key (defaults to SCRAPINGANT_API_KEY)
    #[clap(short = 'k', long)]
    api_key: Option<String>,

    /// Enable debug logging
    #[clap(short, long)]
    verbose: bool,
}

fn parse_location(value: &str) -> Result<String, String> {
    if location_code(value).is_some() || RAW_LOCATION_CODE.is_match(value) {
        Ok(value.trim().to_lowercase())
    } else {
        Err(format!(
            "unknown location '{}', expected one of: {} (or a code with a postal code, e.g. vannes-56000)",
            value,
            location_names().join(", ")
        ))
    }
}

/// Log lines go to stderr with the progress bar cleared while they print.
#[derive(Clone)]
struct ProgressAwareStderr(ProgressBar);

struct LogLine {
    progress: ProgressBar,
    buf: Vec<u8>,
}

impl Write for LogLine {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for LogLine {
    fn drop(&mut self) {
        let buf = std::mem::take(&mut self.buf);
        if !buf.is_empty() {
            self.progress.suspend(|| {
                let _ = io::stderr().write_all(&buf);
            });
        }
    }
}

impl<'a> MakeWriter<'a> for ProgressAwareStderr {
    type Writer = LogLine;

    fn make_writer(&'a self) -> Self::Writer {
        LogLine {
            progress: self.0.clone(),
            buf: Vec::new(),
        }
    }
}

fn init_logging(verbose: bool, progress: &ProgressBar) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(ProgressAwareStderr(progress.clone()))
        .init();
}

// Drawn on stderr; stays blank until detail fetching sets its length.
fn detail_progress_bar(verbose: bool) -> ProgressBar {
    if verbose || !io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.green/dim}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("█▓░"));
    }
    pb
}

fn summarize(records: &[PropertyRecord]) {
    let prices: Vec<u64> = records.iter().filter_map(|r| r.price).collect();
    if !prices.is_empty() {
        let min = prices.iter().min().copied().unwrap_or_default();
        let max = prices.iter().max().copied().unwrap_or_default();
        let avg = prices.iter().sum::<u64>() / prices.len() as u64;
        info!("Price range: {} € - {} € (avg {} €)", min, max, avg);
    }

    let with_details = records.iter().filter(|r| r.description.is_some()).count();
    info!("{}/{} properties with detail data", with_details, records.len());
}

async fn run(args: Args, progress: ProgressBar) -> Result<ExitCode> {
    let config = match ScraperConfig::resolve(args.api_key.as_deref()) {
        Ok(config) => config.max_workers(args.max_workers),
        Err(e) => {
            error!("{}", e);
            return Ok(ExitCode::from(1));
        }
    };

    let scraper = BieniciScraper::from_config(&config)?
        .with_progress(progress);

    let query = SearchQuery::new(args.location.clone(), args.contract, args.property);
    let options = ScrapingOptions {
        max_pages: args.max_pages,
        limit: args.limit,
        fetch_details: !args.no_details,
    };

    let records = tokio::select! {
        records = scraper.scrape(&query, &options) => records,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, exiting without export");
            return Ok(ExitCode::from(130));
        }
    };

    if records.is_empty() {
        warn!("No properties scraped");
        return Ok(ExitCode::from(1));
    }

    export_to_csv(&records, &args.output)?;
    summarize(&records);
    info!("Scraped {} properties, saved to {}", records.len(), args.output);

    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let progress = detail_progress_bar(args.verbose);
    init_logging(args.verbose, &progress);

    info!("Bienicifinder - Property Scraper for bienici.com");

    match run(args, progress).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(1)
        }
    }
}
