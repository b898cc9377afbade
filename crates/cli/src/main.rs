// ABOUTME: CLI for pulling property listings from a site into CSV and normalizing the result.
// ABOUTME: Thin clap front end over listings-puller with tracing logs on stderr and Ctrl-C cancellation.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use listings_puller::{
    extend_from_file, load_builtin_sites, CsvSink, Dataset, Driver, FetchConfig, HttpFetcher,
    IngestError, JobConfig, Normalizer, SiteAdapter, SiteRegistry,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "listings")]
#[command(about = "Pull property listings from listing sites and normalize them")]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short = 'v', long = "verbose", global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Walk a site's index pages and append listings to a CSV file
    Pull(PullArgs),
    /// Turn a raw CSV into typed columns using the site's rules
    Normalize(NormalizeArgs),
    /// List the known site definitions
    Sites(SitesArgs),
}

#[derive(Args, Debug)]
struct PullArgs {
    /// Site name, e.g. otodom, olx, zingat
    #[arg(short = 's', long = "site")]
    site: String,

    /// Listing category or search path below the site root
    #[arg(long = "slug")]
    slug: Option<String>,

    /// Output CSV (default: <site>.csv). An existing file is continued.
    #[arg(short = 'o', long = "out")]
    out: Option<PathBuf>,

    #[arg(long = "page-start")]
    page_start: Option<u32>,

    /// Last page to visit, inclusive
    #[arg(long = "page-end")]
    page_end: Option<u32>,

    /// Skip fields shown on the index page
    #[arg(long = "no-previews")]
    no_previews: bool,

    /// Do not open listing detail pages
    #[arg(long = "no-details")]
    no_details: bool,

    /// Override the site's root URL
    #[arg(long = "root-url")]
    root_url: Option<String>,

    /// Detail pages fetched at once
    #[arg(long = "concurrency")]
    concurrency: Option<usize>,

    /// Fetch attempts per page
    #[arg(long = "max-attempts", default_value_t = 3)]
    max_attempts: u32,

    /// Per-request timeout in seconds
    #[arg(long = "timeout-secs", default_value_t = 30)]
    timeout_secs: u64,

    /// Extra site definitions (JSON array)
    #[arg(long = "sites")]
    sites: Option<PathBuf>,

    /// Job configuration file (JSON); flags override its values
    #[arg(long = "config")]
    config: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct NormalizeArgs {
    #[arg(short = 's', long = "site")]
    site: String,

    /// Raw CSV written by `pull`
    #[arg(short = 'i', long = "input")]
    input: PathBuf,

    /// Output CSV (default: <input>_clean.csv)
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Extra site definitions (JSON array)
    #[arg(long = "sites")]
    sites: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct SitesArgs {
    /// Extra site definitions (JSON array)
    #[arg(long = "sites")]
    sites: Option<PathBuf>,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn registry(extra: Option<&Path>) -> Result<SiteRegistry> {
    let mut registry = load_builtin_sites()?;
    if let Some(path) = extra {
        let added = extend_from_file(&mut registry, path)?;
        info!(path = %path.display(), added, "loaded site definitions");
    }
    Ok(registry)
}

fn job_config(args: &PullArgs) -> Result<JobConfig> {
    let mut job = match &args.config {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("reading job config {}", path.display()))?;
            serde_json::from_str::<JobConfig>(&raw)
                .with_context(|| format!("parsing job config {}", path.display()))?
        }
        None => JobConfig::default(),
    };
    if let Some(slug) = &args.slug {
        job.listing_page_slug = slug.clone();
    }
    if let Some(root) = &args.root_url {
        job.root_url = Some(root.clone());
    }
    if let Some(start) = args.page_start {
        job.page_start = start;
    }
    if args.page_end.is_some() {
        job.page_end = args.page_end;
    }
    if args.no_previews {
        job.get_listing_previews = false;
    }
    if args.no_details {
        job.get_listing_pages = false;
    }
    if let Some(n) = args.concurrency {
        job.detail_concurrency = n;
    }
    job.validate()?;
    Ok(job)
}

async fn pull(args: PullArgs) -> Result<()> {
    let job = job_config(&args)?;
    let sites = registry(args.sites.as_deref())?;
    let adapter = sites.adapter(&args.site, job.root_url.as_deref())?;
    let fetch = FetchConfig::builder()
        .max_attempts(args.max_attempts)
        .timeout(Duration::from_secs(args.timeout_secs))
        .build()?;
    let fetcher = HttpFetcher::new(fetch).context("building HTTP client")?;

    let site = adapter.site();
    let driver = Driver::new(Arc::new(adapter), Arc::new(fetcher), job)?;
    let out = args
        .out
        .unwrap_or_else(|| PathBuf::from(format!("{}.csv", site)));
    let mut sink = CsvSink::open(&out)?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, finishing at the last complete page");
            on_signal.cancel();
        }
    });

    info!(%site, out = %out.display(), "pulling listings");
    let summary = match driver.run(&mut sink, cancel).await {
        Ok(summary) => summary,
        Err(err @ (IngestError::IndexFetch { .. } | IngestError::Sink { .. })) => {
            let resume = err
                .last_completed_page()
                .map_or(driver.job().page_start, |p| p + 1);
            return Err(anyhow::Error::new(err)
                .context(format!("pull stopped; resume with --page-start {}", resume)));
        }
        Err(err) => return Err(err.into()),
    };

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "site": site.to_string(),
            "out": out.display().to_string(),
            "summary": summary,
        }))?
    );
    Ok(())
}

fn normalize(args: NormalizeArgs) -> Result<()> {
    let sites = registry(args.sites.as_deref())?;
    let spec = sites
        .get(&args.site)
        .ok_or_else(|| listings_puller::ConfigError::UnknownSite(args.site.clone()))?;
    let output = args.output.unwrap_or_else(|| default_clean_path(&args.input));

    let raw = Dataset::from_path(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let rows = raw.len();
    let clean = Normalizer::new(spec.normalize.clone()).process(raw);
    clean
        .to_path(&output)
        .with_context(|| format!("writing {}", output.display()))?;

    info!(site = %args.site, rows, columns = clean.columns.len(), out = %output.display(), "normalized");
    Ok(())
}

fn default_clean_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "listings".to_string());
    input.with_file_name(format!("{}_clean.csv", stem))
}

fn sites(args: SitesArgs) -> Result<()> {
    let sites = registry(args.sites.as_deref())?;
    let listed: Vec<_> = sites
        .iter()
        .map(|spec| {
            json!({
                "site": spec.site.to_string(),
                "root_url": spec.root_url,
                "previews": spec.has_previews(),
                "details": spec.has_details(),
            })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&listed)?);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Command::Pull(args) => pull(args).await,
        Command::Normalize(args) => normalize(args),
        Command::Sites(args) => sites(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::from(1)
        }
    }
}
