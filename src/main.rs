//! Sumi-Harvest main entry point
//!
//! Command-line interface for fetching single pages, crawling sites and
//! running the durable job queue.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use sumi_harvest::config::{load_config_with_hash, validate, Config};
use sumi_harvest::dispatch::{JobQueue, SqliteJobQueue, WorkerPool};
use sumi_harvest::model::{
    AuthDescriptor, ExtractionRule, FetchRequest, MethodPreference, ProxyDescriptor,
};
use sumi_harvest::output::write_crawl_report;
use sumi_harvest::{CrawlConfig, Crawler, Engine};
use tracing_subscriber::EnvFilter;

/// Sumi-Harvest: an adaptive content-acquisition engine
///
/// Fetches pages with plain HTTP or a headless browser, whichever works,
/// and returns normalized, structured results.
#[derive(Parser, Debug)]
#[command(name = "sumi-harvest")]
#[command(version)]
#[command(about = "An adaptive content-acquisition engine", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (built-in defaults when omitted)
    #[arg(short, long, value_name = "CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch one URL and print the result as JSON
    Fetch {
        url: String,

        #[command(flatten)]
        request: RequestArgs,
    },

    /// Crawl outward from a seed URL
    Crawl {
        seed: String,

        /// Stop after this many successful pages
        #[arg(long, default_value_t = 100)]
        max_pages: usize,

        /// Do not follow links found deeper than this
        #[arg(long, default_value_t = 2)]
        max_depth: u32,

        /// Additional in-scope host (`*.example.com` allowed); repeatable
        #[arg(long = "allow-domain", value_name = "PATTERN")]
        allowed_domains: Vec<String>,

        /// Regex non-seed URLs must match; repeatable
        #[arg(long = "include", value_name = "REGEX")]
        include_patterns: Vec<String>,

        /// Regex that excludes a URL; repeatable
        #[arg(long = "exclude", value_name = "REGEX")]
        exclude_patterns: Vec<String>,

        /// Follow links to any host
        #[arg(long)]
        any_domain: bool,

        /// Ignore robots.txt
        #[arg(long)]
        ignore_robots: bool,

        /// Write a markdown report to this path
        #[arg(long, value_name = "PATH")]
        report: Option<PathBuf>,

        /// Print every result as a JSON line
        #[arg(long)]
        jsonl: bool,

        #[command(flatten)]
        request: RequestArgs,
    },

    /// Add URLs to the job queue
    Enqueue {
        #[arg(required = true)]
        urls: Vec<String>,

        #[command(flatten)]
        request: RequestArgs,
    },

    /// Run queue workers until interrupted
    Worker {
        /// Worker count (overrides `queue.workers`)
        #[arg(long)]
        workers: Option<usize>,

        /// Return active jobs claimed longer ago than this to the queue first
        #[arg(long, default_value_t = 600, value_name = "SECS")]
        recover_after: u64,

        /// Exit once nothing is waiting or running
        #[arg(long)]
        drain: bool,
    },

    /// Show job queue counts, or one job
    Status {
        /// Show a single job
        #[arg(long)]
        job: Option<i64>,
    },
}

/// Options shared by every command that builds a `FetchRequest`
#[derive(Args, Debug, Clone)]
struct RequestArgs {
    /// auto, static or rendered
    #[arg(long, default_value = "auto")]
    method: MethodPreference,

    /// Per-attempt timeout in milliseconds
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,

    /// Extra retry rounds
    #[arg(long)]
    retries: Option<u32>,

    /// Request header as `Name: value`; repeatable
    #[arg(short = 'H', long = "header", value_name = "HEADER")]
    headers: Vec<String>,

    /// Proxy URL for this request
    #[arg(long)]
    proxy: Option<String>,

    /// Bearer token sent as `Authorization`
    #[arg(long, value_name = "TOKEN")]
    bearer: Option<String>,

    /// CSS extraction rule as `name=selector`; repeatable
    #[arg(long = "select", value_name = "NAME=SELECTOR")]
    selectors: Vec<String>,

    /// JSON path extraction rule as `name=$.path`; repeatable
    #[arg(long = "json-path", value_name = "NAME=PATH")]
    json_paths: Vec<String>,

    /// Collect image URLs
    #[arg(long)]
    images: bool,

    /// Save a screenshot of rendered pages
    #[arg(long)]
    screenshot: bool,

    /// CSS selector a rendered fetch waits for
    #[arg(long, value_name = "SELECTOR")]
    wait_for: Option<String>,
}

impl RequestArgs {
    fn build(&self, url: &str) -> anyhow::Result<FetchRequest> {
        let mut request = FetchRequest::new(url).with_method(self.method);
        request.timeout_ms = self.timeout_ms;
        request.retries = self.retries;
        request.extract_images = self.images;
        request.screenshot = self.screenshot;
        request.wait_for = self.wait_for.clone();

        for header in &self.headers {
            let (name, value) = header
                .split_once(':')
                .with_context(|| format!("header '{}' is not `Name: value`", header))?;
            request = request.with_header(name.trim(), value.trim());
        }
        if let Some(proxy) = &self.proxy {
            request = request.with_proxy(ProxyDescriptor::new(proxy.as_str()));
        }
        if let Some(token) = &self.bearer {
            request = request.with_auth(AuthDescriptor::Bearer {
                token: token.clone(),
            });
        }
        for rule in &self.selectors {
            let (name, query) = split_rule(rule)?;
            request = request.with_rule(ExtractionRule::selector(name, query));
        }
        for rule in &self.json_paths {
            let (name, query) = split_rule(rule)?;
            request = request.with_rule(ExtractionRule::path(name, query));
        }

        Ok(request)
    }
}

fn split_rule(rule: &str) -> anyhow::Result<(&str, &str)> {
    rule.split_once('=')
        .with_context(|| format!("rule '{}' is not `name=query`", rule))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let config = load(cli.config.as_deref())?;

    match cli.command {
        Command::Fetch { url, request } => handle_fetch(config, &url, &request).await,
        Command::Crawl {
            seed,
            max_pages,
            max_depth,
            allowed_domains,
            include_patterns,
            exclude_patterns,
            any_domain,
            ignore_robots,
            report,
            jsonl,
            request,
        } => {
            let crawl = CrawlConfig {
                request: request.build(&seed)?,
                seed,
                max_pages,
                max_depth,
                same_domain_only: !any_domain,
                allowed_domains,
                include_patterns,
                exclude_patterns,
                respect_robots: !ignore_robots,
            };
            handle_crawl(config, crawl, report.as_deref(), jsonl).await
        }
        Command::Enqueue { urls, request } => handle_enqueue(&config, &urls, &request),
        Command::Worker {
            workers,
            recover_after,
            drain,
        } => handle_worker(config, workers, Duration::from_secs(recover_after), drain).await,
        Command::Status { job } => handle_status(&config, job),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_harvest=info,warn"),
            1 => EnvFilter::new("sumi_harvest=debug,info"),
            2 => EnvFilter::new("sumi_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load(path: Option<&Path>) -> anyhow::Result<Config> {
    let Some(path) = path else {
        tracing::debug!("No configuration file given, using defaults");
        let config = Config::default();
        validate(&config)?;
        return Ok(config);
    };

    tracing::info!("Loading configuration from: {}", path.display());
    match load_config_with_hash(path) {
        Ok((config, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            Ok(config)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            Err(e.into())
        }
    }
}

fn open_queue(config: &Config) -> anyhow::Result<SqliteJobQueue> {
    let path = Path::new(&config.queue.database_path);
    SqliteJobQueue::open(path, &config.queue)
        .with_context(|| format!("opening queue database {}", path.display()))
}

async fn handle_fetch(config: Config, url: &str, args: &RequestArgs) -> anyhow::Result<()> {
    let engine = Engine::new(config)?;
    let outcome = engine.fetch(args.build(url)?).await;
    engine.shutdown().await;

    let result = outcome?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn handle_crawl(
    config: Config,
    crawl: CrawlConfig,
    report_path: Option<&Path>,
    jsonl: bool,
) -> anyhow::Result<()> {
    let engine = Engine::new(config)?;
    let crawler = Crawler::new(engine.clone());

    let stop = crawler.stop_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight pages");
            stop.cancel();
        }
    });

    let outcome = crawler.crawl(crawl).await;
    engine.shutdown().await;
    let report = match outcome {
        Ok(report) => report,
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            return Err(e.into());
        }
    };

    if jsonl {
        for result in &report.results {
            println!("{}", serde_json::to_string(result)?);
        }
    }
    if let Some(path) = report_path {
        write_crawl_report(&report, path)?;
        tracing::info!("Report written to {}", path.display());
    }

    eprintln!(
        "Crawled {} page(s), {} failed, {} visited{}",
        report.succeeded(),
        report.failed(),
        report.visited,
        if report.stopped { " (stopped)" } else { "" }
    );
    Ok(())
}

fn handle_enqueue(config: &Config, urls: &[String], args: &RequestArgs) -> anyhow::Result<()> {
    let queue = open_queue(config)?;
    for url in urls {
        let id = queue.enqueue(&args.build(url)?)?;
        println!("{}\t{}", id, url);
    }
    Ok(())
}

async fn handle_worker(
    config: Config,
    workers: Option<usize>,
    recover_after: Duration,
    drain: bool,
) -> anyhow::Result<()> {
    let mut queue_config = config.queue.clone();
    if let Some(workers) = workers {
        queue_config.workers = workers;
    }

    let queue = Arc::new(open_queue(&config)?);
    queue.recover_stale(recover_after)?;

    let engine = Engine::new(config)?;
    let pool = WorkerPool::new(engine.clone(), queue.clone(), &queue_config);
    pool.start();

    if drain {
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                _ = tokio::time::sleep(queue_config.poll_interval()) => {
                    if queue.status()?.is_drained() {
                        tracing::info!("Queue drained");
                        break;
                    }
                }
            }
        }
    } else {
        tokio::signal::ctrl_c().await?;
        tracing::info!("Interrupt received, stopping workers");
    }

    pool.shutdown().await;
    engine.shutdown().await;

    println!("{}", serde_json::to_string_pretty(&queue.status()?)?);
    Ok(())
}

fn handle_status(config: &Config, job: Option<i64>) -> anyhow::Result<()> {
    let queue = open_queue(config)?;
    match job {
        Some(id) => println!("{}", serde_json::to_string_pretty(&queue.get(id)?)?),
        None => println!("{}", serde_json::to_string_pretty(&queue.status()?)?),
    }
    Ok(())
}
