//! # siteqa CLI Application
//!
//! Command-line interface for crawling a website into a scrape and asking
//! questions about it.
//!
//! ## Subcommands
//!
//! - `scrape`: crawl a site, archive its pages and build its vector index
//! - `rebuild`: rebuild a scrape's index from its archived pages
//! - `query`: answer a question from one scrape, or list the closest chunks
//! - `list`: show the scrapes in the archive
//!
//! Model credentials come from `GEMINI_API_KEY`, or `GEMINI_FREE_API_KEY`
//! with `--free-tier`.

mod telemetry;

use anyhow::{Context, anyhow};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use rig::providers::gemini;
use siteqa::crawler::{CrawlEvent, CrawlerConfig, Renderer, storage::StorageConfig};
use siteqa::model::{Client, RateLimitedCompletionModel, RateLimitedEmbeddingModel};
use siteqa::pipeline::{Pipeline, PipelineConfig, ScrapeSummary};
use siteqa::processor::ProcessorConfig;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::instrument;

type GeminiPipeline = Pipeline<
    RateLimitedCompletionModel<gemini::completion::CompletionModel>,
    RateLimitedEmbeddingModel<gemini::embedding::EmbeddingModel>,
>;

#[derive(Parser)]
#[command(author, version, about = "Crawl a website and answer questions about it", long_about = None)]
struct Cli {
    /// Directory holding scrapes
    #[arg(long, global = true, default_value = "scraped_pages")]
    data_dir: PathBuf,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Use free-tier models and quotas (reads GEMINI_FREE_API_KEY)
    #[arg(long, global = true)]
    free_tier: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Crawl a website, archive its pages and build its index
    Scrape(ScrapeArgs),

    /// Rebuild the index of an existing scrape from its archived pages
    Rebuild(RebuildArgs),

    /// Ask a question about a scrape
    Query(QueryArgs),

    /// List scrapes
    List(ListArgs),
}

#[derive(Args, Debug)]
struct ScrapeArgs {
    /// URL to start crawling from
    #[arg(required = true)]
    url: String,

    /// Maximum number of pages to fetch
    #[arg(short = 'p', long, default_value = "100")]
    max_pages: usize,

    /// Maximum link distance from the seed
    #[arg(short, long)]
    max_depth: Option<u32>,

    /// Stop dequeuing new pages after this many seconds
    #[arg(long)]
    max_duration_secs: Option<u64>,

    /// Number of pages fetched at once
    #[arg(short, long, default_value = "1")]
    concurrency: usize,

    /// Browser render timeout in seconds
    #[arg(long, default_value = "30")]
    render_timeout_secs: u64,

    /// Fetch HTML with plain GET requests instead of a headless browser
    #[arg(long)]
    no_js: bool,

    /// Chrome/Chromium executable to launch
    #[arg(long)]
    chrome: Option<PathBuf>,

    /// CSS selectors to exclude from extracted text (comma-separated)
    #[arg(short, long, default_value = "aside,form")]
    exclude: String,

    /// Chunk size in characters
    #[arg(long, default_value = "1000")]
    chunk_size: usize,

    /// Overlap between consecutive chunks in characters
    #[arg(long, default_value = "200")]
    chunk_overlap: usize,
}

#[derive(Args, Debug)]
struct RebuildArgs {
    /// Scrape to rebuild
    #[arg(required = true)]
    scrape_id: String,
}

#[derive(Args, Debug)]
struct QueryArgs {
    /// Scrape to query
    #[arg(required = true)]
    scrape_id: String,

    /// Question to ask
    #[arg(required = true)]
    question: String,

    /// Number of chunks to retrieve
    #[arg(short, long, default_value = "4")]
    limit: usize,

    /// Output format (text|json)
    #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
    format: String,

    /// Use vector search only (no LLM)
    #[arg(short = 'v', long, default_value = "false")]
    vector_search_only: bool,

    /// Sampling temperature for the answer
    #[arg(short, long, default_value = "0.7")]
    temperature: f64,
}

#[derive(Args, Debug)]
struct ListArgs {
    /// Show detailed information
    #[arg(short, long)]
    details: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();
    let _telemetry = telemetry::init_tracing_subscriber(cli.log_file.as_deref())?;

    let storage = StorageConfig {
        base_path: cli.data_dir.clone(),
    };

    match cli.command {
        Some(Commands::Scrape(args)) => scrape_command(args, storage, cli.free_tier).await?,
        Some(Commands::Rebuild(args)) => rebuild_command(args, storage, cli.free_tier).await?,
        Some(Commands::Query(args)) => query_command(args, storage, cli.free_tier).await?,
        Some(Commands::List(args)) => list_command(args, storage).await?,
        None => {
            // If no command is provided, show help
            let _ = Cli::parse_from(["siteqa", "--help"]);
        }
    }

    Ok(())
}

/// The model client is the only place credentials are read
fn gemini_pipeline(config: PipelineConfig, free_tier: bool) -> anyhow::Result<GeminiPipeline> {
    let (variable, client) = if free_tier {
        let api_key = std::env::var("GEMINI_FREE_API_KEY")
            .map_err(|_| anyhow!("GEMINI_FREE_API_KEY environment variable must be set"))?;
        (
            "GEMINI_FREE_API_KEY",
            Client::new_gemini_free(gemini::Client::new(&api_key)),
        )
    } else {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| anyhow!("GEMINI_API_KEY environment variable must be set"))?;
        (
            "GEMINI_API_KEY",
            Client::new_gemini(gemini::Client::new(&api_key), &Default::default()),
        )
    };
    tracing::debug!(variable, "Using Gemini credentials");
    Ok(Pipeline::new(client, config))
}

#[instrument]
async fn scrape_command(
    args: ScrapeArgs,
    storage: StorageConfig,
    free_tier: bool,
) -> anyhow::Result<()> {
    println!("Scraping {}...", args.url);

    let crawler = CrawlerConfig::builder()
        .max_pages(args.max_pages)
        .max_depth(args.max_depth)
        .max_duration(args.max_duration_secs.map(Duration::from_secs))
        .concurrency(args.concurrency)
        .render_timeout(Duration::from_secs(args.render_timeout_secs))
        .render_js(!args.no_js)
        .chrome_executable(args.chrome.clone())
        .exclude_selectors(
            args.exclude
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        )
        .build();
    let processor = ProcessorConfig::builder()
        .chunk_size(args.chunk_size)
        .chunk_overlap(args.chunk_overlap)
        .build();

    let config = PipelineConfig {
        crawler,
        processor,
        storage,
        ..PipelineConfig::default()
    };
    let pipeline = gemini_pipeline(config, free_tier)?;

    let summary = run_scrape(&pipeline, &args.url).await?;

    println!("Scrape ID: {}", summary.scrape_id);
    println!(
        "Extracted {} documents ({} failures), indexed {} chunks",
        summary.document_count, summary.failure_count, summary.chunk_count
    );
    Ok(())
}

async fn run_scrape(pipeline: &GeminiPipeline, url: &str) -> anyhow::Result<ScrapeSummary> {
    let fetcher = pipeline.configured_fetcher()?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?,
    );
    spinner.enable_steady_tick(Duration::from_millis(120));

    let (tx, mut rx) = mpsc::channel::<CrawlEvent>(64);
    let progress = spinner.clone();
    let reporter = tokio::spawn(async move {
        let (mut documents, mut failures, mut queued) = (0usize, 0usize, 0usize);
        while let Some(event) = rx.recv().await {
            match event {
                CrawlEvent::Document { url, .. } => {
                    documents += 1;
                    progress.set_message(format!(
                        "{} documents, {} failures, {} queued | {}",
                        documents, failures, queued, url
                    ));
                }
                CrawlEvent::Failed { url, reason } => {
                    failures += 1;
                    progress.println(format!("Failed {}: {}", url, reason));
                }
                CrawlEvent::Skipped { .. } => {}
                CrawlEvent::Discovered { frontier, .. } => queued = frontier,
                CrawlEvent::Finished { .. } => progress.set_message("Building index..."),
            }
        }
    });

    let result = pipeline.start_crawl(&fetcher, url, Some(tx)).await;
    fetcher.renderer().shutdown().await;
    let _ = reporter.await;
    spinner.finish_and_clear();

    match result {
        Ok(summary) => Ok(summary),
        Err(siteqa::Error::EmptyCrawl { scrape_id }) => Err(anyhow!(
            "Nothing to index: no page of {} produced any text (report saved under scrape {})",
            url,
            scrape_id
        )),
        Err(e) => Err(e.into()),
    }
}

#[instrument]
async fn rebuild_command(
    args: RebuildArgs,
    storage: StorageConfig,
    free_tier: bool,
) -> anyhow::Result<()> {
    let config = PipelineConfig {
        storage,
        ..PipelineConfig::default()
    };
    let pipeline = gemini_pipeline(config, free_tier)?;

    println!("Rebuilding index for {}...", args.scrape_id);
    let handle = pipeline
        .rebuild_index(&args.scrape_id)
        .await
        .with_context(|| format!("Failed to rebuild scrape {}", args.scrape_id))?;
    println!(
        "Indexed {} chunks into {}",
        handle.chunk_count,
        handle.path.display()
    );
    Ok(())
}

#[instrument]
async fn query_command(
    args: QueryArgs,
    storage: StorageConfig,
    free_tier: bool,
) -> anyhow::Result<()> {
    let config = PipelineConfig {
        storage,
        answer_temperature: args.temperature,
        retrieval_limit: args.limit,
        ..PipelineConfig::default()
    };
    let pipeline = gemini_pipeline(config, free_tier)?;

    if args.vector_search_only {
        let results = pipeline
            .retrieve(&args.scrape_id, &args.question, args.limit)
            .await?;
        match args.format.as_str() {
            "json" => {
                println!("{}", serde_json::to_string_pretty(&results)?);
            }
            _ => {
                println!("Found {} results", results.len());
                for (i, result) in results.iter().enumerate() {
                    println!("{}. [{:.3}] {}", i + 1, result.score, result.text);
                    println!("   URL: {}", result.source_url);
                    println!();
                }
            }
        }
        return Ok(());
    }

    let answer = pipeline.answer(&args.scrape_id, &args.question).await?;
    match args.format.as_str() {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&answer)?);
        }
        _ => {
            println!("\nAnswer:");
            println!("{}", answer.answer);
            println!("\nSources:");
            for (i, source) in answer.sources.iter().enumerate() {
                println!("{}. {}", i + 1, source);
            }
            if !answer.actions.is_empty() {
                println!("\nSuggested actions:");
                for action in &answer.actions {
                    println!("- {} ({})", action.description, action.url);
                }
            }
            println!();
        }
    }
    Ok(())
}

#[instrument]
async fn list_command(args: ListArgs, storage: StorageConfig) -> anyhow::Result<()> {
    let storage = siteqa::crawler::storage::Storage::with_config(storage);
    let scrapes = storage.list_scrapes().await?;

    println!("Scrapes: {}", scrapes.len());
    for scrape in scrapes {
        let Some(report) = scrape.report.as_ref() else {
            println!("{}  ({} pages, no report)", scrape.scrape_id, scrape.page_count);
            continue;
        };
        println!(
            "{}  {}  finished {}  {} documents, {} failures{}",
            scrape.scrape_id,
            report.seed_url,
            report.finished_at.format("%Y-%m-%d %H:%M:%S"),
            report.document_count,
            report.failure_count(),
            if scrape.has_index { "" } else { "  (not indexed)" }
        );

        if args.details {
            println!("  Pages archived: {}", scrape.page_count);
            println!("  URLs visited: {}", report.visited_count);
            if let Some(chunks) = report.chunk_count {
                println!("  Chunks indexed: {}", chunks);
            }
            println!("  Skipped: {}", report.skipped.len());
            for failure in &report.failures {
                println!("  Failed {}: {}", failure.url, failure.reason);
            }
            if !report.external_links.is_empty() {
                println!("  External links: {}", report.external_links.len());
            }
            println!();
        }
    }
    Ok(())
}
