mod category;
mod config;
mod error;
mod extract;
mod http;
mod ledger;
mod listing;
mod pipeline;
mod post_key;
mod renderer;
#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use config::{RunConfig, Throttle, DEFAULT_CATEGORY_KEY};
use error::ArchiveError;
use ledger::Ledger;
use listing::{CategoryRef, NaverListing};
use pipeline::{Pipeline, RunContext, RunStats};
use renderer::{ChromiumRenderer, ChromiumSession, LaunchOptions};

#[derive(Parser)]
#[command(name = "blog_archiver", about = "Archive every post of a blog category as PDF")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enumerate a category (or read a URL file) and save new posts as PDF
    Run(RunArgs),
    /// Show what the ledger in an output directory already holds
    Stats {
        /// Output directory containing the ledger
        #[arg(long, default_value = "./naver_pdfs")]
        out: PathBuf,
        /// Most recent rows to list
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Blog owner id (required unless --urls-file is given)
    #[arg(long)]
    blog_id: Option<String>,
    /// Category label as shown in the blog navigation
    #[arg(long, default_value = DEFAULT_CATEGORY_KEY)]
    category_key: String,
    /// Category number, skips the navigation lookup
    #[arg(long)]
    category_no: Option<String>,
    /// Text file with one post URL per line
    #[arg(long)]
    urls_file: Option<PathBuf>,
    /// Output directory for PDFs and the ledger
    #[arg(long, default_value = "./naver_pdfs")]
    out: PathBuf,
    /// Base delay in seconds after each post (jittered)
    #[arg(long, default_value = "1.2")]
    rate_sleep: f64,
    /// Posts per listing page
    #[arg(long, default_value = "30")]
    page_size: u32,
    /// Seconds to wait for a post to become ready
    #[arg(long, default_value = "20")]
    wait_timeout: u64,
    /// Chromium user data directory
    #[arg(long)]
    user_data_dir: Option<PathBuf>,
    /// Chromium profile directory name
    #[arg(long)]
    profile_dir: Option<String>,
    /// Show the browser window
    #[arg(long)]
    headful: bool,
    /// Verbose logging
    #[arg(long)]
    debug: bool,
}

impl RunArgs {
    fn config(&self) -> RunConfig {
        RunConfig {
            out_dir: self.out.clone(),
            throttle: Throttle::jittered(Duration::from_secs_f64(self.rate_sleep.max(0.0))),
            page_size: self.page_size,
            wait_timeout: Duration::from_secs(self.wait_timeout),
            headless: !self.headful,
            user_data_dir: self.user_data_dir.clone(),
            profile_dir: self.profile_dir.clone(),
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let verbose = matches!(&cli.command, Commands::Run(a) if a.debug);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| (if verbose { "debug" } else { "info" }).into()),
        )
        .init();

    let t0 = Instant::now();
    let result = match cli.command {
        Commands::Run(args) => run(args).await.map(|stats| stats.print()),
        Commands::Stats { out, limit } => stats(out, limit),
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }
    result
}

async fn run(args: RunArgs) -> anyhow::Result<RunStats> {
    let cfg = args.config();
    if args.urls_file.is_none() && args.blog_id.is_none() {
        return Err(ArchiveError::MissingBlogId.into());
    }
    std::fs::create_dir_all(&cfg.out_dir)
        .with_context(|| format!("Failed to create {}", cfg.out_dir.display()))?;

    let ledger = Ledger::new(cfg.ledger_path());
    let mut ctx = RunContext::from_ledger(&ledger)?;
    let client = http::build_client(args.blog_id.as_deref())?;

    let (session, renderer) = ChromiumSession::launch(&LaunchOptions {
        headless: cfg.headless,
        user_data_dir: cfg.user_data_dir.clone(),
        profile_dir: cfg.profile_dir.clone(),
    })
    .await?;

    let result = run_with(&args, &cfg, &renderer, &client, &ledger, &mut ctx).await;
    session.shutdown().await;
    result
}

async fn run_with(
    args: &RunArgs,
    cfg: &RunConfig,
    renderer: &ChromiumRenderer,
    client: &reqwest::Client,
    ledger: &Ledger,
    ctx: &mut RunContext,
) -> anyhow::Result<RunStats> {
    let pipeline = Pipeline::new(renderer, client, ledger, cfg);

    if let Some(path) = &args.urls_file {
        let urls = pipeline::read_url_file(path)?;
        println!("URL file loaded: {} urls", urls.len());
        return pipeline.process_urls(ctx, urls).await;
    }

    let blog_id = args.blog_id.as_deref().ok_or(ArchiveError::MissingBlogId)?;
    let category = match &args.category_no {
        Some(no) => {
            println!("Using categoryNo={}", no);
            CategoryRef { blog_id: blog_id.to_string(), category_no: no.clone() }
        }
        None => {
            category::resolve_category(renderer, blog_id, &args.category_key, cfg.wait_timeout)
                .await?
        }
    };

    let listing = NaverListing::new(client.clone());
    pipeline
        .run_category(ctx, &listing, &category, &args.category_key)
        .await
}

fn stats(out: PathBuf, limit: usize) -> anyhow::Result<()> {
    let ledger = Ledger::new(out.join(config::LEDGER_FILE));
    let rows = ledger.records()?;
    if rows.is_empty() {
        println!("No processed posts in {}.", ledger.path().display());
        return Ok(());
    }

    let fallback = rows.iter().filter(|r| r.publish_date.fallback).count();
    println!("Processed:     {}", rows.len());
    println!("Upload dates:  {}", fallback);
    println!();
    println!("{:<14} | {:<12} | {:<40}", "Key", "Date", "Title");
    println!("{}", "-".repeat(72));
    for r in rows.iter().rev().take(limit) {
        let key = r.key.as_ref().map(|k| k.to_string()).unwrap_or_default();
        let date = if r.publish_date.fallback {
            format!("{}*", r.publish_date.date)
        } else {
            r.publish_date.date.clone()
        };
        println!("{:<14} | {:<12} | {:<40}", key, date, truncate(&r.title, 40));
    }
    if fallback > 0 {
        println!("\n* upload date (no publish date found)");
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
