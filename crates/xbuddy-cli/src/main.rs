//! xbuddy command-line front end
//!
//! Runs one scrape-and-download for a video URL and prints the result.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use xbuddy_core::{
    DebugLog, DuplicateCheck, EventLog, ProgressCallback, ScrapeReport, ScraperConfig,
    XbuddyScraper,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Dedup {
    /// Same byte size counts as duplicate
    Size,
    /// Same byte size and same MD5
    Content,
}

impl From<Dedup> for DuplicateCheck {
    fn from(dedup: Dedup) -> Self {
        match dedup {
            Dedup::Size => DuplicateCheck::Size,
            Dedup::Content => DuplicateCheck::Content,
        }
    }
}

#[derive(Parser, Debug)]
#[command(version, about = "Download a video through the 9xbuddy link aggregator")]
struct Args {
    /// Page URL of the video
    url: String,

    /// TOML config file; flags override its values
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Directory for finished downloads
    #[arg(long, short = 'o')]
    downloads_dir: Option<PathBuf>,

    /// Append-only debug log file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// User agent for the browser and HTTP requests
    #[arg(long)]
    user_agent: Option<String>,

    /// Seconds to wait for the process page to render
    #[arg(long)]
    timeout: Option<u64>,

    /// Show the browser window
    #[arg(long)]
    headful: bool,

    /// Duplicate detection between downloads of one run
    #[arg(long, value_enum)]
    dedup: Option<Dedup>,

    /// Only list the classified links, download nothing
    #[arg(long)]
    links_only: bool,

    /// Print machine-readable JSON
    #[arg(long)]
    json: bool,
}

impl Args {
    fn load_config(&self) -> Result<ScraperConfig> {
        let mut config = match &self.config {
            Some(path) => ScraperConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => ScraperConfig::default(),
        };

        if let Some(dir) = &self.downloads_dir {
            config.downloads_dir = dir.clone();
        }
        if let Some(path) = &self.log_file {
            config.debug_log_path = path.clone();
        }
        if let Some(ua) = &self.user_agent {
            config.user_agent = ua.clone();
        }
        if let Some(secs) = self.timeout {
            config.render_timeout_secs = secs;
        }
        if self.headful {
            config.headless = false;
        }
        if let Some(dedup) = self.dedup {
            config.duplicate_check = dedup.into();
        }

        config.validate()?;
        Ok(config)
    }
}

/// Logs each 10% step when the size is known, every report otherwise at debug
fn progress_logger() -> ProgressCallback {
    let last_step = Arc::new(AtomicU64::new(0));
    Arc::new(move |downloaded, total| match total {
        Some(total) if total > 0 => {
            let step = (downloaded.saturating_mul(10) / total).min(10);
            if last_step.swap(step, Ordering::Relaxed) < step {
                info!(downloaded, total, "downloaded {}%", step * 10);
            }
        }
        _ => debug!(downloaded, "download progress"),
    })
}

fn print_report(report: &ScrapeReport) {
    for candidate in report.candidates.iter() {
        println!("  {:?}: {}", candidate.bucket, candidate.url);
    }
    for attempt in &report.attempts {
        println!("  [{}] {} -> {:?}", attempt.method, attempt.url, attempt.outcome);
    }
    println!(
        "Saved {} ({} bytes) via {}",
        report.file.path.display(),
        report.file.size,
        report.file.method
    );
}

async fn run(args: &Args, scraper: &XbuddyScraper) -> Result<()> {
    if args.links_only {
        let candidates = scraper.extract_candidates(&args.url).await?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&candidates)?);
        } else {
            for candidate in candidates.iter() {
                println!("{:?}: {}", candidate.bucket, candidate.url);
            }
        }
        return Ok(());
    }

    let report = scraper.scrape(&args.url).await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = args.load_config()?;
    debug!(?config, "effective configuration");

    let log = Arc::new(
        DebugLog::open(&config.debug_log_path)
            .with_context(|| format!("opening {}", config.debug_log_path.display()))?,
    );
    let events = EventLog::spawn(log.clone(), config.event_queue_capacity);

    let scraper = XbuddyScraper::with_progress(config, log.clone(), events.sink(), progress_logger())?;
    let result = run(&args, &scraper).await;

    drop(scraper);
    let written = events.shutdown().await;
    info!(events = written, "page events logged");

    if let Err(e) = &result {
        log.line(format!("failed: {:#}", e));
    }
    result
}
