//! xbuddy Core Library
//!
//! Fetches a video to local disk through the 9xbuddy link aggregator.
//!
//! # Overview
//!
//! A scrape runs in two phases:
//! - A headless browser renders the aggregator's process page for the video
//!   URL; the download links on it are filtered and ordered by
//!   [`LinkClassifier`]
//! - [`DownloadResolver`] tries each candidate with HLS, direct HTTP and
//!   browser-click downloads until a file appears that is not a duplicate
//!   of one already obtained
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use xbuddy_core::{DebugLog, EventLog, Result, ScraperConfig, XbuddyScraper};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = ScraperConfig::default();
//!     let log = Arc::new(DebugLog::open(&config.debug_log_path)?);
//!     let events = EventLog::spawn(log.clone(), config.event_queue_capacity);
//!
//!     let scraper = XbuddyScraper::new(config, log, events.sink())?;
//!     let report = scraper.scrape("https://www.youtube.com/watch?v=abc").await?;
//!
//!     for candidate in report.candidates.iter() {
//!         println!("{:?}: {}", candidate.bucket, candidate.url);
//!     }
//!     println!("saved {} ({} bytes)", report.file.path.display(), report.file.size);
//!
//!     drop(scraper);
//!     events.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Browser sessions
//!
//! Every scrape opens its own browser and closes it on every exit path
//! before any download starts. The browser-click fallback opens a second,
//! short-lived browser of its own.

pub mod classifier;
mod config;
mod debug_log;
pub mod download;
mod error;
pub mod filename;
pub mod parser;
pub mod renderer;
mod scraper;
mod types;
pub mod url;

// Re-export configuration
pub use config::{DEFAULT_USER_AGENT, ScraperConfig};

// Re-export error types
pub use error::{Result, XbuddyError};

// Re-export logging types
pub use debug_log::{DebugLog, EventLog, EventSink, PageEvent};

// Re-export classification and download pipeline
pub use classifier::{HostRule, LinkClassifier, LinkRules};
pub use download::{
    BrowserClickDownloader, DirectConfig, DirectDownloader, DownloadContext, DownloadMethod,
    DownloadResolver, DownloadRun, DuplicateCheck, HlsDownloader, ProgressCallback,
};
pub use renderer::{BrowserSession, CapturedDownload, ChromiumRenderer, Renderer};

// Re-export main scraper API
pub use scraper::XbuddyScraper;

// Re-export data types
pub use types::{
    Anchor, AttemptOutcome, Bucket, Candidate, CandidateList, DirectFile, DownloadAttempt,
    DownloadedFile, MethodKind, ScrapeReport,
};

// Re-export file name helpers
pub use filename::{resolve_filename, sanitize_filename};

// Re-export URL helper functions for convenience
pub use crate::url::{build_process_url, is_hls_url, parse_video_url, url_basename};
