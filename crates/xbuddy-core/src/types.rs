//! Core data types for the xbuddy scraper
//!
//! Contains the candidate, attempt and result structures passed between
//! the classifier, the resolver and the caller.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Priority class of a scraped link
///
/// Declaration order is download attempt order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Bucket {
    /// Parent element mentions the 480p resolution
    Resolution480,
    /// Hosted on a `*.workers.dev` mirror
    WorkersDev,
    /// Hosted on a `*.9xbud.com` mirror
    NineXBud,
    /// Hosted on a `*.video-src.com` mirror
    VideoSrc,
    /// Anything else that survived the blocklist
    Other,
}

impl Bucket {
    /// Whether only the first link of this bucket is kept
    pub fn is_front_only(self) -> bool {
        !matches!(self, Bucket::Resolution480)
    }
}

/// An anchor scraped from the rendered aggregator page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    /// Raw `href` attribute
    pub href: String,
    /// Text content of the anchor's immediate parent element
    pub parent_text: String,
}

impl Anchor {
    pub fn new(href: impl Into<String>, parent_text: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            parent_text: parent_text.into(),
        }
    }
}

/// A download link with its assigned bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub url: String,
    pub bucket: Bucket,
}

/// Ordered download candidates for one invocation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateList {
    candidates: Vec<Candidate>,
}

impl CandidateList {
    pub fn new(candidates: Vec<Candidate>) -> Self {
        Self { candidates }
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.iter()
    }

    /// Candidate URLs in attempt order
    pub fn urls(&self) -> Vec<&str> {
        self.candidates.iter().map(|c| c.url.as_str()).collect()
    }
}

impl FromIterator<Candidate> for CandidateList {
    fn from_iter<I: IntoIterator<Item = Candidate>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Way a file was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodKind {
    /// HLS playlist muxed by an external tool
    Hls,
    /// Streaming HTTP GET
    Direct,
    /// Fresh browser page, click on a download control
    BrowserClick,
    /// The aggregator's own single-click download button
    DirectButton,
}

impl fmt::Display for MethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MethodKind::Hls => "hls",
            MethodKind::Direct => "direct",
            MethodKind::BrowserClick => "browser-click",
            MethodKind::DirectButton => "direct-button",
        };
        f.write_str(name)
    }
}

/// Result of a single method on a single candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Saved(PathBuf),
    Duplicate(PathBuf),
    Failed(String),
}

/// One entry of the per-invocation attempt log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadAttempt {
    pub url: String,
    pub method: MethodKind,
    pub outcome: AttemptOutcome,
}

/// A file materialized on local disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadedFile {
    /// Absolute path to the artifact
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
    /// File name, used as the title by callers
    pub title: String,
    /// Method that produced the file
    pub method: MethodKind,
    /// URL the file was fetched from
    pub source_url: String,
}

/// Result shape consumed by the bot layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectFile {
    pub contents: Vec<PathBuf>,
    pub total_size: u64,
    pub title: String,
}

impl From<DownloadedFile> for DirectFile {
    fn from(file: DownloadedFile) -> Self {
        Self {
            contents: vec![file.path],
            total_size: file.size,
            title: file.title,
        }
    }
}

/// Everything one scrape-and-download invocation produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeReport {
    pub process_url: String,
    pub candidates: CandidateList,
    pub attempts: Vec<DownloadAttempt>,
    pub file: DownloadedFile,
}
