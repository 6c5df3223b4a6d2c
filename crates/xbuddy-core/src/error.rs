//! Error types for the xbuddy scraper
//!
//! One enum covers the whole pipeline. Download-level failures are caught
//! and logged by the resolver; only render failures, an empty candidate
//! list, and exhaustion of every method reach the caller.

use serde::{Serialize, Serializer};
use thiserror::Error;

/// Error type for all scrape and download operations
///
/// Implements Display for human-readable messages and Serialize so a
/// calling bot layer can forward the message as-is.
#[derive(Error, Debug)]
pub enum XbuddyError {
    /// HTTP request failed at the transport level
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Server answered with a non-2xx status
    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    /// Filesystem operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Browser launch, navigation or DOM query failed
    #[error("Browser error: {0}")]
    Browser(String),

    /// The aggregator page never rendered the expected content
    #[error("Timed out after {secs}s waiting for `{selector}`")]
    RenderTimeout { selector: String, secs: u64 },

    /// No usable download link survived filtering
    #[error("No links found")]
    NoLinksFound,

    /// Every candidate and every download method failed
    #[error("All download methods failed ({attempts} attempts)")]
    AllMethodsFailed { attempts: usize },

    /// The response finished without producing any bytes
    #[error("Empty download from {0}")]
    EmptyDownload(String),

    /// The new file matched one already obtained in this run
    #[error("Duplicate download: {0}")]
    Duplicate(String),

    /// An external tool is not installed or not on PATH
    #[error("External tool not found: {tool}")]
    ExternalToolMissing { tool: String },

    /// An external tool exited unsuccessfully
    #[error("{tool} failed (exit code {code:?}): {stderr}")]
    ExternalToolFailed {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    /// Invalid URL format
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Invalid configuration value or rule
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl XbuddyError {
    /// Whether this error belongs to a single download attempt.
    ///
    /// These are logged and skipped by the resolver rather than surfaced.
    pub fn is_download_failure(&self) -> bool {
        matches!(
            self,
            XbuddyError::HttpError(_)
                | XbuddyError::HttpStatus { .. }
                | XbuddyError::Io(_)
                | XbuddyError::EmptyDownload(_)
                | XbuddyError::Duplicate(_)
                | XbuddyError::ExternalToolMissing { .. }
                | XbuddyError::ExternalToolFailed { .. }
                | XbuddyError::Browser(_)
        )
    }

    /// HTTP 403 is what the hosts answer when they decide we are a bot
    pub fn is_bot_block(&self) -> bool {
        matches!(self, XbuddyError::HttpStatus { status: 403, .. })
    }
}

impl Serialize for XbuddyError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Result type alias for xbuddy operations
pub type Result<T> = std::result::Result<T, XbuddyError>;
