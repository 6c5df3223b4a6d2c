//! Download methods and the fallback resolver
//!
//! Each [`DownloadMethod`] turns one candidate URL into one local file.
//! The [`DownloadResolver`] runs them in order per candidate until a
//! non-duplicate file appears.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::MethodKind;

pub mod browser;
pub mod direct;
pub mod hls;
pub mod resolver;

#[cfg(test)]
pub(crate) mod fake;

pub use browser::BrowserClickDownloader;
pub use direct::{DirectConfig, DirectDownloader, ProgressCallback};
pub use hls::HlsDownloader;
pub use resolver::{DownloadResolver, DownloadRun, DuplicateCheck};

/// Per-invocation request context shared by every method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadContext {
    /// Directory the file is written to; created if absent
    pub dest_dir: PathBuf,
    pub user_agent: String,
    /// Sent as `Referer` when set (the process page URL)
    pub referer: Option<String>,
}

impl DownloadContext {
    pub fn new(dest_dir: impl Into<PathBuf>, user_agent: impl Into<String>) -> Self {
        Self {
            dest_dir: dest_dir.into(),
            user_agent: user_agent.into(),
            referer: None,
        }
    }

    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }
}

/// One way of turning a URL into a local file
#[async_trait]
pub trait DownloadMethod: Send + Sync {
    fn kind(&self) -> MethodKind;

    /// Whether this method should be tried for `url` at all
    fn applies_to(&self, _url: &str) -> bool {
        true
    }

    /// Downloads `url` into `ctx.dest_dir` and returns the file path
    ///
    /// The returned file is never empty.
    async fn fetch(&self, url: &str, ctx: &DownloadContext) -> Result<PathBuf>;
}
