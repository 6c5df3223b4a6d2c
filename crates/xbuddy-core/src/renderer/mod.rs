//! Page rendering abstraction
//!
//! A [`Renderer`] launches one browser per [`BrowserSession`]. Sessions are
//! consumed by [`BrowserSession::close`], so a session is released at most
//! once; callers use [`release`] on every exit path so it is released at
//! least once too.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::debug_log::{DebugLog, EventSink};
use crate::error::Result;

pub mod chromium;

#[cfg(test)]
pub(crate) mod fake;

pub use chromium::ChromiumRenderer;

/// A file the browser saved after a click
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedDownload {
    /// Final path on disk
    pub path: PathBuf,
    /// URL the browser downloaded from
    pub url: String,
}

/// Launches browser sessions
#[async_trait]
pub trait Renderer: Send + Sync {
    type Session: BrowserSession;

    /// Starts a fresh browser with one page
    ///
    /// Diagnostic page events are forwarded to `events`.
    async fn launch(&self, user_agent: &str, events: EventSink) -> Result<Self::Session>;
}

/// One browser with one working page
#[async_trait]
pub trait BrowserSession: Send {
    /// Navigates the working page
    async fn navigate(&mut self, url: &str) -> Result<()>;

    /// Polls until `selector` is present or `timeout` elapses
    ///
    /// Returns `false` on timeout.
    async fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> Result<bool>;

    /// Whether at least one element matches `selector` right now
    async fn has_element(&mut self, selector: &str) -> Result<bool>;

    /// Serialized HTML of the live DOM
    async fn content(&mut self) -> Result<String>;

    /// Clicks the first element matching `selector` and captures the
    /// resulting file download into `dest_dir`
    ///
    /// Returns `None` when nothing matched or no download started within
    /// `timeout`.
    async fn click_for_download(
        &mut self,
        selector: &str,
        dest_dir: &Path,
        timeout: Duration,
    ) -> Result<Option<CapturedDownload>>;

    /// Shuts the browser down
    async fn close(self) -> Result<()>;
}

/// Closes a session, logging instead of failing
pub async fn release<S: BrowserSession>(session: S, log: &DebugLog) {
    match session.close().await {
        Ok(()) => log.line("browser session closed"),
        Err(e) => {
            warn!(error = %e, "failed to close browser session");
            log.line(format!("browser session close failed: {}", e));
        }
    }
}
