//! Last-resort method: open the link in a fresh browser and click

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{DownloadContext, DownloadMethod};
use crate::config::ScraperConfig;
use crate::debug_log::{DebugLog, EventSink};
use crate::error::{Result, XbuddyError};
use crate::renderer::{BrowserSession, Renderer, release};
use crate::types::MethodKind;

/// Clicks the first download-looking control on the target page
pub struct BrowserClickDownloader<R: Renderer> {
    renderer: Arc<R>,
    selectors: Vec<String>,
    settle: Duration,
    click_timeout: Duration,
    events: EventSink,
    log: Arc<DebugLog>,
}

impl<R: Renderer> BrowserClickDownloader<R> {
    pub fn new(renderer: Arc<R>, config: &ScraperConfig, log: Arc<DebugLog>) -> Self {
        Self {
            renderer,
            selectors: config.rules.download_control_selectors.clone(),
            settle: config.settle(),
            click_timeout: config.click_timeout(),
            events: EventSink::disabled(),
            log,
        }
    }

    /// Forward page events of the click session to `events`
    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    async fn click_through(
        &self,
        session: &mut R::Session,
        url: &str,
        ctx: &DownloadContext,
    ) -> Result<PathBuf> {
        session.navigate(url).await?;
        tokio::time::sleep(self.settle).await;

        for selector in &self.selectors {
            if !session.has_element(selector).await? {
                continue;
            }
            debug!(selector, url, "clicking download control");
            self.log.line(format!("browser click: {} on {}", selector, url));

            let captured = match session
                .click_for_download(selector, &ctx.dest_dir, self.click_timeout)
                .await
            {
                Ok(Some(captured)) => captured,
                Ok(None) => {
                    return Err(XbuddyError::Browser(format!(
                        "click on `{}` started no download",
                        selector
                    )));
                }
                // Hidden or detached controls fail to click; try the next one.
                Err(e) => {
                    debug!(selector, error = %e, "click failed");
                    self.log.line(format!("browser click on {} failed: {}", selector, e));
                    continue;
                }
            };

            let size = tokio::fs::metadata(&captured.path).await.map(|m| m.len()).unwrap_or(0);
            if size == 0 {
                let _ = tokio::fs::remove_file(&captured.path).await;
                return Err(XbuddyError::EmptyDownload(captured.url));
            }
            info!(path = %captured.path.display(), size, "browser download finished");
            return Ok(captured.path);
        }

        Err(XbuddyError::Browser(format!("no download control on {}", url)))
    }
}

#[async_trait]
impl<R: Renderer + 'static> DownloadMethod for BrowserClickDownloader<R> {
    fn kind(&self) -> MethodKind {
        MethodKind::BrowserClick
    }

    async fn fetch(&self, url: &str, ctx: &DownloadContext) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&ctx.dest_dir).await?;
        let mut session = self.renderer.launch(&ctx.user_agent, self.events.clone()).await?;
        let result = self.click_through(&mut session, url, ctx).await;
        release(session, &self.log).await;
        result
    }
}
