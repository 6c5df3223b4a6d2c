//! Headless Chromium renderer built on chromiumoxide
//!
//! Each session launches its own browser with a throwaway profile
//! directory, so two sessions never fight over a profile lock.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{
    DownloadProgressState, EventDownloadProgress, EventDownloadWillBegin,
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::cdp::browser_protocol::network::{
    EventRequestWillBeSent, EventResponseReceived, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::EventWindowOpen;
use chromiumoxide::cdp::js_protocol::runtime::EventConsoleApiCalled;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{BrowserSession, CapturedDownload, Renderer};
use crate::config::ScraperConfig;
use crate::debug_log::{EventSink, PageEvent};
use crate::error::{Result, XbuddyError};
use crate::filename::sanitize_filename;
use crate::url::url_digest;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

static PROFILE_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn browser_error(e: impl std::fmt::Display) -> XbuddyError {
    XbuddyError::Browser(e.to_string())
}

/// Launch options for [`ChromiumRenderer`]
#[derive(Debug, Clone)]
pub struct ChromiumRenderer {
    headless: bool,
    executable: Option<PathBuf>,
    popup_timeout: Duration,
    download_timeout: Duration,
}

impl Default for ChromiumRenderer {
    fn default() -> Self {
        Self::from_config(&ScraperConfig::default())
    }
}

impl ChromiumRenderer {
    pub fn from_config(config: &ScraperConfig) -> Self {
        Self {
            headless: config.headless,
            executable: config.chrome_executable.clone(),
            popup_timeout: config.popup_timeout(),
            download_timeout: config.download_timeout(),
        }
    }

    fn profile_dir() -> PathBuf {
        let n = PROFILE_COUNTER.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!("xbuddy-profile-{}-{}", std::process::id(), n))
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    type Session = ChromiumSession;

    async fn launch(&self, user_agent: &str, events: EventSink) -> Result<ChromiumSession> {
        let profile_dir = Self::profile_dir();
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .user_data_dir(&profile_dir)
            .arg(format!("--user-agent={}", user_agent));
        if !self.headless {
            builder = builder.with_head();
        }
        if let Some(executable) = &self.executable {
            builder = builder.chrome_executable(executable);
        }
        let config = builder.build().map_err(XbuddyError::Browser)?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(browser_error)?;
        let handler_task = tokio::spawn(async move { while handler.next().await.is_some() {} });

        let mut session = ChromiumSession {
            browser,
            page: None,
            handler_task,
            listeners: Vec::new(),
            popup_tasks: Vec::new(),
            events,
            popup_timeout: self.popup_timeout,
            download_timeout: self.download_timeout,
            current_url: None,
            profile_dir,
        };

        // A half-built session still owns a browser process.
        if let Err(e) = session.open_page(user_agent).await {
            let _ = session.close().await;
            return Err(e);
        }

        info!(headless = self.headless, "browser launched");
        Ok(session)
    }
}

/// One Chromium process with one working page
pub struct ChromiumSession {
    browser: Browser,
    page: Option<Page>,
    handler_task: JoinHandle<()>,
    listeners: Vec<JoinHandle<()>>,
    popup_tasks: Vec<JoinHandle<()>>,
    events: EventSink,
    popup_timeout: Duration,
    download_timeout: Duration,
    current_url: Option<String>,
    profile_dir: PathBuf,
}

impl ChromiumSession {
    async fn open_page(&mut self, user_agent: &str) -> Result<()> {
        let page = self.browser.new_page("about:blank").await.map_err(browser_error)?;
        page.execute(SetUserAgentOverrideParams::new(user_agent.to_string()))
            .await
            .map_err(browser_error)?;
        self.attach_listeners(&page).await?;
        self.page = Some(page);
        Ok(())
    }

    fn page(&self) -> Result<&Page> {
        self.page
            .as_ref()
            .ok_or_else(|| XbuddyError::Browser("page not open".to_string()))
    }

    /// Forwards diagnostic events to the sink; never touches control flow
    async fn attach_listeners(&mut self, page: &Page) -> Result<()> {
        let mut requests = page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(browser_error)?;
        let sink = self.events.clone();
        self.listeners.push(tokio::spawn(async move {
            while let Some(event) = requests.next().await {
                sink.emit(PageEvent::Request {
                    method: event.request.method.clone(),
                    url: event.request.url.clone(),
                });
            }
        }));

        let mut responses = page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(browser_error)?;
        let sink = self.events.clone();
        self.listeners.push(tokio::spawn(async move {
            while let Some(event) = responses.next().await {
                sink.emit(PageEvent::Response {
                    status: event.response.status,
                    url: event.response.url.clone(),
                });
            }
        }));

        let mut console = page
            .event_listener::<EventConsoleApiCalled>()
            .await
            .map_err(browser_error)?;
        let sink = self.events.clone();
        self.listeners.push(tokio::spawn(async move {
            while let Some(event) = console.next().await {
                let text = event
                    .args
                    .iter()
                    .filter_map(|arg| {
                        arg.value
                            .as_ref()
                            .map(|v| v.to_string())
                            .or_else(|| arg.description.clone())
                    })
                    .collect::<Vec<_>>()
                    .join(" ");
                sink.emit(PageEvent::Console(text));
            }
        }));

        let mut popups = page
            .event_listener::<EventWindowOpen>()
            .await
            .map_err(browser_error)?;
        let sink = self.events.clone();
        self.listeners.push(tokio::spawn(async move {
            while let Some(event) = popups.next().await {
                sink.emit(PageEvent::Popup(event.url.clone()));
            }
        }));

        Ok(())
    }

    /// Closes every page except the working one
    ///
    /// Each stray page gets a short grace period to finish loading, then is
    /// closed in the background.
    async fn sweep_popups(&mut self) {
        let Some(main_id) = self.page.as_ref().map(|p| p.target_id().clone()) else {
            return;
        };
        let pages = match self.browser.pages().await {
            Ok(pages) => pages,
            Err(e) => {
                debug!(error = %e, "could not list pages");
                return;
            }
        };

        self.popup_tasks.retain(|task| !task.is_finished());
        for stray in pages.into_iter().filter(|p| *p.target_id() != main_id) {
            let grace = self.popup_timeout;
            self.popup_tasks.push(tokio::spawn(async move {
                let _ = tokio::time::timeout(grace, stray.wait_for_navigation()).await;
                if let Err(e) = stray.close().await {
                    debug!(error = %e, "failed to close popup");
                }
            }));
        }
    }

    async fn click(&self, selector: &str) -> Result<bool> {
        let page = self.page()?;
        let elements = page.find_elements(selector).await.map_err(browser_error)?;
        let Some(element) = elements.into_iter().next() else {
            return Ok(false);
        };

        if let Err(e) = element.click().await {
            // Hidden or covered controls reject synthetic mouse input.
            debug!(selector, error = %e, "mouse click failed, using DOM click");
            let script = format!(
                "(() => {{ const el = document.querySelector({}); if (el) {{ el.click(); return true; }} return false; }})()",
                serde_json::to_string(selector).map_err(browser_error)?
            );
            let clicked: bool = page
                .evaluate(script)
                .await
                .map_err(browser_error)?
                .into_value()
                .map_err(browser_error)?;
            return Ok(clicked);
        }
        Ok(true)
    }

    fn fallback_name(&self, download_url: &str) -> String {
        let source = self.current_url.as_deref().unwrap_or(download_url);
        format!("browser_download_{}.mp4", url_digest(source))
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        let page = self.page()?;
        if let Err(e) = page.goto(url).await {
            // Slow ad scripts often break the load event; the page is still usable.
            warn!(url, error = %e, "navigation did not complete cleanly");
        }
        self.current_url = Some(url.to_string());
        self.sweep_popups().await;
        Ok(())
    }

    async fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> Result<bool> {
        let start = Instant::now();
        loop {
            // Queries fail while a navigation swaps the document.
            let present = match self.has_element(selector).await {
                Ok(present) => present,
                Err(e) => {
                    debug!(selector, error = %e, "selector query failed, retrying");
                    false
                }
            };
            if present {
                self.sweep_popups().await;
                return Ok(true);
            }
            if start.elapsed() >= timeout {
                return Ok(false);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn has_element(&mut self, selector: &str) -> Result<bool> {
        let elements = self
            .page()?
            .find_elements(selector)
            .await
            .map_err(browser_error)?;
        Ok(!elements.is_empty())
    }

    async fn content(&mut self) -> Result<String> {
        self.page()?.content().await.map_err(browser_error)
    }

    async fn click_for_download(
        &mut self,
        selector: &str,
        dest_dir: &Path,
        timeout: Duration,
    ) -> Result<Option<CapturedDownload>> {
        tokio::fs::create_dir_all(dest_dir).await?;
        let dest_dir = tokio::fs::canonicalize(dest_dir).await?;

        let behavior = SetDownloadBehaviorParams::builder()
            .behavior(SetDownloadBehaviorBehavior::AllowAndName)
            .download_path(dest_dir.to_string_lossy().to_string())
            .events_enabled(true)
            .build()
            .map_err(XbuddyError::Browser)?;
        self.browser.execute(behavior).await.map_err(browser_error)?;

        let mut begins = self
            .browser
            .event_listener::<EventDownloadWillBegin>()
            .await
            .map_err(browser_error)?;
        let mut progress = self
            .browser
            .event_listener::<EventDownloadProgress>()
            .await
            .map_err(browser_error)?;

        if !self.click(selector).await? {
            return Ok(None);
        }
        self.sweep_popups().await;

        let begin = match tokio::time::timeout(timeout, begins.next()).await {
            Ok(Some(begin)) => begin,
            _ => {
                debug!(selector, "click did not start a download");
                return Ok(None);
            }
        };
        self.events.emit(PageEvent::Download {
            url: begin.url.clone(),
            suggested_filename: begin.suggested_filename.clone(),
        });

        let guid = begin.guid.clone();
        let finished = tokio::time::timeout(self.download_timeout, async {
            while let Some(update) = progress.next().await {
                if update.guid != guid {
                    continue;
                }
                match update.state {
                    DownloadProgressState::Completed => return true,
                    DownloadProgressState::Canceled => return false,
                    _ => {}
                }
            }
            false
        })
        .await
        .unwrap_or(false);

        let temp_path = dest_dir.join(&guid);
        if !finished {
            warn!(url = %begin.url, "browser download did not complete");
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Ok(None);
        }

        let name = if begin.suggested_filename.trim().is_empty() {
            self.fallback_name(&begin.url)
        } else {
            sanitize_filename(&begin.suggested_filename)
        };
        let path = dest_dir.join(&name);

        let existing = tokio::fs::metadata(&path).await.map(|m| m.len()).unwrap_or(0);
        if existing > 0 {
            info!(path = %path.display(), "file already present, keeping it");
            let _ = tokio::fs::remove_file(&temp_path).await;
        } else {
            tokio::fs::rename(&temp_path, &path).await?;
        }

        Ok(Some(CapturedDownload {
            path,
            url: begin.url.clone(),
        }))
    }

    async fn close(mut self) -> Result<()> {
        for task in self.listeners.drain(..).chain(self.popup_tasks.drain(..)) {
            task.abort();
        }

        let result = self.browser.close().await.map(|_| ()).map_err(browser_error);
        if let Err(e) = self.browser.wait().await {
            debug!(error = %e, "browser process wait failed");
        }
        self.handler_task.abort();

        if let Err(e) = tokio::fs::remove_dir_all(&self.profile_dir).await {
            debug!(error = %e, dir = %self.profile_dir.display(), "profile dir not removed");
        }
        result
    }
}
