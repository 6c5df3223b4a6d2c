//! Main scraper API
//!
//! Renders the aggregator's process page for a video URL, turns the links
//! on it into an ordered candidate list, and downloads the first candidate
//! that yields a new file.

use std::sync::Arc;

use tracing::{info, warn};

use crate::classifier::LinkClassifier;
use crate::config::ScraperConfig;
use crate::debug_log::{DebugLog, EventSink};
use crate::download::{DownloadContext, DownloadResolver, DownloadRun, ProgressCallback};
use crate::error::{Result, XbuddyError};
use crate::parser::{has_direct_button, parse_anchors, parse_formats};
use crate::renderer::{BrowserSession, ChromiumRenderer, Renderer, release};
use crate::types::{CandidateList, DirectFile, DownloadedFile, MethodKind, ScrapeReport};
use crate::url::{build_process_url, parse_video_url};

/// What the rendered page gave us
enum PageOutcome {
    /// The single-click button already produced the file
    Downloaded(DownloadedFile),
    Candidates(CandidateList),
}

/// Scrape-and-download pipeline for one aggregator
///
/// One browser session is opened per call and closed before any candidate
/// is downloaded.
pub struct XbuddyScraper<R: Renderer + 'static = ChromiumRenderer> {
    config: ScraperConfig,
    renderer: Arc<R>,
    classifier: LinkClassifier,
    resolver: DownloadResolver,
    log: Arc<DebugLog>,
    events: EventSink,
}

impl XbuddyScraper<ChromiumRenderer> {
    /// Create a scraper driving a local Chromium
    ///
    /// # Arguments
    /// * `config` - Scraper configuration
    /// * `log` - Process-lifetime debug log
    /// * `events` - Sink for diagnostic page events
    ///
    /// # Errors
    /// Returns `Config` if the configuration or its rules are invalid
    ///
    /// # Example
    /// ```no_run
    /// # async fn example() -> xbuddy_core::Result<()> {
    /// use std::sync::Arc;
    /// use xbuddy_core::{DebugLog, EventSink, ScraperConfig, XbuddyScraper};
    ///
    /// let log = Arc::new(DebugLog::open("xbuddy_debug.log")?);
    /// let scraper = XbuddyScraper::new(ScraperConfig::default(), log, EventSink::disabled())?;
    /// let file = scraper.get_direct_file("https://www.youtube.com/watch?v=abc").await?;
    /// println!("{} ({} bytes)", file.title, file.total_size);
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(config: ScraperConfig, log: Arc<DebugLog>, events: EventSink) -> Result<Self> {
        let renderer = Arc::new(ChromiumRenderer::from_config(&config));
        Self::with_renderer(config, renderer, log, events, None)
    }

    /// Like [`XbuddyScraper::new`], reporting direct download progress to `progress`
    pub fn with_progress(
        config: ScraperConfig,
        log: Arc<DebugLog>,
        events: EventSink,
        progress: ProgressCallback,
    ) -> Result<Self> {
        let renderer = Arc::new(ChromiumRenderer::from_config(&config));
        Self::with_renderer(config, renderer, log, events, Some(progress))
    }
}

impl<R: Renderer + 'static> XbuddyScraper<R> {
    /// Create a scraper with a custom renderer and the standard method chain
    pub fn with_renderer(
        config: ScraperConfig,
        renderer: Arc<R>,
        log: Arc<DebugLog>,
        events: EventSink,
        progress: Option<ProgressCallback>,
    ) -> Result<Self> {
        config.validate()?;
        let resolver = DownloadResolver::standard(
            &config,
            renderer.clone(),
            log.clone(),
            events.clone(),
            progress,
        )?;
        Self::with_parts(config, renderer, resolver, log, events)
    }

    /// Create a scraper from prebuilt parts
    pub fn with_parts(
        config: ScraperConfig,
        renderer: Arc<R>,
        resolver: DownloadResolver,
        log: Arc<DebugLog>,
        events: EventSink,
    ) -> Result<Self> {
        config.validate()?;
        let classifier = LinkClassifier::new(&config.rules)?;
        Ok(Self {
            config,
            renderer,
            classifier,
            resolver,
            log,
            events,
        })
    }

    pub fn config(&self) -> &ScraperConfig {
        &self.config
    }

    fn process_url(&self, video_url: &str) -> Result<String> {
        let video_url = parse_video_url(video_url)?;
        Ok(build_process_url(&self.config.process_base_url, video_url.as_str()))
    }

    /// Scrapes the process page and downloads the best candidate
    ///
    /// # Arguments
    /// * `video_url` - Page URL of the video to fetch
    ///
    /// # Returns
    /// Report with the candidates, every download attempt and the final file
    ///
    /// # Errors
    /// - `InvalidUrl` if `video_url` is not an http(s) URL with a host
    /// - `Browser` if the browser cannot be launched or driven
    /// - `RenderTimeout` if the results never render
    /// - `NoLinksFound` if no usable link survives filtering
    /// - `AllMethodsFailed` if no candidate could be downloaded
    pub async fn scrape(&self, video_url: &str) -> Result<ScrapeReport> {
        let process_url = self.process_url(video_url)?;
        info!(video_url, process_url = %process_url, "scrape started");
        self.log.line(format!("scrape: {} via {}", video_url.trim(), process_url));

        tokio::fs::create_dir_all(&self.config.downloads_dir).await?;
        let ctx = DownloadContext::new(&self.config.downloads_dir, &self.config.user_agent)
            .with_referer(&process_url);
        let mut run = DownloadRun::default();

        let mut session = self
            .renderer
            .launch(&self.config.user_agent, self.events.clone())
            .await?;
        let outcome = self.inspect_page(&mut session, &process_url, &ctx, &mut run).await;
        release(session, &self.log).await;

        let candidates = match outcome? {
            PageOutcome::Downloaded(file) => {
                return Ok(ScrapeReport {
                    process_url,
                    candidates: CandidateList::default(),
                    attempts: run.attempts,
                    file,
                });
            }
            PageOutcome::Candidates(candidates) => candidates,
        };

        if candidates.is_empty() {
            warn!(process_url = %process_url, "no links found");
            self.log.line("no links found");
            return Err(XbuddyError::NoLinksFound);
        }

        let file = match self.resolver.resolve(&candidates, &ctx, &mut run).await {
            Ok(file) => file,
            Err(e) => {
                self.log.line(format!("download failed: {}", e));
                return Err(e);
            }
        };

        Ok(ScrapeReport {
            process_url,
            candidates,
            attempts: run.attempts,
            file,
        })
    }

    /// Scrapes and downloads, returning the shape a bot layer sends on
    ///
    /// # Errors
    /// Same as [`XbuddyScraper::scrape`]
    pub async fn get_direct_file(&self, video_url: &str) -> Result<DirectFile> {
        self.scrape(video_url).await.map(|report| report.file.into())
    }

    /// Renders the process page and classifies its links without downloading
    ///
    /// # Errors
    /// Same as [`XbuddyScraper::scrape`], minus the download failures
    pub async fn extract_candidates(&self, video_url: &str) -> Result<CandidateList> {
        let process_url = self.process_url(video_url)?;
        let mut session = self
            .renderer
            .launch(&self.config.user_agent, self.events.clone())
            .await?;

        let result = match self.render(&mut session, &process_url).await {
            Ok(html) => self.classify_page(&html),
            Err(e) => Err(e),
        };
        release(session, &self.log).await;
        result
    }

    /// Navigates, waits for the results and returns the settled DOM
    async fn render(&self, session: &mut R::Session, process_url: &str) -> Result<String> {
        session.navigate(process_url).await?;

        let selector = &self.config.rules.result_selector;
        if !session
            .wait_for_selector(selector, self.config.render_timeout())
            .await?
        {
            self.log.line(format!("render timeout waiting for {}", selector));
            return Err(XbuddyError::RenderTimeout {
                selector: selector.clone(),
                secs: self.config.render_timeout_secs,
            });
        }

        tokio::time::sleep(self.config.settle()).await;
        session.content().await
    }

    fn classify_page(&self, html: &str) -> Result<CandidateList> {
        let rules = &self.config.rules;
        let anchors = parse_anchors(html, rules)?;

        let formats = parse_formats(html, rules)?;
        info!(
            anchors = anchors.len(),
            formats = ?formats.formats,
            has_480 = formats.has_resolution_hint,
            "page parsed"
        );
        self.log.line(format!(
            "anchors: {}, formats: {:?}, 480p: {}",
            anchors.len(),
            formats.formats,
            formats.has_resolution_hint
        ));

        let candidates = self.classifier.classify(&anchors);
        for candidate in candidates.iter() {
            self.log.line(format!("link {:?}: {}", candidate.bucket, candidate.url));
        }
        Ok(candidates)
    }

    async fn inspect_page(
        &self,
        session: &mut R::Session,
        process_url: &str,
        ctx: &DownloadContext,
        run: &mut DownloadRun,
    ) -> Result<PageOutcome> {
        let html = self.render(session, process_url).await?;

        let rules = &self.config.rules;
        if has_direct_button(&html, rules)? {
            info!("direct download button present");
            match session
                .click_for_download(&rules.direct_button_selector, &ctx.dest_dir, self.config.click_timeout())
                .await
            {
                Ok(Some(captured)) => {
                    let source = if captured.url.is_empty() {
                        process_url.to_string()
                    } else {
                        captured.url.clone()
                    };
                    let size = tokio::fs::metadata(&captured.path).await.map(|m| m.len()).unwrap_or(0);
                    if size == 0 {
                        let _ = tokio::fs::remove_file(&captured.path).await;
                        run.record_failure(&source, MethodKind::DirectButton, &XbuddyError::EmptyDownload(source.clone()));
                    } else if let Some(file) = self
                        .resolver
                        .admit(&source, MethodKind::DirectButton, &captured.path, run)
                        .await?
                    {
                        return Ok(PageOutcome::Downloaded(file));
                    }
                }
                Ok(None) => {
                    let e = XbuddyError::Browser("direct button started no download".to_string());
                    run.record_failure(process_url, MethodKind::DirectButton, &e);
                }
                Err(e) => {
                    warn!(error = %e, "direct button failed, falling back to links");
                    run.record_failure(process_url, MethodKind::DirectButton, &e);
                }
            }
            self.log.line("direct button gave nothing, extracting links");
        }

        self.classify_page(&html).map(PageOutcome::Candidates)
    }
}
