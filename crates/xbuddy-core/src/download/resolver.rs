//! Fallback chain over candidates and methods
//!
//! Candidates are tried in order. For each one every applicable method runs
//! in chain order until one produces a file. A file that duplicates one
//! already obtained in this run is deleted and the candidate is abandoned.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

use super::{
    BrowserClickDownloader, DirectConfig, DirectDownloader, DownloadContext, DownloadMethod,
    HlsDownloader, ProgressCallback,
};
use crate::config::ScraperConfig;
use crate::debug_log::{DebugLog, EventSink};
use crate::error::{Result, XbuddyError};
use crate::renderer::Renderer;
use crate::types::{AttemptOutcome, CandidateList, DownloadAttempt, DownloadedFile, MethodKind};

/// How a new file is compared against earlier ones
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateCheck {
    /// Same byte size
    #[default]
    Size,
    /// Same byte size and same MD5
    Content,
}

/// Attempts and files of one invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadRun {
    pub attempts: Vec<DownloadAttempt>,
    pub files: Vec<DownloadedFile>,
}

impl DownloadRun {
    fn record(&mut self, url: &str, method: MethodKind, outcome: AttemptOutcome) {
        self.attempts.push(DownloadAttempt {
            url: url.to_string(),
            method,
            outcome,
        });
    }

    /// Logs a failed attempt
    pub fn record_failure(&mut self, url: &str, method: MethodKind, error: &XbuddyError) {
        self.record(url, method, AttemptOutcome::Failed(error.to_string()));
    }
}

async fn file_digest(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut context = md5::Context::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        context.consume(&buf[..n]);
    }
    Ok(format!("{:x}", context.compute()))
}

/// Runs the download method chain
pub struct DownloadResolver {
    methods: Vec<Box<dyn DownloadMethod>>,
    duplicate_check: DuplicateCheck,
    log: Arc<DebugLog>,
}

impl DownloadResolver {
    /// Methods are tried in the given order for every candidate
    pub fn new(
        methods: Vec<Box<dyn DownloadMethod>>,
        duplicate_check: DuplicateCheck,
        log: Arc<DebugLog>,
    ) -> Self {
        Self {
            methods,
            duplicate_check,
            log,
        }
    }

    /// The standard chain: HLS, then direct HTTP, then browser click
    ///
    /// `progress` is handed to the direct downloader.
    pub fn standard<R: Renderer + 'static>(
        config: &ScraperConfig,
        renderer: Arc<R>,
        log: Arc<DebugLog>,
        events: EventSink,
        progress: Option<ProgressCallback>,
    ) -> Result<Self> {
        let mut direct = DirectDownloader::with_config(DirectConfig::from(config))?;
        if let Some(progress) = progress {
            direct = direct.with_progress(progress);
        }
        let methods: Vec<Box<dyn DownloadMethod>> = vec![
            Box::new(HlsDownloader::new(&config.ffmpeg_path)),
            Box::new(direct),
            Box::new(BrowserClickDownloader::new(renderer, config, log.clone()).with_events(events)),
        ];
        Ok(Self::new(methods, config.duplicate_check, log))
    }

    /// Method kinds in chain order
    pub fn method_kinds(&self) -> Vec<MethodKind> {
        self.methods.iter().map(|m| m.kind()).collect()
    }

    /// Downloads the first candidate that yields a new file
    ///
    /// Every attempt is appended to `run`.
    ///
    /// # Errors
    /// - `AllMethodsFailed` - No candidate produced a non-duplicate file
    /// - Any error that does not belong to a single attempt, such as `Config`
    pub async fn resolve(
        &self,
        candidates: &CandidateList,
        ctx: &DownloadContext,
        run: &mut DownloadRun,
    ) -> Result<DownloadedFile> {
        let before = run.attempts.len();

        for candidate in candidates.iter() {
            let url = candidate.url.as_str();
            info!(url, bucket = ?candidate.bucket, "trying candidate");
            self.log.line(format!("candidate {:?}: {}", candidate.bucket, url));

            for method in self.methods.iter().filter(|m| m.applies_to(url)) {
                let kind = method.kind();
                match method.fetch(url, ctx).await {
                    Ok(path) => match self.admit(url, kind, &path, run).await? {
                        Some(file) => return Ok(file),
                        // Other methods would fetch the same content again.
                        None => break,
                    },
                    Err(e) if e.is_download_failure() => {
                        warn!(url, method = %kind, error = %e, "download method failed");
                        self.log.line(format!("{} failed for {}: {}", kind, url, e));
                        run.record_failure(url, kind, &e);
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        Err(XbuddyError::AllMethodsFailed {
            attempts: run.attempts.len() - before,
        })
    }

    /// Accepts a freshly downloaded file unless it duplicates an earlier one
    ///
    /// Duplicates are deleted from disk and recorded; `None` is returned so
    /// the caller moves on.
    pub async fn admit(
        &self,
        url: &str,
        kind: MethodKind,
        path: &Path,
        run: &mut DownloadRun,
    ) -> Result<Option<DownloadedFile>> {
        let path = tokio::fs::canonicalize(path)
            .await
            .unwrap_or_else(|_| path.to_path_buf());
        let size = tokio::fs::metadata(&path).await?.len();

        if let Some(original) = self.duplicate_of(&path, size, run).await? {
            // A re-download that resolved to the very same file must not delete it.
            if original != path {
                let _ = tokio::fs::remove_file(&path).await;
            }
            info!(path = %path.display(), original = %original.display(), "duplicate download discarded");
            self.log
                .line(format!("{} duplicate of {}: {}", kind, original.display(), url));
            run.record(url, kind, AttemptOutcome::Duplicate(path));
            return Ok(None);
        }

        let title = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let file = DownloadedFile {
            path: path.clone(),
            size,
            title,
            method: kind,
            source_url: url.to_string(),
        };

        info!(path = %path.display(), size, method = %kind, "download accepted");
        self.log.line(format!("{} saved {} ({} bytes)", kind, path.display(), size));
        run.record(url, kind, AttemptOutcome::Saved(path));
        run.files.push(file.clone());
        Ok(Some(file))
    }

    async fn duplicate_of(&self, path: &Path, size: u64, run: &DownloadRun) -> Result<Option<PathBuf>> {
        let mut digest: Option<String> = None;

        for earlier in run.files.iter().filter(|f| f.size == size) {
            if earlier.path == path {
                return Ok(Some(earlier.path.clone()));
            }
            match self.duplicate_check {
                DuplicateCheck::Size => return Ok(Some(earlier.path.clone())),
                DuplicateCheck::Content => {
                    let new_digest = match &digest {
                        Some(d) => d.clone(),
                        None => {
                            let d = file_digest(path).await?;
                            digest = Some(d.clone());
                            d
                        }
                    };
                    match file_digest(&earlier.path).await {
                        Ok(old) if old == new_digest => return Ok(Some(earlier.path.clone())),
                        Ok(_) => {}
                        Err(e) => debug!(error = %e, path = %earlier.path.display(), "cannot hash earlier file"),
                    }
                }
            }
        }
        Ok(None)
    }
}
