//! HLS playlists, remuxed to MP4 by ffmpeg

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use super::{DownloadContext, DownloadMethod};
use crate::error::{Result, XbuddyError};
use crate::filename::sanitize_filename;
use crate::types::MethodKind;
use crate::url::{is_hls_url, url_basename, url_digest};

/// Downloads `.m3u8` playlists through an external ffmpeg
#[derive(Debug, Clone)]
pub struct HlsDownloader {
    ffmpeg: PathBuf,
}

impl Default for HlsDownloader {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl HlsDownloader {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }

    /// Local file name for a playlist URL
    ///
    /// `name.m3u8` becomes `name.mp4`; anything else gets a digest name.
    pub fn output_name(url: &str) -> String {
        let base = url_basename(url);
        match base.strip_suffix(".m3u8") {
            Some(stem) if !stem.is_empty() => sanitize_filename(&format!("{}.mp4", stem)),
            _ => format!("hls_download_{}.mp4", url_digest(url)),
        }
    }

    fn tool_name(&self) -> String {
        self.ffmpeg.display().to_string()
    }

    async fn run(&self, url: &str, ctx: &DownloadContext, output: &Path) -> Result<()> {
        let mut command = Command::new(&self.ffmpeg);
        command
            .arg("-y")
            .args(["-loglevel", "error"])
            .arg("-user_agent")
            .arg(&ctx.user_agent);
        if let Some(referer) = &ctx.referer {
            command.arg("-referer").arg(referer);
        }
        command
            .arg("-i")
            .arg(url)
            .args(["-c", "copy", "-bsf:a", "aac_adtstoasc"])
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let result = command.output().await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                XbuddyError::ExternalToolMissing {
                    tool: self.tool_name(),
                }
            } else {
                XbuddyError::Io(e)
            }
        })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            debug!(stderr = %stderr, "ffmpeg stderr");
            return Err(XbuddyError::ExternalToolFailed {
                tool: self.tool_name(),
                code: result.status.code(),
                stderr: stderr.lines().last().unwrap_or("unknown error").to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DownloadMethod for HlsDownloader {
    fn kind(&self) -> MethodKind {
        MethodKind::Hls
    }

    fn applies_to(&self, url: &str) -> bool {
        is_hls_url(url)
    }

    async fn fetch(&self, url: &str, ctx: &DownloadContext) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&ctx.dest_dir).await?;
        let output = ctx.dest_dir.join(Self::output_name(url));

        if let Err(e) = self.run(url, ctx, &output).await {
            let _ = tokio::fs::remove_file(&output).await;
            return Err(e);
        }

        let size = tokio::fs::metadata(&output).await.map(|m| m.len()).unwrap_or(0);
        if size == 0 {
            let _ = tokio::fs::remove_file(&output).await;
            return Err(XbuddyError::EmptyDownload(url.to_string()));
        }

        info!(path = %output.display(), size, "hls download finished");
        Ok(output)
    }
}
