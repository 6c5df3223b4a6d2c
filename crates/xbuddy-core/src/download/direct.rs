//! Streaming HTTP downloader
//!
//! Sends browser-like headers, derives the file name from the response and
//! streams the body to disk in arrival order.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Response, StatusCode};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

use super::{DownloadContext, DownloadMethod};
use crate::config::ScraperConfig;
use crate::error::{Result, XbuddyError};
use crate::filename::resolve_filename;
use crate::types::MethodKind;

const ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7";
const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";
const MAX_REDIRECTS: usize = 10;

/// Progress is reported every time this many more bytes have arrived
const PROGRESS_STEP: u64 = 1024 * 1024;

/// Called with `(downloaded, total)`; `total` is `None` when unknown
pub type ProgressCallback = Arc<dyn Fn(u64, Option<u64>) + Send + Sync>;

/// Configuration for the direct downloader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectConfig {
    /// TCP connect timeout in seconds (default: 30)
    pub connect_timeout_secs: u64,
    /// Max silence between body chunks in seconds (default: 120)
    pub read_timeout_secs: u64,
    /// Write buffer size in bytes (default: 8192)
    pub chunk_size: usize,
}

impl Default for DirectConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            read_timeout_secs: 120,
            chunk_size: 8192,
        }
    }
}

impl From<&ScraperConfig> for DirectConfig {
    fn from(config: &ScraperConfig) -> Self {
        Self {
            connect_timeout_secs: config.connect_timeout_secs,
            read_timeout_secs: config.request_timeout_secs,
            chunk_size: config.chunk_size,
        }
    }
}

/// Streams one URL to disk with a plain GET
pub struct DirectDownloader {
    client: reqwest::Client,
    chunk_size: usize,
    progress: Option<ProgressCallback>,
}

impl DirectDownloader {
    /// Create a downloader with default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(DirectConfig::default())
    }

    /// Create a downloader with custom configuration
    pub fn with_config(config: DirectConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .read_timeout(Duration::from_secs(config.read_timeout_secs))
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .default_headers({
                let mut headers = HeaderMap::new();
                headers.insert(header::ACCEPT, HeaderValue::from_static(ACCEPT));
                headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static(ACCEPT_LANGUAGE));
                headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
                headers.insert(header::UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
                headers.insert("sec-fetch-dest", HeaderValue::from_static("document"));
                headers.insert("sec-fetch-mode", HeaderValue::from_static("navigate"));
                headers.insert("sec-fetch-site", HeaderValue::from_static("cross-site"));
                headers.insert("sec-fetch-user", HeaderValue::from_static("?1"));
                headers
            })
            .build()?;

        Ok(Self {
            client,
            chunk_size: config.chunk_size.max(1),
            progress: None,
        })
    }

    /// Reports progress every MiB and once on completion
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    fn request_headers(ctx: &DownloadContext) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&ctx.user_agent) {
            headers.insert(header::USER_AGENT, value);
        }
        if let Some(referer) = &ctx.referer
            && let Ok(value) = HeaderValue::from_str(referer)
        {
            headers.insert(header::REFERER, value);
        }
        headers
    }

    fn report(&self, downloaded: u64, total: Option<u64>) {
        if let Some(callback) = &self.progress {
            callback(downloaded, total);
        }
    }

    /// Writes the body to `part` and returns the byte count
    async fn stream_to(&self, response: Response, part: &Path) -> Result<u64> {
        let total = response.content_length();
        let file = tokio::fs::File::create(part).await?;
        let mut writer = BufWriter::with_capacity(self.chunk_size, file);
        let mut stream = response.bytes_stream();

        let mut downloaded: u64 = 0;
        let mut next_report = PROGRESS_STEP;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            writer.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            if downloaded >= next_report {
                debug!(downloaded, ?total, "download progress");
                self.report(downloaded, total);
                next_report = downloaded + PROGRESS_STEP;
            }
        }
        writer.flush().await?;

        self.report(downloaded, total);
        Ok(downloaded)
    }
}

fn header_str(response: &Response, name: header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

#[async_trait]
impl DownloadMethod for DirectDownloader {
    fn kind(&self) -> MethodKind {
        MethodKind::Direct
    }

    /// Downloads `url` into the context's directory
    ///
    /// # Errors
    /// - `HttpStatus` - Non-2xx answer; 403 usually means bot detection
    /// - `HttpError` - Transport failure before or during the body
    /// - `EmptyDownload` - The body had no bytes
    async fn fetch(&self, url: &str, ctx: &DownloadContext) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&ctx.dest_dir).await?;

        let response = self
            .client
            .get(url)
            .headers(Self::request_headers(ctx))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            if status == StatusCode::FORBIDDEN {
                warn!(url, "host answered 403, likely blocking automated clients");
            }
            return Err(XbuddyError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let content_disposition = header_str(&response, header::CONTENT_DISPOSITION);
        let content_type = header_str(&response, header::CONTENT_TYPE);
        let name = resolve_filename(content_disposition.as_deref(), url, content_type.as_deref());
        let path = ctx.dest_dir.join(&name);

        if let Ok(meta) = tokio::fs::metadata(&path).await
            && meta.len() > 0
        {
            info!(path = %path.display(), "file already downloaded");
            return Ok(path);
        }

        let part = ctx.dest_dir.join(format!("{}.part", name));
        match self.stream_to(response, &part).await {
            Ok(0) => {
                let _ = tokio::fs::remove_file(&part).await;
                Err(XbuddyError::EmptyDownload(url.to_string()))
            }
            Ok(size) => {
                tokio::fs::rename(&part, &path).await?;
                info!(path = %path.display(), size, "direct download finished");
                Ok(path)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&part).await;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use wiremock::matchers::{header as header_matcher, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn context(dir: &Path) -> DownloadContext {
        DownloadContext::new(dir, "TestAgent/1.0")
    }

    fn dir_entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_direct_config_default() {
        let config = DirectConfig::default();
        assert_eq!(config.connect_timeout_secs, 30);
        assert_eq!(config.read_timeout_secs, 120);
        assert_eq!(config.chunk_size, 8192);
    }

    #[test]
    fn test_direct_config_from_scraper_config() {
        let scraper = ScraperConfig {
            connect_timeout_secs: 5,
            request_timeout_secs: 60,
            chunk_size: 4096,
            ..ScraperConfig::default()
        };
        let config = DirectConfig::from(&scraper);
        assert_eq!(config.connect_timeout_secs, 5);
        assert_eq!(config.read_timeout_secs, 60);
        assert_eq!(config.chunk_size, 4096);
    }

    #[tokio::test]
    async fn test_content_disposition_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/get/abc"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-disposition", "attachment; filename=\"movie.mp4\"")
                    .set_body_bytes(b"video-bytes".to_vec()),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let downloader = DirectDownloader::new().unwrap();
        let url = format!("{}/get/abc", server.uri());

        let path = downloader.fetch(&url, &context(dir.path())).await.unwrap();
        assert_eq!(path, dir.path().join("movie.mp4"));
        assert_eq!(std::fs::read(&path).unwrap(), b"video-bytes");
        assert_eq!(dir_entries(dir.path()), vec!["movie.mp4"]);
    }

    #[tokio::test]
    async fn test_long_multibyte_name_fits_with_part_suffix() {
        let long_name = format!("{}.mp4", "映画".repeat(100));
        let disposition = format!(
            "attachment; filename*=UTF-8''{}",
            urlencoding::encode(&long_name)
        );
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-disposition", disposition.as_str())
                    .set_body_bytes(b"video-bytes".to_vec()),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let downloader = DirectDownloader::new().unwrap();
        let url = format!("{}/get/long", server.uri());

        let path = downloader.fetch(&url, &context(dir.path())).await.unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.ends_with(".mp4"));
        assert!(name.starts_with("映画"));
        assert!(name.len() <= crate::filename::MAX_FILENAME_BYTES);
        assert_eq!(std::fs::read(&path).unwrap(), b"video-bytes");
    }

    #[tokio::test]
    async fn test_basename_with_content_type_extension() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/dl"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "video/mp4")
                    .set_body_bytes(vec![1u8; 2048]),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let downloader = DirectDownloader::new().unwrap();
        let url = format!("{}/dl?x=1", server.uri());

        let path = downloader.fetch(&url, &context(dir.path())).await.unwrap();
        assert_eq!(path.file_name().unwrap(), "dl.mp4");
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 2048);
    }

    #[tokio::test]
    async fn test_literal_download_basename_uses_digest() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/download"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "video/x-matroska")
                    .set_body_bytes(b"mkv".to_vec()),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let downloader = DirectDownloader::new().unwrap();
        let url = format!("{}/download", server.uri());

        let path = downloader.fetch(&url, &context(dir.path())).await.unwrap();
        let expected = format!("download_{:x}.mkv", md5::compute(url.as_bytes()));
        assert_eq!(path.file_name().unwrap().to_string_lossy(), expected);
    }

    #[tokio::test]
    async fn test_browser_headers_and_referer_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/video.mp4"))
            .and(header_matcher("user-agent", "TestAgent/1.0"))
            .and(header_matcher("referer", "https://9xbuddy.site/process?url=x"))
            .and(header_matcher("accept-language", "en-US,en;q=0.9"))
            .and(header_matcher("sec-fetch-mode", "navigate"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ok".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let downloader = DirectDownloader::new().unwrap();
        let ctx = context(dir.path()).with_referer("https://9xbuddy.site/process?url=x");
        let url = format!("{}/video.mp4", server.uri());

        let path = downloader.fetch(&url, &ctx).await.unwrap();
        assert_eq!(path.file_name().unwrap(), "video.mp4");
    }

    #[tokio::test]
    async fn test_forbidden_is_bot_block() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let downloader = DirectDownloader::new().unwrap();
        let url = format!("{}/video.mp4", server.uri());

        let err = downloader.fetch(&url, &context(dir.path())).await.unwrap_err();
        assert!(err.is_bot_block());
        assert!(matches!(err, XbuddyError::HttpStatus { status: 403, .. }));
        assert!(dir_entries(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_server_error_is_http_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let downloader = DirectDownloader::new().unwrap();
        let url = format!("{}/video.mp4", server.uri());

        match downloader.fetch(&url, &context(dir.path())).await {
            Err(XbuddyError::HttpStatus { status, .. }) => assert_eq!(status, 502),
            other => panic!("Expected HttpStatus, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_body_leaves_no_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).insert_header("content-type", "video/mp4"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let downloader = DirectDownloader::new().unwrap();
        let url = format!("{}/empty.mp4", server.uri());

        let err = downloader.fetch(&url, &context(dir.path())).await.unwrap_err();
        assert!(matches!(err, XbuddyError::EmptyDownload(_)));
        assert!(dir_entries(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_existing_file_short_circuits() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"fresh".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("clip.mp4"), b"already here").unwrap();

        let downloader = DirectDownloader::new().unwrap();
        let url = format!("{}/clip.mp4", server.uri());

        let path = downloader.fetch(&url, &context(dir.path())).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"already here");
    }

    #[tokio::test]
    async fn test_creates_missing_dest_dir() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"abc".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("nested").join("downloads");
        let downloader = DirectDownloader::new().unwrap();
        let url = format!("{}/a.mp3", server.uri());

        let path = downloader.fetch(&url, &context(&dest)).await.unwrap();
        assert_eq!(path, dest.join("a.mp3"));
    }

    #[tokio::test]
    async fn test_progress_reports_completion() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 3000]))
            .mount(&server)
            .await;

        let seen: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let downloader = DirectDownloader::new()
            .unwrap()
            .with_progress(Arc::new(move |downloaded, _total| {
                sink.lock().unwrap().push(downloaded);
            }));

        let dir = tempfile::tempdir().unwrap();
        let url = format!("{}/p.mp4", server.uri());
        downloader.fetch(&url, &context(dir.path())).await.unwrap();

        assert_eq!(seen.lock().unwrap().last(), Some(&3000));
    }
}
