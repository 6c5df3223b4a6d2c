//! URL helper functions
//!
//! Provides the process URL builder and the small URL inspections the
//! download methods rely on.

use ::url::Url;

use crate::error::{Result, XbuddyError};

/// Default aggregator endpoint that renders download links for a video URL
pub const PROCESS_BASE_URL: &str = "https://9xbuddy.site/process";

/// Builds the aggregator process URL for a source video URL
///
/// The video URL is percent-encoded so `&`, `#` and spaces cannot leak
/// into the aggregator's own query string.
///
/// # Arguments
/// * `base` - Process endpoint (e.g., "https://9xbuddy.site/process")
/// * `video_url` - Source video page URL
///
/// # Example
/// ```
/// use xbuddy_core::url::build_process_url;
/// let url = build_process_url("https://9xbuddy.site/process", "https://v.example/watch?v=1&t=2");
/// assert_eq!(
///     url,
///     "https://9xbuddy.site/process?url=https%3A%2F%2Fv.example%2Fwatch%3Fv%3D1%26t%3D2"
/// );
/// ```
pub fn build_process_url(base: &str, video_url: &str) -> String {
    format!("{}?url={}", base, urlencoding::encode(video_url.trim()))
}

/// Parses a video page URL, accepting only absolute http(s) URLs with a host
///
/// # Errors
/// Returns `InvalidUrl` for anything else
///
/// # Example
/// ```
/// use xbuddy_core::url::parse_video_url;
/// let url = parse_video_url(" HTTPS://Www.YouTube.com/watch?v=abc ").unwrap();
/// assert_eq!(url.as_str(), "https://www.youtube.com/watch?v=abc");
/// assert!(parse_video_url("https://").is_err());
/// assert!(parse_video_url("ftp://files.example/v.mp4").is_err());
/// ```
pub fn parse_video_url(raw: &str) -> Result<Url> {
    let raw = raw.trim();
    let url = Url::parse(raw).map_err(|_| XbuddyError::InvalidUrl(raw.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none_or(str::is_empty) {
        return Err(XbuddyError::InvalidUrl(raw.to_string()));
    }
    Ok(url)
}

/// Extracts the last path segment of a URL, percent-decoded
///
/// Returns an empty string when the URL cannot be parsed, has no path or
/// ends with `/`.
///
/// # Example
/// ```
/// use xbuddy_core::url::url_basename;
/// assert_eq!(url_basename("https://cdn.example/files/My%20Movie.mp4?sig=abc"), "My Movie.mp4");
/// assert_eq!(url_basename("https://cdn.example/"), "");
/// ```
pub fn url_basename(url: &str) -> String {
    let Ok(parsed) = Url::parse(url.trim()) else {
        return String::new();
    };
    let segment = parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or("");
    urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string())
}

/// Returns the lower-cased extension (with leading dot) of the URL basename
///
/// # Example
/// ```
/// use xbuddy_core::url::url_extension;
/// assert_eq!(url_extension("https://a.b/c/clip.MKV?x=1"), Some(".mkv".to_string()));
/// assert_eq!(url_extension("https://a.b/c/dl"), None);
/// ```
pub fn url_extension(url: &str) -> Option<String> {
    let name = url_basename(url);
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(format!(".{}", ext.to_lowercase()))
}

/// Checks whether a URL points at an HLS playlist
pub fn is_hls_url(url: &str) -> bool {
    url.contains(".m3u8") || url.contains("/hls/")
}

/// Full MD5 hex digest of the URL, used for hash-derived file names
pub fn url_digest(url: &str) -> String {
    format!("{:x}", md5::compute(url.as_bytes()))
}
