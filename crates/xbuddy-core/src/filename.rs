//! File name derivation for downloaded artifacts
//!
//! Names come from `Content-Disposition`, then the URL basename, then an
//! MD5 of the URL. Whatever wins is sanitized before it touches the disk.

use regex::Regex;

use crate::url::{url_basename, url_digest, url_extension};

/// Name used when sanitizing leaves nothing behind
pub const DEFAULT_FILENAME: &str = "download";

/// Maximum file name length in characters, extension included
pub const MAX_FILENAME_CHARS: usize = 150;

/// Maximum file name length in bytes; leaves room for a `.part` suffix
/// under the common 255-byte limit
pub const MAX_FILENAME_BYTES: usize = 250;

/// Extensions longer than this are treated as part of the name when truncating
const MAX_EXTENSION_CHARS: usize = 16;

const INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// URL extensions trusted as-is
const KNOWN_EXTENSIONS: &[&str] = &[
    ".mp4", ".mpeg", ".mpg", ".avi", ".mkv", ".mov", ".mp3", ".wav", ".m4a",
];

/// Content-type fragments mapped to extensions, first match wins
const CONTENT_TYPE_EXTENSIONS: &[(&str, &str)] = &[
    ("video/mp4", ".mp4"),
    ("video/mpeg", ".mp4"),
    ("video/quicktime", ".mov"),
    ("video/x-msvideo", ".avi"),
    ("video/x-matroska", ".mkv"),
    ("video/", ".mp4"),
    ("audio/mpeg", ".mp3"),
    ("audio/wav", ".wav"),
    ("audio/mp4", ".m4a"),
    ("audio/", ".mp3"),
];

const FALLBACK_EXTENSION: &str = ".mp4";

/// Sanitizes a file name for the local filesystem
///
/// Replaces `<>:"/\|?*` and control characters with `_`, collapses
/// whitespace runs, truncates to [`MAX_FILENAME_CHARS`] and
/// [`MAX_FILENAME_BYTES`] while keeping the extension, and falls back to [`DEFAULT_FILENAME`] when nothing is left.
/// Applying it twice gives the same result as applying it once.
///
/// # Example
/// ```
/// use xbuddy_core::sanitize_filename;
/// assert_eq!(sanitize_filename("a:b  <c>.mp4"), "a_b _c_.mp4");
/// assert_eq!(sanitize_filename("   "), "download");
/// ```
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| {
            if INVALID_CHARS.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    let collapsed = replaced.split_whitespace().collect::<Vec<_>>().join(" ");
    let truncated = truncate_keeping_extension(&collapsed);
    let trimmed = truncated.trim();

    if trimmed.is_empty() {
        DEFAULT_FILENAME.to_string()
    } else {
        trimmed.to_string()
    }
}

fn fits(name: &str) -> bool {
    name.len() <= MAX_FILENAME_BYTES && name.chars().count() <= MAX_FILENAME_CHARS
}

/// Longest prefix of `s` within both limits, cut on a char boundary
fn prefix_within(s: &str, max_chars: usize, max_bytes: usize) -> &str {
    let mut end = 0;
    for (idx, c) in s.char_indices().take(max_chars) {
        if idx + c.len_utf8() > max_bytes {
            break;
        }
        end = idx + c.len_utf8();
    }
    &s[..end]
}

fn truncate_keeping_extension(name: &str) -> String {
    if fits(name) {
        return name.to_string();
    }

    if let Some((stem, ext)) = split_extension(name) {
        let ext_chars = ext.chars().count();
        if ext_chars <= MAX_EXTENSION_CHARS {
            let stem = prefix_within(stem, MAX_FILENAME_CHARS - ext_chars, MAX_FILENAME_BYTES - ext.len());
            return format!("{}{}", stem.trim_end(), ext);
        }
    }

    prefix_within(name, MAX_FILENAME_CHARS, MAX_FILENAME_BYTES).to_string()
}

/// Splits `name` into stem and extension (with dot)
///
/// A leading dot does not start an extension.
fn split_extension(name: &str) -> Option<(&str, &str)> {
    let idx = name.rfind('.')?;
    let (stem, ext) = name.split_at(idx);
    if stem.is_empty() || ext.len() <= 1 {
        return None;
    }
    Some((stem, ext))
}

/// Checks whether a file name already carries an extension
pub fn has_extension(name: &str) -> bool {
    split_extension(name).is_some()
}

/// Extracts the file name from a `Content-Disposition` header value
///
/// Prefers the RFC 5987 `filename*=` form, then quoted and bare
/// `filename=`. The value is percent-decoded and sanitized.
pub fn filename_from_content_disposition(header: &str) -> Option<String> {
    let patterns = [
        r#"(?i)filename\*\s*=\s*[^']*'[^']*'([^;]+)"#,
        r#"(?i)filename\s*=\s*"([^"]*)""#,
        r#"(?i)filename\s*=\s*([^;]+)"#,
    ];

    for pattern in patterns {
        let Ok(re) = Regex::new(pattern) else {
            continue;
        };
        if let Some(caps) = re.captures(header)
            && let Some(m) = caps.get(1)
        {
            let raw = m.as_str().trim().trim_matches(|c| c == '"' || c == '\'');
            if raw.is_empty() {
                continue;
            }
            let decoded = urlencoding::decode(raw)
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| raw.to_string());
            return Some(sanitize_filename(&decoded));
        }
    }

    None
}

/// Picks an extension from the URL or the response content type
///
/// The URL's own extension wins when it is in the known-good set; the
/// content type table comes next and `.mp4` is the final default.
pub fn extension_for(content_type: Option<&str>, url: &str) -> String {
    if let Some(ext) = url_extension(url)
        && KNOWN_EXTENSIONS.contains(&ext.as_str())
    {
        return ext;
    }

    if let Some(content_type) = content_type {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_lowercase();
        for (fragment, ext) in CONTENT_TYPE_EXTENSIONS {
            if mime.contains(fragment) {
                return ext.to_string();
            }
        }
    }

    FALLBACK_EXTENSION.to_string()
}

/// Derives the local file name for a streamed response
///
/// # Arguments
/// * `content_disposition` - Raw `Content-Disposition` header, if any
/// * `url` - Request URL
/// * `content_type` - Raw `Content-Type` header, if any
pub fn resolve_filename(
    content_disposition: Option<&str>,
    url: &str,
    content_type: Option<&str>,
) -> String {
    let mut name = content_disposition
        .and_then(filename_from_content_disposition)
        .or_else(|| {
            let base = url_basename(url);
            if matches!(base.as_str(), "" | "." | "/" | "download") {
                None
            } else {
                Some(sanitize_filename(&base))
            }
        })
        .unwrap_or_else(|| format!("download_{}", url_digest(url)));

    if !has_extension(&name) {
        name.push_str(&extension_for(content_type, url));
    }

    sanitize_filename(&name)
}
