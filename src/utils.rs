//! String and filesystem helpers shared across the pipeline.
//!
//! - Slug and fallback-title derivation from article URLs
//! - Tag and whitespace cleanup for scraped text
//! - Character-safe truncation for logs and captions
//! - Output directory validation

use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fs as stdfs;
use tokio::fs;
use tracing::{info, instrument, warn};
use url::Url;

static TAG_JUNK: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s\-]").expect("static regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));
static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("static regex"));

/// Truncate a string for logging purposes.
///
/// Long strings are cut after `max` characters with an ellipsis and a count of
/// the dropped bytes. Cuts always land on a character boundary.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        None => s.to_string(),
        Some((cut, _)) => format!("{}…(+{} bytes)", &s[..cut], s.len() - cut),
    }
}

/// Keep at most `max` characters of `s`.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        None => s,
        Some((cut, _)) => &s[..cut],
    }
}

/// Collapse every run of whitespace into a single space and trim the ends.
pub fn collapse_whitespace(s: &str) -> String {
    WHITESPACE.replace_all(s.trim(), " ").into_owned()
}

/// Remove markup tags and normalize whitespace.
pub fn strip_tags(s: &str) -> String {
    collapse_whitespace(&HTML_TAG.replace_all(s, " "))
}

/// Path of `url` without leading and trailing slashes.
///
/// Falls back to treating the input as a bare path when it does not parse as
/// an absolute URL.
fn trimmed_path(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => parsed.path().trim_matches('/').to_string(),
        Err(_) => url.trim_matches('/').to_string(),
    }
}

/// Derive the publishing slug from an article URL.
///
/// Strips scheme and host, the configured path `prefix` (e.g. `article/`),
/// and a trailing all-digit id segment. Pure: the same URL always gives the
/// same slug.
///
/// # Arguments
///
/// * `url` - Absolute article URL, or a bare path
/// * `prefix` - Path prefix to drop; empty keeps the whole path
///
/// # Returns
///
/// The remaining path segments joined by `-`, without the numeric id.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(
///     slug_from_url("https://x/article/my-title-news-12345", "article/"),
///     "my-title-news"
/// );
/// ```
pub fn slug_from_url(url: &str, prefix: &str) -> String {
    let path = trimmed_path(url);
    let path = if prefix.is_empty() {
        path.as_str()
    } else {
        path.strip_prefix(prefix).unwrap_or(&path)
    };

    let mut parts: Vec<&str> = path.split('-').collect();
    if parts
        .last()
        .is_some_and(|last| !last.is_empty() && last.chars().all(|c| c.is_ascii_digit()))
    {
        parts.pop();
    }
    parts.join("-")
}

/// Upper-case the first letter of every word, lower-case the rest.
///
/// A word starts at any letter that does not follow another letter, so
/// `"2024news"` becomes `"2024News"`.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

/// Build an approximate title from an article URL path.
///
/// Hyphens and slashes become spaces, words are title-cased, and the result is
/// capped at 100 characters.
pub fn title_from_url(url: &str) -> String {
    let path = trimmed_path(url).replace(['-', '/'], " ");
    truncate_chars(&title_case(&path), 100).to_string()
}

/// Clean one scraped tag.
///
/// Drops everything except word characters, whitespace and hyphens, then
/// trims.
///
/// # Arguments
///
/// * `raw` - Tag text as scraped (link text or one meta keyword)
///
/// # Returns
///
/// The cleaned tag, or `None` when fewer than two characters remain.
pub fn clean_tag(raw: &str) -> Option<String> {
    let cleaned = TAG_JUNK.replace_all(raw, "");
    let cleaned = cleaned.trim();
    if cleaned.chars().count() < 2 {
        None
    } else {
        Some(cleaned.to_string())
    }
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then writes and removes a probe file.
///
/// # Arguments
///
/// * `path` - Directory to create and probe
///
/// # Returns
///
/// `Ok(())` when a file could be created inside `path`, otherwise the I/O
/// error from creating the directory or the probe file.
#[instrument(level = "info", skip_all, fields(path = %path))]
pub async fn ensure_writable_dir(path: &str) -> Result<(), Box<dyn Error>> {
    if let Err(e) = fs::create_dir_all(path).await {
        warn!(error = %e, "Failed to create output directory");
        return Err(Box::new(e));
    }
    let probe_path = format!("{}/..__probe_write__", path.trim_end_matches('/'));
    match stdfs::File::create(&probe_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&probe_path);
            info!("Output directory is writable");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}
