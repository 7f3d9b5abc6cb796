//! Sitemap discovery and delta computation.
//!
//! The source publishes a newest-first XML sitemap:
//!
//! ```xml
//! <urlset>
//!   <url><loc>https://cineulagam.com/article/newest-3</loc><lastmod>2025-10-16T10:00:00+05:30</lastmod></url>
//!   <url><loc>https://cineulagam.com/article/older-2</loc></url>
//! </urlset>
//! ```
//!
//! [`Discovery::fetch_all`] turns that snapshot into an ordered list of
//! [`ArticleRef`], and [`Discovery::fetch_delta`] narrows it to the entries
//! newer than the watermark cursor via [`delta_since`].

use crate::error::DiscoveryError;
use crate::http::HttpClient;
use crate::models::ArticleRef;
use crate::utils::{collapse_whitespace, title_from_url};
use chrono::{DateTime, NaiveDate, Utc};
use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::{debug, info, instrument, warn};

/// Fetches the sitemap and computes what is new.
#[derive(Debug, Clone)]
pub struct Discovery {
    http: HttpClient,
    sitemap_url: String,
}

impl Discovery {
    pub fn new(http: HttpClient, sitemap_url: impl Into<String>) -> Self {
        Self {
            http,
            sitemap_url: sitemap_url.into(),
        }
    }

    /// Fetch and parse the sitemap.
    #[instrument(level = "info", skip(self), fields(sitemap = %self.sitemap_url))]
    pub async fn try_fetch_all(&self) -> Result<Vec<ArticleRef>, DiscoveryError> {
        let xml = self.http.get_text(&self.sitemap_url).await?;
        let refs = parse_sitemap(&xml)?;
        info!(count = refs.len(), "Indexed sitemap entries");
        Ok(refs)
    }

    /// Every sitemap entry, newest first.
    ///
    /// Transport errors and malformed documents are logged and reported as an
    /// empty list: no work is available this run.
    pub async fn fetch_all(&self) -> Vec<ArticleRef> {
        match self.try_fetch_all().await {
            Ok(refs) => refs,
            Err(e) => {
                warn!(error = %e, sitemap = %self.sitemap_url, "Sitemap unavailable; nothing to do");
                Vec::new()
            }
        }
    }

    /// Entries newer than `cursor_url`. See [`delta_since`].
    #[instrument(level = "info", skip(self))]
    pub async fn fetch_delta(&self, cursor_url: Option<&str>) -> Vec<ArticleRef> {
        let all = self.fetch_all().await;
        if all.is_empty() {
            return all;
        }
        delta_since(all, cursor_url)
    }
}

/// Narrow a newest-first sequence to the entries before `cursor_url`.
///
/// # Arguments
///
/// * `all` - Every sitemap entry, newest first
/// * `cursor_url` - URL of the most recently published article, if any
///
/// # Returns
///
/// The prefix of `all` that is newer than the cursor:
///
/// - no cursor: the whole sequence (first run)
/// - cursor at index `i`: `all[..i]`
/// - cursor missing from the sequence: the whole sequence, with a warning.
///   The cursor aged out of the sitemap window; re-processing is caught by the
///   store's uniqueness check, while stopping would silently stall publishing.
pub fn delta_since(mut all: Vec<ArticleRef>, cursor_url: Option<&str>) -> Vec<ArticleRef> {
    let Some(cursor) = cursor_url else {
        info!(count = all.len(), "No cursor yet; whole sitemap is new");
        return all;
    };

    match all.iter().position(|r| r.url == cursor) {
        Some(i) => {
            all.truncate(i);
            info!(count = all.len(), %cursor, "Computed delta since cursor");
            all
        }
        None => {
            warn!(%cursor, count = all.len(), "Cursor not found in sitemap; processing every entry");
            all
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    None,
    Loc,
    LastMod,
    NewsTitle,
}

#[derive(Debug, Default)]
struct Entry {
    loc: String,
    lastmod: String,
    news_title: String,
}

impl Entry {
    fn push(&mut self, field: Field, text: &str) {
        match field {
            Field::Loc => self.loc.push_str(text),
            Field::LastMod => self.lastmod.push_str(text),
            Field::NewsTitle => self.news_title.push_str(text),
            Field::None => {}
        }
    }

    fn finish(self) -> Option<ArticleRef> {
        let url = self.loc.trim().to_string();
        if url.is_empty() {
            return None;
        }
        let news_title = collapse_whitespace(&self.news_title);
        let title = if news_title.is_empty() {
            title_from_url(&url)
        } else {
            news_title
        };
        Some(ArticleRef {
            last_modified: parse_lastmod(self.lastmod.trim()),
            title,
            url,
        })
    }
}

/// Resolve an XML entity reference body such as `amp` or `#x26`.
fn resolve_entity(name: &str) -> Option<String> {
    let resolved = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        _ => {
            let code = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                name.strip_prefix('#')?.parse().ok()?
            };
            char::from_u32(code)?
        }
    };
    Some(resolved.to_string())
}

/// Parse a sitemap document into article refs, keeping document order.
pub fn parse_sitemap(xml: &str) -> Result<Vec<ArticleRef>, DiscoveryError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut refs = Vec::new();
    let mut current: Option<Entry> = None;
    let mut field = Field::None;

    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(source) => {
                return Err(DiscoveryError::Malformed {
                    position: reader.error_position() as u64,
                    source,
                });
            }
        };
        match event {
            Event::Start(e) => match e.local_name().as_ref() {
                b"url" => current = Some(Entry::default()),
                b"loc" if current.is_some() => field = Field::Loc,
                b"lastmod" if current.is_some() => field = Field::LastMod,
                b"title" if current.is_some() && e.name().as_ref().starts_with(b"news:") => {
                    field = Field::NewsTitle
                }
                _ => {}
            },
            Event::End(e) => match e.local_name().as_ref() {
                b"url" => {
                    if let Some(entry) = current.take().and_then(Entry::finish) {
                        refs.push(entry);
                    }
                    field = Field::None;
                }
                b"loc" | b"lastmod" | b"title" => field = Field::None,
                _ => {}
            },
            Event::Text(t) => {
                if let Some(entry) = current.as_mut() {
                    entry.push(field, &String::from_utf8_lossy(&t));
                }
            }
            Event::CData(t) => {
                if let Some(entry) = current.as_mut() {
                    entry.push(field, &String::from_utf8_lossy(&t));
                }
            }
            Event::GeneralRef(r) => {
                if let Some(entry) = current.as_mut() {
                    let name = String::from_utf8_lossy(&r);
                    match resolve_entity(&name) {
                        Some(text) => entry.push(field, &text),
                        None => debug!(entity = %name, "Skipping unknown entity"),
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(refs)
}

/// `<lastmod>` as RFC 3339 or a bare `YYYY-MM-DD` date.
fn parse_lastmod(raw: &str) -> Option<DateTime<Utc>> {
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
