//! Data models shared by the pipeline stages.
//!
//! - [`ArticleRef`]: one sitemap entry, as discovered
//! - [`ExtractedArticle`]: normalized article content ready for the sinks
//! - [`SinkReference`]: what a sink hands back after publishing
//! - [`PublishedRecord`]: the durable "already processed" marker
//! - [`StoreStats`] and [`RunResult`]: read models for operators

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A discovered article, as listed by the sitemap.
///
/// The position of a ref in the discovery sequence matters: the sitemap is
/// newest-first and delta computation relies on that order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRef {
    /// Canonical article URL; the unique key across the whole pipeline.
    pub url: String,
    /// Approximate title, usually derived from the URL path.
    pub title: String,
    /// `<lastmod>` of the sitemap entry, when present and parseable.
    pub last_modified: Option<DateTime<Utc>>,
}

/// An article after content extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedArticle {
    pub url: String,
    pub title: String,
    /// Flattened body text. Block-quote embeds are kept as markup.
    pub body_text: String,
    /// Short extractive summary with a trailing disclaimer.
    pub summary_text: String,
    /// Absolute image URLs in document order, without duplicates.
    pub images: Vec<String>,
    /// At most ten tags, deduplicated case-insensitively.
    pub tags: Vec<String>,
    pub slug: String,
    /// Self-contained presentational markup for sinks that accept HTML.
    pub rendered_html: String,
}

impl ExtractedArticle {
    /// The image a sink should lead with, if any.
    pub fn lead_image(&self) -> Option<&str> {
        self.images.first().map(String::as_str)
    }
}

/// Reference returned by a sink after a successful publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkReference {
    /// Name of the sink that produced this reference.
    pub sink: String,
    /// Sink-specific identifier (post id, message id).
    pub id: String,
    /// Public location of the published artifact, when the sink has one.
    pub url: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

/// Durable marker that an article went through every sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedRecord {
    pub url: String,
    pub title: String,
    /// Identifier assigned by the first sink (the blog post id).
    pub primary_sink_id: String,
    pub posted_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Summary numbers over the watermark store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_count: u64,
    /// Records posted since the start of the current local day.
    pub today_count: u64,
    pub most_recent_title: Option<String>,
    pub most_recent_timestamp: Option<DateTime<Utc>>,
}

/// How a pipeline run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    /// A stop was requested; remaining articles were left for the next run.
    Cancelled,
    /// The watermark store became unreachable.
    Failed,
    /// Another run was already in progress in this process.
    AlreadyRunning,
}

/// Outcome of one `run_once` invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub status: RunStatus,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Number of articles in the delta.
    pub candidate_count: usize,
    pub published_count: usize,
    pub already_posted_count: usize,
    /// Articles skipped because extraction or a sink failed.
    pub failed_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_article(images: Vec<String>) -> ExtractedArticle {
        ExtractedArticle {
            url: "https://cineulagam.com/article/some-news-123".to_string(),
            title: "Some news".to_string(),
            body_text: "body".to_string(),
            summary_text: "summary".to_string(),
            images,
            tags: vec![],
            slug: "some-news".to_string(),
            rendered_html: String::new(),
        }
    }

    #[test]
    fn test_lead_image_is_first_image() {
        let article = sample_article(vec![
            "https://cdn.example.com/a.jpg".to_string(),
            "https://cdn.example.com/b.jpg".to_string(),
        ]);
        assert_eq!(article.lead_image(), Some("https://cdn.example.com/a.jpg"));
        assert_eq!(sample_article(vec![]).lead_image(), None);
    }

    #[test]
    fn test_run_status_serializes_snake_case() {
        let json = serde_json::to_string(&RunStatus::AlreadyRunning).unwrap();
        assert_eq!(json, "\"already_running\"");
    }

    #[test]
    fn test_article_ref_roundtrip() {
        let json = r#"{"url":"https://x/article/a-1","title":"A","last_modified":null}"#;
        let r: ArticleRef = serde_json::from_str(json).unwrap();
        assert_eq!(r.url, "https://x/article/a-1");
        assert!(r.last_modified.is_none());
    }
}
