//! Blogger v3 sink.
//!
//! Creates one live post per article:
//!
//! ```text
//! POST {api_base}/blogs/{blog_id}/posts/?isDraft=false
//! Authorization: Bearer {access_token}
//! {"kind": "blogger#post", "title": .., "content": .., "labels": [..], "url": slug}
//! ```
//!
//! The access token is supplied from outside (environment or config); this
//! module never refreshes it.

use super::{PublishSink, remote_message};
use crate::config::BloggerConfig;
use crate::error::SinkError;
use crate::http::HttpClient;
use crate::models::{ExtractedArticle, SinkReference};
use chrono::{DateTime, Utc};
use html_escape::encode_double_quoted_attribute;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

const SINK: &str = "blogger";

#[derive(Debug, Serialize)]
struct NewPost<'a> {
    kind: &'static str,
    title: &'a str,
    content: String,
    labels: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct PostResponse {
    id: String,
    url: Option<String>,
    published: Option<String>,
}

/// Blog metadata, read by connectivity checks.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BlogInfo {
    pub id: String,
    pub name: Option<String>,
    pub url: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BloggerSink {
    http: HttpClient,
    config: BloggerConfig,
}

impl BloggerSink {
    pub fn new(http: HttpClient, config: BloggerConfig) -> Self {
        Self { http, config }
    }

    /// `(blog_id, access_token)`, or why they are unusable.
    fn credentials(&self) -> Result<(&str, &str), SinkError> {
        let blog_id = self
            .config
            .blog_id
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| SinkError::NotConfigured {
                sink: SINK,
                reason: "blog id is missing".into(),
            })?;
        let token = self
            .config
            .access_token
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| SinkError::NotConfigured {
                sink: SINK,
                reason: "access token is missing".into(),
            })?;
        Ok((blog_id, token))
    }

    fn blog_url(&self, blog_id: &str) -> String {
        format!(
            "{}/blogs/{}",
            self.config.api_base.trim_end_matches('/'),
            urlencoding::encode(blog_id)
        )
    }

    /// Trimmed, de-duplicated, capped labels.
    pub fn labels(&self, tags: &[String]) -> Vec<String> {
        tags.iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unique()
            .take(self.config.max_labels)
            .collect()
    }

    /// Post body: featured image, rendered article, source attribution.
    pub fn post_content(&self, article: &ExtractedArticle) -> String {
        let mut parts = Vec::with_capacity(3);
        if let Some(image) = article.lead_image() {
            parts.push(format!(
                "<img src=\"{}\" alt=\"Featured Image\" style=\"max-width: 100%; height: auto; margin-bottom: 20px;\">",
                encode_double_quoted_attribute(image)
            ));
        }
        parts.push(article.rendered_html.clone());
        parts.push(format!(
            "<hr>\n<p><em>{}</em></p>",
            html_escape::encode_text(&self.config.attribution)
        ));
        parts.join("\n")
    }

    /// Read blog metadata; proves the id and token work.
    #[instrument(level = "info", skip_all)]
    pub async fn blog_info(&self) -> Result<BlogInfo, SinkError> {
        let (blog_id, token) = self.credentials()?;
        let reply = self
            .http
            .get_reply(&self.blog_url(blog_id), Some(token))
            .await
            .map_err(|source| SinkError::Transport { sink: SINK, source })?;
        if !reply.status.is_success() {
            return Err(SinkError::RejectedByRemote {
                sink: SINK,
                status: reply.status.as_u16(),
                message: remote_message(&reply.body),
            });
        }
        serde_json::from_str(&reply.body).map_err(|e| SinkError::InvalidResponse {
            sink: SINK,
            reason: e.to_string(),
        })
    }
}

impl PublishSink for BloggerSink {
    fn name(&self) -> &'static str {
        SINK
    }

    #[instrument(level = "info", skip_all, fields(url = %article.url, slug = %article.slug))]
    async fn publish(
        &self,
        article: &ExtractedArticle,
        _upstream: Option<&SinkReference>,
    ) -> Result<SinkReference, SinkError> {
        let (blog_id, token) = self.credentials()?;
        let body = NewPost {
            kind: "blogger#post",
            title: &article.title,
            content: self.post_content(article),
            labels: self.labels(&article.tags),
            url: Some(article.slug.as_str()).filter(|s| !s.is_empty()),
        };
        let endpoint = format!("{}/posts/?isDraft=false", self.blog_url(blog_id));

        let reply = self
            .http
            .post_json(&endpoint, &body, Some(token))
            .await
            .map_err(|source| SinkError::Transport { sink: SINK, source })?;
        if !reply.status.is_success() {
            return Err(SinkError::RejectedByRemote {
                sink: SINK,
                status: reply.status.as_u16(),
                message: remote_message(&reply.body),
            });
        }

        let post: PostResponse =
            serde_json::from_str(&reply.body).map_err(|e| SinkError::InvalidResponse {
                sink: SINK,
                reason: e.to_string(),
            })?;
        let published_at = post
            .published
            .as_deref()
            .and_then(|p| DateTime::parse_from_rfc3339(p).ok())
            .map(|p| p.with_timezone(&Utc));

        info!(post_id = %post.id, post_url = ?post.url, labels = body.labels.len(), "Published blog post");
        Ok(SinkReference {
            sink: SINK.to_string(),
            id: post.id,
            url: post.url,
            published_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpConfig;
    use crate::http::RetryPolicy;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn article() -> ExtractedArticle {
        ExtractedArticle {
            url: "https://cineulagam.com/article/new-trailer-99".into(),
            title: "New trailer out".into(),
            body_text: "Body".into(),
            summary_text: "Summary".into(),
            images: vec!["https://cdn.x/lead.jpg".into()],
            tags: vec!["Kollywood".into(), " Kollywood ".into(), "Trailer".into()],
            slug: "new-trailer".into(),
            rendered_html: "<div class=\"article-container\">rendered</div>".into(),
        }
    }

    fn sink(server: &MockServer, token: Option<&str>) -> BloggerSink {
        let http = HttpClient::new(&HttpConfig::default(), "test", RetryPolicy::none()).unwrap();
        BloggerSink::new(
            http,
            BloggerConfig {
                api_base: server.uri(),
                blog_id: Some("42".into()),
                access_token: token.map(str::to_string),
                ..BloggerConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn test_publish_creates_live_post() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/blogs/42/posts/"))
            .and(query_param("isDraft", "false"))
            .and(header("authorization", "Bearer secret"))
            .and(body_partial_json(serde_json::json!({
                "kind": "blogger#post",
                "title": "New trailer out",
                "labels": ["Kollywood", "Trailer"],
                "url": "new-trailer"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "7001",
                "url": "https://myblog.blogspot.com/2025/10/new-trailer.html",
                "published": "2025-10-16T10:00:00-07:00"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let reference = sink(&server, Some("secret"))
            .publish(&article(), None)
            .await
            .unwrap();
        assert_eq!(reference.sink, "blogger");
        assert_eq!(reference.id, "7001");
        assert_eq!(
            reference.url.as_deref(),
            Some("https://myblog.blogspot.com/2025/10/new-trailer.html")
        );
        assert_eq!(
            reference.published_at.unwrap().to_rfc3339(),
            "2025-10-16T17:00:00+00:00"
        );
    }

    #[tokio::test]
    async fn test_rejection_surfaces_remote_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "error": {"code": 403, "message": "The caller does not have permission"}
            })))
            .mount(&server)
            .await;

        let err = sink(&server, Some("secret"))
            .publish(&article(), None)
            .await
            .unwrap_err();
        match err {
            SinkError::RejectedByRemote { status, message, .. } => {
                assert_eq!(status, 403);
                assert_eq!(message, "The caller does not have permission");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_token_is_not_configured() {
        let server = MockServer::start().await;
        let err = sink(&server, None).publish(&article(), None).await.unwrap_err();
        assert!(matches!(err, SinkError::NotConfigured { sink: "blogger", .. }));
    }

    #[test]
    fn test_post_content_layout() {
        let server_less = BloggerSink::new(
            HttpClient::new(&HttpConfig::default(), "test", RetryPolicy::none()).unwrap(),
            BloggerConfig::default(),
        );
        let content = server_less.post_content(&article());
        let img = content.find("alt=\"Featured Image\"").unwrap();
        let body = content.find("rendered").unwrap();
        let source = content.find("<em>Source: Entertainment News</em>").unwrap();
        assert!(img < body && body < source);
    }

    #[test]
    fn test_labels_are_capped() {
        let sink = BloggerSink::new(
            HttpClient::new(&HttpConfig::default(), "test", RetryPolicy::none()).unwrap(),
            BloggerConfig {
                max_labels: 2,
                ..BloggerConfig::default()
            },
        );
        let tags: Vec<String> = ["a1", "b2", "c3"].iter().map(|s| s.to_string()).collect();
        assert_eq!(sink.labels(&tags), vec!["a1", "b2"]);
    }

    #[tokio::test]
    async fn test_blog_info() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/blogs/42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "42", "name": "Cinema News", "url": "https://myblog.blogspot.com/"
            })))
            .mount(&server)
            .await;

        let info = sink(&server, Some("secret")).blog_info().await.unwrap();
        assert_eq!(info.name.as_deref(), Some("Cinema News"));
        assert!(info.description.is_none());
    }
}
