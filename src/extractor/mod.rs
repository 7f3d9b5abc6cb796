//! Heuristic article extractor.
//!
//! Turns raw article HTML into an [`ExtractedArticle`]. The extractor knows
//! nothing about the network or persistence beyond
//! [`Extractor::fetch_and_extract`], which is a thin convenience over
//! [`HttpClient::get_text`].
//!
//! | Field | Source |
//! |-------|--------|
//! | `title` | first non-empty match of the title cascade |
//! | `body_text` | first body container whose flattened text is long enough ([`body`]) |
//! | `images` | priority search in [`images`] |
//! | `tags` | staged search in [`tags`] |
//! | `summary_text` | [`summary::summarize`] over the prose |
//! | `slug` | [`slug_from_url`] |
//! | `rendered_html` | [`render::render`] |

pub mod body;
pub mod images;
pub mod render;
pub mod rules;
pub mod summary;
pub mod tags;

use crate::config::ExtractorConfig;
use crate::error::{ConfigError, ExtractionError};
use crate::http::HttpClient;
use crate::models::ExtractedArticle;
use crate::utils::{collapse_whitespace, slug_from_url};
use body::Block;
use rules::Rules;
use scraper::Html;
use tracing::{debug, info, instrument};

#[derive(Debug)]
pub struct Extractor {
    rules: Rules,
}

impl Extractor {
    pub fn new(config: &ExtractorConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            rules: Rules::compile(config)?,
        })
    }

    /// Fetch `url` and extract it.
    #[instrument(level = "info", skip_all, fields(%url))]
    pub async fn fetch_and_extract(
        &self,
        http: &HttpClient,
        url: &str,
    ) -> Result<ExtractedArticle, ExtractionError> {
        let html = http.get_text(url).await?;
        self.extract(url, &html)
    }

    /// Extract an article from `raw_html` fetched from `url`.
    pub fn extract(&self, url: &str, raw_html: &str) -> Result<ExtractedArticle, ExtractionError> {
        let document = Html::parse_document(raw_html);

        let title = self.title(&document).ok_or(ExtractionError::MissingTitle)?;
        let blocks = self
            .body_blocks(&document)
            .ok_or(ExtractionError::MissingBody {
                min_chars: self.rules.min_body_chars,
            })?;

        let body_text = body::body_text(&blocks);
        let summary_text = summary::summarize(&body::prose_text(&blocks));
        let images = images::collect(&document, url, &self.rules);
        let tags = tags::collect(&document, &self.rules.tag_stages, self.rules.max_tags);
        let slug = slug_from_url(url, &self.rules.slug_prefix);
        let rendered_html = render::render(&title, &blocks, &images, &tags);

        info!(
            %url,
            title = %crate::utils::truncate_for_log(&title, 80),
            body_chars = body_text.chars().count(),
            images = images.len(),
            tags = tags.len(),
            "Extracted article"
        );

        Ok(ExtractedArticle {
            url: url.to_string(),
            title,
            body_text,
            summary_text,
            images,
            tags,
            slug,
            rendered_html,
        })
    }

    fn title(&self, document: &Html) -> Option<String> {
        self.rules.title.iter().find_map(|sel| {
            document
                .select(sel)
                .map(|el| collapse_whitespace(&el.text().collect::<String>()))
                .find(|t| !t.is_empty())
        })
    }

    fn body_blocks(&self, document: &Html) -> Option<Vec<Block>> {
        for sel in &self.rules.body {
            let Some(container) = document.select(sel).next() else {
                continue;
            };
            let blocks = body::flatten(container, &self.rules);
            let chars = body::body_text(&blocks).chars().count();
            if chars > self.rules.min_body_chars {
                return Some(blocks);
            }
            debug!(chars, "Body container too short; trying next selector");
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpConfig;
    use crate::http::RetryPolicy;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const URL: &str = "https://cineulagam.com/article/vijay-new-film-update-1760618319";

    const PAGE: &str = r#"<!doctype html>
<html><head>
  <title>Vijay new film update | Cineulagam</title>
  <meta name="keywords" content="Vijay, Kollywood">
</head><body>
  <h1 class="entry-title">  Vijay's new film:   first look out </h1>
  <div class="ds-content">
    <img class="img-fluid" src="//cdn.cineulagam.com/vijay.jpg">
    <p>The makers released the first look poster of the film on Thursday evening.</p>
    <script>trackView();</script>
    <div class="article-promo"><p>Download our app!</p></div>
    <p>Fans celebrated across Tamil Nadu as the poster trended on social media.</p>
    <blockquote class="twitter-tweet"><p>Huge!</p></blockquote>
    <p>The film is expected to hit screens next summer.</p>
  </div>
  <div class="ds-topics"><a href="/tag/vijay">Vijay</a><a href="/tag/kollywood">Kollywood</a><a>vijay</a></div>
</body></html>"#;

    fn extractor() -> Extractor {
        Extractor::new(&ExtractorConfig::default()).unwrap()
    }

    #[test]
    fn test_extracts_every_field() {
        let article = extractor().extract(URL, PAGE).unwrap();
        assert_eq!(article.title, "Vijay's new film: first look out");
        assert_eq!(article.slug, "vijay-new-film-update");
        assert_eq!(article.images, vec!["https://cdn.cineulagam.com/vijay.jpg"]);
        assert_eq!(article.tags, vec!["Vijay", "Kollywood"]);
        assert!(article.body_text.starts_with("The makers released"));
        assert!(article.body_text.contains("<blockquote class=\"twitter-tweet\">"));
        assert!(!article.body_text.contains("trackView"));
        assert!(!article.body_text.contains("Download our app"));
        assert!(article.summary_text.starts_with("The makers released the first look poster"));
        assert!(article.summary_text.ends_with(summary::DISCLAIMER));
        assert!(!article.summary_text.contains("blockquote"));
        assert!(article.rendered_html.contains("class=\"tag\">Kollywood<"));
    }

    #[test]
    fn test_missing_title() {
        let html = r#"<html><body><div class="ds-content"><p>x</p></div></body></html>"#;
        assert!(matches!(
            extractor().extract(URL, html),
            Err(ExtractionError::MissingTitle)
        ));
    }

    #[test]
    fn test_missing_body_when_too_short() {
        let html = r#"<html><head><title>T</title></head>
            <body><div class="ds-content"><p>Too short.</p></div></body></html>"#;
        assert!(matches!(
            extractor().extract(URL, html),
            Err(ExtractionError::MissingBody { min_chars: 100 })
        ));
    }

    #[test]
    fn test_falls_through_to_next_body_container() {
        let long = "This paragraph is long enough to count as a real article body. ".repeat(3);
        let html = format!(
            r#"<html><head><title>Fallback</title></head><body>
               <div class="ds-content"><p>tiny</p></div>
               <article><p>{long}</p></article></body></html>"#
        );
        let article = extractor().extract(URL, &html).unwrap();
        assert_eq!(article.title, "Fallback");
        assert!(article.body_text.starts_with("This paragraph"));
    }

    #[test]
    fn test_body_threshold_is_strict() {
        let config = ExtractorConfig {
            min_body_chars: 10,
            ..ExtractorConfig::default()
        };
        let extractor = Extractor::new(&config).unwrap();
        let exact = r#"<title>T</title><div class="ds-content"><p>0123456789</p></div>"#;
        let over = r#"<title>T</title><div class="ds-content"><p>0123456789A</p></div>"#;
        assert!(extractor.extract(URL, exact).is_err());
        assert!(extractor.extract(URL, over).is_ok());
    }

    #[tokio::test]
    async fn test_fetch_and_extract_reports_transport_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/article/ok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/article/gone-2"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let http = HttpClient::new(&HttpConfig::default(), "test", RetryPolicy::none()).unwrap();
        let extractor = extractor();

        let ok = extractor
            .fetch_and_extract(&http, &format!("{}/article/ok-1", server.uri()))
            .await
            .unwrap();
        assert_eq!(ok.slug, "ok");

        let err = extractor
            .fetch_and_extract(&http, &format!("{}/article/gone-2", server.uri()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "transport");
    }
}
