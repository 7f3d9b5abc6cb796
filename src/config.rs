//! YAML configuration.
//!
//! Every section has defaults, so the binary runs without a config file. The
//! extractor's selector cascades live here as plain data: supporting a new
//! article layout means adding selectors, not code.
//!
//! ```yaml
//! source:
//!   sitemap_url: https://sitemap.cineulagam.com/articles-0.xml
//! pacing:
//!   min_delay_ms: 1000
//!   max_delay_ms: 3000
//! extractor:
//!   min_body_chars: 100
//!   tag_stages:
//!     - name: site
//!       rules:
//!         - kind: text
//!           selector: ".ds-topics a"
//! store:
//!   url: sqlite://news_syndicator.db?mode=rwc
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::fs;
use tracing::{info, instrument};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub source: SourceConfig,
    pub http: HttpConfig,
    pub retry: RetryConfig,
    pub pacing: PacingConfig,
    pub extractor: ExtractorConfig,
    pub blogger: BloggerConfig,
    pub telegram: TelegramConfig,
    pub store: StoreConfig,
}

impl Config {
    /// Load configuration from `path`, or defaults when no path is given.
    #[instrument(level = "info")]
    pub async fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            info!("No config file given; using defaults");
            return Ok(Self::default());
        };
        let raw = fs::read_to_string(path).await.map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        let config = Self::from_yaml(&raw).map_err(|source| ConfigError::Yaml {
            path: path.to_string(),
            source,
        })?;
        config.validate()?;
        info!(path, "Loaded configuration");
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(raw)
    }

    /// Reject settings that would make the pipeline misbehave silently.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "retry.max_attempts",
                reason: "must be at least 1".into(),
            });
        }
        if self.pacing.min_delay_ms > self.pacing.max_delay_ms {
            return Err(ConfigError::Invalid {
                field: "pacing",
                reason: format!(
                    "min_delay_ms ({}) exceeds max_delay_ms ({})",
                    self.pacing.min_delay_ms, self.pacing.max_delay_ms
                ),
            });
        }
        if self.extractor.max_tags == 0 {
            return Err(ConfigError::Invalid {
                field: "extractor.max_tags",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SourceConfig {
    pub sitemap_url: String,
    pub user_agent: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            sitemap_url: "https://sitemap.cineulagam.com/articles-0.xml".to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36"
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            request_timeout_secs: 30,
        }
    }
}

impl HttpConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per request, including the first one.
    pub max_attempts: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            jitter_ms: 250,
        }
    }
}

/// Randomized delay before each article page fetch.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PacingConfig {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 1_000,
            max_delay_ms: 3_000,
        }
    }
}

/// One tag-extraction pattern.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TagRuleConfig {
    /// Text of every element matching `selector`.
    Text { selector: String },
    /// `content` attribute of the first element matching `selector`,
    /// split on `,`, `;` and `|`.
    Meta { selector: String },
    /// Text of any `a`, `span` or `div` whose class contains `needle`.
    ClassContains { needle: String },
}

/// A group of tag rules. Rules inside a stage accumulate; the first stage
/// that yields any tag wins.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TagStageConfig {
    pub name: String,
    pub rules: Vec<TagRuleConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Body text must be longer than this many characters.
    pub min_body_chars: usize,
    /// Path prefix stripped when deriving slugs.
    pub slug_prefix: String,
    pub title_selectors: Vec<String>,
    pub body_selectors: Vec<String>,
    /// Subtrees skipped entirely while reading the body.
    pub removal_selectors: Vec<String>,
    /// Elements kept verbatim as markup inside the body.
    pub embed_selector: String,
    /// Primary content container searched first for images.
    pub image_container: String,
    pub fluid_image_class: String,
    pub tag_stages: Vec<TagStageConfig>,
    pub max_tags: usize,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn text_rule(selector: &str) -> TagRuleConfig {
    TagRuleConfig::Text {
        selector: selector.to_string(),
    }
}

fn meta_rule(selector: &str) -> TagRuleConfig {
    TagRuleConfig::Meta {
        selector: selector.to_string(),
    }
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            min_body_chars: 100,
            slug_prefix: "article/".to_string(),
            title_selectors: strings(&[
                "h1.entry-title",
                "h1.post-title",
                "h1.article-title",
                "h1",
                ".entry-title",
                ".post-title",
                ".article-title",
                "title",
            ]),
            body_selectors: strings(&[
                ".ds-content",
                ".entry-content",
                ".post-content",
                ".article-content",
                ".content",
                "article",
                ".post-body",
                ".entry-body",
            ]),
            removal_selectors: strings(&["script", "style", ".article-promo"]),
            embed_selector: "blockquote".to_string(),
            image_container: ".ds-content".to_string(),
            fluid_image_class: "img-fluid".to_string(),
            tag_stages: vec![
                TagStageConfig {
                    name: "site".to_string(),
                    rules: vec![text_rule(".ds-topics a")],
                },
                TagStageConfig {
                    name: "generic".to_string(),
                    rules: vec![
                        text_rule(".tags a"),
                        text_rule(".tag a"),
                        text_rule(".post-tags a"),
                        text_rule(".entry-tags a"),
                        text_rule(".article-tags a"),
                        text_rule(".meta-tags a"),
                        text_rule(".tag-list a"),
                        text_rule("a[rel=\"tag\"]"),
                        text_rule(".keywords a"),
                        text_rule(".categories a"),
                        text_rule(".post-categories a"),
                        text_rule(".entry-categories a"),
                        meta_rule("meta[name=\"keywords\"]"),
                        meta_rule("meta[property=\"article:tag\"]"),
                        meta_rule("meta[name=\"news_keywords\"]"),
                    ],
                },
                TagStageConfig {
                    name: "fallback".to_string(),
                    rules: vec![TagRuleConfig::ClassContains {
                        needle: "tag".to_string(),
                    }],
                },
            ],
            max_tags: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BloggerConfig {
    pub api_base: String,
    pub blog_id: Option<String>,
    /// OAuth access token; obtaining and refreshing it is handled elsewhere.
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    pub max_labels: usize,
    pub attribution: String,
}

impl Default for BloggerConfig {
    fn default() -> Self {
        Self {
            api_base: "https://www.googleapis.com/blogger/v3".to_string(),
            blog_id: None,
            access_token: None,
            max_labels: 20,
            attribution: "Source: Entertainment News".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub api_base: String,
    #[serde(skip_serializing)]
    pub bot_token: Option<String>,
    pub channel_id: Option<String>,
    pub caption_limit: usize,
    pub message_limit: usize,
    pub snippet_chars: usize,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.telegram.org".to_string(),
            bot_token: None,
            channel_id: None,
            caption_limit: 1024,
            message_limit: 4096,
            snippet_chars: 200,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// `sqlite://path?mode=rwc` or `memory://`.
    pub url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://news_syndicator.db?mode=rwc".to_string(),
        }
    }
}
