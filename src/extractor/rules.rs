//! Compiled extraction rules.
//!
//! [`ExtractorConfig`] carries selectors as strings; [`Rules::compile`] parses
//! each of them once at startup so a typo in the YAML fails fast with
//! [`ConfigError::Selector`] instead of silently matching nothing per article.

use crate::config::{ExtractorConfig, TagRuleConfig, TagStageConfig};
use crate::error::ConfigError;
use scraper::{ElementRef, Selector};

pub(crate) fn compile(selector: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector).map_err(|e| ConfigError::Selector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

fn compile_all(selectors: &[String]) -> Result<Vec<Selector>, ConfigError> {
    selectors.iter().map(|s| compile(s)).collect()
}

/// How one tag rule reads candidates out of a document.
#[derive(Debug)]
pub enum TagRule {
    /// Text of every matching element.
    Text(Selector),
    /// Separated `content` attribute of the first matching element.
    Meta(Selector),
    /// Text of `a`/`span`/`div` elements whose class contains the needle.
    ClassContains { candidates: Selector, needle: String },
}

impl TagRule {
    fn compile(config: &TagRuleConfig) -> Result<Self, ConfigError> {
        Ok(match config {
            TagRuleConfig::Text { selector } => TagRule::Text(compile(selector)?),
            TagRuleConfig::Meta { selector } => TagRule::Meta(compile(selector)?),
            TagRuleConfig::ClassContains { needle } => TagRule::ClassContains {
                candidates: compile("a, span, div")?,
                needle: needle.to_lowercase(),
            },
        })
    }

    /// Case-insensitive substring match against the `class` attribute.
    pub(crate) fn class_matches(el: &ElementRef<'_>, needle: &str) -> bool {
        el.value()
            .attr("class")
            .is_some_and(|class| class.to_lowercase().contains(needle))
    }
}

#[derive(Debug)]
pub struct TagStage {
    pub name: String,
    pub rules: Vec<TagRule>,
}

impl TagStage {
    fn compile(config: &TagStageConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            name: config.name.clone(),
            rules: config
                .rules
                .iter()
                .map(TagRule::compile)
                .collect::<Result<_, _>>()?,
        })
    }
}

/// Every selector the extractor needs, parsed.
#[derive(Debug)]
pub struct Rules {
    pub title: Vec<Selector>,
    pub body: Vec<Selector>,
    pub removal: Vec<Selector>,
    pub embed: Selector,
    pub image_container: Selector,
    pub fluid_image: Selector,
    pub any_image: Selector,
    pub tag_stages: Vec<TagStage>,
    pub max_tags: usize,
    pub min_body_chars: usize,
    pub slug_prefix: String,
}

impl Rules {
    pub fn compile(config: &ExtractorConfig) -> Result<Self, ConfigError> {
        if config.title_selectors.is_empty() {
            return Err(ConfigError::Invalid {
                field: "extractor.title_selectors",
                reason: "at least one selector is required".into(),
            });
        }
        if config.body_selectors.is_empty() {
            return Err(ConfigError::Invalid {
                field: "extractor.body_selectors",
                reason: "at least one selector is required".into(),
            });
        }

        Ok(Self {
            title: compile_all(&config.title_selectors)?,
            body: compile_all(&config.body_selectors)?,
            removal: compile_all(&config.removal_selectors)?,
            embed: compile(&config.embed_selector)?,
            image_container: compile(&config.image_container)?,
            fluid_image: compile(&format!("img.{}", config.fluid_image_class))?,
            any_image: compile("img")?,
            tag_stages: config
                .tag_stages
                .iter()
                .map(TagStage::compile)
                .collect::<Result<_, _>>()?,
            max_tags: config.max_tags,
            min_body_chars: config.min_body_chars,
            slug_prefix: config.slug_prefix.clone(),
        })
    }

    pub(crate) fn is_removed(&self, el: &ElementRef<'_>) -> bool {
        self.removal.iter().any(|sel| sel.matches(el))
    }
}
