//! Tag extraction.
//!
//! Stages run in order and the first stage that yields at least one tag
//! wins. Inside a stage every rule contributes, in rule order. Candidates
//! are cleaned with [`clean_tag`], deduplicated case-insensitively (first
//! spelling kept) and capped.

use super::rules::{TagRule, TagStage};
use crate::utils::clean_tag;
use itertools::Itertools;
use scraper::{ElementRef, Html};
use tracing::debug;

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>()
}

fn raw_candidates(document: &Html, rule: &TagRule) -> Vec<String> {
    match rule {
        TagRule::Text(sel) => document.select(sel).map(element_text).collect(),
        TagRule::Meta(sel) => document
            .select(sel)
            .next()
            .and_then(|el| el.value().attr("content"))
            .map(|content| content.split([',', ';', '|']).map(str::to_string).collect())
            .unwrap_or_default(),
        TagRule::ClassContains { candidates, needle } => document
            .select(candidates)
            .filter(|el| TagRule::class_matches(el, needle))
            .map(element_text)
            .collect(),
    }
}

fn run_stage(document: &Html, stage: &TagStage, max: usize) -> Vec<String> {
    stage
        .rules
        .iter()
        .flat_map(|rule| raw_candidates(document, rule))
        .filter_map(|raw| clean_tag(&raw))
        .unique_by(|tag| tag.to_lowercase())
        .take(max)
        .collect()
}

/// Tags from the first productive stage, at most `max` of them.
pub fn collect(document: &Html, stages: &[TagStage], max: usize) -> Vec<String> {
    for stage in stages {
        let tags = run_stage(document, stage, max);
        if !tags.is_empty() {
            debug!(stage = %stage.name, count = tags.len(), "Extracted tags");
            return tags;
        }
    }
    Vec::new()
}
