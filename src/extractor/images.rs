//! Image discovery.
//!
//! Priority order, first non-empty wins:
//! 1. fluid images inside the primary content container
//! 2. any image inside that container
//! 3. fluid images anywhere in the document

use super::rules::Rules;
use itertools::Itertools;
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Turn an `src` value into an absolute URL.
///
/// Protocol-relative sources get `https:`; relative ones are joined to the
/// article URL. Inline `data:` images and unresolvable values are dropped.
pub fn normalize(src: &str, base: Option<&Url>) -> Option<String> {
    let src = src.trim();
    if src.is_empty() || src.starts_with("data:") {
        return None;
    }
    if let Some(rest) = src.strip_prefix("//") {
        return Some(format!("https://{rest}"));
    }
    if let Ok(absolute) = Url::parse(src) {
        return Some(absolute.to_string());
    }
    base.and_then(|b| b.join(src).ok()).map(|u| u.to_string())
}

/// First usable source of one image. Lazy-loading themes put a `data:`
/// placeholder or nothing in `src` and the real URL in `data-src`.
fn image_source(img: ElementRef<'_>, base: Option<&Url>) -> Option<String> {
    let el = img.value();
    [el.attr("src"), el.attr("data-src")]
        .into_iter()
        .flatten()
        .find_map(|src| normalize(src, base))
}

fn sources<'a>(imgs: impl Iterator<Item = ElementRef<'a>>, base: Option<&Url>) -> Vec<String> {
    imgs.filter_map(|img| image_source(img, base))
        .unique()
        .collect()
}

fn within(container: Option<ElementRef<'_>>, sel: &Selector, base: Option<&Url>) -> Vec<String> {
    container.map(|c| sources(c.select(sel), base)).unwrap_or_default()
}

/// Absolute, de-duplicated image URLs in document order.
pub fn collect(document: &Html, article_url: &str, rules: &Rules) -> Vec<String> {
    let base = Url::parse(article_url).ok();
    let base = base.as_ref();
    let container = document.select(&rules.image_container).next();

    let fluid = within(container, &rules.fluid_image, base);
    if !fluid.is_empty() {
        return fluid;
    }
    let any = within(container, &rules.any_image, base);
    if !any.is_empty() {
        return any;
    }
    sources(document.select(&rules.fluid_image), base)
}
