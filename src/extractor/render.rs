//! Presentational markup for sinks that accept HTML.
//!
//! ```text
//! <style>...</style>
//! <div class="article-container">
//!   <div class="article-content">
//!     image gallery
//!     paragraphs, with an inline image after every second one
//!     tag block
//!   </div>
//! </div>
//! ```
//!
//! Text is escaped; embeds are inserted as-is.

use super::body::Block;
use html_escape::{encode_double_quoted_attribute, encode_text};
use std::fmt::Write;

const STYLE: &str = r#"<style>
.article-container { max-width: 1200px; margin: 0 auto; font-family: 'Segoe UI', Tahoma, Geneva, Verdana, sans-serif; line-height: 1.6; color: #333; }
.image-gallery { display: grid; grid-template-columns: repeat(auto-fit, minmax(280px, 1fr)); gap: 16px; margin: 20px 0; }
.gallery-image, .inline-image { width: 100%; height: auto; border-radius: 10px; }
.inline-image-container { margin: 24px 0; text-align: center; }
.content-paragraph { margin-bottom: 18px; font-size: 1.1rem; text-align: justify; }
.article-tags { margin-top: 30px; padding: 20px; background: #f8f9fa; border-radius: 10px; }
.article-tags .tag { display: inline-block; background: #ff6b6b; color: white; padding: 4px 12px; margin: 4px; border-radius: 15px; font-size: 0.9rem; }
</style>"#;

fn gallery(out: &mut String, title: &str, images: &[String]) {
    if images.is_empty() {
        return;
    }
    out.push_str("<div class=\"image-gallery\">");
    for (i, src) in images.iter().enumerate() {
        let _ = write!(
            out,
            "<div class=\"gallery-item\"><img src=\"{}\" alt=\"{} - Image {}\" loading=\"lazy\" class=\"gallery-image\"></div>",
            encode_double_quoted_attribute(src),
            encode_double_quoted_attribute(title),
            i + 1
        );
    }
    out.push_str("</div>");
}

fn inline_image(out: &mut String, title: &str, src: &str) {
    let _ = write!(
        out,
        "<div class=\"inline-image-container\"><img src=\"{}\" alt=\"{} - Related Image\" loading=\"lazy\" class=\"inline-image\"></div>",
        encode_double_quoted_attribute(src),
        encode_double_quoted_attribute(title)
    );
}

fn tag_block(out: &mut String, tags: &[String]) {
    if tags.is_empty() {
        return;
    }
    out.push_str("<div class=\"article-tags\"><h3>Tags:</h3><div class=\"tag-list\">");
    let spans = tags
        .iter()
        .map(|tag| format!("<span class=\"tag\">{}</span>", encode_text(tag)))
        .collect::<Vec<_>>()
        .join(" ");
    out.push_str(&spans);
    out.push_str("</div></div>");
}

/// Render the article body as a self-contained HTML fragment.
pub fn render(title: &str, blocks: &[Block], images: &[String], tags: &[String]) -> String {
    let mut out = String::with_capacity(STYLE.len() + 1024);
    out.push_str(STYLE);
    out.push_str("<div class=\"article-container\"><div class=\"article-content\">");
    gallery(&mut out, title, images);

    out.push_str("<div class=\"article-text\">");
    let paragraphs = blocks.iter().filter(|b| !matches!(b, Block::Break));
    for (i, block) in paragraphs.enumerate() {
        match block {
            Block::Text(text) => {
                let _ = write!(out, "<p class=\"content-paragraph\">{}</p>", encode_text(text));
            }
            Block::Embed(markup) => out.push_str(markup),
            Block::Break => {}
        }
        if i % 2 == 1 && i < images.len() {
            let idx = (i / 2).min(images.len() - 1);
            inline_image(&mut out, title, &images[idx]);
        }
    }
    out.push_str("</div>");

    tag_block(&mut out, tags);
    out.push_str("</div></div>");
    out
}
