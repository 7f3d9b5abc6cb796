//! Preview files for `extract --output-dir`.
//!
//! ```text
//! output_dir/
//! ├── <slug>.json   # the ExtractedArticle
//! └── <slug>.html   # rendered_html wrapped in a standalone page
//! ```

use crate::models::ExtractedArticle;
use crate::utils::ensure_writable_dir;
use html_escape::encode_text;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument};

/// Paths written by [`write_preview`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewFiles {
    pub json: PathBuf,
    pub html: PathBuf,
}

fn file_stem(article: &ExtractedArticle) -> &str {
    if article.slug.is_empty() {
        "article"
    } else {
        &article.slug
    }
}

fn standalone_page(article: &ExtractedArticle) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n</head>\n<body>\n{}\n</body>\n</html>\n",
        encode_text(&article.title),
        article.rendered_html
    )
}

/// Write `<slug>.json` and `<slug>.html` for `article` into `output_dir`.
///
/// # Arguments
///
/// * `article` - The extracted article to preview
/// * `output_dir` - Directory for the two files; created when missing
///
/// # Returns
///
/// The paths written, or an error if the directory is not writable or a
/// write fails.
#[instrument(level = "info", skip_all, fields(%output_dir, slug = %article.slug))]
pub async fn write_preview(
    article: &ExtractedArticle,
    output_dir: &str,
) -> Result<PreviewFiles, Box<dyn Error>> {
    ensure_writable_dir(output_dir).await?;

    let dir = Path::new(output_dir);
    let stem = file_stem(article);
    let files = PreviewFiles {
        json: dir.join(format!("{stem}.json")),
        html: dir.join(format!("{stem}.html")),
    };

    fs::write(&files.json, serde_json::to_string_pretty(article)?).await?;
    fs::write(&files.html, standalone_page(article)).await?;
    info!(json = %files.json.display(), html = %files.html.display(), "Wrote preview");

    Ok(files)
}
