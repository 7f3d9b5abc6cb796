//! Publish sinks.
//!
//! A sink delivers one [`ExtractedArticle`] to one external system and
//! returns a [`SinkReference`]. Sinks run in a fixed order; each receives the
//! reference produced by the sink before it so it can link back to it
//! (the channel post links to the blog post).
//!
//! - [`BloggerSink`]: creates a blog post (primary sink)
//! - [`TelegramSink`]: announces the post in a channel

pub mod blogger;
pub mod telegram;

pub use blogger::BloggerSink;
pub use telegram::TelegramSink;

use crate::error::SinkError;
use crate::models::{ExtractedArticle, SinkReference};

pub trait PublishSink {
    /// Stable label used in logs and in [`SinkReference::sink`].
    fn name(&self) -> &'static str;

    /// Publish `article`. `upstream` is the previous sink's reference, if any.
    async fn publish(
        &self,
        article: &ExtractedArticle,
        upstream: Option<&SinkReference>,
    ) -> Result<SinkReference, SinkError>;
}

/// Best-effort human message from an API error body.
///
/// Understands `{"error": {"message": ..}}` and `{"description": ..}`, and
/// falls back to the raw body, shortened.
pub(crate) fn remote_message(body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let message = parsed.as_ref().and_then(|v| {
        v.pointer("/error/message")
            .or_else(|| v.get("description"))
            .and_then(|m| m.as_str())
    });
    match message {
        Some(m) => m.to_string(),
        None => crate::utils::truncate_for_log(body.trim(), 200),
    }
}
