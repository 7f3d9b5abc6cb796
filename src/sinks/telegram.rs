//! Telegram channel sink.
//!
//! Announces an article in a channel through the Bot API:
//!
//! 1. `sendPhoto` with the lead image and a Markdown caption, when the
//!    article has an image
//! 2. `sendMessage` with the same text, when there is no image or the photo
//!    send failed for any reason
//!
//! Both carry an inline "Read More" button linking to the blog post when the
//! upstream sink returned a url. A channel without a bot token or chat id is
//! treated as switched off: publishing succeeds with a `skipped` reference.

use super::{PublishSink, remote_message};
use crate::config::TelegramConfig;
use crate::error::SinkError;
use crate::http::HttpClient;
use crate::models::{ExtractedArticle, SinkReference};
use crate::utils::{collapse_whitespace, strip_tags, truncate_chars};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, instrument, warn};

const SINK: &str = "telegram";

#[derive(Debug, Deserialize)]
struct ApiReply<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
    date: Option<i64>,
}

/// The bot account behind the token, as reported by `getMe`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BotIdentity {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
}

/// Text that can sit inside a `*bold*` entity: `*` would close it early.
fn bold_safe(s: &str) -> String {
    collapse_whitespace(&s.replace('*', " "))
}

/// Escape the characters legacy Markdown treats as markup, for text outside
/// any entity.
pub fn escape_markdown(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[derive(Debug, Clone)]
pub struct TelegramSink {
    http: HttpClient,
    config: TelegramConfig,
}

impl TelegramSink {
    pub fn new(http: HttpClient, config: TelegramConfig) -> Self {
        Self { http, config }
    }

    /// `(bot_token, channel_id)` when both are set.
    fn credentials(&self) -> Option<(&str, &str)> {
        let token = self.config.bot_token.as_deref().filter(|s| !s.trim().is_empty())?;
        let chat = self.config.channel_id.as_deref().filter(|s| !s.trim().is_empty())?;
        Some((token, chat))
    }

    pub fn is_configured(&self) -> bool {
        self.credentials().is_some()
    }

    fn method_url(&self, token: &str, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.api_base.trim_end_matches('/'),
            token,
            method
        )
    }

    /// Summary without markup, capped at `snippet_chars` with `...`.
    pub fn snippet(&self, article: &ExtractedArticle) -> String {
        let plain = strip_tags(&article.summary_text);
        if plain.chars().count() > self.config.snippet_chars {
            format!("{}...", truncate_chars(&plain, self.config.snippet_chars).trim_end())
        } else {
            plain
        }
    }

    /// `📰 *title*` followed by the snippet, capped at `limit` characters.
    ///
    /// Legacy Markdown has no escapes inside an entity, so the title loses its
    /// `*` and is otherwise sent as is; only the snippet is escaped. Truncation
    /// never cuts into the bold span or leaves a dangling escape.
    pub fn caption(&self, article: &ExtractedArticle, limit: usize) -> String {
        let title = bold_safe(&article.title);
        let snippet = escape_markdown(&self.snippet(article));
        let text = format!("📰 *{title}*\n\n{snippet}");
        if text.chars().count() <= limit {
            return text;
        }

        // "📰 *" + title + "*"
        let header = title.chars().count() + 4;
        if header + 2 + 3 <= limit {
            let keep = limit - header - 2 - 3;
            let cut = truncate_chars(&snippet, keep).trim_end_matches('\\').trim_end();
            format!("📰 *{title}*\n\n{cut}...")
        } else {
            let keep = limit.saturating_sub(4 + 3);
            format!("📰 *{}...*", truncate_chars(&title, keep).trim_end())
        }
    }

    fn read_more(upstream: Option<&SinkReference>) -> Option<Value> {
        let url = upstream?.url.as_deref()?;
        Some(json!({
            "inline_keyboard": [[{ "text": "📖 Read More", "url": url }]]
        }))
    }

    async fn call(&self, token: &str, method: &str, payload: &Value) -> Result<SentMessage, SinkError> {
        let reply = self
            .http
            .post_json(&self.method_url(token, method), payload, None)
            .await
            .map_err(|source| SinkError::Transport { sink: SINK, source })?;

        let parsed: Result<ApiReply<SentMessage>, _> = serde_json::from_str(&reply.body);
        match parsed {
            Ok(ApiReply {
                ok: true,
                result: Some(message),
                ..
            }) if reply.status.is_success() => Ok(message),
            Ok(ApiReply {
                description,
                error_code,
                ..
            }) => Err(SinkError::RejectedByRemote {
                sink: SINK,
                status: error_code.unwrap_or(reply.status.as_u16()),
                message: description.unwrap_or_else(|| remote_message(&reply.body)),
            }),
            Err(_) if !reply.status.is_success() => Err(SinkError::RejectedByRemote {
                sink: SINK,
                status: reply.status.as_u16(),
                message: remote_message(&reply.body),
            }),
            Err(e) => Err(SinkError::InvalidResponse {
                sink: SINK,
                reason: e.to_string(),
            }),
        }
    }

    /// Identity of the configured bot.
    #[instrument(level = "info", skip_all)]
    pub async fn get_me(&self) -> Result<BotIdentity, SinkError> {
        let (token, _) = self.credentials().ok_or_else(|| SinkError::NotConfigured {
            sink: SINK,
            reason: "bot token or channel id is missing".into(),
        })?;
        let reply = self
            .http
            .get_reply(&self.method_url(token, "getMe"), None)
            .await
            .map_err(|source| SinkError::Transport { sink: SINK, source })?;
        let parsed: ApiReply<BotIdentity> =
            serde_json::from_str(&reply.body).map_err(|e| SinkError::InvalidResponse {
                sink: SINK,
                reason: e.to_string(),
            })?;
        match parsed {
            ApiReply {
                ok: true,
                result: Some(me),
                ..
            } => Ok(me),
            ApiReply { description, .. } => Err(SinkError::RejectedByRemote {
                sink: SINK,
                status: reply.status.as_u16(),
                message: description.unwrap_or_default(),
            }),
        }
    }

    fn reference(message: SentMessage) -> SinkReference {
        SinkReference {
            sink: SINK.to_string(),
            id: message.message_id.to_string(),
            url: None,
            published_at: message.date.and_then(|d| DateTime::<Utc>::from_timestamp(d, 0)),
        }
    }
}

impl PublishSink for TelegramSink {
    fn name(&self) -> &'static str {
        SINK
    }

    #[instrument(level = "info", skip_all, fields(url = %article.url))]
    async fn publish(
        &self,
        article: &ExtractedArticle,
        upstream: Option<&SinkReference>,
    ) -> Result<SinkReference, SinkError> {
        let Some((token, chat)) = self.credentials() else {
            info!("Telegram channel not configured; skipping");
            return Ok(SinkReference {
                sink: SINK.to_string(),
                id: "skipped".to_string(),
                url: None,
                published_at: None,
            });
        };
        let keyboard = Self::read_more(upstream);

        if let Some(image) = article.lead_image() {
            let mut payload = json!({
                "chat_id": chat,
                "photo": image,
                "caption": self.caption(article, self.config.caption_limit),
                "parse_mode": "Markdown",
            });
            if let Some(k) = &keyboard {
                payload["reply_markup"] = k.clone();
            }
            match self.call(token, "sendPhoto", &payload).await {
                Ok(message) => {
                    info!(message_id = message.message_id, "Posted photo to channel");
                    return Ok(Self::reference(message));
                }
                Err(e) => warn!(error = %e, "Photo post failed; falling back to text"),
            }
        }

        let mut payload = json!({
            "chat_id": chat,
            "text": self.caption(article, self.config.message_limit),
            "parse_mode": "Markdown",
            "disable_web_page_preview": false,
        });
        if let Some(k) = keyboard {
            payload["reply_markup"] = k;
        }
        let message = self.call(token, "sendMessage", &payload).await?;
        info!(message_id = message.message_id, "Posted text to channel");
        Ok(Self::reference(message))
    }
}
