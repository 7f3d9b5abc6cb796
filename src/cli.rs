//! Command-line interface for the syndicator.
//!
//! Every option can be given as a flag or through the environment. Values
//! given here override the YAML configuration.

use crate::config::Config;
use clap::{Parser, Subcommand};

/// Incrementally syndicate new sitemap articles to a blog and a channel.
///
/// # Examples
///
/// ```sh
/// # Publish everything newer than the cursor
/// news_syndicator --config config.yaml run
///
/// # Preview one article without publishing
/// news_syndicator extract https://cineulagam.com/article/some-story-123 -o ./preview
///
/// # What would the next run pick up?
/// STORE_URL=sqlite://prod.db news_syndicator pending
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to config.yaml file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Watermark store URL (`sqlite://...` or `memory://`)
    #[arg(long, env = "STORE_URL", global = true)]
    pub store_url: Option<String>,

    /// Blogger OAuth access token
    #[arg(long, env = "BLOGGER_ACCESS_TOKEN", global = true, hide_env_values = true)]
    pub blogger_token: Option<String>,

    /// Blogger blog id
    #[arg(long, env = "BLOGGER_BLOG_ID", global = true)]
    pub blogger_blog_id: Option<String>,

    /// Telegram bot token
    #[arg(long, env = "TELEGRAM_BOT_TOKEN", global = true, hide_env_values = true)]
    pub telegram_token: Option<String>,

    /// Telegram channel id or @handle
    #[arg(long, env = "TELEGRAM_CHANNEL_ID", global = true)]
    pub telegram_channel: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Publish every article newer than the cursor, once
    Run,
    /// Print the URL of the most recently published article
    Cursor,
    /// Print store statistics
    Stats,
    /// Print the most recently published records
    Recent {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Print the current delta without publishing anything
    Pending,
    /// Fetch and extract one article
    Extract {
        url: String,
        /// Also write `<slug>.json` and `<slug>.html` here
        #[arg(short, long)]
        output_dir: Option<String>,
    },
    /// Delete one published record so the article can be published again
    Forget { url: String },
    /// Check the store, the blog and the bot
    Check,
}

impl Cli {
    /// Apply command-line and environment overrides on top of `config`.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(url) = &self.store_url {
            config.store.url = url.clone();
        }
        if let Some(token) = &self.blogger_token {
            config.blogger.access_token = Some(token.clone());
        }
        if let Some(id) = &self.blogger_blog_id {
            config.blogger.blog_id = Some(id.clone());
        }
        if let Some(token) = &self.telegram_token {
            config.telegram.bot_token = Some(token.clone());
        }
        if let Some(channel) = &self.telegram_channel {
            config.telegram.channel_id = Some(channel.clone());
        }
    }
}
