//! # News Syndicator
//!
//! Watches one news site's sitemap and re-publishes every article that is
//! newer than the last one it published: first as a Blogger post, then as a
//! Telegram channel announcement linking to that post.
//!
//! ## Usage
//!
//! ```sh
//! news_syndicator --config config.yaml run
//! ```
//!
//! ## Architecture
//!
//! 1. **Discovery**: fetch the sitemap and cut it at the cursor (the newest published URL)
//! 2. **Extraction**: fetch each candidate page and turn it into an `ExtractedArticle`
//! 3. **Publishing**: blog sink, then channel sink
//! 4. **Watermark**: record the article only after both sinks succeeded
//!
//! Scheduling is left to cron or whatever drives the binary.

use clap::Parser;
use serde::Serialize;
use std::error::Error;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod discovery;
mod error;
mod extractor;
mod http;
mod models;
mod outputs;
mod pipeline;
mod sinks;
mod store;
mod utils;

use cli::{Cli, Command};
use config::Config;
use discovery::Discovery;
use extractor::Extractor;
use http::{HttpClient, RetryPolicy};
use models::RunStatus;
use pipeline::{Pacing, Pipeline};
use sinks::{BloggerSink, TelegramSink};
use store::{Store, WatermarkStore};

type Syndicator = Pipeline<Store, BloggerSink, TelegramSink>;

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn build_http(config: &Config) -> Result<HttpClient, Box<dyn Error>> {
    Ok(HttpClient::new(
        &config.http,
        &config.source.user_agent,
        RetryPolicy::from(&config.retry),
    )?)
}

async fn build_pipeline(config: &Config, http: HttpClient) -> Result<Syndicator, Box<dyn Error>> {
    let store = Store::connect(&config.store.url).await?;
    let discovery = Discovery::new(http.clone(), config.source.sitemap_url.clone());
    let extractor = Extractor::new(&config.extractor)?;
    let blogger = BloggerSink::new(http.clone(), config.blogger.clone());
    let telegram = TelegramSink::new(http.clone(), config.telegram.clone());
    if !telegram.is_configured() {
        warn!("Telegram is not configured; channel announcements will be skipped");
    }
    Ok(Pipeline::new(
        discovery,
        extractor,
        http,
        store,
        blogger,
        telegram,
        Pacing::from(&config.pacing),
    ))
}

#[instrument(level = "info", skip_all)]
async fn run(config: &Config, http: HttpClient) -> Result<(), Box<dyn Error>> {
    let pipeline = build_pipeline(config, http).await?;

    let stop = pipeline.stop_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; finishing the current article");
            stop.stop();
        }
    });

    let result = pipeline.run_once().await?;
    print_json(&result)?;
    if result.status == RunStatus::AlreadyRunning {
        return Err("another run is already in progress".into());
    }
    Ok(())
}

#[instrument(level = "info", skip_all, fields(%url))]
async fn extract(
    config: &Config,
    http: HttpClient,
    url: &str,
    output_dir: Option<&str>,
) -> Result<(), Box<dyn Error>> {
    let extractor = Extractor::new(&config.extractor)?;
    let article = extractor.fetch_and_extract(&http, url).await?;
    if let Some(dir) = output_dir {
        if let Err(e) = outputs::write_preview(&article, dir).await {
            error!(path = %dir, error = %e, "Preview directory is not writable (fix perms or choose a different path)");
            return Err(e);
        }
    }
    print_json(&article)
}

#[instrument(level = "info", skip_all)]
async fn check(config: &Config, http: HttpClient) -> Result<(), Box<dyn Error>> {
    let mut healthy = true;

    let store = match Store::connect(&config.store.url).await {
        Ok(store) => store.ping().await.map(|_| store.backend_name()),
        Err(e) => Err(e),
    };
    let store = match store {
        Ok(backend) => serde_json::json!({ "ok": true, "backend": backend }),
        Err(e) => {
            healthy = false;
            serde_json::json!({ "ok": false, "error": e.to_string() })
        }
    };

    let blogger = BloggerSink::new(http.clone(), config.blogger.clone());
    let blog = match blogger.blog_info().await {
        Ok(info) => serde_json::json!({ "ok": true, "blog": info }),
        Err(e) => {
            healthy = false;
            serde_json::json!({ "ok": false, "error": e.to_string() })
        }
    };

    let telegram = TelegramSink::new(http, config.telegram.clone());
    let bot = if telegram.is_configured() {
        match telegram.get_me().await {
            Ok(identity) => serde_json::json!({ "ok": true, "bot": identity }),
            Err(e) => {
                healthy = false;
                serde_json::json!({ "ok": false, "error": e.to_string() })
            }
        }
    } else {
        serde_json::json!({ "ok": true, "skipped": "not configured" })
    };

    print_json(&serde_json::json!({ "store": store, "blogger": blog, "telegram": bot }))?;
    if healthy {
        Ok(())
    } else {
        Err("one or more connectivity checks failed".into())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    let start_time = std::time::Instant::now();
    let args = Cli::parse();
    debug!(command = ?args.command, config = ?args.config, "Parsed CLI arguments");

    let mut config = Config::load(args.config.as_deref()).await?;
    args.apply_overrides(&mut config);
    config.validate()?;

    let http = build_http(&config)?;

    match &args.command {
        Command::Run => run(&config, http).await?,
        Command::Extract { url, output_dir } => {
            extract(&config, http, url, output_dir.as_deref()).await?
        }
        Command::Check => check(&config, http).await?,
        Command::Pending => {
            let pipeline = build_pipeline(&config, http).await?;
            print_json(&pipeline.pending().await?)?;
        }
        Command::Cursor => {
            let store = Store::connect(&config.store.url).await?;
            print_json(&serde_json::json!({ "cursor": store.get_cursor().await? }))?;
        }
        Command::Stats => {
            let store = Store::connect(&config.store.url).await?;
            print_json(&store.stats().await?)?;
        }
        Command::Recent { limit } => {
            let store = Store::connect(&config.store.url).await?;
            print_json(&store.recent(*limit).await?)?;
        }
        Command::Forget { url } => {
            let store = Store::connect(&config.store.url).await?;
            let removed = store.delete(url).await?;
            if removed {
                info!(%url, "Forgot published record");
            } else {
                warn!(%url, "No published record for this URL");
            }
            print_json(&serde_json::json!({ "url": url, "removed": removed }))?;
        }
    }

    let elapsed = start_time.elapsed();
    info!(?elapsed, secs = elapsed.as_secs(), millis = elapsed.subsec_millis(), "Execution complete");
    Ok(())
}
