//! Pipeline orchestrator.
//!
//! One [`Pipeline::run_once`] call walks the delta sequentially, newest
//! first:
//!
//! ```text
//! for each ArticleRef in delta:
//!     stop requested?           -> status cancelled
//!     already posted?           -> skip
//!     pacing delay, fetch, extract   (failure: skip article)
//!     primary sink              (failure: skip article)
//!     secondary sink(primary ref)   (failure: skip article, primary not rolled back)
//!     store.record(...)         (failure: abort run)
//! ```
//!
//! # Failure classes
//!
//! | Failure | Effect |
//! |---------|--------|
//! | sitemap unavailable | empty delta, run completes |
//! | extraction or sink failure | article skipped, retried on a later run |
//! | store failure | run aborts with [`PipelineError::StoreUnavailable`] |
//!
//! # Cursor ordering
//!
//! Records of one run are stamped `started_at + (delta_len - index)`
//! microseconds, so the newest article of the run carries the greatest
//! `posted_at` and becomes the cursor.

use crate::config::PacingConfig;
use crate::discovery::Discovery;
use crate::error::{PipelineError, StoreError};
use crate::extractor::Extractor;
use crate::http::HttpClient;
use crate::models::{ArticleRef, RunResult, RunStatus, StoreStats};
use crate::sinks::PublishSink;
use crate::store::{RecordOutcome, WatermarkStore};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::{Rng, rng};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

/// Cooperative stop flag, checked between articles.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Randomized delay before each article fetch.
#[derive(Debug, Clone)]
pub struct Pacing {
    min: Duration,
    max: Duration,
}

impl Pacing {
    pub fn none() -> Self {
        Self {
            min: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    fn next_delay(&self) -> Duration {
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        if max <= min {
            return self.min;
        }
        Duration::from_millis(rng().random_range(min..=max))
    }

    pub async fn wait(&self) {
        let delay = self.next_delay();
        if !delay.is_zero() {
            debug!(?delay, "Pacing before fetch");
            sleep(delay).await;
        }
    }
}

impl From<&PacingConfig> for Pacing {
    fn from(config: &PacingConfig) -> Self {
        Self {
            min: Duration::from_millis(config.min_delay_ms),
            max: Duration::from_millis(config.max_delay_ms.max(config.min_delay_ms)),
        }
    }
}

#[derive(Debug, Default)]
struct Tally {
    candidates: usize,
    published: usize,
    already_posted: usize,
    failed: usize,
}

impl Tally {
    fn finish(
        &self,
        status: RunStatus,
        error: Option<String>,
        started_at: DateTime<Utc>,
    ) -> RunResult {
        RunResult {
            status,
            error,
            started_at,
            finished_at: Utc::now(),
            candidate_count: self.candidates,
            published_count: self.published,
            already_posted_count: self.already_posted,
            failed_count: self.failed,
        }
    }
}

/// Discovery, extraction, two sinks and a watermark store, wired together.
pub struct Pipeline<W, A, B> {
    discovery: Discovery,
    extractor: Extractor,
    http: HttpClient,
    store: W,
    primary: A,
    secondary: B,
    pacing: Pacing,
    stop: StopSignal,
    run_lock: Mutex<()>,
    last_run: RwLock<Option<RunResult>>,
}

impl<W, A, B> Pipeline<W, A, B>
where
    W: WatermarkStore,
    A: PublishSink,
    B: PublishSink,
{
    pub fn new(
        discovery: Discovery,
        extractor: Extractor,
        http: HttpClient,
        store: W,
        primary: A,
        secondary: B,
        pacing: Pacing,
    ) -> Self {
        Self {
            discovery,
            extractor,
            http,
            store,
            primary,
            secondary,
            pacing,
            stop: StopSignal::new(),
            run_lock: Mutex::new(()),
            last_run: RwLock::new(None),
        }
    }

    /// Handle that stops the current and future runs between articles.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub async fn cursor(&self) -> Result<Option<String>, StoreError> {
        self.store.get_cursor().await
    }

    pub async fn stats(&self) -> Result<StoreStats, StoreError> {
        self.store.stats().await
    }

    /// Result of the most recent run in this process.
    pub async fn last_run(&self) -> Option<RunResult> {
        self.last_run.read().await.clone()
    }

    /// The current delta, without fetching or publishing anything.
    pub async fn pending(&self) -> Result<Vec<ArticleRef>, StoreError> {
        let cursor = self.store.get_cursor().await?;
        Ok(self.discovery.fetch_delta(cursor.as_deref()).await)
    }

    /// Process the current delta once.
    ///
    /// Returns [`RunStatus::AlreadyRunning`] immediately when another run holds
    /// the lock. Only store failures escape as errors; the failed run is still
    /// recorded for [`Pipeline::last_run`].
    #[instrument(level = "info", skip_all)]
    pub async fn run_once(&self) -> Result<RunResult, PipelineError> {
        let started_at = Utc::now();
        let Ok(_guard) = self.run_lock.try_lock() else {
            warn!("A run is already in progress; not starting another");
            return Ok(Tally::default().finish(RunStatus::AlreadyRunning, None, started_at));
        };

        let mut tally = Tally::default();
        let outcome = self.process_delta(started_at, &mut tally).await;
        let (result, returned) = match outcome {
            Ok(status) => {
                let result = tally.finish(status, None, started_at);
                (result.clone(), Ok(result))
            }
            Err(e) => {
                error!(error = %e, published = tally.published, "Run aborted");
                (tally.finish(RunStatus::Failed, Some(e.to_string()), started_at), Err(e))
            }
        };

        info!(
            status = ?result.status,
            candidates = result.candidate_count,
            published = result.published_count,
            already_posted = result.already_posted_count,
            failed = result.failed_count,
            "Run finished"
        );
        *self.last_run.write().await = Some(result);
        returned
    }

    async fn process_delta(
        &self,
        started_at: DateTime<Utc>,
        tally: &mut Tally,
    ) -> Result<RunStatus, PipelineError> {
        let cursor = self.store.get_cursor().await?;
        let delta = self.discovery.fetch_delta(cursor.as_deref()).await;
        tally.candidates = delta.len();
        info!(candidates = delta.len(), cursor = ?cursor, "Starting run");

        let total = delta.len();
        for (index, article_ref) in delta.iter().enumerate() {
            if self.stop.is_stopped() {
                info!(remaining = total - index, "Stop requested; leaving the rest for the next run");
                return Ok(RunStatus::Cancelled);
            }
            let posted_at = started_at + ChronoDuration::microseconds((total - index) as i64);
            self.process_one(article_ref, posted_at, tally).await?;
        }
        Ok(RunStatus::Completed)
    }

    #[instrument(level = "info", skip_all, fields(url = %article_ref.url))]
    async fn process_one(
        &self,
        article_ref: &ArticleRef,
        posted_at: DateTime<Utc>,
        tally: &mut Tally,
    ) -> Result<(), PipelineError> {
        let url = article_ref.url.as_str();
        if self.store.is_posted(url).await? {
            debug!("Already posted; skipping");
            tally.already_posted += 1;
            return Ok(());
        }

        self.pacing.wait().await;
        let article = match self.extractor.fetch_and_extract(&self.http, url).await {
            Ok(article) => article,
            Err(e) => {
                warn!(stage = "extract", kind = e.kind(), error = %e, "Skipping article");
                tally.failed += 1;
                return Ok(());
            }
        };

        let primary_ref = match self.primary.publish(&article, None).await {
            Ok(reference) => reference,
            Err(e) => {
                warn!(stage = "sink", sink = self.primary.name(), error = %e, "Skipping article");
                tally.failed += 1;
                return Ok(());
            }
        };

        let secondary_ref = match self.secondary.publish(&article, Some(&primary_ref)).await {
            Ok(reference) => reference,
            Err(e) => {
                warn!(
                    stage = "sink",
                    sink = self.secondary.name(),
                    primary_id = %primary_ref.id,
                    error = %e,
                    "Skipping article; primary post stays published"
                );
                tally.failed += 1;
                return Ok(());
            }
        };

        let outcome = self
            .store
            .record(url, &article.title, &primary_ref, posted_at)
            .await?;
        if outcome == RecordOutcome::AlreadyExists {
            warn!("Record already existed; another run published this article concurrently");
        }
        tally.published += 1;
        info!(
            primary_id = %primary_ref.id,
            secondary_id = %secondary_ref.id,
            "Published article"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExtractorConfig, HttpConfig};
    use crate::error::SinkError;
    use crate::http::RetryPolicy;
    use crate::models::{ExtractedArticle, PublishedRecord, SinkReference};
    use crate::store::MemoryStore;
    use std::collections::HashSet;
    use std::sync::Mutex as StdMutex;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Clone, Default)]
    struct FakeSink {
        label: &'static str,
        fail_for: HashSet<String>,
        calls: Arc<StdMutex<Vec<(String, Option<String>)>>>,
    }

    impl FakeSink {
        fn named(label: &'static str) -> Self {
            Self {
                label,
                ..Self::default()
            }
        }

        fn failing_for(mut self, url: &str) -> Self {
            self.fail_for.insert(url.to_string());
            self
        }

        fn calls(&self) -> Vec<(String, Option<String>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl PublishSink for FakeSink {
        fn name(&self) -> &'static str {
            self.label
        }

        async fn publish(
            &self,
            article: &ExtractedArticle,
            upstream: Option<&SinkReference>,
        ) -> Result<SinkReference, SinkError> {
            self.calls
                .lock()
                .unwrap()
                .push((article.url.clone(), upstream.map(|r| r.id.clone())));
            if self.fail_for.contains(&article.url) {
                return Err(SinkError::RejectedByRemote {
                    sink: self.label,
                    status: 500,
                    message: "boom".into(),
                });
            }
            Ok(SinkReference {
                sink: self.label.to_string(),
                id: format!("{}-{}", self.label, article.slug),
                url: Some(format!("https://{}.example/{}", self.label, article.slug)),
                published_at: None,
            })
        }
    }

    struct DownStore;

    impl WatermarkStore for DownStore {
        async fn is_posted(&self, _url: &str) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn get_cursor(&self) -> Result<Option<String>, StoreError> {
            Ok(None)
        }
        async fn record(
            &self,
            _url: &str,
            _title: &str,
            _primary: &SinkReference,
            _posted_at: DateTime<Utc>,
        ) -> Result<RecordOutcome, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn stats(&self) -> Result<StoreStats, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn recent(&self, _limit: usize) -> Result<Vec<PublishedRecord>, StoreError> {
            Ok(vec![])
        }
        async fn get(&self, _url: &str) -> Result<Option<PublishedRecord>, StoreError> {
            Ok(None)
        }
        async fn delete(&self, _url: &str) -> Result<bool, StoreError> {
            Ok(false)
        }
        async fn ping(&self) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    /// Reads succeed, every write fails.
    struct ReadOnlyStore;

    impl WatermarkStore for ReadOnlyStore {
        async fn is_posted(&self, _url: &str) -> Result<bool, StoreError> {
            Ok(false)
        }
        async fn get_cursor(&self) -> Result<Option<String>, StoreError> {
            Ok(None)
        }
        async fn record(
            &self,
            _url: &str,
            _title: &str,
            _primary: &SinkReference,
            _posted_at: DateTime<Utc>,
        ) -> Result<RecordOutcome, StoreError> {
            Err(StoreError::Unavailable("database is locked".into()))
        }
        async fn stats(&self) -> Result<StoreStats, StoreError> {
            Ok(StoreStats::default())
        }
        async fn recent(&self, _limit: usize) -> Result<Vec<PublishedRecord>, StoreError> {
            Ok(vec![])
        }
        async fn get(&self, _url: &str) -> Result<Option<PublishedRecord>, StoreError> {
            Ok(None)
        }
        async fn delete(&self, _url: &str) -> Result<bool, StoreError> {
            Ok(false)
        }
        async fn ping(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn page(title: Option<&str>) -> String {
        let heading = title
            .map(|t| format!("<h1 class=\"entry-title\">{t}</h1>"))
            .unwrap_or_default();
        format!(
            r#"<html><body>{heading}<div class="ds-content">
               <p>This is a sufficiently long first paragraph for the extractor to accept.</p>
               <p>And a second paragraph so the body comfortably passes the threshold.</p>
               </div></body></html>"#
        )
    }

    /// Serves a sitemap listing `slugs` (newest first) plus one page per slug.
    async fn site(slugs: &[&str], untitled: &[&str]) -> (MockServer, Vec<String>) {
        let server = MockServer::start().await;
        let urls: Vec<String> = slugs
            .iter()
            .map(|s| format!("{}/article/{s}", server.uri()))
            .collect();
        let entries: String = urls
            .iter()
            .map(|u| format!("<url><loc>{u}</loc></url>"))
            .collect();
        Mock::given(method("GET"))
            .and(path("/articles-0.xml"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(format!("<urlset>{entries}</urlset>")),
            )
            .mount(&server)
            .await;
        for slug in slugs {
            let title = (!untitled.contains(slug)).then(|| format!("Story {slug}"));
            Mock::given(method("GET"))
                .and(path(format!("/article/{slug}")))
                .respond_with(ResponseTemplate::new(200).set_body_string(page(title.as_deref())))
                .mount(&server)
                .await;
        }
        (server, urls)
    }

    fn pipeline<W: WatermarkStore>(
        server: &MockServer,
        store: W,
        primary: FakeSink,
        secondary: FakeSink,
    ) -> Pipeline<W, FakeSink, FakeSink> {
        let http = HttpClient::new(&HttpConfig::default(), "test", RetryPolicy::none()).unwrap();
        let discovery = Discovery::new(http.clone(), format!("{}/articles-0.xml", server.uri()));
        let extractor = Extractor::new(&ExtractorConfig::default()).unwrap();
        Pipeline::new(discovery, extractor, http, store, primary, secondary, Pacing::none())
    }

    #[tokio::test]
    async fn test_end_to_end_publishes_delta_and_moves_cursor() {
        let (server, urls) = site(&["a-3", "b-2", "c-1"], &[]).await;
        let store = MemoryStore::new();
        let blog = FakeSink::named("blog");
        let channel = FakeSink::named("channel");
        let p = pipeline(&server, store.clone(), blog.clone(), channel.clone());

        let result = p.run_once().await.unwrap();
        assert_eq!(result.status, RunStatus::Completed);
        assert_eq!(result.candidate_count, 3);
        assert_eq!(result.published_count, 3);
        assert_eq!(p.cursor().await.unwrap().as_deref(), Some(urls[0].as_str()));
        assert!(store.is_posted(&urls[1]).await.unwrap());
        assert!(store.is_posted(&urls[2]).await.unwrap());

        let record = store.get(&urls[0]).await.unwrap().unwrap();
        assert_eq!(record.title, "Story a-3");
        assert_eq!(record.primary_sink_id, "blog-a");

        // the channel saw the blog reference for every article
        let channel_calls = channel.calls();
        assert_eq!(channel_calls.len(), 3);
        assert_eq!(channel_calls[0].1.as_deref(), Some("blog-a"));

        // nothing new on the next run
        let again = p.run_once().await.unwrap();
        assert_eq!(again.candidate_count, 0);
        assert_eq!(again.published_count, 0);
        assert_eq!(blog.calls().len(), 3);
        assert_eq!(p.last_run().await.unwrap().status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn test_secondary_failure_leaves_article_unposted() {
        let (server, urls) = site(&["x-2", "y-1"], &[]).await;
        let store = MemoryStore::new();
        let blog = FakeSink::named("blog");
        let channel = FakeSink::named("channel").failing_for(&urls[0]);
        let p = pipeline(&server, store.clone(), blog.clone(), channel);

        let result = p.run_once().await.unwrap();
        assert_eq!(result.published_count, 1);
        assert_eq!(result.failed_count, 1);
        assert!(!store.is_posted(&urls[0]).await.unwrap());
        assert!(store.is_posted(&urls[1]).await.unwrap());
        assert_eq!(blog.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_primary_failure_skips_secondary() {
        let (server, urls) = site(&["x-1"], &[]).await;
        let blog = FakeSink::named("blog").failing_for(&urls[0]);
        let channel = FakeSink::named("channel");
        let p = pipeline(&server, MemoryStore::new(), blog, channel.clone());

        let result = p.run_once().await.unwrap();
        assert_eq!(result.failed_count, 1);
        assert!(channel.calls().is_empty());
        assert_eq!(p.cursor().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_missing_title_is_skipped_without_abort() {
        let (server, urls) = site(&["untitled-2", "fine-1"], &["untitled-2"]).await;
        let store = MemoryStore::new();
        let blog = FakeSink::named("blog");
        let p = pipeline(&server, store.clone(), blog.clone(), FakeSink::named("channel"));

        let result = p.run_once().await.unwrap();
        assert_eq!(result.status, RunStatus::Completed);
        assert_eq!(result.failed_count, 1);
        assert_eq!(result.published_count, 1);
        assert!(!store.is_posted(&urls[0]).await.unwrap());
        assert_eq!(p.cursor().await.unwrap().as_deref(), Some(urls[1].as_str()));
        assert_eq!(blog.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_store_outage_aborts_run() {
        let (server, _urls) = site(&["a-2", "b-1"], &[]).await;
        let blog = FakeSink::named("blog");
        let p = pipeline(&server, DownStore, blog.clone(), FakeSink::named("channel"));

        let err = p.run_once().await.unwrap_err();
        assert!(matches!(err, PipelineError::StoreUnavailable(_)));
        assert!(blog.calls().is_empty());
        let last = p.last_run().await.unwrap();
        assert_eq!(last.status, RunStatus::Failed);
        assert!(last.error.unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_failed_commit_aborts_before_next_article() {
        let (server, urls) = site(&["a-2", "b-1"], &[]).await;
        let blog = FakeSink::named("blog");
        let channel = FakeSink::named("channel");
        let p = pipeline(&server, ReadOnlyStore, blog.clone(), channel.clone());

        let err = p.run_once().await.unwrap_err();
        assert!(matches!(err, PipelineError::StoreUnavailable(_)));
        // both sinks ran for the first article, nothing ran for the second
        let blog_calls = blog.calls();
        assert_eq!(blog_calls.len(), 1);
        assert_eq!(blog_calls[0].0, urls[0]);
        assert_eq!(channel.calls().len(), 1);

        let last = p.last_run().await.unwrap();
        assert_eq!(last.status, RunStatus::Failed);
        assert_eq!(last.published_count, 0);
        assert!(last.error.unwrap().contains("database is locked"));
    }

    #[tokio::test]
    async fn test_stop_signal_cancels_before_next_article() {
        let (server, _urls) = site(&["a-2", "b-1"], &[]).await;
        let blog = FakeSink::named("blog");
        let p = pipeline(&server, MemoryStore::new(), blog.clone(), FakeSink::named("channel"));
        p.stop_signal().stop();

        let result = p.run_once().await.unwrap();
        assert_eq!(result.status, RunStatus::Cancelled);
        assert_eq!(result.published_count, 0);
        assert!(blog.calls().is_empty());
    }

    #[tokio::test]
    async fn test_aged_out_cursor_reprocesses_window_but_skips_posted() {
        let (server, urls) = site(&["a-3", "b-2", "c-1"], &[]).await;
        let store = MemoryStore::new();
        let earlier = SinkReference {
            sink: "blog".into(),
            id: "old".into(),
            url: None,
            published_at: None,
        };
        let long_ago = Utc::now() - ChronoDuration::days(30);
        store.record(&urls[1], "b", &earlier, long_ago).await.unwrap();
        store
            .record("https://gone.example/article/aged-out-9", "old", &earlier, long_ago + ChronoDuration::seconds(1))
            .await
            .unwrap();

        let blog = FakeSink::named("blog");
        let p = pipeline(&server, store.clone(), blog.clone(), FakeSink::named("channel"));
        let result = p.run_once().await.unwrap();
        assert_eq!(result.candidate_count, 3);
        assert_eq!(result.already_posted_count, 1);
        assert_eq!(result.published_count, 2);
        assert_eq!(blog.calls().len(), 2);
        assert_eq!(p.cursor().await.unwrap().as_deref(), Some(urls[0].as_str()));
    }

    #[tokio::test]
    async fn test_concurrent_run_reports_already_running() {
        let (server, _urls) = site(&["a-1"], &[]).await;
        let p = pipeline(&server, MemoryStore::new(), FakeSink::named("blog"), FakeSink::named("channel"));

        let _held = p.run_lock.try_lock().unwrap();
        let result = p.run_once().await.unwrap();
        assert_eq!(result.status, RunStatus::AlreadyRunning);
        assert_eq!(result.candidate_count, 0);
    }

    #[tokio::test]
    async fn test_sitemap_outage_is_an_empty_run() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let p = pipeline(&server, MemoryStore::new(), FakeSink::named("blog"), FakeSink::named("channel"));

        let result = p.run_once().await.unwrap();
        assert_eq!(result.status, RunStatus::Completed);
        assert_eq!(result.candidate_count, 0);
        assert!(p.pending().await.unwrap().is_empty());
    }

    #[test]
    fn test_pacing_delay_within_bounds() {
        let pacing = Pacing::from(&PacingConfig {
            min_delay_ms: 5,
            max_delay_ms: 10,
        });
        for _ in 0..50 {
            let d = pacing.next_delay();
            assert!(d >= Duration::from_millis(5) && d <= Duration::from_millis(10));
        }
        assert_eq!(Pacing::none().next_delay(), Duration::ZERO);
    }
}
