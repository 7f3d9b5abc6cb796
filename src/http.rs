//! Shared HTTP transport with timeouts and an explicit retry policy.
//!
//! Every outbound call in the pipeline goes through [`HttpClient`], so the
//! timeout and retry rules are applied in one place:
//!
//! - connect and overall request timeouts from [`HttpConfig`]
//! - a browser-like `User-Agent` and `Accept` headers
//! - [`RetryPolicy`]: exponential backoff with jitter
//!
//! # Retry Strategy
//!
//! ```text
//! delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..=jitter)
//! ```
//!
//! GET requests are retried on connect errors, timeouts, HTTP 429 and 5xx.
//! POST requests are only retried when the connection could not be
//! established, so a create call is never sent twice by this layer.

use crate::config::{HttpConfig, RetryConfig};
use crate::error::TransportError;
use rand::{Rng, rng};
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};

/// Backoff settings applied at the transport boundary.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: usize,
    /// Delay before the second attempt; doubles afterwards.
    pub base_delay: Duration,
    /// Cap on the exponential part of the delay.
    pub max_delay: Duration,
    /// Upper bound of the random delay added to each backoff.
    pub jitter: Duration,
}

impl RetryPolicy {
    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    /// Backoff before retry number `attempt` (1-based), without jitter.
    pub fn backoff(&self, attempt: usize) -> Duration {
        let shift = attempt.saturating_sub(1).min(31) as u32;
        self.base_delay
            .saturating_mul(1u32 << shift)
            .min(self.max_delay)
    }

    fn delay_for(&self, attempt: usize) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rng().random_range(0..=jitter_ms)
        };
        self.backoff(attempt) + Duration::from_millis(jitter)
    }

    /// Run `op` until it succeeds, `should_retry` declines, or attempts run out.
    pub async fn run<T, E, F, Fut>(
        &self,
        what: &str,
        should_retry: impl Fn(&E) -> bool,
        mut op: F,
    ) -> Result<T, E>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    attempt += 1;
                    let elapsed_ms_total = total_t0.elapsed().as_millis();

                    if attempt >= self.max_attempts || !should_retry(&e) {
                        if attempt > 1 {
                            error!(
                                what,
                                attempt,
                                max = self.max_attempts,
                                elapsed_ms_total,
                                error = %e,
                                "Request exhausted retries"
                            );
                        }
                        return Err(e);
                    }

                    let delay = self.delay_for(attempt);
                    warn!(
                        what,
                        attempt,
                        max = self.max_attempts,
                        elapsed_ms_total,
                        ?delay,
                        error = %e,
                        "Request attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: Duration::from_millis(config.jitter_ms),
        }
    }
}

/// Raw answer to a POST: sinks interpret status and body themselves.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: StatusCode,
    pub body: String,
}

/// Thin wrapper over a configured [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    retry: RetryPolicy,
}

impl HttpClient {
    pub fn new(
        http: &HttpConfig,
        user_agent: &str,
        retry: RetryPolicy,
    ) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

        let client = Client::builder()
            .user_agent(user_agent)
            .default_headers(headers)
            .connect_timeout(http.connect_timeout())
            .timeout(http.request_timeout())
            .build()
            .map_err(TransportError::Client)?;

        Ok(Self { client, retry })
    }

    /// GET `url` and return the body as text. Non-2xx is an error.
    #[instrument(level = "debug", skip(self))]
    pub async fn get_text(&self, url: &str) -> Result<String, TransportError> {
        self.retry
            .run("GET", TransportError::is_transient, || async move {
                let t0 = Instant::now();
                let response = self
                    .client
                    .get(url)
                    .send()
                    .await
                    .map_err(|source| TransportError::Request {
                        url: url.to_string(),
                        source,
                    })?;
                let status = response.status();
                if !status.is_success() {
                    return Err(TransportError::Status {
                        url: url.to_string(),
                        status: status.as_u16(),
                    });
                }
                let body = response
                    .text()
                    .await
                    .map_err(|source| TransportError::Request {
                        url: url.to_string(),
                        source,
                    })?;
                debug!(
                    bytes = body.len(),
                    elapsed_ms = t0.elapsed().as_millis(),
                    "Fetched"
                );
                Ok(body)
            })
            .await
    }

    /// POST a JSON body. Any HTTP status is returned to the caller.
    #[instrument(level = "debug", skip(self, body, bearer))]
    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
        bearer: Option<&str>,
    ) -> Result<HttpReply, TransportError> {
        self.retry
            .run("POST", TransportError::is_connect, || async move {
                let mut request = self.client.post(url).json(body);
                if let Some(token) = bearer {
                    request = request.bearer_auth(token);
                }
                let response = request
                    .send()
                    .await
                    .map_err(|source| TransportError::Request {
                        url: url.to_string(),
                        source,
                    })?;
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .map_err(|source| TransportError::Request {
                        url: url.to_string(),
                        source,
                    })?;
                Ok(HttpReply { status, body })
            })
            .await
    }

    /// GET returning status and body without treating non-2xx as an error.
    #[instrument(level = "debug", skip(self, bearer))]
    pub async fn get_reply(
        &self,
        url: &str,
        bearer: Option<&str>,
    ) -> Result<HttpReply, TransportError> {
        self.retry
            .run("GET", TransportError::is_transient, || async move {
                let mut request = self.client.get(url);
                if let Some(token) = bearer {
                    request = request.bearer_auth(token);
                }
                let response = request
                    .send()
                    .await
                    .map_err(|source| TransportError::Request {
                        url: url.to_string(),
                        source,
                    })?;
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .map_err(|source| TransportError::Request {
                        url: url.to_string(),
                        source,
                    })?;
                Ok(HttpReply { status, body })
            })
            .await
    }
}
