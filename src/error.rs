//! Error taxonomy for the syndication pipeline.
//!
//! Each stage has its own error type so the orchestrator can decide, per
//! failure class, whether to skip one article or abort the whole run:
//!
//! | Type | Scope |
//! |------|-------|
//! | [`DiscoveryError`] | non-fatal, the run sees an empty delta |
//! | [`ExtractionError`] | one article is skipped |
//! | [`SinkError`] | one article is skipped, later sinks are not called |
//! | [`StoreError`] | aborts the run ([`PipelineError::StoreUnavailable`]) |

use thiserror::Error;

/// Failure while loading or compiling configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid selector `{selector}`: {reason}")]
    Selector { selector: String, reason: String },

    #[error("invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// A single HTTP exchange failed.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
}

impl TransportError {
    /// Connection could not be established; the remote never saw the request.
    pub fn is_connect(&self) -> bool {
        matches!(self, TransportError::Request { source, .. } if source.is_connect())
    }

    /// Worth another attempt for an idempotent request.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Client(_) => false,
            TransportError::Request { source, .. } => source.is_connect() || source.is_timeout(),
            TransportError::Status { status, .. } => *status == 429 || *status >= 500,
        }
    }
}

/// The sitemap could not be fetched or parsed.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("malformed sitemap at byte {position}: {source}")]
    Malformed {
        position: u64,
        #[source]
        source: quick_xml::Error,
    },
}

/// Per-article extraction failure.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("no title selector matched")]
    MissingTitle,

    #[error("no body container yielded more than {min_chars} characters")]
    MissingBody { min_chars: usize },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ExtractionError {
    /// Short stage label used in structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ExtractionError::MissingTitle => "missing_title",
            ExtractionError::MissingBody { .. } => "missing_body",
            ExtractionError::Transport(_) => "transport",
        }
    }
}

/// A publish sink could not deliver an article.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("{sink}: {source}")]
    Transport {
        sink: &'static str,
        #[source]
        source: TransportError,
    },

    #[error("{sink} rejected the request (HTTP {status}): {message}")]
    RejectedByRemote {
        sink: &'static str,
        status: u16,
        message: String,
    },

    #[error("{sink} is not configured: {reason}")]
    NotConfigured { sink: &'static str, reason: String },

    #[error("{sink} returned an unreadable response: {reason}")]
    InvalidResponse { sink: &'static str, reason: String },
}

/// The watermark store failed.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("watermark store unavailable: {0}")]
    Unavailable(String),

    #[error("stored record for {url} is invalid: {reason}")]
    InvalidRecord { url: String, reason: String },
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

/// Failures that escape a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("aborting run: {0}")]
    StoreUnavailable(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transience() {
        let throttled = TransportError::Status {
            url: "https://example.com".into(),
            status: 429,
        };
        let missing = TransportError::Status {
            url: "https://example.com".into(),
            status: 404,
        };
        let broken = TransportError::Status {
            url: "https://example.com".into(),
            status: 503,
        };
        assert!(throttled.is_transient());
        assert!(broken.is_transient());
        assert!(!missing.is_transient());
        assert!(!missing.is_connect());
    }

    #[test]
    fn test_extraction_kind_labels() {
        assert_eq!(ExtractionError::MissingTitle.kind(), "missing_title");
        assert_eq!(
            ExtractionError::MissingBody { min_chars: 100 }.kind(),
            "missing_body"
        );
    }

    #[test]
    fn test_store_error_wraps_into_pipeline_error() {
        let err: PipelineError = StoreError::Unavailable("connection refused".into()).into();
        assert!(err.to_string().contains("connection refused"));
    }
}
