//! Error types for the crawl engine.
//!
//! Drops are not errors: a dropped request, response or item is a normal,
//! reason-carrying outcome reported through events. The types here cover the
//! two remaining classes: transport failures, which are offered to the
//! exception middleware chain, and programming errors, which abort the run.

/// Errors that abort a crawl or reject its configuration.
#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    /// The run or one of its components was configured with invalid values.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A request was built from a URI that cannot be parsed.
    #[error("Invalid URI '{uri}': {source}")]
    InvalidUrl {
        uri: String,
        #[source]
        source: url::ParseError,
    },

    /// A request names a parse callback the spider does not provide.
    #[error("Spider '{spider}' has no parse callback named '{callback}'")]
    UnknownCallback { spider: String, callback: String },

    /// A transport failure escaped the exception chain where one was not expected.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Serializing statistics or item data failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Network or protocol level failures reported by a [`Transport`](crate::transport::Transport).
///
/// HTTP error statuses are not transport errors; they arrive as responses.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Transport error: {0}")]
    Other(String),
}

#[cfg(feature = "reqwest-transport")]
impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else if err.is_timeout() {
            TransportError::Timeout(err.to_string())
        } else {
            TransportError::Other(err.to_string())
        }
    }
}
