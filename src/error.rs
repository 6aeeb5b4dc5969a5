//! Error types for tempoiq-client.

use thiserror::Error;

/// Error type for tempoiq-client operations.
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Failed to encode or decode JSON.
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The configured host does not form a valid URL.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// The API answered with a non-success status.
    #[error("TempoIQ API returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, usually an error description.
        body: String,
    },

    /// Failed to interpret part of a response.
    #[error("Failed to parse response: {message}")]
    Parse {
        /// Description of what failed to parse.
        message: String,
    },

    /// A single-stream lookup matched nothing.
    #[error("No stream matched the selector")]
    NoResult,

    /// A single-stream lookup matched more than one stream.
    #[error("Selector matched {count} streams, expected exactly one")]
    TooManyResults {
        /// Number of streams that matched.
        count: usize,
    },

    /// The page has no continuation token, so it can neither be evicted nor
    /// fetched again.
    #[error("Page {page} cannot be refetched")]
    NotCollectible {
        /// Page number within the cursor.
        page: usize,
    },

    /// A read response carried no stream header block.
    #[error("Response is missing the stream header block")]
    MissingStreams,

    /// Invalid client or query configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for tempoiq-client operations.
pub type Result<T> = std::result::Result<T, Error>;
