use affsync_core::FeedSource;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("rate limited by {feed} (retry after {retry_after_secs}s)")]
    RateLimited {
        feed: FeedSource,
        retry_after_secs: u64,
    },

    #[error("{feed} rejected the request as malformed: {detail}")]
    MalformedRequest { feed: FeedSource, detail: String },

    #[error("{feed} rejected credentials (HTTP {status})")]
    Auth { feed: FeedSource, status: u16 },

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("{feed} API error: {message}")]
    Api { feed: FeedSource, message: String },

    #[error("{feed} connector is missing {var}")]
    MissingCredentials { feed: FeedSource, var: &'static str },

    #[error("offset {offset} is beyond the maximum allowed offset {max_offset}")]
    OffsetOutOfRange { offset: u32, max_offset: u32 },

    #[error("invalid URL \"{url}\": {reason}")]
    InvalidUrl { url: String, reason: String },
}
