use thiserror::Error;

/// Fatal pre-flight errors. Raised before any request is sent.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "ScrapingAnt API key is required. Set the {env} environment variable or pass --api-key."
    )]
    MissingApiKey { env: &'static str },

    #[error("failed to build HTTP client: {0}")]
    InvalidClient(#[source] reqwest::Error),
}

/// Transport failures. Every variant is treated as transient by the retry loop.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("upstream returned HTTP {0}")]
    Status(u16),

    #[error("failed to fetch {url} after {attempts} attempts: {last}")]
    Exhausted {
        url: String,
        attempts: u32,
        #[source]
        last: Box<FetchError>,
    },
}

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("listing is missing required field `{0}`")]
    MissingField(&'static str),
}
