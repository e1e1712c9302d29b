use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("authorization error: {0}")]
    Unauthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{context} failed with HTTP status {status}")]
    Status { context: String, status: u16 },

    /// A 2xx response whose body did not match the expected JSON shape.
    #[error("{context} returned a malformed response body: {source}")]
    Decode {
        context: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error(transparent)]
    Url(#[from] url::ParseError),
}
