use thiserror::Error;

/// Top-level error type for the `deckathlon-api` crate.
///
/// Only failures that prevent a response from arriving at all are errors
/// here. Non-2xx statuses are ordinary [`ApiResponse`](crate::ApiResponse)
/// values -- `deckathlon-core` decides what they mean.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Data ────────────────────────────────────────────────────────
    /// Request payload could not be encoded.
    #[error("Cannot encode request payload: {0}")]
    Encoding(#[from] serde_json::Error),
}
