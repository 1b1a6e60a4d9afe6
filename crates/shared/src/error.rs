//! Error types shared across the client.

use thiserror::Error;

/// Failure of an RPC-over-HTTP call.
///
/// Business failures (non-200 envelope) and session expiry (HTTP 401) are
/// deliberately distinct variants: expiry additionally forces a local logout,
/// while a business failure only carries the server's message back to the
/// caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The request never produced an HTTP response.
    #[error("network error: {0}")]
    Network(String),
    /// Non-success HTTP status outside the envelope contract (and not 401).
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    /// The server answered with an envelope code other than 200.
    #[error("request failed ({code}): {message}")]
    Business { code: u16, message: String },
    /// HTTP 401: the session is no longer valid. Local identity has been
    /// cleared by the time the caller sees this.
    #[error("not logged in or session expired")]
    SessionExpired,
    /// The response body did not match the expected shape.
    #[error("decode error: {0}")]
    Decode(String),
}

/// Failure while establishing the realtime connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RealtimeError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("token authentication requires a stored credential")]
    MissingCredential,
    #[error("invalid endpoint URL: {0}")]
    InvalidEndpoint(String),
}
