use reqwest::{Method, StatusCode};
use thiserror::Error;

/// Errors surfaced by credential resolution
///
/// None of the variants carry the registry secret or an issued token.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("No secret stored for registry credential '{key}'")]
    SecretNotFound { key: String },

    #[error("Secret store error: {0}")]
    SecretStore(String),

    #[error("Token exchange with {realm} failed ({method}): {reason}")]
    TokenExchangeFailed {
        realm: String,
        method: Method,
        reason: String,
    },

    #[error("Invalid {0} for Authorization header")]
    InvalidHeader(&'static str),
}

/// Failure of a single token endpoint round trip
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Token endpoint returned status {status}")]
    Status { status: StatusCode },

    #[error("{0}")]
    Other(String),
}
