//! Error handling for schoolhub

use schoolhub_auth::AuthError;
use schoolhub_postgrest::PostgrestError;
use std::fmt;
use thiserror::Error;

/// Unified error type for the access policy layer
#[derive(Error, Debug)]
pub enum Error {
    /// The service URL or public key is missing or still a template value
    #[error("Service is not configured (missing: {})", .missing.join(", "))]
    NotConfigured { missing: Vec<String> },

    /// An operation needed an active user and there was none
    #[error("No active user")]
    NotSignedIn,

    /// Identity provider errors
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Row store errors, passed through unmodified
    #[error(transparent)]
    Store(#[from] PostgrestError),

    /// Network or HTTP related errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Rejected before any call was made
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The current role may not perform the operation
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Timed out waiting for {0}")]
    Timeout(String),
}

impl Error {
    /// Create a new invalid input error
    pub fn invalid_input<T: fmt::Display>(msg: T) -> Self {
        Error::InvalidInput(msg.to_string())
    }

    /// Create a new authorization error
    pub fn unauthorized<T: fmt::Display>(msg: T) -> Self {
        Error::Unauthorized(msg.to_string())
    }

    /// Create a new timeout error
    pub fn timeout<T: fmt::Display>(what: T) -> Self {
        Error::Timeout(what.to_string())
    }
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_configured_lists_missing_variables() {
        let err = Error::NotConfigured {
            missing: vec!["SUPABASE_URL".into(), "SUPABASE_ANON_KEY".into()],
        };
        assert_eq!(
            err.to_string(),
            "Service is not configured (missing: SUPABASE_URL, SUPABASE_ANON_KEY)"
        );
    }

    #[test]
    fn store_errors_keep_their_message() {
        let inner = PostgrestError::InvalidParameters("bad filter".into());
        let expected = inner.to_string();
        let err: Error = inner.into();
        assert_eq!(err.to_string(), expected);
        assert!(matches!(err, Error::Store(_)));
    }

    #[tokio::test]
    async fn transport_errors_convert_to_http() {
        let inner = reqwest::Client::new()
            .get("not a url")
            .send()
            .await
            .unwrap_err();
        let err: Error = inner.into();
        assert!(matches!(err, Error::Http(_)));
        assert!(err.to_string().starts_with("HTTP error: "));
    }
}
