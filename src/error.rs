//! Error types
//!
//! The crate exposes a single top-level [`Error`] with per-area error enums
//! that convert into it.

use std::fmt;
use std::io;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// I/O failure (bind, accept, serve)
    Io(io::Error),
    /// Authentication failed
    Auth(AuthError),
    /// Credential store failure
    Store(StoreError),
    /// The hub control loop is no longer running
    HubClosed,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Auth(e) => write!(f, "Authentication error: {}", e),
            Error::Store(e) => write!(f, "Credential store error: {}", e),
            Error::HubClosed => write!(f, "Hub is closed"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Auth(e) => Some(e),
            Error::Store(e) => Some(e),
            Error::HubClosed => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<AuthError> for Error {
    fn from(e: AuthError) -> Self {
        Error::Auth(e)
    }
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        Error::Store(e)
    }
}

/// Reasons a subscribe request is rejected
#[derive(Debug)]
pub enum AuthError {
    /// No token header, or an empty one
    MissingToken,
    /// Token not present in the credential store
    InvalidToken,
    /// The credential store could not be queried
    StoreUnavailable(StoreError),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::MissingToken => write!(f, "missing auth token"),
            AuthError::InvalidToken => write!(f, "invalid auth token"),
            AuthError::StoreUnavailable(e) => write!(f, "credential store unavailable: {}", e),
        }
    }
}

impl std::error::Error for AuthError {}

/// Credential store errors
#[derive(Debug)]
pub enum StoreError {
    /// Connection or socket failure
    Io(io::Error),
    /// Malformed reply from the server
    Protocol(String),
    /// Error reply sent by the server
    Server(String),
    /// Timed out connecting to the store
    Timeout,
    /// The connection pool has been shut down
    PoolClosed,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "I/O error: {}", e),
            StoreError::Protocol(msg) => write!(f, "protocol error: {}", msg),
            StoreError::Server(msg) => write!(f, "server error: {}", msg),
            StoreError::Timeout => write!(f, "connect timed out"),
            StoreError::PoolClosed => write!(f, "connection pool closed"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<io::Error> for StoreError {
    fn from(e: io::Error) -> Self {
        StoreError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err: Error = AuthError::MissingToken.into();
        assert_eq!(err.to_string(), "Authentication error: missing auth token");

        let err: Error = StoreError::Server("NOAUTH".into()).into();
        assert_eq!(err.to_string(), "Credential store error: server error: NOAUTH");

        assert_eq!(Error::HubClosed.to_string(), "Hub is closed");
    }

    #[test]
    fn test_store_unavailable_wraps_source() {
        let err = AuthError::StoreUnavailable(StoreError::Timeout);
        assert_eq!(
            err.to_string(),
            "credential store unavailable: connect timed out"
        );
    }
}
