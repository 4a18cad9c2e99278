//! Error types for the client framework.
//!
//! This module defines the top-level [`ClientError`] returned by connection
//! and send operations, and the [`HandlerError`] used by event handler
//! implementations.

use thiserror::Error;

/// Convenience type alias for Results using [`ClientError`].
pub type Result<T, E = ClientError> = std::result::Result<T, E>;

/// Top-level client errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// I/O error during connect, registration, or raw transmission.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A caller supplied an unusable argument (empty outbound line,
    /// malformed IP byte slice, unknown encoding label).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// `connect` was called while a session is live.
    #[error("already connected to an IRC server; disconnect first")]
    AlreadyConnected,

    /// The server rejected our nick during registration and automatic
    /// nick changes are disabled. Carries the offending server line.
    #[error("nick already in use: {0}")]
    NickAlreadyInUse(String),

    /// The server answered registration with a non-recoverable 4xx/5xx.
    /// Carries the raw server line.
    #[error("could not log into the IRC server: {0}")]
    Irc(String),

    /// `reconnect` was called without a prior successful `connect`.
    #[error("never connected to an IRC server previously")]
    NotConnected,
}

/// Errors surfaced by event handler implementations.
///
/// The reader loop logs these and keeps running; a faulty handler never
/// tears down the connection.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HandlerError {
    /// I/O failure inside a handler.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Client operation failure inside a handler.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Anything else the handler wants to report.
    #[error("handler error: {0}")]
    Internal(String),
}

/// Result type for event handler callbacks.
pub type HandlerResult = std::result::Result<(), HandlerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ClientError::NickAlreadyInUse("433 * Foo :Nickname is already in use.".into());
        assert_eq!(
            format!("{}", err),
            "nick already in use: 433 * Foo :Nickname is already in use."
        );

        let err = ClientError::InvalidArgument("empty line".into());
        assert_eq!(format!("{}", err), "invalid argument: empty line");
    }

    #[test]
    fn test_io_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: ClientError = io_err.into();
        assert!(matches!(err, ClientError::Io(_)));
    }

    #[test]
    fn test_handler_error_from_client_error() {
        let err: HandlerError = ClientError::NotConnected.into();
        assert_eq!(
            format!("{}", err),
            "never connected to an IRC server previously"
        );
    }
}
