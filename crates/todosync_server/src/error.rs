//! Error types for the sync server.

use thiserror::Error;
use todosync_codec::CodecError;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the sync server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// A frame arrived out of order for its session.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The peer never registered.
    #[error("peer {0} is not registered")]
    NotRegistered(std::net::SocketAddr),

    /// A pushed changeset or an outgoing snapshot violated the chunk format.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// A payload does not fit a single datagram.
    #[error("payload of {0} bytes does not fit a datagram")]
    PayloadTooLarge(usize),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Returns true if the peer caused this error.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::InvalidRequest(_) | ServerError::NotRegistered(_) | ServerError::Codec(_)
        )
    }

    /// Returns true if the server itself failed.
    pub fn is_server_error(&self) -> bool {
        matches!(self, ServerError::PayloadTooLarge(_) | ServerError::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(ServerError::InvalidRequest("bad".into()).is_client_error());
        assert!(ServerError::PayloadTooLarge(70_000).is_server_error());
        assert!(!ServerError::InvalidRequest("bad".into()).is_server_error());
    }

    #[test]
    fn error_display() {
        let err = ServerError::NotRegistered("127.0.0.1:4000".parse().unwrap());
        assert!(err.to_string().contains("127.0.0.1:4000"));
    }
}
