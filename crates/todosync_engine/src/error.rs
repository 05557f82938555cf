//! Error types for the sync engine.

use thiserror::Error;
use todosync_codec::CodecError;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during a sync run.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Socket error or unreachable server.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
    },

    /// The server never acknowledged the registration.
    #[error("server declined registration of client {client_id}")]
    RegistrationDeclined {
        /// Client identifier that was sent.
        client_id: i32,
    },

    /// A received payload violated the chunk format.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// A frame or payload that cannot be handled.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The task store rejected an operation.
    #[error("storage error: {0}")]
    Storage(String),

    /// A run is already in progress.
    #[error("a sync run is already in progress")]
    AlreadyRunning,

    /// A conflict prompt was dropped without an answer.
    #[error("conflict decision abandoned")]
    DecisionAbandoned,

    /// The worker task failed to complete.
    #[error("sync worker failed: {0}")]
    Worker(String),
}

impl SyncError {
    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Returns true if the run was aborted by a peer or decode failure
    /// rather than by the local side.
    pub fn is_remote_failure(&self) -> bool {
        matches!(
            self,
            SyncError::Transport { .. }
                | SyncError::RegistrationDeclined { .. }
                | SyncError::Codec(_)
                | SyncError::Protocol(_)
        )
    }

    /// Text shown to the user when a run aborts.
    pub fn user_message(&self) -> String {
        match self {
            SyncError::Transport { message } => message.clone(),
            SyncError::RegistrationDeclined { .. } => "Cannot register to server".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(e: std::io::Error) -> Self {
        SyncError::transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_become_transport_failures() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: SyncError = io.into();
        assert!(matches!(err, SyncError::Transport { .. }));
        assert_eq!(err.user_message(), "refused");
        assert!(err.is_remote_failure());
    }

    #[test]
    fn registration_declined_has_its_own_message() {
        let err = SyncError::RegistrationDeclined { client_id: 7 };
        assert_eq!(err.user_message(), "Cannot register to server");
        assert!(err.to_string().contains('7'));
    }

    #[test]
    fn codec_errors_keep_detail() {
        let err: SyncError = CodecError::incomplete("revision").into();
        assert!(err.user_message().contains("missing revision"));
        assert!(!SyncError::AlreadyRunning.is_remote_failure());
    }
}
