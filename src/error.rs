//! Error types for replica nodes

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Numeric error codes understood by every node and service on the substrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Timeout,
    NodeNotFound,
    NotSupported,
    TemporarilyUnavailable,
    MalformedRequest,
    Crash,
    Abort,
    KeyDoesNotExist,
    KeyAlreadyExists,
    PreconditionFailed,
    TxnConflict,
    /// A code this crate does not know by name
    Other(u32),
}

impl ErrorCode {
    pub fn code(self) -> u32 {
        match self {
            ErrorCode::Timeout => 0,
            ErrorCode::NodeNotFound => 1,
            ErrorCode::NotSupported => 10,
            ErrorCode::TemporarilyUnavailable => 11,
            ErrorCode::MalformedRequest => 12,
            ErrorCode::Crash => 13,
            ErrorCode::Abort => 14,
            ErrorCode::KeyDoesNotExist => 20,
            ErrorCode::KeyAlreadyExists => 21,
            ErrorCode::PreconditionFailed => 22,
            ErrorCode::TxnConflict => 30,
            ErrorCode::Other(code) => code,
        }
    }

    /// Whether the failed operation definitely did not take effect.
    pub fn is_definite(self) -> bool {
        !matches!(
            self,
            ErrorCode::Timeout | ErrorCode::Crash | ErrorCode::Other(_)
        )
    }
}

impl From<u32> for ErrorCode {
    fn from(code: u32) -> Self {
        match code {
            0 => ErrorCode::Timeout,
            1 => ErrorCode::NodeNotFound,
            10 => ErrorCode::NotSupported,
            11 => ErrorCode::TemporarilyUnavailable,
            12 => ErrorCode::MalformedRequest,
            13 => ErrorCode::Crash,
            14 => ErrorCode::Abort,
            20 => ErrorCode::KeyDoesNotExist,
            21 => ErrorCode::KeyAlreadyExists,
            22 => ErrorCode::PreconditionFailed,
            30 => ErrorCode::TxnConflict,
            other => ErrorCode::Other(other),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Main error type for replica operations
#[derive(Error, Debug)]
pub enum ReplicaError {
    /// Outbound message could not be handed to the transport
    #[error("Transport error: {message} (peer: {peer})")]
    Transport { message: String, peer: String },

    /// A service answered with an error body
    #[error("Service error {code}: {text}")]
    Service { code: ErrorCode, text: String },

    /// No answer within the allowed time
    #[error("Timed out after {after:?} waiting for {operation}")]
    Timeout {
        operation: String,
        after: Duration,
    },

    /// Operation not served by this node
    #[error("Unsupported operation: {operation}")]
    Unsupported { operation: String },

    /// Message body could not be understood
    #[error("Malformed message: {message}")]
    Malformed { message: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Join handle errors
    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ReplicaError {
    /// Create a transport error
    pub fn transport(message: impl Into<String>, peer: impl fmt::Display) -> Self {
        Self::Transport {
            message: message.into(),
            peer: peer.to_string(),
        }
    }

    /// Create a service error from a wire code
    pub fn service(code: impl Into<ErrorCode>, text: impl Into<String>) -> Self {
        Self::Service {
            code: code.into(),
            text: text.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after,
        }
    }

    /// Create an unsupported-operation error
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    /// Create a malformed-message error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// The code to put on an `error` reply for this failure.
    pub fn code(&self) -> ErrorCode {
        match self {
            ReplicaError::Service { code, .. } => *code,
            ReplicaError::Timeout { .. } => ErrorCode::Timeout,
            ReplicaError::Unsupported { .. } => ErrorCode::NotSupported,
            ReplicaError::Malformed { .. } | ReplicaError::Serialization(_) => {
                ErrorCode::MalformedRequest
            }
            ReplicaError::Transport { .. } => ErrorCode::TemporarilyUnavailable,
            ReplicaError::Config { .. } | ReplicaError::Io(_) | ReplicaError::Join(_) => {
                ErrorCode::Crash
            }
        }
    }

    /// Recasts a failure that happened after the request already took effect.
    ///
    /// A definite code tells the client the operation did not happen, so those
    /// become [`ErrorCode::Crash`]; indefinite failures pass through.
    pub fn after_local_apply(self) -> Self {
        if self.code().is_definite() {
            ReplicaError::service(
                ErrorCode::Crash,
                format!("applied locally but not mirrored: {self}"),
            )
        } else {
            self
        }
    }

    /// True for a store's "key does not exist" answer.
    pub fn is_key_not_found(&self) -> bool {
        matches!(
            self,
            ReplicaError::Service {
                code: ErrorCode::KeyDoesNotExist,
                ..
            }
        )
    }
}
