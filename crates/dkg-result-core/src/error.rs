//! Error types for DKG result agreement

use crate::MemberIndex;
use thiserror::Error;

/// Result type alias for agreement operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while agreeing on a DKG result
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid session configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Promise was already fulfilled or failed
    #[error("promise already completed")]
    AlreadyCompleted,

    /// Promise failed without an error value
    #[error("error cannot be nil")]
    NilError,

    /// Vote sender is not a member of the group
    #[error("Unknown sender: member {0} is not in the group")]
    UnknownSender(MemberIndex),

    /// Vote carries a public key different from the one on file
    #[error("Public key mismatch for member {0}")]
    KeyMismatch(MemberIndex),

    /// Invalid signature
    #[error("Invalid signature")]
    InvalidSignature,

    /// Collection window elapsed before any result reached the threshold
    #[error("No quorum: required {threshold} supporters, leading result has {leading}")]
    NoQuorum { threshold: usize, leading: usize },

    /// Operation not allowed in the current session phase
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Cryptographic operation failed
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Network/relay error
    #[error("Relay error: {0}")]
    Relay(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<prost::DecodeError> for Error {
    fn from(e: prost::DecodeError) -> Self {
        Error::Deserialization(e.to_string())
    }
}
