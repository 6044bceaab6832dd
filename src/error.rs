//! Error types for the grain directory.

use crate::types::{GrainId, SiloAddress};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for directory operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the grain directory.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Error {
    /// Configuration errors.
    ///
    /// Raised when the membership table singleton is addressed but no seed
    /// silo is configured, and by config validation.
    #[error("config error: {0}")]
    Config(String),

    /// A request bounced between silos without reaching its owner.
    #[error(
        "silo {local} is not owner of {grain}, cannot forward {operation} to owner {owner} \
         because hop limit is reached (hop count {hop_count})"
    )]
    HopLimitExceeded {
        /// Name of the directory operation.
        operation: String,
        /// The grain being addressed.
        grain: GrainId,
        /// The silo that gave up.
        local: SiloAddress,
        /// The silo believed to be the owner.
        owner: SiloAddress,
        /// Hop count carried by the request.
        hop_count: u32,
    },

    /// The forward target is not a functional member right now.
    #[error(
        "directory at {local} is not stable to perform the lookup for {grain} \
         (it maps to {owner}, which is not a functional silo), retry later"
    )]
    UnstableTarget {
        /// The grain being looked up.
        grain: GrainId,
        /// The silo that refused to forward.
        local: SiloAddress,
        /// The non-functional owner.
        owner: SiloAddress,
    },

    /// Network communication errors.
    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    /// Error from a remote directory that has no local counterpart.
    #[error("remote error: {0}")]
    RemoteError(String),

    /// Generic internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the caller may retry once membership settles.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::UnstableTarget { .. } | Error::Network(_))
    }
}

/// Network communication errors raised by directory channels.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkError {
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// No route to the target silo.
    #[error("silo unreachable: {0}")]
    Unreachable(SiloAddress),
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Network(NetworkError::Serialization(e.to_string()))
    }
}
