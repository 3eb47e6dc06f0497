//! Replication errors

use thiserror::Error;
use verifier_network::NetworkError;
use verifier_storage::LogError;

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    #[error("log error: {0}")]
    Log(#[from] LogError),

    /// Peer sent a well-formed message that is out of place in the session
    #[error("protocol violation: expected {expected}, got {got}")]
    Unexpected {
        expected: &'static str,
        got: &'static str,
    },

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("stake source error: {0}")]
    StakeSource(String),
}

impl SyncError {
    pub fn unexpected(expected: &'static str, got: &'static str) -> Self {
        Self::Unexpected { expected, got }
    }

    /// Whether the next announcement or interval should simply retry
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Network(e) => e.is_recoverable(),
            Self::Log(e) => e.is_recoverable(),
            Self::StakeSource(_) => true,
            Self::Unexpected { .. } | Self::Protocol(_) => false,
        }
    }
}
