//! Network error types

use libp2p::PeerId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, NetworkError>;

#[derive(Error, Debug)]
pub enum NetworkError {
    // === Streams ===
    #[error("Failed to open stream to {peer}: {reason}")]
    OpenStream { peer: PeerId, reason: String },

    #[error("Stream closed by peer")]
    StreamClosed,

    #[error("Stream timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // === Messages ===
    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error("Unexpected message: expected {expected}, got {got}")]
    Unexpected {
        expected: &'static str,
        got: &'static str,
    },

    // === Swarm ===
    #[error("Publish error: {0}")]
    Publish(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Channel error: {0}")]
    Channel(String),
}

impl NetworkError {
    /// Transport failures are retried on the next sync interval; malformed
    /// traffic is not
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Malformed(_) | Self::Unexpected { .. } | Self::Config(_))
    }
}

impl From<bincode::Error> for NetworkError {
    fn from(e: bincode::Error) -> Self {
        Self::Malformed(e.to_string())
    }
}
