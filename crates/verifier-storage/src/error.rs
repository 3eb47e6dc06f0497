//! Error types for the attestation log

use thiserror::Error;
use verifier_core::{Address, SignatureId};

pub type Result<T> = std::result::Result<T, LogError>;

fn show(id: &Option<SignatureId>) -> String {
    id.map(|id| id.to_string()).unwrap_or_else(|| "<none>".to_string())
}

#[derive(Error, Debug, Clone)]
pub enum LogError {
    // === Chain Integrity ===
    /// Explicit previous id does not match the signer's current tip
    #[error("previous id is overtaking for signer {signer}: tip {}, got {}", show(.expected), show(.got))]
    Overtaking {
        signer: Address,
        expected: Option<SignatureId>,
        got: Option<SignatureId>,
    },

    /// Supplied id already belongs to a different record
    #[error("signature id {0} is already in use")]
    DuplicateId(SignatureId),

    #[error("not found: {0}")]
    NotFound(String),

    // === Persistence ===
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// In-memory indices disagree with each other
    #[error("log index corrupted: {0}")]
    Corrupted(String),
}

impl LogError {
    pub fn is_overtaking(&self) -> bool {
        matches!(self, Self::Overtaking { .. })
    }

    /// Overtaking and missing records resolve themselves on a later sync
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Overtaking { .. } | Self::NotFound(_))
    }
}

impl From<rocksdb::Error> for LogError {
    fn from(e: rocksdb::Error) -> Self {
        Self::Backend(e.to_string())
    }
}

impl From<bincode::Error> for LogError {
    fn from(e: bincode::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
