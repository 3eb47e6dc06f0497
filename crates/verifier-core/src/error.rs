//! Error types for verifier core operations

use crate::types::Address;
use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Failure to parse a textual signature id
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdParseError {
    #[error("signature id must be 26 characters, got {0}")]
    InvalidLength(usize),

    #[error("invalid base32 character {0:?}")]
    InvalidChar(char),

    #[error("signature id overflows 128 bits")]
    Overflow,
}

/// Errors that can occur in core operations
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    // === Encoding ===
    #[error("Invalid signature id: {0}")]
    InvalidId(#[from] IdParseError),

    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    // === Cryptographic Errors ===
    /// Signature bytes are malformed or do not verify
    #[error("Invalid signature from signer {0}")]
    InvalidSignature(Address),

    /// No verification key is known for the signer
    #[error("Unknown signer: {0}")]
    UnknownSigner(Address),

    /// Key material could not be decoded
    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

impl CoreError {
    pub fn code(&self) -> u32 {
        match self {
            Self::InvalidId(_) | Self::InvalidHex(_) => 1001,
            Self::InvalidSignature(_) => 1005,
            Self::UnknownSigner(_) => 1006,
            Self::InvalidKey(_) => 1007,
        }
    }

    /// An unknown signer may become known after the next stake refresh
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::UnknownSigner(_))
    }
}
