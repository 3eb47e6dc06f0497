//! # Verifier Core
//!
//! Core data structures for the optimistic-rollup verifier network.
//!
//! This crate provides the building blocks shared by storage, networking and
//! replication:
//! - `SignatureId` - time-ordered 128-bit record identifier
//! - `OptimismSignature` - a verifier's signed verdict on one batch
//! - `LocalSigner` / `SignatureVerifier` - producing and checking attestations
//!
//! ## Attestation chains
//!
//! Every signer's records are linked through `previous_id` into one chain,
//! regardless of which commitment-chain contract each record attests to.
//!
//! ```text
//!   signer A:   a1 ◄── a2 ◄── a3 ◄── a4 (tip)
//!               scc1   scc2   scc1   scc2
//!
//!   signer B:   b1 ◄── b2 (tip)
//!               scc1   scc1
//! ```

pub mod crypto;
pub mod error;
pub mod id;
pub mod signature;
pub mod types;

pub use crypto::*;
pub use error::*;
pub use id::*;
pub use signature::*;
pub use types::*;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crypto::{LocalSigner, SignatureMessage, SignatureVerifier};
    pub use crate::error::{CoreError, Result};
    pub use crate::id::SignatureId;
    pub use crate::signature::{OptimismScc, OptimismSignature, SignaturePointer, Signer};
    pub use crate::types::*;
}
