//! Attestation records and registry entities

use serde::{Deserialize, Serialize};

use crate::crypto::SignatureMessage;
use crate::id::SignatureId;
use crate::types::{Address, H256};

/// A verifier's signed verdict on one state-commitment batch.
///
/// `previous_id` links to the signer's chronologically preceding record
/// across all commitment chains, so each signer's records form a single
/// chain ending at its tip.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimismSignature {
    pub id: SignatureId,
    pub previous_id: Option<SignatureId>,
    pub signer: Address,
    /// State-commitment-chain contract the batch belongs to
    pub scc: Address,
    pub batch_index: u64,
    pub batch_root: H256,
    pub batch_size: u64,
    pub prev_total_elements: u64,
    #[serde(with = "serde_bytes")]
    pub extra_data: Vec<u8>,
    pub approved: bool,
    #[serde(with = "serde_bytes")]
    pub signature: Vec<u8>,
}

impl OptimismSignature {
    pub fn tuple(&self) -> TupleKey {
        TupleKey {
            signer: self.signer,
            scc: self.scc,
            batch_index: self.batch_index,
        }
    }

    pub fn pointer(&self) -> SignaturePointer {
        SignaturePointer {
            id: self.id,
            previous_id: self.previous_id,
        }
    }

    /// The content the signature bytes were produced over
    pub fn message(&self, chain_id: u64) -> SignatureMessage {
        SignatureMessage {
            chain_id,
            scc: self.scc,
            batch_index: self.batch_index,
            batch_root: self.batch_root,
            approved: self.approved,
        }
    }
}

/// Uniqueness key: one current record per signer, contract and batch
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TupleKey {
    pub signer: Address,
    pub scc: Address,
    pub batch_index: u64,
}

/// `(id, previous_id)` pair exchanged while searching for a common ancestor
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignaturePointer {
    pub id: SignatureId,
    pub previous_id: Option<SignatureId>,
}

/// Registered signer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signer {
    pub address: Address,
}

/// State-commitment-chain contract tracked by the verifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimismScc {
    pub address: Address,
    /// Lowest batch index not yet verified
    pub next_index: u64,
}

impl OptimismScc {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            next_index: 0,
        }
    }
}
