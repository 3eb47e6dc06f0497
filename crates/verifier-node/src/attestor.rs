//! Local attestation production
//!
//! Signs a verified batch with the node's key and appends it to the local
//! signer's chain. Re-attesting the same batch replaces the earlier verdict
//! in place without moving the record in the chain.

use std::sync::Arc;
use verifier_core::{Address, LocalSigner, OptimismSignature, SignatureMessage, H256};
use verifier_storage::{Link, NewSignature, SignatureLog};

/// A batch verdict to be signed
#[derive(Clone, Debug)]
pub struct BatchVerdict {
    pub scc: Address,
    pub batch_index: u64,
    pub batch_root: H256,
    pub batch_size: u64,
    pub prev_total_elements: u64,
    pub extra_data: Vec<u8>,
    pub approved: bool,
}

pub struct Attestor {
    log: Arc<SignatureLog>,
    signer: Arc<LocalSigner>,
    chain_id: u64,
}

impl Attestor {
    pub fn new(log: Arc<SignatureLog>, signer: Arc<LocalSigner>, chain_id: u64) -> Self {
        Self {
            log,
            signer,
            chain_id,
        }
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Sign `verdict` and save it; the scc's next index moves past the batch
    pub fn attest(&self, verdict: BatchVerdict) -> anyhow::Result<OptimismSignature> {
        let message = SignatureMessage {
            chain_id: self.chain_id,
            scc: verdict.scc,
            batch_index: verdict.batch_index,
            batch_root: verdict.batch_root,
            approved: verdict.approved,
        };
        let signature = self.signer.sign(&message);

        let record = self.log.save(NewSignature {
            id: None,
            link: Link::Auto,
            signer: self.signer.address(),
            scc: verdict.scc,
            batch_index: verdict.batch_index,
            batch_root: verdict.batch_root,
            batch_size: verdict.batch_size,
            prev_total_elements: verdict.prev_total_elements,
            extra_data: verdict.extra_data,
            approved: verdict.approved,
            signature,
        })?;

        let next = self
            .log
            .find_or_create_scc(verdict.scc)?
            .next_index
            .max(verdict.batch_index + 1);
        self.log.save_next_index(verdict.scc, next)?;

        tracing::info!(
            "Attested batch {} of {} ({}): {}",
            record.batch_index,
            record.scc,
            if record.approved { "approved" } else { "rejected" },
            record.id
        );
        Ok(record)
    }
}
