//! Persistence seam under the attestation log
//!
//! The log keeps its indices in memory and writes every mutation through to
//! a [`Backend`] before applying it. On open the backend hands back a
//! [`Snapshot`] from which the indices are rebuilt.

use verifier_core::{OptimismScc, OptimismSignature, SignatureId, Signer};

use crate::error::Result;

/// Everything a backend has persisted
#[derive(Debug, Default)]
pub struct Snapshot {
    pub signatures: Vec<OptimismSignature>,
    pub signers: Vec<Signer>,
    pub sccs: Vec<OptimismScc>,
}

pub trait Backend: Send + Sync {
    /// Insert or overwrite a record keyed by its id
    fn put_signature(&self, record: &OptimismSignature) -> Result<()>;

    /// Remove records atomically
    fn delete_signatures(&self, ids: &[SignatureId]) -> Result<()>;

    fn put_signer(&self, signer: &Signer) -> Result<()>;

    fn put_scc(&self, scc: &OptimismScc) -> Result<()>;

    fn load(&self) -> Result<Snapshot>;
}

/// Volatile backend: nothing survives the process
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryBackend;

impl Backend for MemoryBackend {
    fn put_signature(&self, _record: &OptimismSignature) -> Result<()> {
        Ok(())
    }

    fn delete_signatures(&self, _ids: &[SignatureId]) -> Result<()> {
        Ok(())
    }

    fn put_signer(&self, _signer: &Signer) -> Result<()> {
        Ok(())
    }

    fn put_scc(&self, _scc: &OptimismScc) -> Result<()> {
        Ok(())
    }

    fn load(&self) -> Result<Snapshot> {
        Ok(Snapshot::default())
    }
}
