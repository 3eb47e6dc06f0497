//! Attestation signing and verification
//!
//! A verifier signs the BLAKE3 digest of `(chain_id, scc, batch_index,
//! batch_root, approved)` with its Ed25519 key. The signer address is derived
//! from the verifying key, see [`Address::from_public_key`].

use ed25519_dalek::{Signature, Signer as _, SigningKey};
use std::collections::HashMap;
use std::sync::Arc;

pub use ed25519_dalek::VerifyingKey;

use crate::error::{CoreError, Result};
use crate::signature::OptimismSignature;
use crate::types::{Address, H256};

const DOMAIN_TAG: &[u8] = b"optimism-verifier/attestation/v1";

/// Content covered by an attestation signature
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SignatureMessage {
    pub chain_id: u64,
    pub scc: Address,
    pub batch_index: u64,
    pub batch_root: H256,
    pub approved: bool,
}

impl SignatureMessage {
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(DOMAIN_TAG);
        hasher.update(&self.chain_id.to_be_bytes());
        hasher.update(self.scc.as_bytes());
        hasher.update(&self.batch_index.to_be_bytes());
        hasher.update(self.batch_root.as_bytes());
        hasher.update(&[self.approved as u8]);
        *hasher.finalize().as_bytes()
    }
}

/// The node's own attestation key
pub struct LocalSigner {
    key: SigningKey,
    address: Address,
}

impl LocalSigner {
    pub fn generate() -> Self {
        Self::from_bytes(&rand::random::<[u8; 32]>())
    }

    pub fn from_bytes(secret: &[u8; 32]) -> Self {
        let key = SigningKey::from_bytes(secret);
        let address = Address::from_public_key(key.verifying_key().as_bytes());
        Self { key, address }
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.key.to_bytes()
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }

    pub fn sign(&self, message: &SignatureMessage) -> Vec<u8> {
        self.key.sign(&message.digest()).to_bytes().to_vec()
    }
}

impl std::fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Parse a hex-encoded Ed25519 verifying key
pub fn verifying_key_from_hex(s: &str) -> Result<VerifyingKey> {
    let bytes = H256::from_hex(s)?;
    VerifyingKey::from_bytes(bytes.as_bytes()).map_err(|e| CoreError::InvalidKey(e.to_string()))
}

// ============================================================================
// Verification
// ============================================================================

/// Maps a signer address to its verification key
pub trait KeyResolver: Send + Sync {
    fn resolve(&self, signer: &Address) -> Option<VerifyingKey>;
}

impl KeyResolver for HashMap<Address, VerifyingKey> {
    fn resolve(&self, signer: &Address) -> Option<VerifyingKey> {
        self.get(signer).copied()
    }
}

impl<T: KeyResolver + ?Sized> KeyResolver for Arc<T> {
    fn resolve(&self, signer: &Address) -> Option<VerifyingKey> {
        (**self).resolve(signer)
    }
}

/// Decides whether a received record's signature bytes are authentic
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, record: &OptimismSignature) -> Result<()>;
}

impl<T: SignatureVerifier + ?Sized> SignatureVerifier for Arc<T> {
    fn verify(&self, record: &OptimismSignature) -> Result<()> {
        (**self).verify(record)
    }
}

/// Ed25519 verification against keys from a [`KeyResolver`]
pub struct Ed25519Verifier<R> {
    chain_id: u64,
    resolver: R,
}

impl<R: KeyResolver> Ed25519Verifier<R> {
    pub fn new(chain_id: u64, resolver: R) -> Self {
        Self { chain_id, resolver }
    }
}

impl<R: KeyResolver> SignatureVerifier for Ed25519Verifier<R> {
    fn verify(&self, record: &OptimismSignature) -> Result<()> {
        let key = self
            .resolver
            .resolve(&record.signer)
            .ok_or(CoreError::UnknownSigner(record.signer))?;
        if Address::from_public_key(key.as_bytes()) != record.signer {
            return Err(CoreError::InvalidKey(format!(
                "key does not belong to {}",
                record.signer
            )));
        }
        let signature = Signature::from_slice(&record.signature)
            .map_err(|_| CoreError::InvalidSignature(record.signer))?;
        key.verify_strict(&record.message(self.chain_id).digest(), &signature)
            .map_err(|_| CoreError::InvalidSignature(record.signer))
    }
}

/// Accepts every record; for deployments that trust their peers' stores
#[derive(Clone, Copy, Debug, Default)]
pub struct AcceptAll;

impl SignatureVerifier for AcceptAll {
    fn verify(&self, _record: &OptimismSignature) -> Result<()> {
        Ok(())
    }
}
