//! RocksDB backend
//!
//! ## Key layout
//!
//! - `sig/<id: 16 bytes BE>` - bincode `OptimismSignature`
//! - `sgn/<address>` - bincode `Signer`
//! - `scc/<address>` - bincode `OptimismScc`

use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use serde::de::DeserializeOwned;
use std::path::Path;
use verifier_core::{OptimismScc, OptimismSignature, SignatureId, Signer};

use crate::backend::{Backend, Snapshot};
use crate::error::Result;

const SIGNATURE_PREFIX: &[u8] = b"sig/";
const SIGNER_PREFIX: &[u8] = b"sgn/";
const SCC_PREFIX: &[u8] = b"scc/";

fn key(prefix: &[u8], suffix: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + suffix.len());
    key.extend_from_slice(prefix);
    key.extend_from_slice(suffix);
    key
}

pub struct RocksBackend {
    db: DB,
}

impl RocksBackend {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path.as_ref())?;
        tracing::debug!("Opened signature store at {:?}", path.as_ref());
        Ok(Self { db })
    }

    fn scan<T: DeserializeOwned>(&self, prefix: &[u8]) -> Result<Vec<T>> {
        let mut out = Vec::new();
        for item in self
            .db
            .iterator(IteratorMode::From(prefix, Direction::Forward))
        {
            let (k, v) = item?;
            if !k.starts_with(prefix) {
                break;
            }
            out.push(bincode::deserialize(&v)?);
        }
        Ok(out)
    }
}

impl Backend for RocksBackend {
    fn put_signature(&self, record: &OptimismSignature) -> Result<()> {
        let value = bincode::serialize(record)?;
        self.db
            .put(key(SIGNATURE_PREFIX, &record.id.to_bytes()), value)?;
        Ok(())
    }

    fn delete_signatures(&self, ids: &[SignatureId]) -> Result<()> {
        let mut batch = WriteBatch::default();
        for id in ids {
            batch.delete(key(SIGNATURE_PREFIX, &id.to_bytes()));
        }
        self.db.write(batch)?;
        Ok(())
    }

    fn put_signer(&self, signer: &Signer) -> Result<()> {
        let value = bincode::serialize(signer)?;
        self.db
            .put(key(SIGNER_PREFIX, signer.address.as_bytes()), value)?;
        Ok(())
    }

    fn put_scc(&self, scc: &OptimismScc) -> Result<()> {
        let value = bincode::serialize(scc)?;
        self.db.put(key(SCC_PREFIX, scc.address.as_bytes()), value)?;
        Ok(())
    }

    fn load(&self) -> Result<Snapshot> {
        Ok(Snapshot {
            signatures: self.scan(SIGNATURE_PREFIX)?,
            signers: self.scan(SIGNER_PREFIX)?,
            sccs: self.scan(SCC_PREFIX)?,
        })
    }
}
