//! # Verifier Storage
//!
//! The attestation log: a per-signer hash-linked record store with upsert
//! and conflict detection, plus causal replay over it.
//!
//! ## Storage Layout
//!
//! - `log` - in-memory arena and indices, write-through to a backend
//! - `backend` - persistence seam (`MemoryBackend` for tests and ephemeral nodes)
//! - `rocks` - RocksDB backend
//! - `replay` - `SequentialFinder` over the log or over a received page

pub mod backend;
pub mod error;
pub mod log;
pub mod replay;
pub mod rocks;

pub use backend::{Backend, MemoryBackend, Snapshot};
pub use error::{LogError, Result};
pub use log::{Link, NewSignature, SignatureLog, SignatureQuery};
pub use replay::{CausalBatch, ReplayCursor, ReplaySource, SequentialFinder};
pub use rocks::RocksBackend;
