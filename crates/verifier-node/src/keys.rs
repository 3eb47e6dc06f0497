//! On-disk key material
//!
//! ```text
//!   <data_dir>/keys/signer.key   attestation key (hex)
//!   <data_dir>/keys/node.key     libp2p identity seed (hex)
//! ```

use std::path::{Path, PathBuf};
use verifier_core::LocalSigner;

pub fn keys_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("keys")
}

/// Read a 32-byte hex secret, creating a random one if the file is missing
pub fn load_or_generate_secret(path: &Path) -> anyhow::Result<[u8; 32]> {
    if path.exists() {
        return read_secret(path);
    }
    let secret = rand::random::<[u8; 32]>();
    write_secret(path, &secret)?;
    tracing::info!("Generated key at {:?}", path);
    Ok(secret)
}

pub fn read_secret(path: &Path) -> anyhow::Result<[u8; 32]> {
    let content = std::fs::read_to_string(path)?;
    let bytes = hex::decode(content.trim())?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| anyhow::anyhow!("key at {:?} is {} bytes, expected 32", path, b.len()))
}

pub fn write_secret(path: &Path, secret: &[u8; 32]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, hex::encode(secret))?;
    Ok(())
}

/// The node's attestation key
pub fn load_signer(data_dir: &Path) -> anyhow::Result<LocalSigner> {
    let secret = load_or_generate_secret(&keys_dir(data_dir).join("signer.key"))?;
    Ok(LocalSigner::from_bytes(&secret))
}

/// Seed for the node's libp2p identity
pub fn load_identity_seed(data_dir: &Path) -> anyhow::Result<[u8; 32]> {
    load_or_generate_secret(&keys_dir(data_dir).join("node.key"))
}
