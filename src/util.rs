//! Small helpers shared across reconciliation components: content hashing
//! and atomic file writes. Grounded on the same primitives the teacher's
//! integrity monitor uses, generalized to async I/O for the daemon's
//! tokio runtime.

use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::Result;

pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().iter().map(|b| format!("{b:02x}")).collect()
}

/// Write to a sibling `.tmp` file then rename over the destination, so a
/// reader never observes a partially-written manifest.
pub async fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&tmp, data).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
