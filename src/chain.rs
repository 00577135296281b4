//! Hash chain for append-only run-log entries.

use anyhow::{anyhow, Result};
use sha2::{Digest, Sha256};

/// `prev_hash` of the first entry in a chain.
pub const GENESIS_HASH: [u8; 32] = [0u8; 32];

/// Hashes a log entry payload with the previous chain hash.
pub fn hash_entry(prev_hash: &[u8; 32], payload: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(prev_hash);
    hasher.update(payload);
    hasher.finalize().into()
}

/// Walks `(id, payload, prev_hash, entry_hash)` tuples in append order and checks
/// every link. Returns the number of verified entries.
pub fn verify_chain<'a, I>(entries: I) -> Result<u64>
where
    I: IntoIterator<Item = (i64, &'a [u8], [u8; 32], [u8; 32])>,
{
    let mut expected_prev = GENESIS_HASH;
    let mut count = 0u64;
    for (id, payload, prev_hash, entry_hash) in entries {
        if prev_hash != expected_prev {
            return Err(anyhow!(
                "integrity check failed at id {}: prev_hash={}, expected_prev={}",
                id,
                hex::encode(prev_hash),
                hex::encode(expected_prev)
            ));
        }
        let computed = hash_entry(&expected_prev, payload);
        if computed != entry_hash {
            return Err(anyhow!(
                "integrity check failed at id {}: computed_hash={}, stored_hash={}",
                id,
                hex::encode(computed),
                hex::encode(entry_hash)
            ));
        }
        expected_prev = entry_hash;
        count += 1;
    }
    Ok(count)
}
