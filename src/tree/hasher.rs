//! Hash computation for element payloads using BLAKE3

use crate::types::Hash;
use blake3::Hasher;
use std::collections::BTreeMap;

/// Compute content hash for file bytes
pub fn compute_content_hash(content: &[u8]) -> Hash {
    let mut hasher = Hasher::new();
    hasher.update(content);
    *hasher.finalize().as_bytes()
}

/// Compute a digest over an element payload
///
/// digest = hash(kind || content_hash? || props)
///
/// Properties are hashed in key order, so equal payloads always produce
/// equal digests.
pub fn compute_payload_digest(
    kind: &str,
    content_hash: Option<&Hash>,
    props: &BTreeMap<String, String>,
) -> Hash {
    let mut hasher = Hasher::new();

    hasher.update(kind.as_bytes());
    if let Some(content_hash) = content_hash {
        hasher.update(content_hash);
    }

    hasher.update(&(props.len() as u64).to_be_bytes());
    for (key, value) in props.iter() {
        hasher.update(&(key.len() as u64).to_be_bytes());
        hasher.update(key.as_bytes());
        hasher.update(&(value.len() as u64).to_be_bytes());
        hasher.update(value.as_bytes());
    }

    *hasher.finalize().as_bytes()
}
