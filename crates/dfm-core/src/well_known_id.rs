//! Deterministic node identifiers derived from a string.
//!
//! `well_known_id(s)` lets a caller reference a node before it is constructed: hashing
//! the same string twice always yields the same id, which is the only sanctioned way to
//! produce colliding node ids (see the `duplicate node id` invariant in `ir.rs`).

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Derive a deterministic node id from an arbitrary string.
///
/// The digest is truncated to the 16 bytes a UUID needs; this is a key-derivation use,
/// not a collision-resistance-critical one, so truncated SHA-256 is adequate.
#[must_use]
pub fn well_known_id(s: &str) -> Uuid {
    let digest = Sha256::digest(s.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes)
}
