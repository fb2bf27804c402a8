//! Idempotency fingerprints for generation submissions.
//!
//! A client retry (double-click, network replay) must reuse the
//! in-flight generation job instead of double-billing. The caller
//! supplies a nonce; the fingerprint binds it to the track so the same
//! nonce cannot collide across tracks.

use sha2::{Digest, Sha256};

use crate::types::DbId;

/// Compute the stored idempotency fingerprint for a submission:
/// the SHA-256 hex digest of `"{track_id}:{nonce}"`.
pub fn fingerprint(track_id: DbId, nonce: &str) -> String {
    sha256_hex(format!("{track_id}:{nonce}").as_bytes())
}

/// Compute the SHA-256 hex digest of arbitrary bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex_encode(hasher.finalize())
}

/// Encode bytes as a lowercase hex string.
fn hex_encode(bytes: impl AsRef<[u8]>) -> String {
    bytes
        .as_ref()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}
