//! Ed25519 signing of checksummed index sets.
//!
//! The cache stores each authorization set next to a signature over the
//! set's XOR checksum concatenated with the cache key. Binding the checksum
//! to the key prevents substituting one key's (validly signed) value for
//! another's. Verification is fail-closed: a missing signature or any
//! cryptographic failure reads as "unverified", never as an error.

use std::collections::BTreeSet;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;

use crate::{checksum::xor_checksum, index::VertexIndex};

/// Signs and verifies cache entries.
///
/// One signer instance wraps one Ed25519 key pair. Key rotation is a
/// deployment concern: entries signed under a retired key simply fail
/// verification and are recomputed as cache misses.
pub struct SetSigner {
    signing: SigningKey,
}

impl SetSigner {
    /// Generates a fresh key pair from OS entropy.
    pub fn generate() -> Self {
        Self { signing: SigningKey::generate(&mut OsRng) }
    }

    /// Wraps existing key material.
    pub fn from_signing_key(signing: SigningKey) -> Self {
        Self { signing }
    }

    /// The public half, for export to verifying-only deployments.
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing.verifying_key()
    }

    /// Signs the checksum of `ids` bound to `cache_key`.
    pub fn sign(&self, ids: &BTreeSet<VertexIndex>, cache_key: &str) -> Vec<u8> {
        let message = signable_message(xor_checksum(ids), cache_key);
        self.signing.sign(&message).to_bytes().to_vec()
    }

    /// Verifies a stored signature against `ids` and `cache_key`.
    ///
    /// Returns false on a missing signature, malformed signature bytes, or
    /// signature mismatch.
    pub fn verify(
        &self,
        ids: &BTreeSet<VertexIndex>,
        cache_key: &str,
        signature: Option<&[u8]>,
    ) -> bool {
        let Some(bytes) = signature else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(bytes) else {
            return false;
        };
        let message = signable_message(xor_checksum(ids), cache_key);
        self.signing.verifying_key().verify(&message, &signature).is_ok()
    }
}

/// 8-byte big-endian checksum followed by the UTF-8 cache key.
fn signable_message(checksum: i64, cache_key: &str) -> Vec<u8> {
    let mut message = Vec::with_capacity(8 + cache_key.len());
    message.extend_from_slice(&checksum.to_be_bytes());
    message.extend_from_slice(cache_key.as_bytes());
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[i64]) -> BTreeSet<VertexIndex> {
        values.iter().copied().map(VertexIndex::new).collect()
    }

    #[test]
    fn sign_then_verify_succeeds() {
        let signer = SetSigner::generate();
        let value = ids(&[1, 5, 9]);
        let signature = signer.sign(&value, "USER:alice");
        assert!(signer.verify(&value, "USER:alice", Some(&signature)));
    }

    #[test]
    fn missing_signature_fails_closed() {
        let signer = SetSigner::generate();
        assert!(!signer.verify(&ids(&[1]), "USER:alice", None));
    }

    #[test]
    fn flipped_bit_fails() {
        let signer = SetSigner::generate();
        let value = ids(&[1, 5, 9]);
        let mut signature = signer.sign(&value, "USER:alice");
        signature[0] ^= 0x01;
        assert!(!signer.verify(&value, "USER:alice", Some(&signature)));
    }

    #[test]
    fn different_key_binding_fails() {
        let signer = SetSigner::generate();
        let value = ids(&[1, 5, 9]);
        let signature = signer.sign(&value, "USER:alice");
        assert!(!signer.verify(&value, "USER:bob", Some(&signature)));
    }

    #[test]
    fn mutated_set_fails() {
        let signer = SetSigner::generate();
        let value = ids(&[1, 5, 9]);
        let signature = signer.sign(&value, "USER:alice");
        assert!(!signer.verify(&ids(&[1, 5]), "USER:alice", Some(&signature)));
    }

    #[test]
    fn rotated_key_fails_verification() {
        let old = SetSigner::generate();
        let new = SetSigner::generate();
        let value = ids(&[1, 5, 9]);
        let signature = old.sign(&value, "USER:alice");
        assert!(!new.verify(&value, "USER:alice", Some(&signature)));
    }

    #[test]
    fn truncated_signature_fails_closed() {
        let signer = SetSigner::generate();
        let value = ids(&[1]);
        let signature = signer.sign(&value, "USER:alice");
        assert!(!signer.verify(&value, "USER:alice", Some(&signature[..16])));
    }
}
