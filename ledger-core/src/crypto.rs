//! Cryptographic operations for the ledger
//!
//! This module provides:
//! - SHA-256 hashing for blocks
//! - The `Signer` capability used by replicas to vote
//! - A simulated secret-based signer and an Ed25519 key pair behind the same trait

use crate::types::{Hash, Payload};
use crate::{Error, Result};
use ed25519_dalek::{Signature as DalekSignature, Signer as _, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

/// Hash arbitrary bytes using SHA-256
pub fn hash_bytes(data: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    Hash::from_bytes(hasher.finalize().into())
}

/// Hash a block's contents
///
/// `SHA256(bincode(payload) || transaction_id || previous_hash)`. Nothing
/// time-dependent enters the input, so every replica recomputes the same value.
pub fn hash_block(payload: &Payload, transaction_id: &Uuid, previous_hash: &Hash) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(payload.canonical_bytes());
    hasher.update(transaction_id.as_bytes());
    hasher.update(previous_hash.as_bytes());
    Hash::from_bytes(hasher.finalize().into())
}

/// Capability to sign a block digest
pub trait Signer: Send + Sync + fmt::Debug {
    /// Produce a signature token over the digest
    fn sign(&self, digest: &Hash) -> String;

    /// Check a token produced by `sign`
    fn verify(&self, digest: &Hash, token: &str) -> bool;
}

/// Simulated signer: one-way hash of an opaque secret and the digest
#[derive(Clone)]
pub struct SecretSigner {
    secret: String,
}

impl SecretSigner {
    /// Create from a secret
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Default secret for a named node
    pub fn for_node(name: &str) -> Self {
        Self::new(format!("key_{name}_secret"))
    }
}

impl fmt::Debug for SecretSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretSigner").finish_non_exhaustive()
    }
}

impl Signer for SecretSigner {
    fn sign(&self, digest: &Hash) -> String {
        let material = format!("{}:{}", self.secret, digest.to_hex());
        hash_bytes(material.as_bytes()).to_hex()
    }

    fn verify(&self, digest: &Hash, token: &str) -> bool {
        self.sign(digest) == token
    }
}

/// Ed25519 key pair for signing
#[derive(Debug)]
pub struct KeyPair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        Self::from_seed(&rand::random::<[u8; 32]>())
    }

    /// Create from seed (32 bytes) - deterministic generation
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        let verifying_key = signing_key.verifying_key();

        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Get public key bytes
    pub fn public_key(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// Verify a hex-encoded signature over a digest
    pub fn verify_digest(&self, digest: &Hash, token: &str) -> Result<()> {
        let bytes = hex::decode(token)
            .map_err(|e| Error::SignatureError(format!("Malformed signature: {}", e)))?;
        let bytes: [u8; 64] = bytes
            .try_into()
            .map_err(|_| Error::SignatureError("Signature must be 64 bytes".to_string()))?;
        let signature = DalekSignature::from_bytes(&bytes);
        self.verifying_key
            .verify(digest.as_bytes(), &signature)
            .map_err(|e| Error::SignatureError(format!("Verification failed: {}", e)))
    }
}

impl Signer for KeyPair {
    fn sign(&self, digest: &Hash) -> String {
        hex::encode(self.signing_key.sign(digest.as_bytes()).to_bytes())
    }

    fn verify(&self, digest: &Hash, token: &str) -> bool {
        self.verify_digest(digest, token).is_ok()
    }
}
