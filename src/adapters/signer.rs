//! Manifest signing collaborator.
//!
//! The signer is a stateless oracle: given the canonical manifest bytes it
//! returns a signature under a fixed algorithm and key id, and separately
//! exposes the public key so third parties can re-verify manifests without
//! talking to this service.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use ed25519_dalek::{Signer as _, SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};

/// The one signature algorithm this engine emits
pub const SIGNING_ALGORITHM: &str = "Ed25519";

/// The manifest signing collaborator contract
#[async_trait]
pub trait ManifestSigner: Send + Sync {
    /// Identifier of the active signing key
    fn key_id(&self) -> &str;

    /// Algorithm identifier recorded in manifests
    fn algorithm(&self) -> &str {
        SIGNING_ALGORITHM
    }

    /// Sign raw payload bytes
    async fn sign(&self, payload: &[u8]) -> Result<Vec<u8>>;

    /// Public key bytes for independent verification
    async fn public_key(&self) -> Result<Vec<u8>>;
}

/// In-process Ed25519 signer
pub struct Ed25519Signer {
    key: SigningKey,
    key_id: String,
}

impl Ed25519Signer {
    pub fn new(key: SigningKey) -> Self {
        let key_id = derive_key_id(&key.verifying_key());
        Self { key, key_id }
    }

    /// Generate a fresh signing key
    pub fn generate() -> Self {
        Self::new(SigningKey::generate(&mut rand::rngs::OsRng))
    }

    /// Load the key from a 32-byte seed file, generating and persisting one
    /// on first use
    pub fn load_or_generate(path: &Path) -> Result<Self> {
        if path.exists() {
            let bytes = std::fs::read(path)
                .with_context(|| format!("Failed to read signing key: {}", path.display()))?;
            let seed: [u8; 32] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| anyhow::anyhow!("Signing key must be exactly 32 bytes"))?;
            return Ok(Self::new(SigningKey::from_bytes(&seed)));
        }

        let signer = Self::generate();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create key directory: {}", parent.display()))?;
        }
        std::fs::write(path, signer.key.to_bytes())
            .with_context(|| format!("Failed to write signing key: {}", path.display()))?;
        Ok(signer)
    }

    /// The verifying half of the active key
    pub fn verifying_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }
}

/// Key id: algorithm tag plus the first 8 bytes of SHA-256(public key)
fn derive_key_id(key: &VerifyingKey) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    let digest = hasher.finalize();
    format!("ed25519:{}", hex::encode(&digest[..8]))
}

#[async_trait]
impl ManifestSigner for Ed25519Signer {
    fn key_id(&self) -> &str {
        &self.key_id
    }

    async fn sign(&self, payload: &[u8]) -> Result<Vec<u8>> {
        Ok(self.key.sign(payload).to_bytes().to_vec())
    }

    async fn public_key(&self) -> Result<Vec<u8>> {
        Ok(self.key.verifying_key().as_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signature, Verifier};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_signature_verifies_against_public_key() {
        let signer = Ed25519Signer::generate();
        let payload = b"manifest bytes";

        let sig_bytes = signer.sign(payload).await.unwrap();
        let sig = Signature::from_slice(&sig_bytes).unwrap();

        let pk_bytes = signer.public_key().await.unwrap();
        let pk = VerifyingKey::from_bytes(&pk_bytes.try_into().unwrap()).unwrap();
        assert!(pk.verify(payload, &sig).is_ok());
        assert!(pk.verify(b"tampered bytes", &sig).is_err());
    }

    #[tokio::test]
    async fn test_signing_is_deterministic_for_identical_bytes() {
        let signer = Ed25519Signer::generate();
        let a = signer.sign(b"same").await.unwrap();
        let b = signer.sign(b"same").await.unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_id_format() {
        let signer = Ed25519Signer::generate();
        let id = signer.key_id();
        assert!(id.starts_with("ed25519:"));
        assert_eq!(id.len(), "ed25519:".len() + 16);
    }

    #[test]
    fn test_load_or_generate_round_trip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("signing.key");

        let first = Ed25519Signer::load_or_generate(&path).unwrap();
        let second = Ed25519Signer::load_or_generate(&path).unwrap();
        assert_eq!(first.key_id(), second.key_id());
    }
}
