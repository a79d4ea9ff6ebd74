//! The signed verification manifest.
//!
//! The manifest binds a source's exact bytes (via hash) to its provenance
//! and storage location. It is signed as an opaque byte sequence: the
//! serialization produced by [`VerificationManifest::canonical_bytes`] is
//! what gets signed and what gets persisted, so a third party can fetch the
//! manifest object and verify the signature against it byte for byte.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The exact payload covered by the manifest signature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationManifest {
    /// Source this manifest attests
    pub source_id: Uuid,

    /// Content-addressed key of the verified bytes
    pub storage_key: String,

    /// SHA-256 of the verified bytes (hex)
    pub sha256: String,

    /// Size of the verified bytes
    pub byte_length: u64,

    /// Media type of the verified bytes
    pub media_type: String,

    /// When the document was retrieved from its origin
    pub retrieved_at: DateTime<Utc>,

    /// Publisher of the original document
    pub publisher: String,

    /// Origin URL the document came from
    pub origin_url: String,

    /// When verification completed
    pub verified_at: DateTime<Utc>,

    /// Signature algorithm identifier
    pub algorithm: String,

    /// Identifier of the signing key
    pub signing_key_id: String,
}

impl VerificationManifest {
    /// Serialize to the canonical byte sequence that is signed and persisted.
    ///
    /// Serde serializes struct fields in declaration order, so the same
    /// manifest value always yields the same bytes.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).context("Failed to serialize verification manifest")
    }

    /// Parse a manifest back from its persisted bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).context("Failed to parse verification manifest")
    }
}
