//! Domain types for the evidence engine.
//!
//! This module contains the pure data structures:
//! - Source: a verifiable document backing a claim
//! - EvidenceCard: the versioned, status-governed claim record
//! - VerificationManifest: the signed binding of bytes to provenance
//!
//! Nothing in here knows about storage keys or I/O; the mapping from domain
//! records to index rows lives in `storage::keys`.

pub mod card;
pub mod manifest;
pub mod source;

// Re-export commonly used types
pub use card::{
    CardInput, CardPatch, CardStatus, CounterpointKind, EvidenceCard, EvidenceStrength,
    ScoreSignals, MAX_ENTITY_REFS, MAX_SOURCE_REFS,
};
pub use manifest::VerificationManifest;
pub use source::{DocumentKind, MediaType, Source, SourceInput, VerificationStatus};
