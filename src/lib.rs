//! cardea - evidence record integrity and lifecycle engine
//!
//! The engine behind a platform that publishes evidence cards: falsifiable
//! claims about organizations, each backed by verifiable source documents.
//!
//! # Architecture
//!
//! Two fail-closed gates couple the source and card lifecycles:
//! - A card cannot publish until every cited source is verified
//! - A source cannot be publicly downloaded until it is verified AND cited
//!   by a published card
//!
//! Verification binds a source's exact bytes to their provenance: the bytes
//! are hashed, moved to a content-addressed location, and attested by a
//! signed manifest that third parties can independently re-verify.
//!
//! Cards are append-only version logs: every mutation writes a full new
//! snapshot, guarded by an optimistic version check, and publishing fans out
//! denormalized index rows in a single atomic transaction.
//!
//! # Modules
//!
//! - `domain`: pure data structures (Source, EvidenceCard, manifest)
//! - `core`: SourceVerifier, CardLifecycle, PublicationGate, errors
//! - `storage`: document/object store collaborators and key derivation
//! - `adapters`: manifest signer and bounded snapshot fetcher
//! - `cli`: operator command-line interface

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod storage;

// Re-export main types at crate root for convenience
// (crate:: disambiguates our core module from the built-in core crate)
pub use crate::core::{CardLifecycle, EngineError, PublicationGate, SourceVerifier, VerifierLimits};
pub use domain::{
    CardInput, CardPatch, CardStatus, EvidenceCard, EvidenceStrength, MediaType, Source,
    SourceInput, VerificationManifest, VerificationStatus,
};
pub use storage::{DocumentStore, LocalObjectStore, ObjectStore, SqliteDocumentStore};
