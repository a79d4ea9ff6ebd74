//! Adapter interfaces for external collaborators.
//!
//! Adapters wrap the services the engine depends on but does not own: the
//! manifest signing oracle and outbound HTTP fetches. The storage
//! collaborators live in `storage` alongside their key-mapping rules.

pub mod fetcher;
pub mod signer;

pub use fetcher::{FetchedDocument, SnapshotFetcher};
pub use signer::{Ed25519Signer, ManifestSigner, SIGNING_ALGORITHM};
