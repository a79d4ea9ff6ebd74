//! Typed domain errors.
//!
//! Every engine operation returns one of these unchanged to the caller; the
//! engine performs no automatic retries. `SourceNotPublic` is deliberately
//! uninformative — the public download gate must not reveal whether a source
//! exists, is pending, failed, or is merely uncited.

use thiserror::Error;
use uuid::Uuid;

use crate::domain::CardStatus;
use crate::storage::StoreError;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Missing source, card, version, or staged object
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Illegal status change, or an edit attempted outside draft/review
    #[error("card is {status}, which does not permit {action}")]
    InvalidStateTransition { status: CardStatus, action: String },

    /// Publish blocked: a cited source is not verified (named, since the
    /// caller is an authenticated editor)
    #[error("source {source_id} is not verified")]
    SourceNotVerified { source_id: Uuid },

    /// Download blocked. One message for every underlying reason.
    #[error("source is not available for download")]
    SourceNotPublic,

    /// Object exceeds the size cap
    #[error("object of {actual} bytes exceeds limit of {limit}")]
    FileTooLarge { actual: u64, limit: u64 },

    /// MIME type outside the fixed allow-list
    #[error("media type not allowed: {0}")]
    InvalidMimeType(String),

    /// Optimistic concurrency check failed: the card changed under the caller
    #[error("version conflict: expected {expected}, found {found}")]
    Conflict { expected: u64, found: u64 },

    /// Reference bounds or other input constraint violated
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Document store failure (conditional writes surface as `Conflict`
    /// where the engine maps them; everything else passes through here)
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Object store, signer, or fetch failure
    #[error(transparent)]
    Dependency(#[from] anyhow::Error),
}

impl EngineError {
    pub(crate) fn not_found(kind: &'static str, id: impl ToString) -> Self {
        EngineError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub(crate) fn bad_transition(status: CardStatus, action: impl Into<String>) -> Self {
        EngineError::InvalidStateTransition {
            status,
            action: action.into(),
        }
    }
}
