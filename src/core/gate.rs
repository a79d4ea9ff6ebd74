//! Publication gates: the fail-closed policy layer.
//!
//! Two predicates couple the source and card lifecycles:
//!
//! - `can_publish`: a card may publish only when every cited source is
//!   verified. The caller is an authenticated editor, so failures name the
//!   offending source.
//! - `can_download`: a source may be downloaded only when it is verified AND
//!   cited by a published card. The caller is the anonymous public, so every
//!   failure collapses into one undifferentiated error.

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::{EvidenceCard, Source, VerificationStatus};
use crate::storage::{keys, DocumentStore, QueryOptions};

use super::errors::EngineError;

/// Cross-cutting publish/download policy over the shared document store
#[derive(Clone)]
pub struct PublicationGate {
    store: Arc<dyn DocumentStore>,
}

impl PublicationGate {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Every cited source must be verified. Fails on the first offender,
    /// naming it; a missing record counts as unverified.
    pub async fn can_publish(&self, card: &EvidenceCard) -> Result<(), EngineError> {
        for source_id in &card.source_ids {
            let item = self
                .store
                .get(&keys::source_pk(*source_id), keys::SOURCE_META_SK)
                .await?;

            let verified = match item {
                Some(item) => {
                    let source: Source = keys::from_item(&item)?;
                    source.verification == VerificationStatus::Verified
                }
                None => false,
            };

            if !verified {
                return Err(EngineError::SourceNotVerified {
                    source_id: *source_id,
                });
            }
        }
        Ok(())
    }

    /// Verified AND cited by a published card; any failure is the single
    /// `SourceNotPublic` outcome.
    pub async fn can_download(&self, source: &Source) -> Result<(), EngineError> {
        if source.verification != VerificationStatus::Verified {
            return Err(EngineError::SourceNotPublic);
        }
        if !self.is_cited(source.id).await? {
            return Err(EngineError::SourceNotPublic);
        }
        Ok(())
    }

    /// Whether any published card cites this source.
    ///
    /// Exact point lookup on the citation index written at publish time.
    /// Citation rows are not rewritten on dispute/correct/retract, so this
    /// reflects the state as of each card's last publish.
    pub async fn is_cited(&self, source_id: Uuid) -> Result<bool, EngineError> {
        let rows = self
            .store
            .query(
                &keys::source_pk(source_id),
                QueryOptions {
                    sk_prefix: Some(keys::CITATION_SK_PREFIX.to_string()),
                    limit: Some(1),
                    ..Default::default()
                },
            )
            .await?;
        Ok(!rows.is_empty())
    }
}
