//! The evidence card state machine and its versioned, indexed persistence.
//!
//! Every mutation writes a full new snapshot at `version + 1` under a
//! conditional insert; prior versions are never touched. All mutating
//! operations take the version the caller last observed and fail with
//! `Conflict` when the stored card has moved on — the conditional insert
//! backstops the check under concurrent writers.
//!
//! Publish is the only operation that writes indexes, and it writes all of
//! them in one atomic transaction: the version row, the public-feed row, one
//! row per referenced entity, and one citation row per cited source.
//! Dispute/correct/retract do NOT rewrite those rows; index copies remain as
//! of the last publish. That staleness is a documented property, not a bug.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::domain::{
    CardInput, CardPatch, CardStatus, CounterpointKind, EvidenceCard, MAX_ENTITY_REFS,
    MAX_SOURCE_REFS,
};
use crate::storage::{
    keys, DocumentStore, PutCondition, QueryOptions, QueryOrder, StoreError, TransactPut,
};

use super::errors::EngineError;
use super::gate::PublicationGate;

/// Owns the card lifecycle: versioning, transitions, publish fan-out,
/// and the listing paths over the denormalized indexes
pub struct CardLifecycle {
    store: Arc<dyn DocumentStore>,
    gate: PublicationGate,
}

impl CardLifecycle {
    pub fn new(store: Arc<dyn DocumentStore>, gate: PublicationGate) -> Self {
        Self { store, gate }
    }

    /// Create version 1 of a new draft card
    pub async fn create(&self, input: CardInput, actor: &str) -> Result<EvidenceCard, EngineError> {
        validate_refs(&input.entity_ids, &input.source_ids)?;

        let card = EvidenceCard::new(input, actor);
        self.store
            .put(keys::card_version_item(&card)?, PutCondition::IfAbsent)
            .await?;

        info!(card_id = %card.id, "Card created");
        Ok(card)
    }

    /// Current (highest) version of a card
    pub async fn current(&self, card_id: Uuid) -> Result<EvidenceCard, EngineError> {
        let items = self
            .store
            .query(
                &keys::card_pk(card_id),
                QueryOptions {
                    order: Some(QueryOrder::Descending),
                    limit: Some(1),
                    ..Default::default()
                },
            )
            .await?;
        let item = items
            .first()
            .ok_or_else(|| EngineError::not_found("card", card_id))?;
        keys::from_item(item).map_err(EngineError::from)
    }

    /// A specific retained version of a card
    pub async fn version(&self, card_id: Uuid, version: u64) -> Result<EvidenceCard, EngineError> {
        let item = self
            .store
            .get(&keys::card_pk(card_id), &keys::card_version_sk(version))
            .await?
            .ok_or_else(|| {
                EngineError::not_found("card version", format!("{}@v{}", card_id, version))
            })?;
        keys::from_item(&item).map_err(EngineError::from)
    }

    /// Every retained version of a card, oldest first
    pub async fn versions(&self, card_id: Uuid) -> Result<Vec<EvidenceCard>, EngineError> {
        let items = self
            .store
            .query(&keys::card_pk(card_id), QueryOptions::default())
            .await?;
        if items.is_empty() {
            return Err(EngineError::not_found("card", card_id));
        }
        items
            .iter()
            .map(|item| keys::from_item(item).map_err(EngineError::from))
            .collect()
    }

    /// Edit card content. Allowed only in draft/review; writes a full new
    /// snapshot at version + 1.
    pub async fn update(
        &self,
        card_id: Uuid,
        patch: CardPatch,
        expected_version: u64,
        actor: &str,
    ) -> Result<EvidenceCard, EngineError> {
        let current = self.current(card_id).await?;
        check_expected(&current, expected_version)?;

        if !current.status.is_editable() {
            return Err(EngineError::bad_transition(current.status, "update"));
        }

        let mut next = current.next_version(actor);
        next.apply_patch(patch);
        validate_refs(&next.entity_ids, &next.source_ids)?;

        self.insert_version(&next, expected_version).await?;
        info!(card_id = %card_id, version = next.version, "Card updated");
        Ok(next)
    }

    /// Plain status transition along the fixed graph.
    ///
    /// Published, disputed, corrected, and retracted targets carry side
    /// effects and are reachable only through their dedicated operations.
    pub async fn transition(
        &self,
        card_id: Uuid,
        to: CardStatus,
        expected_version: u64,
        actor: &str,
    ) -> Result<EvidenceCard, EngineError> {
        if matches!(
            to,
            CardStatus::Published
                | CardStatus::Disputed
                | CardStatus::Corrected
                | CardStatus::Retracted
        ) {
            return Err(EngineError::InvalidInput(format!(
                "transition to {} requires its dedicated operation",
                to
            )));
        }

        let current = self.current(card_id).await?;
        check_expected(&current, expected_version)?;
        check_transition(&current, to)?;

        let mut next = current.next_version(actor);
        next.status = to;

        self.insert_version(&next, expected_version).await?;
        info!(card_id = %card_id, from = %current.status, to = %to, "Card transitioned");
        Ok(next)
    }

    /// Shelve a card. Plain transition, no index changes.
    pub async fn archive(
        &self,
        card_id: Uuid,
        expected_version: u64,
        actor: &str,
    ) -> Result<EvidenceCard, EngineError> {
        self.transition(card_id, CardStatus::Archived, expected_version, actor)
            .await
    }

    /// Resurrect an archived card to draft. Plain transition, no index changes.
    pub async fn restore(
        &self,
        card_id: Uuid,
        expected_version: u64,
        actor: &str,
    ) -> Result<EvidenceCard, EngineError> {
        self.transition(card_id, CardStatus::Draft, expected_version, actor)
            .await
    }

    /// Publish a card: gate on source verification, then atomically write
    /// the new version plus every denormalized index row.
    pub async fn publish(
        &self,
        card_id: Uuid,
        expected_version: u64,
        actor: &str,
    ) -> Result<EvidenceCard, EngineError> {
        let current = self.current(card_id).await?;
        check_expected(&current, expected_version)?;
        check_transition(&current, CardStatus::Published)?;

        // Re-read every cited source; first unverified reference aborts
        self.gate.can_publish(&current).await?;

        let mut next = current.next_version(actor);
        next.status = CardStatus::Published;
        // Publish date is set exactly once, at first publish
        let published_at = match next.published_at {
            Some(at) => at,
            None => {
                let now = Utc::now();
                next.published_at = Some(now);
                now
            }
        };

        let mut puts = vec![TransactPut {
            item: keys::card_version_item(&next)?,
            condition: PutCondition::IfAbsent,
        }];
        puts.push(TransactPut {
            item: keys::feed_item(&next, published_at)?,
            condition: PutCondition::Overwrite,
        });
        for entity_id in &next.entity_ids {
            puts.push(TransactPut {
                item: keys::entity_item(&next, entity_id, published_at)?,
                condition: PutCondition::Overwrite,
            });
        }
        for source_id in &next.source_ids {
            puts.push(TransactPut {
                item: keys::citation_item(*source_id, next.id, published_at)?,
                condition: PutCondition::Overwrite,
            });
        }

        // One indivisible transaction: a reader must never observe the feed
        // row without the version row, or vice versa. An oversized fan-out
        // fails the whole publish before any write.
        self.store
            .transact_put(puts)
            .await
            .map_err(|err| map_version_conflict(err, expected_version, next.version))?;

        info!(
            card_id = %card_id,
            version = next.version,
            bucket = %keys::feed_bucket(published_at),
            entities = next.entity_ids.len(),
            sources = next.source_ids.len(),
            "Card published"
        );
        Ok(next)
    }

    /// Mark a published card disputed, appending the note to the counterpoint
    pub async fn dispute(
        &self,
        card_id: Uuid,
        note: &str,
        expected_version: u64,
        actor: &str,
    ) -> Result<EvidenceCard, EngineError> {
        self.annotate(
            card_id,
            CardStatus::Disputed,
            CounterpointKind::Dispute,
            note,
            expected_version,
            actor,
        )
        .await
    }

    /// Record a correction against a published or disputed card
    pub async fn correct(
        &self,
        card_id: Uuid,
        note: &str,
        expected_version: u64,
        actor: &str,
    ) -> Result<EvidenceCard, EngineError> {
        self.annotate(
            card_id,
            CardStatus::Corrected,
            CounterpointKind::Correction,
            note,
            expected_version,
            actor,
        )
        .await
    }

    /// Withdraw a card from the public record
    pub async fn retract(
        &self,
        card_id: Uuid,
        note: &str,
        expected_version: u64,
        actor: &str,
    ) -> Result<EvidenceCard, EngineError> {
        self.annotate(
            card_id,
            CardStatus::Retracted,
            CounterpointKind::Retraction,
            note,
            expected_version,
            actor,
        )
        .await
    }

    /// Admin listing: scan version rows, keep the highest version per card,
    /// then filter. Filtering before dedup would read stale statuses from
    /// superseded version rows.
    pub async fn list_cards(
        &self,
        status: Option<CardStatus>,
    ) -> Result<Vec<EvidenceCard>, EngineError> {
        let items = self.store.scan_prefix(keys::CARD_PARTITION_PREFIX).await?;

        let mut latest: HashMap<Uuid, EvidenceCard> = HashMap::new();
        for item in &items {
            let card: EvidenceCard = keys::from_item(item)?;
            match latest.get(&card.id) {
                Some(existing) if existing.version >= card.version => {}
                _ => {
                    latest.insert(card.id, card);
                }
            }
        }

        let mut cards: Vec<EvidenceCard> = latest
            .into_values()
            .filter(|card| status.map_or(true, |s| card.status == s))
            .collect();
        cards.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(cards)
    }

    /// Public feed for one time bucket (defaults to the current month),
    /// reverse-chronological. Cross-bucket pages iterate buckets caller-side.
    pub async fn public_feed(
        &self,
        bucket: Option<String>,
    ) -> Result<Vec<EvidenceCard>, EngineError> {
        let bucket = bucket.unwrap_or_else(|| keys::feed_bucket(Utc::now()));
        let items = self
            .store
            .query(
                &keys::feed_pk(&bucket),
                QueryOptions {
                    order: Some(QueryOrder::Descending),
                    ..Default::default()
                },
            )
            .await?;
        items
            .iter()
            .map(|item| keys::from_item(item).map_err(EngineError::from))
            .collect()
    }

    /// Cards published about one entity, reverse-chronological
    pub async fn cards_for_entity(
        &self,
        entity_id: &str,
    ) -> Result<Vec<EvidenceCard>, EngineError> {
        let items = self
            .store
            .query(
                &keys::entity_pk(entity_id),
                QueryOptions {
                    order: Some(QueryOrder::Descending),
                    ..Default::default()
                },
            )
            .await?;
        items
            .iter()
            .map(|item| keys::from_item(item).map_err(EngineError::from))
            .collect()
    }

    /// Whether any published card cites this source (exact citation-index
    /// lookup; stale by design after dispute/correct/retract)
    pub async fn is_referenced_by_published_card(
        &self,
        source_id: Uuid,
    ) -> Result<bool, EngineError> {
        self.gate.is_cited(source_id).await
    }

    /// Append a counterpoint annotation and transition in one version bump.
    /// No index writes: published fan-out rows remain as of the last publish.
    async fn annotate(
        &self,
        card_id: Uuid,
        to: CardStatus,
        kind: CounterpointKind,
        note: &str,
        expected_version: u64,
        actor: &str,
    ) -> Result<EvidenceCard, EngineError> {
        let current = self.current(card_id).await?;
        check_expected(&current, expected_version)?;
        check_transition(&current, to)?;

        let mut next = current.next_version(actor);
        next.append_counterpoint(kind, note, Utc::now());
        next.status = to;

        self.insert_version(&next, expected_version).await?;
        info!(card_id = %card_id, to = %to, version = next.version, "Card annotated");
        Ok(next)
    }

    /// Conditionally insert a new version row; a lost race surfaces as
    /// `Conflict`, never as a silent overwrite
    async fn insert_version(
        &self,
        card: &EvidenceCard,
        expected_version: u64,
    ) -> Result<(), EngineError> {
        self.store
            .put(keys::card_version_item(card)?, PutCondition::IfAbsent)
            .await
            .map_err(|err| map_version_conflict(err, expected_version, card.version))
    }
}

/// Reference-count bounds shared by create and update
fn validate_refs(entity_ids: &[String], source_ids: &[Uuid]) -> Result<(), EngineError> {
    if entity_ids.is_empty() || entity_ids.len() > MAX_ENTITY_REFS {
        return Err(EngineError::InvalidInput(format!(
            "card must reference 1..={} entities, got {}",
            MAX_ENTITY_REFS,
            entity_ids.len()
        )));
    }
    if source_ids.len() > MAX_SOURCE_REFS {
        return Err(EngineError::InvalidInput(format!(
            "card may cite at most {} sources, got {}",
            MAX_SOURCE_REFS,
            source_ids.len()
        )));
    }
    Ok(())
}

/// Optimistic concurrency check against the version the caller last observed
fn check_expected(current: &EvidenceCard, expected_version: u64) -> Result<(), EngineError> {
    if current.version != expected_version {
        return Err(EngineError::Conflict {
            expected: expected_version,
            found: current.version,
        });
    }
    Ok(())
}

/// Validate a transition against the fixed graph
fn check_transition(current: &EvidenceCard, to: CardStatus) -> Result<(), EngineError> {
    if !current.status.can_transition(to) {
        return Err(EngineError::bad_transition(
            current.status,
            format!("transition to {}", to),
        ));
    }
    Ok(())
}

/// A conditional-insert failure on a version row means a concurrent writer
/// got there first; everything else passes through
fn map_version_conflict(err: StoreError, expected: u64, attempted: u64) -> EngineError {
    match err {
        StoreError::ConditionFailed { ref sk, .. } if sk.starts_with("V#") => {
            EngineError::Conflict {
                expected,
                found: attempted,
            }
        }
        other => EngineError::Store(other),
    }
}
