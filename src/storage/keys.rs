//! Key derivation: the mapping from domain records to store rows.
//!
//! All partition/sort keys and object keys are derived here, deterministically,
//! from domain values. Domain types never carry derived keys; anything that
//! needs a key recomputes it from the record.
//!
//! Document-store layout:
//!
//! | partition             | sort                     | payload            |
//! |-----------------------|--------------------------|--------------------|
//! | `SOURCE#{id}`         | `META`                   | Source record      |
//! | `SOURCE#{id}`         | `CITED#{card_id}`        | citation marker    |
//! | `CARD#{id}`           | `V#{version, 0-padded}`  | card version       |
//! | `FEED#{yyyy-mm}`      | `{ts}#{card_id}`         | card copy          |
//! | `ENTITY#{entity_id}`  | `{ts}#{card_id}`         | card copy          |
//!
//! Sort keys are fixed-width where ordering matters, so lexicographic order
//! equals numeric/chronological order.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::{EvidenceCard, Source};

use super::document_store::Item;

pub const SOURCE_PARTITION_PREFIX: &str = "SOURCE#";
pub const CARD_PARTITION_PREFIX: &str = "CARD#";
pub const FEED_PARTITION_PREFIX: &str = "FEED#";
pub const ENTITY_PARTITION_PREFIX: &str = "ENTITY#";

/// Sort key of the single metadata row in a source partition
pub const SOURCE_META_SK: &str = "META";

/// Sort-key prefix of citation rows in a source partition
pub const CITATION_SK_PREFIX: &str = "CITED#";

// ── document-store keys ─────────────────────────────────────────

pub fn source_pk(id: Uuid) -> String {
    format!("{}{}", SOURCE_PARTITION_PREFIX, id)
}

pub fn card_pk(id: Uuid) -> String {
    format!("{}{}", CARD_PARTITION_PREFIX, id)
}

/// Zero-padded so `V#...10` sorts after `V#...9`
pub fn card_version_sk(version: u64) -> String {
    format!("V#{:010}", version)
}

/// Coarse time bucket for the public feed: one partition per month
pub fn feed_bucket(at: DateTime<Utc>) -> String {
    at.format("%Y-%m").to_string()
}

pub fn feed_pk(bucket: &str) -> String {
    format!("{}{}", FEED_PARTITION_PREFIX, bucket)
}

pub fn entity_pk(entity_id: &str) -> String {
    format!("{}{}", ENTITY_PARTITION_PREFIX, entity_id)
}

/// Sort key for feed and entity rows: fixed-width timestamp then card id,
/// queried in descending order for reverse-chronological pages
pub fn chrono_sk(published_at: DateTime<Utc>, card_id: Uuid) -> String {
    format!("{}#{}", published_at.format("%Y-%m-%dT%H:%M:%S%.6fZ"), card_id)
}

pub fn citation_sk(card_id: Uuid) -> String {
    format!("{}{}", CITATION_SK_PREFIX, card_id)
}

// ── object-store keys ───────────────────────────────────────────

/// Staging location for an upload, derived from the source id alone
pub fn staging_object_key(source_id: Uuid, extension: &str) -> String {
    format!("staging/{}.{}", source_id, extension)
}

/// Final content-addressed location: same bytes, same key, every time
pub fn content_object_key(source_id: Uuid, sha256: &str, extension: &str) -> String {
    format!("sources/{}/{}.{}", source_id, sha256, extension)
}

/// Manifest location, addressed alongside the bytes it attests
pub fn manifest_object_key(source_id: Uuid, sha256: &str) -> String {
    format!("sources/{}/{}.manifest.json", source_id, sha256)
}

// ── record/item mapping ─────────────────────────────────────────

fn to_payload<T: Serialize>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value).context("Failed to serialize record")
}

/// The source metadata row
pub fn source_item(source: &Source) -> Result<Item> {
    Ok(Item {
        pk: source_pk(source.id),
        sk: SOURCE_META_SK.to_string(),
        payload: to_payload(source)?,
    })
}

/// One immutable card version row
pub fn card_version_item(card: &EvidenceCard) -> Result<Item> {
    Ok(Item {
        pk: card_pk(card.id),
        sk: card_version_sk(card.version),
        payload: to_payload(card)?,
    })
}

/// Public-feed fan-out row: a full denormalized copy of the card
pub fn feed_item(card: &EvidenceCard, published_at: DateTime<Utc>) -> Result<Item> {
    Ok(Item {
        pk: feed_pk(&feed_bucket(published_at)),
        sk: chrono_sk(published_at, card.id),
        payload: to_payload(card)?,
    })
}

/// Per-entity fan-out row: a full denormalized copy of the card
pub fn entity_item(
    card: &EvidenceCard,
    entity_id: &str,
    published_at: DateTime<Utc>,
) -> Result<Item> {
    Ok(Item {
        pk: entity_pk(entity_id),
        sk: chrono_sk(published_at, card.id),
        payload: to_payload(card)?,
    })
}

/// Citation row: the reverse index from a source to a card that cites it
pub fn citation_item(
    source_id: Uuid,
    card_id: Uuid,
    published_at: DateTime<Utc>,
) -> Result<Item> {
    Ok(Item {
        pk: source_pk(source_id),
        sk: citation_sk(card_id),
        payload: to_payload(&serde_json::json!({
            "card_id": card_id,
            "published_at": published_at,
        }))?,
    })
}

/// Parse a domain record back out of an item payload
pub fn from_item<T: serde::de::DeserializeOwned>(item: &Item) -> Result<T> {
    serde_json::from_value(item.payload.clone())
        .with_context(|| format!("Corrupt record at {}/{}", item.pk, item.sk))
}
