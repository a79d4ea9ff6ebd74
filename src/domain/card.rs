//! Evidence cards and their versioned status state machine.
//!
//! A card is the atomic published claim record. Every mutation writes a full
//! new snapshot with `version + 1`; prior versions are never overwritten.
//! Status changes are restricted to a fixed directed graph.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum entities a card may reference (also bounds the publish fan-out)
pub const MAX_ENTITY_REFS: usize = 20;

/// Maximum sources a card may cite
pub const MAX_SOURCE_REFS: usize = 50;

/// Editorial status of an evidence card.
///
/// The full transition graph lives in [`CardStatus::can_transition`]. There
/// is no terminal state: an archived card can be resurrected to draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardStatus {
    /// Being written, editable
    Draft,

    /// Under editorial review, still editable
    Review,

    /// Publicly visible
    Published,

    /// Published but under active dispute
    Disputed,

    /// Published with a correction on record
    Corrected,

    /// Withdrawn from the public record
    Retracted,

    /// Shelved; may be resurrected to draft
    Archived,
}

impl CardStatus {
    /// Whether a card in this status may move to `to`.
    ///
    /// The graph is exhaustive: any pair not listed here is an invalid
    /// transition.
    pub fn can_transition(self, to: CardStatus) -> bool {
        use CardStatus::*;
        matches!(
            (self, to),
            (Draft, Review)
                | (Draft, Archived)
                | (Review, Draft)
                | (Review, Published)
                | (Review, Archived)
                | (Published, Disputed)
                | (Published, Corrected)
                | (Published, Retracted)
                | (Published, Archived)
                | (Disputed, Published)
                | (Disputed, Corrected)
                | (Disputed, Retracted)
                | (Disputed, Archived)
                | (Corrected, Disputed)
                | (Corrected, Retracted)
                | (Corrected, Archived)
                | (Retracted, Archived)
                | (Archived, Draft)
        )
    }

    /// Whether card content may be edited in this status
    pub fn is_editable(self) -> bool {
        matches!(self, CardStatus::Draft | CardStatus::Review)
    }

    /// Every status, for exhaustive iteration in tests and listings
    pub const ALL: [CardStatus; 7] = [
        CardStatus::Draft,
        CardStatus::Review,
        CardStatus::Published,
        CardStatus::Disputed,
        CardStatus::Corrected,
        CardStatus::Retracted,
        CardStatus::Archived,
    ];
}

impl std::fmt::Display for CardStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CardStatus::Draft => "draft",
            CardStatus::Review => "review",
            CardStatus::Published => "published",
            CardStatus::Disputed => "disputed",
            CardStatus::Corrected => "corrected",
            CardStatus::Retracted => "retracted",
            CardStatus::Archived => "archived",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for CardStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(CardStatus::Draft),
            "review" => Ok(CardStatus::Review),
            "published" => Ok(CardStatus::Published),
            "disputed" => Ok(CardStatus::Disputed),
            "corrected" => Ok(CardStatus::Corrected),
            "retracted" => Ok(CardStatus::Retracted),
            "archived" => Ok(CardStatus::Archived),
            _ => anyhow::bail!("Unknown card status: {}", s),
        }
    }
}

/// How strongly the cited sources support the claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceStrength {
    /// Direct primary documentation
    Primary,

    /// Multiple independent sources agree
    Corroborated,

    /// Indirect or inferential support
    Circumstantial,

    /// Single source, not independently confirmed
    Uncorroborated,
}

/// Kind of annotation appended to the counterpoint log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterpointKind {
    Dispute,
    Correction,
    Retraction,
}

impl std::fmt::Display for CounterpointKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CounterpointKind::Dispute => write!(f, "Dispute"),
            CounterpointKind::Correction => write!(f, "Correction"),
            CounterpointKind::Retraction => write!(f, "Retraction"),
        }
    }
}

/// Optional scoring signals attached by downstream rankers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSignals {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credibility: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub corroboration: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub freshness: Option<f64>,
}

/// A single immutable version of an evidence card
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceCard {
    /// Card identifier, stable across versions
    pub id: Uuid,

    /// Short headline for the claim
    pub title: String,

    /// The falsifiable claim itself
    pub claim: String,

    /// Longer summary and context
    pub summary: String,

    /// Editorial category
    pub category: String,

    /// Entities this claim is about (1..=20)
    pub entity_ids: Vec<String>,

    /// When the claimed event occurred
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_date: Option<DateTime<Utc>>,

    /// Set once, at first publish; never changes afterwards
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,

    /// Jurisdiction the claim falls under
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jurisdiction: Option<String>,

    /// Sources cited in support (0..=50)
    pub source_ids: Vec<Uuid>,

    /// Strength of the cited evidence
    pub strength: EvidenceStrength,

    /// Lifecycle status
    pub status: CardStatus,

    /// Append-only annotated log of disputes, corrections, retractions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counterpoint: Option<String>,

    /// Free-form tags
    #[serde(default)]
    pub tags: Vec<String>,

    /// Optional ranking signals
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_signals: Option<ScoreSignals>,

    /// Version number; starts at 1, strictly +1 per mutation
    pub version: u64,

    /// When this version was written
    pub updated_at: DateTime<Utc>,

    /// Actor that wrote this version
    pub updated_by: String,

    /// When version 1 was created
    pub created_at: DateTime<Utc>,

    /// Actor that created version 1
    pub created_by: String,
}

/// Input for creating a new card
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardInput {
    pub title: String,
    pub claim: String,
    pub summary: String,
    pub category: String,
    pub entity_ids: Vec<String>,
    #[serde(default)]
    pub event_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub jurisdiction: Option<String>,
    #[serde(default)]
    pub source_ids: Vec<Uuid>,
    pub strength: EvidenceStrength,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Partial update applied to an editable card; `None` fields are unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CardPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub claim: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub entity_ids: Option<Vec<String>>,
    #[serde(default)]
    pub event_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub jurisdiction: Option<String>,
    #[serde(default)]
    pub source_ids: Option<Vec<Uuid>>,
    #[serde(default)]
    pub strength: Option<EvidenceStrength>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub score_signals: Option<ScoreSignals>,
}

impl EvidenceCard {
    /// Create version 1 of a new draft card from validated input
    pub fn new(input: CardInput, actor: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: input.title,
            claim: input.claim,
            summary: input.summary,
            category: input.category,
            entity_ids: input.entity_ids,
            event_date: input.event_date,
            published_at: None,
            jurisdiction: input.jurisdiction,
            source_ids: input.source_ids,
            strength: input.strength,
            status: CardStatus::Draft,
            counterpoint: None,
            tags: input.tags,
            score_signals: None,
            version: 1,
            updated_at: now,
            updated_by: actor.to_string(),
            created_at: now,
            created_by: actor.to_string(),
        }
    }

    /// Produce the next version snapshot: same content, version + 1,
    /// refreshed update stamps. Callers then mutate the returned card.
    pub fn next_version(&self, actor: &str) -> Self {
        let mut next = self.clone();
        next.version = self.version + 1;
        next.updated_at = Utc::now();
        next.updated_by = actor.to_string();
        next
    }

    /// Apply a patch in place (content fields only)
    pub fn apply_patch(&mut self, patch: CardPatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(claim) = patch.claim {
            self.claim = claim;
        }
        if let Some(summary) = patch.summary {
            self.summary = summary;
        }
        if let Some(category) = patch.category {
            self.category = category;
        }
        if let Some(entity_ids) = patch.entity_ids {
            self.entity_ids = entity_ids;
        }
        if let Some(event_date) = patch.event_date {
            self.event_date = Some(event_date);
        }
        if let Some(jurisdiction) = patch.jurisdiction {
            self.jurisdiction = Some(jurisdiction);
        }
        if let Some(source_ids) = patch.source_ids {
            self.source_ids = source_ids;
        }
        if let Some(strength) = patch.strength {
            self.strength = strength;
        }
        if let Some(tags) = patch.tags {
            self.tags = tags;
        }
        if let Some(signals) = patch.score_signals {
            self.score_signals = Some(signals);
        }
    }

    /// Append a labeled annotation to the counterpoint log.
    ///
    /// Format: prior text, blank-line separator, `[Kind timestamp]: note`.
    pub fn append_counterpoint(&mut self, kind: CounterpointKind, note: &str, at: DateTime<Utc>) {
        let entry = format!("[{} {}]: {}", kind, at.to_rfc3339(), note);
        self.counterpoint = Some(match self.counterpoint.take() {
            Some(prior) => format!("{}\n\n{}", prior, entry),
            None => entry,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(actor: &str) -> EvidenceCard {
        EvidenceCard::new(
            CardInput {
                title: "Test claim".to_string(),
                claim: "Acme owns Widget Ltd".to_string(),
                summary: "Ownership per registry filing".to_string(),
                category: "ownership".to_string(),
                entity_ids: vec!["acme".to_string()],
                event_date: None,
                jurisdiction: None,
                source_ids: vec![],
                strength: EvidenceStrength::Primary,
                tags: vec![],
            },
            actor,
        )
    }

    /// The exhaustive edge list of the transition graph
    const VALID_EDGES: [(CardStatus, CardStatus); 18] = {
        use CardStatus::*;
        [
            (Draft, Review),
            (Draft, Archived),
            (Review, Draft),
            (Review, Published),
            (Review, Archived),
            (Published, Disputed),
            (Published, Corrected),
            (Published, Retracted),
            (Published, Archived),
            (Disputed, Published),
            (Disputed, Corrected),
            (Disputed, Retracted),
            (Disputed, Archived),
            (Corrected, Disputed),
            (Corrected, Retracted),
            (Corrected, Archived),
            (Retracted, Archived),
            (Archived, Draft),
        ]
    };

    #[test]
    fn test_transition_graph_is_exactly_the_edge_list() {
        for from in CardStatus::ALL {
            for to in CardStatus::ALL {
                let expected = VALID_EDGES.contains(&(from, to));
                assert_eq!(
                    from.can_transition(to),
                    expected,
                    "transition {} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_editable_only_in_draft_and_review() {
        assert!(CardStatus::Draft.is_editable());
        assert!(CardStatus::Review.is_editable());
        for status in [
            CardStatus::Published,
            CardStatus::Disputed,
            CardStatus::Corrected,
            CardStatus::Retracted,
            CardStatus::Archived,
        ] {
            assert!(!status.is_editable(), "{} should not be editable", status);
        }
    }

    #[test]
    fn test_new_card_is_draft_v1() {
        let c = card("editor-1");
        assert_eq!(c.version, 1);
        assert_eq!(c.status, CardStatus::Draft);
        assert!(c.published_at.is_none());
    }

    #[test]
    fn test_next_version_increments_by_one() {
        let c = card("editor-1");
        let next = c.next_version("editor-2");
        assert_eq!(next.version, 2);
        assert_eq!(next.updated_by, "editor-2");
        assert_eq!(next.created_by, "editor-1");
        assert_eq!(next.id, c.id);
    }

    #[test]
    fn test_counterpoint_append_format() {
        let mut c = card("editor-1");
        let t1 = Utc::now();
        c.append_counterpoint(CounterpointKind::Dispute, "challenged by Acme", t1);

        let text = c.counterpoint.clone().unwrap();
        assert!(text.starts_with("[Dispute "));
        assert!(text.ends_with("]: challenged by Acme"));

        let t2 = Utc::now();
        c.append_counterpoint(CounterpointKind::Retraction, "withdrawn", t2);
        let text = c.counterpoint.unwrap();
        assert!(text.contains("challenged by Acme\n\n[Retraction "));
        assert!(text.ends_with("]: withdrawn"));
    }
}
