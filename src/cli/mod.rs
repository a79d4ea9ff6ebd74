//! Command-line interface for the evidence engine.
//!
//! Operator commands over the library API: manage sources through their
//! verification lifecycle and cards through their editorial lifecycle. The
//! CLI performs no validation of its own beyond argument parsing; every rule
//! is enforced by the engine.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::adapters::Ed25519Signer;
use crate::config;
use crate::core::{CardLifecycle, PublicationGate, SourceVerifier};
use crate::domain::{CardInput, CardPatch, CardStatus, DocumentKind, EvidenceStrength, SourceInput};
use crate::storage::{DocumentStore, LocalObjectStore, SqliteDocumentStore};

/// cardea - evidence record integrity and lifecycle engine
#[derive(Parser, Debug)]
#[command(name = "cardea")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Actor id recorded on audit fields
    #[arg(long, env = "CARDEA_ACTOR", default_value = "cli", global = true)]
    pub actor: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage sources
    Source {
        #[command(subcommand)]
        command: SourceCommands,
    },

    /// Manage evidence cards
    Card {
        #[command(subcommand)]
        command: CardCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum SourceCommands {
    /// Create a pending source record
    Create {
        #[arg(long)]
        title: String,

        #[arg(long)]
        publisher: String,

        /// Origin URL the document was retrieved from
        #[arg(long)]
        url: String,

        /// Declared document kind (article, filing, report, ...)
        #[arg(long, default_value = "other")]
        kind: DocumentKind,

        /// Retrieval time (RFC 3339; defaults to now)
        #[arg(long)]
        retrieved_at: Option<DateTime<Utc>>,
    },

    /// Issue a presigned staging upload target
    UploadTarget {
        id: Uuid,

        /// Declared MIME type of the upload
        #[arg(long)]
        content_type: String,
    },

    /// Verify a staged upload: hash, address, sign, persist
    Finalize { id: Uuid },

    /// Verify by fetching the document directly
    Snapshot {
        id: Uuid,

        #[arg(long)]
        url: String,

        /// Byte cap for the fetch (defaults to the configured limit)
        #[arg(long)]
        max_bytes: Option<u64>,
    },

    /// Show a source record
    Show { id: Uuid },

    /// Show public verification metadata
    Verification { id: Uuid },

    /// Issue a public download URL (fail-closed)
    DownloadUrl { id: Uuid },
}

#[derive(Subcommand, Debug)]
pub enum CardCommands {
    /// Create a draft card
    Create {
        #[arg(long)]
        title: String,

        #[arg(long)]
        claim: String,

        #[arg(long)]
        summary: String,

        #[arg(long)]
        category: String,

        /// Entity ids the claim is about (repeatable, 1..=20)
        #[arg(long = "entity")]
        entity_ids: Vec<String>,

        /// Source ids cited in support (repeatable, up to 50)
        #[arg(long = "source")]
        source_ids: Vec<Uuid>,

        #[arg(long, value_parser = parse_strength, default_value = "uncorroborated")]
        strength: EvidenceStrength,

        #[arg(long)]
        jurisdiction: Option<String>,

        #[arg(long)]
        event_date: Option<DateTime<Utc>>,

        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// Show the current version (or a specific one)
    Show {
        id: Uuid,

        #[arg(long)]
        version: Option<u64>,
    },

    /// Edit an editable card, writing a new version
    Update {
        id: Uuid,

        #[arg(long)]
        expected_version: u64,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        claim: Option<String>,

        #[arg(long)]
        summary: Option<String>,

        #[arg(long)]
        category: Option<String>,

        #[arg(long = "entity")]
        entity_ids: Vec<String>,

        #[arg(long = "source")]
        source_ids: Vec<Uuid>,

        #[arg(long, value_parser = parse_strength)]
        strength: Option<EvidenceStrength>,
    },

    /// Plain status transition (draft/review/archived targets)
    Transition {
        id: Uuid,

        #[arg(long)]
        to: CardStatus,

        #[arg(long)]
        expected_version: u64,
    },

    /// Publish: gate on source verification, write all indexes atomically
    Publish {
        id: Uuid,

        #[arg(long)]
        expected_version: u64,
    },

    /// Mark disputed, appending a counterpoint note
    Dispute {
        id: Uuid,

        #[arg(long)]
        note: String,

        #[arg(long)]
        expected_version: u64,
    },

    /// Record a correction, appending a counterpoint note
    Correct {
        id: Uuid,

        #[arg(long)]
        note: String,

        #[arg(long)]
        expected_version: u64,
    },

    /// Retract, appending a counterpoint note
    Retract {
        id: Uuid,

        #[arg(long)]
        note: String,

        #[arg(long)]
        expected_version: u64,
    },

    /// List cards (admin view: latest version per card)
    List {
        #[arg(long)]
        status: Option<CardStatus>,
    },

    /// Public feed for a time bucket (defaults to the current month)
    Feed {
        #[arg(long)]
        bucket: Option<String>,
    },

    /// Published cards referencing an entity
    ForEntity { entity_id: String },
}

fn parse_strength(s: &str) -> Result<EvidenceStrength, String> {
    match s.to_lowercase().as_str() {
        "primary" => Ok(EvidenceStrength::Primary),
        "corroborated" => Ok(EvidenceStrength::Corroborated),
        "circumstantial" => Ok(EvidenceStrength::Circumstantial),
        "uncorroborated" => Ok(EvidenceStrength::Uncorroborated),
        _ => Err(format!("Unknown evidence strength: {}", s)),
    }
}

impl clap::ValueEnum for DocumentKind {
    fn value_variants<'a>() -> &'a [Self] {
        &[
            DocumentKind::Article,
            DocumentKind::Filing,
            DocumentKind::RegistryExtract,
            DocumentKind::Report,
            DocumentKind::PressRelease,
            DocumentKind::Dataset,
            DocumentKind::Other,
        ]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        let name = match self {
            DocumentKind::Article => "article",
            DocumentKind::Filing => "filing",
            DocumentKind::RegistryExtract => "registry-extract",
            DocumentKind::Report => "report",
            DocumentKind::PressRelease => "press-release",
            DocumentKind::Dataset => "dataset",
            DocumentKind::Other => "other",
        };
        Some(clap::builder::PossibleValue::new(name))
    }
}

impl clap::ValueEnum for CardStatus {
    fn value_variants<'a>() -> &'a [Self] {
        &CardStatus::ALL
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(clap::builder::PossibleValue::new(match self {
            CardStatus::Draft => "draft",
            CardStatus::Review => "review",
            CardStatus::Published => "published",
            CardStatus::Disputed => "disputed",
            CardStatus::Corrected => "corrected",
            CardStatus::Retracted => "retracted",
            CardStatus::Archived => "archived",
        }))
    }
}

/// The wired-up engine components
struct Engine {
    verifier: SourceVerifier,
    lifecycle: CardLifecycle,
}

fn build_engine() -> Result<Engine> {
    let config = config::config()?;

    let store: Arc<dyn DocumentStore> = Arc::new(
        SqliteDocumentStore::open(&config.store_path())
            .context("Failed to open document store")?,
    );
    let objects = Arc::new(LocalObjectStore::new(config.objects.clone()));
    let signer = Arc::new(Ed25519Signer::load_or_generate(&config.signing_key_path())?);
    let gate = PublicationGate::new(Arc::clone(&store));

    let verifier = SourceVerifier::new(
        Arc::clone(&store),
        objects,
        signer,
        gate.clone(),
        config.limits.clone(),
    )?;
    let lifecycle = CardLifecycle::new(store, gate);

    Ok(Engine {
        verifier,
        lifecycle,
    })
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let engine = build_engine()?;
        let actor = &self.actor;

        match self.command {
            Commands::Source { command } => execute_source(command, &engine, actor).await,
            Commands::Card { command } => execute_card(command, &engine, actor).await,
        }
    }
}

async fn execute_source(command: SourceCommands, engine: &Engine, actor: &str) -> Result<()> {
    match command {
        SourceCommands::Create {
            title,
            publisher,
            url,
            kind,
            retrieved_at,
        } => {
            let source = engine
                .verifier
                .create(
                    SourceInput {
                        title,
                        publisher,
                        origin_url: url,
                        retrieved_at: retrieved_at.unwrap_or_else(Utc::now),
                        kind,
                    },
                    actor,
                )
                .await?;
            print_json(&source)
        }

        SourceCommands::UploadTarget { id, content_type } => {
            let target = engine.verifier.request_upload(id, &content_type, actor).await?;
            println!("key:     {}", target.key);
            println!("url:     {}", target.url);
            println!("expires: {}", target.expires_at.to_rfc3339());
            Ok(())
        }

        SourceCommands::Finalize { id } => {
            let source = engine.verifier.finalize(id, actor).await?;
            print_json(&source)
        }

        SourceCommands::Snapshot { id, url, max_bytes } => {
            let source = engine
                .verifier
                .capture_snapshot(id, &url, actor, max_bytes)
                .await?;
            print_json(&source)
        }

        SourceCommands::Show { id } => {
            let source = engine.verifier.get(id).await?;
            print_json(&source)
        }

        SourceCommands::Verification { id } => {
            let verification = engine.verifier.get_verification(id).await?;
            print_json(&verification)
        }

        SourceCommands::DownloadUrl { id } => {
            let download = engine.verifier.generate_download_url(id).await?;
            println!("url:      {}", download.url);
            println!("filename: {}", download.filename);
            println!("expires:  {}", download.expires_at.to_rfc3339());
            Ok(())
        }
    }
}

async fn execute_card(command: CardCommands, engine: &Engine, actor: &str) -> Result<()> {
    match command {
        CardCommands::Create {
            title,
            claim,
            summary,
            category,
            entity_ids,
            source_ids,
            strength,
            jurisdiction,
            event_date,
            tags,
        } => {
            let card = engine
                .lifecycle
                .create(
                    CardInput {
                        title,
                        claim,
                        summary,
                        category,
                        entity_ids,
                        event_date,
                        jurisdiction,
                        source_ids,
                        strength,
                        tags,
                    },
                    actor,
                )
                .await?;
            print_json(&card)
        }

        CardCommands::Show { id, version } => {
            let card = match version {
                Some(v) => engine.lifecycle.version(id, v).await?,
                None => engine.lifecycle.current(id).await?,
            };
            print_json(&card)
        }

        CardCommands::Update {
            id,
            expected_version,
            title,
            claim,
            summary,
            category,
            entity_ids,
            source_ids,
            strength,
        } => {
            let patch = CardPatch {
                title,
                claim,
                summary,
                category,
                entity_ids: if entity_ids.is_empty() { None } else { Some(entity_ids) },
                source_ids: if source_ids.is_empty() { None } else { Some(source_ids) },
                strength,
                ..Default::default()
            };
            let card = engine
                .lifecycle
                .update(id, patch, expected_version, actor)
                .await?;
            print_json(&card)
        }

        CardCommands::Transition {
            id,
            to,
            expected_version,
        } => {
            let card = engine
                .lifecycle
                .transition(id, to, expected_version, actor)
                .await?;
            print_json(&card)
        }

        CardCommands::Publish {
            id,
            expected_version,
        } => {
            let card = engine.lifecycle.publish(id, expected_version, actor).await?;
            print_json(&card)
        }

        CardCommands::Dispute {
            id,
            note,
            expected_version,
        } => {
            let card = engine
                .lifecycle
                .dispute(id, &note, expected_version, actor)
                .await?;
            print_json(&card)
        }

        CardCommands::Correct {
            id,
            note,
            expected_version,
        } => {
            let card = engine
                .lifecycle
                .correct(id, &note, expected_version, actor)
                .await?;
            print_json(&card)
        }

        CardCommands::Retract {
            id,
            note,
            expected_version,
        } => {
            let card = engine
                .lifecycle
                .retract(id, &note, expected_version, actor)
                .await?;
            print_json(&card)
        }

        CardCommands::List { status } => {
            let cards = engine.lifecycle.list_cards(status).await?;
            print_json(&cards)
        }

        CardCommands::Feed { bucket } => {
            let cards = engine.lifecycle.public_feed(bucket).await?;
            print_json(&cards)
        }

        CardCommands::ForEntity { entity_id } => {
            let cards = engine.lifecycle.cards_for_entity(&entity_id).await?;
            print_json(&cards)
        }
    }
}
