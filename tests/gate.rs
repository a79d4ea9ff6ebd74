//! Publication gate integration tests
//!
//! The two fail-closed predicates: publish blocked until every cited source
//! is verified, and download blocked until a source is both verified and
//! cited by a published card — with the anti-enumeration property that every
//! download failure looks the same.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use cardea::adapters::Ed25519Signer;
use cardea::core::{CardLifecycle, EngineError, PublicationGate, SourceVerifier, VerifierLimits};
use cardea::domain::{CardInput, CardStatus, DocumentKind, EvidenceStrength, SourceInput};
use cardea::storage::{DocumentStore, LocalObjectStore, ObjectStore, SqliteDocumentStore};
use tempfile::TempDir;

struct Harness {
    verifier: SourceVerifier,
    lifecycle: CardLifecycle,
    objects: Arc<dyn ObjectStore>,
    _tmp: TempDir,
}

fn harness() -> Harness {
    let tmp = TempDir::new().unwrap();
    let store: Arc<dyn DocumentStore> = Arc::new(SqliteDocumentStore::open_in_memory().unwrap());
    let objects: Arc<dyn ObjectStore> =
        Arc::new(LocalObjectStore::new(tmp.path().join("objects")));
    let signer = Arc::new(Ed25519Signer::generate());
    let gate = PublicationGate::new(Arc::clone(&store));
    let verifier = SourceVerifier::new(
        Arc::clone(&store),
        Arc::clone(&objects),
        signer,
        gate.clone(),
        VerifierLimits {
            // Small cap so a test can produce a Failed source cheaply
            max_source_bytes: 64,
            ..Default::default()
        },
    )
    .unwrap();
    let lifecycle = CardLifecycle::new(store, gate);
    Harness {
        verifier,
        lifecycle,
        objects,
        _tmp: tmp,
    }
}

fn source_input(title: &str) -> SourceInput {
    SourceInput {
        title: title.to_string(),
        publisher: "Acme Corp".to_string(),
        origin_url: "https://example.com/doc.pdf".to_string(),
        retrieved_at: Utc::now(),
        kind: DocumentKind::Report,
    }
}

fn card_input(sources: Vec<Uuid>) -> CardInput {
    CardInput {
        title: "Claim".to_string(),
        claim: "Acme misstated revenue".to_string(),
        summary: "Based on the cited filings".to_string(),
        category: "finance".to_string(),
        entity_ids: vec!["acme".to_string()],
        event_date: None,
        jurisdiction: None,
        source_ids: sources,
        strength: EvidenceStrength::Corroborated,
        tags: vec![],
    }
}

async fn upload_and_finalize(h: &Harness, source_id: Uuid, bytes: &[u8]) {
    let target = h
        .verifier
        .request_upload(source_id, "application/pdf", "editor-1")
        .await
        .unwrap();
    h.objects
        .put(&target.key, bytes, "application/pdf")
        .await
        .unwrap();
    h.verifier.finalize(source_id, "editor-1").await.unwrap();
}

/// Publish a card citing the given sources
async fn publish_card(h: &Harness, sources: Vec<Uuid>) -> Uuid {
    let card = h
        .lifecycle
        .create(card_input(sources), "editor-1")
        .await
        .unwrap();
    h.lifecycle
        .transition(card.id, CardStatus::Review, 1, "editor-1")
        .await
        .unwrap();
    h.lifecycle.publish(card.id, 2, "editor-1").await.unwrap();
    card.id
}

#[tokio::test]
async fn test_publish_gate_names_the_unverified_source() {
    let h = harness();

    let verified = h.verifier.create(source_input("A"), "editor-1").await.unwrap();
    upload_and_finalize(&h, verified.id, b"source A").await;
    let pending = h.verifier.create(source_input("B"), "editor-1").await.unwrap();

    let card = h
        .lifecycle
        .create(card_input(vec![verified.id, pending.id]), "editor-1")
        .await
        .unwrap();
    h.lifecycle
        .transition(card.id, CardStatus::Review, 1, "editor-1")
        .await
        .unwrap();

    let err = h.lifecycle.publish(card.id, 2, "editor-1").await.unwrap_err();
    match err {
        EngineError::SourceNotVerified { source_id } => assert_eq!(source_id, pending.id),
        other => panic!("expected SourceNotVerified, got {other:?}"),
    }

    // After verifying B the same publish succeeds
    upload_and_finalize(&h, pending.id, b"source B").await;
    let published = h.lifecycle.publish(card.id, 2, "editor-1").await.unwrap();
    assert_eq!(published.status, CardStatus::Published);
}

#[tokio::test]
async fn test_publish_gate_treats_missing_source_as_unverified() {
    let h = harness();
    let ghost = Uuid::new_v4();

    let card = h
        .lifecycle
        .create(card_input(vec![ghost]), "editor-1")
        .await
        .unwrap();
    h.lifecycle
        .transition(card.id, CardStatus::Review, 1, "editor-1")
        .await
        .unwrap();

    let err = h.lifecycle.publish(card.id, 2, "editor-1").await.unwrap_err();
    match err {
        EngineError::SourceNotVerified { source_id } => assert_eq!(source_id, ghost),
        other => panic!("expected SourceNotVerified, got {other:?}"),
    }
}

#[tokio::test]
async fn test_card_with_no_sources_publishes() {
    let h = harness();
    let card_id = publish_card(&h, vec![]).await;
    let card = h.lifecycle.current(card_id).await.unwrap();
    assert_eq!(card.status, CardStatus::Published);
}

#[tokio::test]
async fn test_download_failures_are_indistinguishable() {
    let h = harness();

    // Missing source
    let missing_err = h
        .verifier
        .generate_download_url(Uuid::new_v4())
        .await
        .unwrap_err();

    // Pending source
    let pending = h.verifier.create(source_input("pending"), "editor-1").await.unwrap();
    let pending_err = h
        .verifier
        .generate_download_url(pending.id)
        .await
        .unwrap_err();

    // Failed source (oversize upload against the 64-byte cap)
    let failed = h.verifier.create(source_input("failed"), "editor-1").await.unwrap();
    let target = h
        .verifier
        .request_upload(failed.id, "application/pdf", "editor-1")
        .await
        .unwrap();
    h.objects
        .put(&target.key, &vec![0u8; 128], "application/pdf")
        .await
        .unwrap();
    h.verifier.finalize(failed.id, "editor-1").await.unwrap_err();
    let failed_err = h
        .verifier
        .generate_download_url(failed.id)
        .await
        .unwrap_err();

    // Verified but cited by no published card
    let uncited = h.verifier.create(source_input("uncited"), "editor-1").await.unwrap();
    upload_and_finalize(&h, uncited.id, b"verified bytes").await;
    let uncited_err = h
        .verifier
        .generate_download_url(uncited.id)
        .await
        .unwrap_err();

    // One undifferentiated outcome, identical in variant and message
    for err in [&missing_err, &pending_err, &failed_err, &uncited_err] {
        assert!(matches!(err, EngineError::SourceNotPublic));
    }
    assert_eq!(missing_err.to_string(), pending_err.to_string());
    assert_eq!(pending_err.to_string(), failed_err.to_string());
    assert_eq!(failed_err.to_string(), uncited_err.to_string());
}

#[tokio::test]
async fn test_download_opens_once_cited_by_published_card() {
    let h = harness();

    let source = h.verifier.create(source_input("cited"), "editor-1").await.unwrap();
    upload_and_finalize(&h, source.id, b"verified bytes").await;

    // Verified alone is not enough
    assert!(matches!(
        h.verifier.generate_download_url(source.id).await.unwrap_err(),
        EngineError::SourceNotPublic
    ));

    publish_card(&h, vec![source.id]).await;

    let download = h.verifier.generate_download_url(source.id).await.unwrap();
    assert!(download.url.contains(&source.id.to_string()));
    assert!(download.filename.ends_with(".pdf"));
    assert!(download.expires_at > Utc::now());
}

#[tokio::test]
async fn test_download_survives_dispute_via_stale_citation_index() {
    let h = harness();

    let source = h.verifier.create(source_input("cited"), "editor-1").await.unwrap();
    upload_and_finalize(&h, source.id, b"verified bytes").await;
    let card_id = publish_card(&h, vec![source.id]).await;

    h.lifecycle
        .dispute(card_id, "contested", 3, "editor-2")
        .await
        .unwrap();

    // Citation rows reflect the last publish; the gate stays open
    let download = h.verifier.generate_download_url(source.id).await;
    assert!(download.is_ok());
}
