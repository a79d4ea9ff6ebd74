//! Source verification integration tests
//!
//! The upload → finalize saga, content addressing, manifest signing,
//! size/MIME rejection, the failed-then-recovered path, and snapshot
//! capture against a local HTTP listener.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use uuid::Uuid;

use cardea::adapters::Ed25519Signer;
use cardea::core::{EngineError, PublicationGate, SourceVerifier, VerifierLimits};
use cardea::domain::{DocumentKind, SourceInput, VerificationManifest, VerificationStatus};
use cardea::storage::{DocumentStore, LocalObjectStore, ObjectStore, SqliteDocumentStore};
use tempfile::TempDir;

struct Harness {
    verifier: SourceVerifier,
    objects: Arc<dyn ObjectStore>,
    objects_root: std::path::PathBuf,
    _tmp: TempDir,
}

fn harness_with_limits(limits: VerifierLimits) -> Harness {
    let tmp = TempDir::new().unwrap();
    let objects_root = tmp.path().join("objects");
    let store: Arc<dyn DocumentStore> = Arc::new(SqliteDocumentStore::open_in_memory().unwrap());
    let objects: Arc<dyn ObjectStore> = Arc::new(LocalObjectStore::new(objects_root.clone()));
    let signer = Arc::new(Ed25519Signer::generate());
    let gate = PublicationGate::new(Arc::clone(&store));
    let verifier =
        SourceVerifier::new(store, Arc::clone(&objects), signer, gate, limits).unwrap();
    Harness {
        verifier,
        objects,
        objects_root,
        _tmp: tmp,
    }
}

fn harness() -> Harness {
    harness_with_limits(VerifierLimits::default())
}

fn source_input() -> SourceInput {
    SourceInput {
        title: "Registry filing".to_string(),
        publisher: "Handelsregister".to_string(),
        origin_url: "https://example.com/filing.pdf".to_string(),
        retrieved_at: Utc::now(),
        kind: DocumentKind::Filing,
    }
}

/// Count files under the objects root (recursive)
fn object_count(root: &Path) -> usize {
    if !root.exists() {
        return 0;
    }
    let mut count = 0;
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir).unwrap() {
            let entry = entry.unwrap();
            if entry.file_type().unwrap().is_dir() {
                stack.push(entry.path());
            } else {
                count += 1;
            }
        }
    }
    count
}

/// Serve one HTTP response on a local listener, returning its URL
async fn serve_once(
    body: Vec<u8>,
    content_type: &'static str,
    declared_length: Option<u64>,
) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = [0u8; 2048];
        let _ = socket.read(&mut request).await;

        let mut response = format!("HTTP/1.1 200 OK\r\nContent-Type: {}\r\n", content_type);
        if let Some(length) = declared_length {
            response += &format!("Content-Length: {}\r\n", length);
        }
        response += "Connection: close\r\n\r\n";

        socket.write_all(response.as_bytes()).await.unwrap();
        let _ = socket.write_all(&body).await;
        let _ = socket.shutdown().await;
    });

    format!("http://{}/document", addr)
}

#[tokio::test]
async fn test_upload_finalize_verifies_and_signs() {
    let h = harness();
    let bytes = b"%PDF-1.7 filing body";

    let source = h.verifier.create(source_input(), "editor-1").await.unwrap();
    let target = h
        .verifier
        .request_upload(source.id, "application/pdf", "editor-1")
        .await
        .unwrap();
    h.objects
        .put(&target.key, bytes, "application/pdf")
        .await
        .unwrap();

    let verified = h.verifier.finalize(source.id, "editor-1").await.unwrap();

    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let expected_hash = hex::encode(hasher.finalize());

    assert_eq!(verified.verification, VerificationStatus::Verified);
    assert_eq!(verified.sha256.as_deref(), Some(expected_hash.as_str()));
    assert_eq!(verified.byte_length, Some(bytes.len() as u64));
    assert_eq!(
        verified.storage_key.as_deref(),
        Some(format!("sources/{}/{}.pdf", source.id, expected_hash).as_str())
    );

    // The staged object is gone, the addressed object exists
    assert!(h.objects.head(&target.key).await.unwrap().is_none());
    assert!(h
        .objects
        .head(verified.storage_key.as_deref().unwrap())
        .await
        .unwrap()
        .is_some());

    // The persisted manifest bytes verify against the recorded signature
    let manifest_key = verified.manifest_key.as_deref().unwrap();
    let mut reader = h.objects.reader(manifest_key).await.unwrap();
    let mut manifest_bytes = Vec::new();
    reader.read_to_end(&mut manifest_bytes).await.unwrap();

    let manifest = VerificationManifest::from_bytes(&manifest_bytes).unwrap();
    assert_eq!(manifest.sha256, expected_hash);
    assert_eq!(manifest.source_id, source.id);
    assert_eq!(manifest.algorithm, "Ed25519");

    let signature_bytes = hex::decode(verified.signature.as_deref().unwrap()).unwrap();
    let signature = Signature::from_slice(&signature_bytes).unwrap();
    let public_key = h.verifier.signing_public_key().await.unwrap();
    let public_key = VerifyingKey::from_bytes(&public_key.try_into().unwrap()).unwrap();
    assert!(public_key.verify(&manifest_bytes, &signature).is_ok());
}

#[tokio::test]
async fn test_finalize_probes_every_allowed_extension() {
    let h = harness();
    let source = h.verifier.create(source_input(), "editor-1").await.unwrap();

    let target = h
        .verifier
        .request_upload(source.id, "image/webp", "editor-1")
        .await
        .unwrap();
    assert!(target.key.ends_with(".webp"));
    h.objects
        .put(&target.key, b"RIFF....WEBP", "image/webp")
        .await
        .unwrap();

    let verified = h.verifier.finalize(source.id, "editor-1").await.unwrap();
    assert!(verified.storage_key.unwrap().ends_with(".webp"));
}

#[tokio::test]
async fn test_finalize_without_staged_object_is_not_found() {
    let h = harness();
    let source = h.verifier.create(source_input(), "editor-1").await.unwrap();

    let err = h.verifier.finalize(source.id, "editor-1").await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound { .. }));
}

#[tokio::test]
async fn test_disallowed_mime_rejected_before_storage() {
    let h = harness();
    let source = h.verifier.create(source_input(), "editor-1").await.unwrap();

    let err = h
        .verifier
        .request_upload(source.id, "application/zip", "editor-1")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidMimeType(_)));

    // No staging object was created
    assert_eq!(object_count(&h.objects_root), 0);
}

#[tokio::test]
async fn test_same_bytes_twice_same_address_no_duplicate_growth() {
    let h = harness();
    let bytes = b"identical content";

    let source = h.verifier.create(source_input(), "editor-1").await.unwrap();
    let target = h
        .verifier
        .request_upload(source.id, "application/pdf", "editor-1")
        .await
        .unwrap();
    h.objects.put(&target.key, bytes, "application/pdf").await.unwrap();
    let first = h.verifier.finalize(source.id, "editor-1").await.unwrap();

    let objects_after_first = object_count(&h.objects_root);

    // Second upload of the same bytes, re-finalized
    let target = h
        .verifier
        .request_upload(source.id, "application/pdf", "editor-1")
        .await
        .unwrap();
    h.objects.put(&target.key, bytes, "application/pdf").await.unwrap();
    let second = h.verifier.finalize(source.id, "editor-1").await.unwrap();

    assert_eq!(first.storage_key, second.storage_key);
    assert_eq!(first.sha256, second.sha256);
    // Content object and manifest were re-written in place, not duplicated
    assert_eq!(object_count(&h.objects_root), objects_after_first);
}

#[tokio::test]
async fn test_different_bytes_land_at_new_address() {
    let h = harness();
    let source = h.verifier.create(source_input(), "editor-1").await.unwrap();

    let target = h
        .verifier
        .request_upload(source.id, "application/pdf", "editor-1")
        .await
        .unwrap();
    h.objects.put(&target.key, b"first revision", "application/pdf").await.unwrap();
    let first = h.verifier.finalize(source.id, "editor-1").await.unwrap();

    let target = h
        .verifier
        .request_upload(source.id, "application/pdf", "editor-1")
        .await
        .unwrap();
    h.objects.put(&target.key, b"second revision", "application/pdf").await.unwrap();
    let second = h.verifier.finalize(source.id, "editor-1").await.unwrap();

    assert_ne!(first.sha256, second.sha256);
    assert_ne!(first.storage_key, second.storage_key);

    // The first address is never overwritten
    assert!(h
        .objects
        .head(first.storage_key.as_deref().unwrap())
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_oversize_upload_fails_closed_then_recovers() {
    let h = harness_with_limits(VerifierLimits {
        max_source_bytes: 16,
        ..Default::default()
    });
    let source = h.verifier.create(source_input(), "editor-1").await.unwrap();

    let target = h
        .verifier
        .request_upload(source.id, "application/pdf", "editor-1")
        .await
        .unwrap();
    h.objects
        .put(&target.key, b"way more than sixteen bytes", "application/pdf")
        .await
        .unwrap();

    let err = h.verifier.finalize(source.id, "editor-1").await.unwrap_err();
    assert!(matches!(err, EngineError::FileTooLarge { .. }));

    // Deterministic rejection is persisted
    let failed = h.verifier.get(source.id).await.unwrap();
    assert_eq!(failed.verification, VerificationStatus::Failed);
    assert!(failed.sha256.is_none());

    // Recovery path: stage a conforming object and re-finalize
    let target = h
        .verifier
        .request_upload(source.id, "application/pdf", "editor-1")
        .await
        .unwrap();
    h.objects.put(&target.key, b"small enough", "application/pdf").await.unwrap();
    let verified = h.verifier.finalize(source.id, "editor-1").await.unwrap();
    assert_eq!(verified.verification, VerificationStatus::Verified);
}

#[tokio::test]
async fn test_refinalize_converges_after_partial_saga() {
    let h = harness();
    let bytes = b"saga bytes";

    let source = h.verifier.create(source_input(), "editor-1").await.unwrap();
    let target = h
        .verifier
        .request_upload(source.id, "application/pdf", "editor-1")
        .await
        .unwrap();
    h.objects.put(&target.key, bytes, "application/pdf").await.unwrap();
    let first = h.verifier.finalize(source.id, "editor-1").await.unwrap();

    // Simulate a saga that copied and sealed but died before deleting the
    // staged object: restage the same bytes and re-invoke from the top
    h.objects.put(&target.key, bytes, "application/pdf").await.unwrap();
    let second = h.verifier.finalize(source.id, "editor-1").await.unwrap();

    // Same bytes converge on the same content address; the re-signed
    // manifest still verifies against the re-recorded signature
    assert_eq!(first.storage_key, second.storage_key);
    assert_eq!(first.sha256, second.sha256);
    assert_eq!(second.verification, VerificationStatus::Verified);
    assert!(h.objects.head(&target.key).await.unwrap().is_none());

    let mut reader = h
        .objects
        .reader(second.manifest_key.as_deref().unwrap())
        .await
        .unwrap();
    let mut manifest_bytes = Vec::new();
    reader.read_to_end(&mut manifest_bytes).await.unwrap();
    let signature_bytes = hex::decode(second.signature.as_deref().unwrap()).unwrap();
    let signature = Signature::from_slice(&signature_bytes).unwrap();
    let public_key = h.verifier.signing_public_key().await.unwrap();
    let public_key = VerifyingKey::from_bytes(&public_key.try_into().unwrap()).unwrap();
    assert!(public_key.verify(&manifest_bytes, &signature).is_ok());
}

#[tokio::test]
async fn test_snapshot_capture_verifies_fetched_page() {
    let h = harness();
    let body = b"<html><body>Acme press release</body></html>".to_vec();
    let url = serve_once(body.clone(), "text/html; charset=utf-8", Some(body.len() as u64)).await;

    let source = h.verifier.create(source_input(), "ingest-bot").await.unwrap();
    let verified = h
        .verifier
        .capture_snapshot(source.id, &url, "ingest-bot", None)
        .await
        .unwrap();

    let mut hasher = Sha256::new();
    hasher.update(&body);
    let expected_hash = hex::encode(hasher.finalize());

    assert_eq!(verified.verification, VerificationStatus::Verified);
    assert_eq!(verified.sha256.as_deref(), Some(expected_hash.as_str()));
    assert_eq!(verified.origin_url, url);
    assert!(verified.storage_key.unwrap().ends_with(".html"));

    // Manifest was persisted alongside the bytes
    assert!(h
        .objects
        .head(verified.manifest_key.as_deref().unwrap())
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_snapshot_rejects_declared_oversize_before_reading() {
    let h = harness();
    // Declared length far over the cap; body never matters
    let url = serve_once(Vec::new(), "text/html", Some(50 * 1024 * 1024)).await;

    let source = h.verifier.create(source_input(), "ingest-bot").await.unwrap();
    let err = h
        .verifier
        .capture_snapshot(source.id, &url, "ingest-bot", Some(1024))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::FileTooLarge { .. }));

    let failed = h.verifier.get(source.id).await.unwrap();
    assert_eq!(failed.verification, VerificationStatus::Failed);
}

#[tokio::test]
async fn test_snapshot_rejects_actual_oversize_despite_missing_header() {
    let h = harness();
    // No Content-Length header: the declared check cannot catch this one
    let body = vec![b'x'; 4096];
    let url = serve_once(body, "text/html", None).await;

    let source = h.verifier.create(source_input(), "ingest-bot").await.unwrap();
    let err = h
        .verifier
        .capture_snapshot(source.id, &url, "ingest-bot", Some(1024))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::FileTooLarge { .. }));
}

#[tokio::test]
async fn test_snapshot_rejects_disallowed_content_type() {
    let h = harness();
    let url = serve_once(b"PK\x03\x04".to_vec(), "application/zip", Some(4)).await;

    let source = h.verifier.create(source_input(), "ingest-bot").await.unwrap();
    let err = h
        .verifier
        .capture_snapshot(source.id, &url, "ingest-bot", None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidMimeType(_)));

    // Content-type rejection is not a size rejection; the record stays pending
    let source = h.verifier.get(source.id).await.unwrap();
    assert_eq!(source.verification, VerificationStatus::Pending);
}

#[tokio::test]
async fn test_get_verification_exposes_reverification_metadata() {
    let h = harness();
    let bytes = b"attested bytes";

    let source = h.verifier.create(source_input(), "editor-1").await.unwrap();
    let target = h
        .verifier
        .request_upload(source.id, "application/pdf", "editor-1")
        .await
        .unwrap();
    h.objects.put(&target.key, bytes, "application/pdf").await.unwrap();
    h.verifier.finalize(source.id, "editor-1").await.unwrap();

    let verification = h.verifier.get_verification(source.id).await.unwrap();
    assert_eq!(verification.status, VerificationStatus::Verified);
    assert!(verification.sha256.is_some());
    assert!(verification.manifest_key.is_some());
    assert!(verification.signature.is_some());
    assert_eq!(verification.algorithm.as_deref(), Some("Ed25519"));
    assert!(verification
        .signing_key_id
        .as_deref()
        .unwrap()
        .starts_with("ed25519:"));

    let missing = h.verifier.get_verification(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(missing, EngineError::NotFound { .. }));
}
