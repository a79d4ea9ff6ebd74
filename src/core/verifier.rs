//! Source verification: staging, hashing, content-addressing, manifest
//! signing, and the public download gate.
//!
//! `finalize` and `capture_snapshot` are multi-step sagas with no
//! compensating rollback. Every step is idempotent by construction: the
//! final object key is a pure function of the bytes, re-copying to it is
//! harmless, and re-signing identical manifest bytes yields the same
//! signature. The staged object is deleted only after the record update, so
//! a failed run can simply be re-invoked from the top.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tracing::{debug, info};
use uuid::Uuid;

use crate::adapters::{FetchedDocument, ManifestSigner, SnapshotFetcher};
use crate::domain::{
    MediaType, Source, SourceInput, VerificationManifest, VerificationStatus,
};
use crate::storage::{keys, DocumentStore, ObjectStore, PresignedUrl, PutCondition};

use super::errors::EngineError;
use super::gate::PublicationGate;

/// Size and time bounds for verification operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifierLimits {
    /// Maximum size of an uploaded source object (default: 25 MiB)
    #[serde(default = "default_max_source_bytes")]
    pub max_source_bytes: u64,

    /// Default cap for snapshot fetches (default: 5 MiB)
    #[serde(default = "default_snapshot_max_bytes")]
    pub snapshot_max_bytes: u64,

    /// Wall-clock timeout for outbound fetches (default: 30s)
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_seconds: u64,

    /// Lifetime of presigned upload targets (default: 15 min)
    #[serde(default = "default_upload_ttl")]
    pub upload_ttl_seconds: u64,

    /// Lifetime of presigned download URLs (default: 5 min)
    #[serde(default = "default_download_ttl")]
    pub download_ttl_seconds: u64,
}

fn default_max_source_bytes() -> u64 {
    25 * 1024 * 1024
}
fn default_snapshot_max_bytes() -> u64 {
    5 * 1024 * 1024
}
fn default_fetch_timeout() -> u64 {
    30
}
fn default_upload_ttl() -> u64 {
    900
}
fn default_download_ttl() -> u64 {
    300
}

impl Default for VerifierLimits {
    fn default() -> Self {
        Self {
            max_source_bytes: default_max_source_bytes(),
            snapshot_max_bytes: default_snapshot_max_bytes(),
            fetch_timeout_seconds: default_fetch_timeout(),
            upload_ttl_seconds: default_upload_ttl(),
            download_ttl_seconds: default_download_ttl(),
        }
    }
}

/// A presigned write target for a staged upload
#[derive(Debug, Clone)]
pub struct UploadTarget {
    pub url: String,
    pub key: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

/// A presigned public download
#[derive(Debug, Clone)]
pub struct DownloadUrl {
    pub url: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub filename: String,
}

/// Public-readable verification metadata for independent re-verification
#[derive(Debug, Clone, Serialize)]
pub struct SourceVerification {
    pub source_id: Uuid,
    pub status: VerificationStatus,
    pub sha256: Option<String>,
    pub byte_length: Option<u64>,
    pub media_type: Option<MediaType>,
    pub manifest_key: Option<String>,
    pub signature: Option<String>,
    pub signing_key_id: Option<String>,
    pub algorithm: Option<String>,
}

/// Owns the source lifecycle: create, stage, verify, and the download gate
pub struct SourceVerifier {
    store: Arc<dyn DocumentStore>,
    objects: Arc<dyn ObjectStore>,
    signer: Arc<dyn ManifestSigner>,
    gate: PublicationGate,
    fetcher: SnapshotFetcher,
    limits: VerifierLimits,
}

impl SourceVerifier {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        objects: Arc<dyn ObjectStore>,
        signer: Arc<dyn ManifestSigner>,
        gate: PublicationGate,
        limits: VerifierLimits,
    ) -> Result<Self, EngineError> {
        let fetcher = SnapshotFetcher::new(Duration::from_secs(limits.fetch_timeout_seconds))?;
        Ok(Self {
            store,
            objects,
            signer,
            gate,
            fetcher,
            limits,
        })
    }

    /// Create a new pending source record
    pub async fn create(&self, input: SourceInput, actor: &str) -> Result<Source, EngineError> {
        let source = Source::new(input, actor);
        self.store
            .put(keys::source_item(&source)?, PutCondition::IfAbsent)
            .await?;

        info!(source_id = %source.id, "Source created");
        Ok(source)
    }

    /// Load a source record
    pub async fn get(&self, source_id: Uuid) -> Result<Source, EngineError> {
        let item = self
            .store
            .get(&keys::source_pk(source_id), keys::SOURCE_META_SK)
            .await?
            .ok_or_else(|| EngineError::not_found("source", source_id))?;
        keys::from_item(&item).map_err(EngineError::from)
    }

    /// Issue a short-lived write target for a staged upload.
    ///
    /// The declared MIME type is checked against the allow-list before any
    /// storage interaction. The staging key is derived from the source id.
    pub async fn request_upload(
        &self,
        source_id: Uuid,
        declared_content_type: &str,
        actor: &str,
    ) -> Result<UploadTarget, EngineError> {
        let media = MediaType::from_mime(declared_content_type)
            .ok_or_else(|| EngineError::InvalidMimeType(declared_content_type.to_string()))?;

        // The source must exist; any status may stage a new upload, since
        // re-verifying different bytes lands at a new content address.
        let source = self.get(source_id).await?;

        let key = keys::staging_object_key(source.id, media.extension());
        let ttl = Duration::from_secs(self.limits.upload_ttl_seconds);
        let presigned = self.objects.presign_put(&key, media.mime(), ttl).await?;

        debug!(source_id = %source_id, key = %key, by = %actor, "Upload target issued");
        Ok(UploadTarget {
            url: presigned.url,
            key,
            expires_at: presigned.expires_at,
        })
    }

    /// Verify a staged upload: probe, size-check, hash, address, sign, persist.
    pub async fn finalize(&self, source_id: Uuid, actor: &str) -> Result<Source, EngineError> {
        let mut source = self.get(source_id).await?;

        // Probe the staging location across each allowed extension
        let mut staged = None;
        for media in MediaType::ALL {
            let key = keys::staging_object_key(source_id, media.extension());
            if let Some(meta) = self.objects.head(&key).await? {
                staged = Some((media, key, meta));
                break;
            }
        }
        let (media, staging_key, meta) = staged
            .ok_or_else(|| EngineError::not_found("staged object", source_id))?;

        // Actual object size, checked before hashing
        if meta.size > self.limits.max_source_bytes {
            self.persist_failed(&mut source, actor).await?;
            return Err(EngineError::FileTooLarge {
                actual: meta.size,
                limit: self.limits.max_source_bytes,
            });
        }

        // Stream the object through the hash without buffering it
        let (sha256, byte_length) = self.hash_object(&staging_key).await?;

        let storage_key = keys::content_object_key(source_id, &sha256, media.extension());
        self.objects.copy(&staging_key, &storage_key).await?;

        self.seal(&mut source, &sha256, byte_length, media, &storage_key, actor)
            .await?;

        // Deleted last so a failed saga can be re-invoked from the top; a
        // transient staging/final duplicate is harmless, the final key is
        // idempotent.
        self.objects.delete(&staging_key).await?;

        info!(source_id = %source_id, sha256 = %sha256, "Source verified from upload");
        Ok(source)
    }

    /// Verify an externally discovered document by fetching it directly.
    ///
    /// The same hash → address → sign → persist sequence as `finalize`, with
    /// the fetch bounded by a wall-clock timeout and a byte cap checked both
    /// against the declared length and the bytes actually read.
    pub async fn capture_snapshot(
        &self,
        source_id: Uuid,
        url: &str,
        actor: &str,
        max_bytes: Option<u64>,
    ) -> Result<Source, EngineError> {
        let mut source = self.get(source_id).await?;
        let cap = max_bytes.unwrap_or(self.limits.snapshot_max_bytes);

        let FetchedDocument { bytes, media_type } = match self.fetcher.fetch(url, cap).await {
            Ok(doc) => doc,
            Err(err @ EngineError::FileTooLarge { .. }) => {
                self.persist_failed(&mut source, actor).await?;
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let sha256 = hex::encode(hasher.finalize());
        let byte_length = bytes.len() as u64;

        let storage_key = keys::content_object_key(source_id, &sha256, media_type.extension());
        self.objects
            .put(&storage_key, &bytes, media_type.mime())
            .await?;

        source.origin_url = url.to_string();
        source.retrieved_at = Utc::now();
        self.seal(&mut source, &sha256, byte_length, media_type, &storage_key, actor)
            .await?;

        info!(source_id = %source_id, sha256 = %sha256, url = %url, "Source verified from snapshot");
        Ok(source)
    }

    /// Public download gate. Missing, pending, failed, and uncited sources
    /// are all indistinguishable to the caller.
    pub async fn generate_download_url(
        &self,
        source_id: Uuid,
    ) -> Result<DownloadUrl, EngineError> {
        let item = self
            .store
            .get(&keys::source_pk(source_id), keys::SOURCE_META_SK)
            .await?;
        let source: Source = match item {
            Some(item) => keys::from_item(&item)?,
            None => return Err(EngineError::SourceNotPublic),
        };

        self.gate.can_download(&source).await?;

        let storage_key = source
            .storage_key
            .as_deref()
            .ok_or(EngineError::SourceNotPublic)?;
        let ttl = Duration::from_secs(self.limits.download_ttl_seconds);
        let presigned: PresignedUrl = self.objects.presign_get(storage_key, ttl).await?;

        debug!(source_id = %source_id, "Download URL issued");
        Ok(DownloadUrl {
            url: presigned.url,
            expires_at: presigned.expires_at,
            filename: source.download_filename(),
        })
    }

    /// Verification metadata for independent third-party re-verification
    pub async fn get_verification(
        &self,
        source_id: Uuid,
    ) -> Result<SourceVerification, EngineError> {
        let source = self.get(source_id).await?;
        Ok(SourceVerification {
            source_id: source.id,
            status: source.verification,
            sha256: source.sha256,
            byte_length: source.byte_length,
            media_type: source.media_type,
            manifest_key: source.manifest_key,
            signature: source.signature,
            signing_key_id: source.signing_key_id,
            algorithm: source.signing_algorithm,
        })
    }

    /// Public key of the active signing key, for manifest verification
    pub async fn signing_public_key(&self) -> Result<Vec<u8>, EngineError> {
        Ok(self.signer.public_key().await?)
    }

    /// Stream an object through SHA-256, returning the hex digest and length
    async fn hash_object(&self, key: &str) -> Result<(String, u64), EngineError> {
        let mut reader = self.objects.reader(key).await?;
        let mut hasher = Sha256::new();
        let mut total: u64 = 0;
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let n = reader
                .read(&mut buf)
                .await
                .map_err(|e| EngineError::Dependency(e.into()))?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            total += n as u64;
        }
        Ok((hex::encode(hasher.finalize()), total))
    }

    /// Build, sign, and persist the manifest, then write the verified record
    async fn seal(
        &self,
        source: &mut Source,
        sha256: &str,
        byte_length: u64,
        media: MediaType,
        storage_key: &str,
        actor: &str,
    ) -> Result<(), EngineError> {
        let manifest_key = keys::manifest_object_key(source.id, sha256);
        let manifest = VerificationManifest {
            source_id: source.id,
            storage_key: storage_key.to_string(),
            sha256: sha256.to_string(),
            byte_length,
            media_type: media.mime().to_string(),
            retrieved_at: source.retrieved_at,
            publisher: source.publisher.clone(),
            origin_url: source.origin_url.clone(),
            verified_at: Utc::now(),
            algorithm: self.signer.algorithm().to_string(),
            signing_key_id: self.signer.key_id().to_string(),
        };

        let manifest_bytes = manifest.canonical_bytes()?;
        let signature = self.signer.sign(&manifest_bytes).await?;
        self.objects
            .put(&manifest_key, &manifest_bytes, "application/json")
            .await?;

        source.sha256 = Some(sha256.to_string());
        source.byte_length = Some(byte_length);
        source.media_type = Some(media);
        source.storage_key = Some(storage_key.to_string());
        source.manifest_key = Some(manifest_key);
        source.signature = Some(hex::encode(signature));
        source.signing_key_id = Some(manifest.signing_key_id);
        source.signing_algorithm = Some(manifest.algorithm);
        source.verification = VerificationStatus::Verified;
        source.updated_at = Utc::now();
        source.updated_by = actor.to_string();

        self.store
            .put(keys::source_item(source)?, PutCondition::Overwrite)
            .await?;
        Ok(())
    }

    /// Record a deterministic rejection. Transient failures never land here;
    /// they leave the record pending so the saga can be re-invoked.
    async fn persist_failed(&self, source: &mut Source, actor: &str) -> Result<(), EngineError> {
        source.verification = VerificationStatus::Failed;
        source.updated_at = Utc::now();
        source.updated_by = actor.to_string();
        self.store
            .put(keys::source_item(source)?, PutCondition::Overwrite)
            .await?;
        Ok(())
    }
}
