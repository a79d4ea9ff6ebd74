//! Object store collaborator for document bytes and manifests.
//!
//! Keys are hierarchical `/`-separated strings (`staging/...`,
//! `sources/{id}/{hash}.{ext}`). The engine only ever needs metadata reads,
//! streamed reads, puts, server-side copies, deletes, and short-lived
//! presigned read/write targets.
//!
//! The bundled implementation maps keys onto a directory tree and issues
//! `file://` URLs whose expiry is advisory; a deployment against a bucket
//! store implements the same trait with real presigning.

use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::AsyncRead;

/// Object metadata returned without the body
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    /// Size in bytes
    pub size: u64,

    /// Content type, when the backing store records one
    pub content_type: Option<String>,
}

/// A short-lived URL granting one operation on one key
#[derive(Debug, Clone)]
pub struct PresignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// The object store collaborator contract
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Metadata without the body; `None` when the key does not exist
    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>>;

    /// Streamed read of the object body
    async fn reader(&self, key: &str) -> Result<Pin<Box<dyn AsyncRead + Send>>>;

    /// Write an object
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<()>;

    /// Server-side copy; the source object is left in place
    async fn copy(&self, from: &str, to: &str) -> Result<()>;

    /// Delete an object (no error if already gone)
    async fn delete(&self, key: &str) -> Result<()>;

    /// Presigned read target
    async fn presign_get(&self, key: &str, ttl: Duration) -> Result<PresignedUrl>;

    /// Presigned write target
    async fn presign_put(&self, key: &str, content_type: &str, ttl: Duration)
        -> Result<PresignedUrl>;
}

/// Filesystem-backed object store rooted at a single directory
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a key to a path under the root, rejecting traversal
    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.starts_with('/') || key.split('/').any(|part| part == "..") {
            return Err(anyhow!("Invalid object key: {}", key));
        }
        Ok(self.root.join(key))
    }

    fn presign(&self, key: &str, ttl: Duration) -> Result<PresignedUrl> {
        let path = self.path_for(key)?;
        let expires_at = Utc::now()
            + chrono::Duration::from_std(ttl).context("Presign TTL out of range")?;
        Ok(PresignedUrl {
            url: format!("file://{}", path.display()),
            expires_at,
        })
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>> {
        let path = self.path_for(key)?;
        match fs::metadata(&path).await {
            Ok(meta) => Ok(Some(ObjectMeta {
                size: meta.len(),
                content_type: None,
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to stat object: {}", key)),
        }
    }

    async fn reader(&self, key: &str) -> Result<Pin<Box<dyn AsyncRead + Send>>> {
        let path = self.path_for(key)?;
        let file = fs::File::open(&path)
            .await
            .with_context(|| format!("Failed to open object: {}", key))?;
        Ok(Box::pin(file))
    }

    async fn put(&self, key: &str, bytes: &[u8], _content_type: &str) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create object directory: {}", parent.display()))?;
        }
        fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write object: {}", key))
    }

    async fn copy(&self, from: &str, to: &str) -> Result<()> {
        let src = self.path_for(from)?;
        let dst = self.path_for(to)?;
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create object directory: {}", parent.display()))?;
        }
        fs::copy(&src, &dst)
            .await
            .with_context(|| format!("Failed to copy object: {} -> {}", from, to))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to delete object: {}", key)),
        }
    }

    async fn presign_get(&self, key: &str, ttl: Duration) -> Result<PresignedUrl> {
        self.presign(key, ttl)
    }

    async fn presign_put(
        &self,
        key: &str,
        _content_type: &str,
        ttl: Duration,
    ) -> Result<PresignedUrl> {
        // Make sure the staging directory exists so the caller can write
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create object directory: {}", parent.display()))?;
        }
        self.presign(key, ttl)
    }
}
