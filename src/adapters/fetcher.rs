//! Bounded HTTP fetch for snapshot capture.
//!
//! Outbound fetches run under a fixed wall-clock timeout and a byte cap that
//! is enforced twice: once against the declared `Content-Length` (an
//! untrusted hint, checked before reading the body) and once against the
//! bytes actually read. A body is never buffered past the cap.

use std::time::Duration;

use anyhow::Context;
use reqwest::header::CONTENT_TYPE;

use crate::core::errors::EngineError;
use crate::domain::MediaType;

/// A fetched document, within bounds and of an allowed media type
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    pub bytes: Vec<u8>,
    pub media_type: MediaType,
}

/// HTTP fetcher with a client-level wall-clock timeout
pub struct SnapshotFetcher {
    client: reqwest::Client,
}

impl SnapshotFetcher {
    pub fn new(timeout: Duration) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }

    /// Fetch `url`, rejecting oversize or disallowed responses.
    pub async fn fetch(&self, url: &str, max_bytes: u64) -> Result<FetchedDocument, EngineError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", url))?
            .error_for_status()
            .with_context(|| format!("Fetch of {} returned an error status", url))?;

        let media_type = match response.headers().get(CONTENT_TYPE) {
            Some(value) => {
                let raw = value.to_str().unwrap_or_default();
                MediaType::from_mime(raw)
                    .ok_or_else(|| EngineError::InvalidMimeType(raw.to_string()))?
            }
            None => return Err(EngineError::InvalidMimeType("<missing>".to_string())),
        };

        // First check: the declared length, before touching the body
        if let Some(declared) = response.content_length() {
            if declared > max_bytes {
                return Err(EngineError::FileTooLarge {
                    actual: declared,
                    limit: max_bytes,
                });
            }
        }

        // Second check: the bytes actually read; never trust the header alone
        let mut response = response;
        let mut bytes: Vec<u8> = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .with_context(|| format!("Failed reading body from {}", url))?
        {
            if bytes.len() as u64 + chunk.len() as u64 > max_bytes {
                return Err(EngineError::FileTooLarge {
                    actual: bytes.len() as u64 + chunk.len() as u64,
                    limit: max_bytes,
                });
            }
            bytes.extend_from_slice(&chunk);
        }

        Ok(FetchedDocument { bytes, media_type })
    }
}
