//! Source records and the verification status lifecycle.
//!
//! A Source is a referenced document or page backing a claim. It is born
//! `Pending`, becomes `Verified` once its bytes have been hashed, stored at
//! a content-addressed location, and bound to a signed manifest, or lands in
//! `Failed` when the uploaded object is deterministically rejected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Verification status of a source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    /// Created, no verified bytes yet
    Pending,

    /// Bytes hashed, content-addressed, and manifest signed
    Verified,

    /// Deterministically rejected (oversize object); recoverable by a new
    /// upload followed by finalize
    Failed,
}

impl std::fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerificationStatus::Pending => write!(f, "pending"),
            VerificationStatus::Verified => write!(f, "verified"),
            VerificationStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Declared kind of a source document (what the document is, not its format)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Article,
    Filing,
    RegistryExtract,
    Report,
    PressRelease,
    Dataset,
    Other,
}

impl std::str::FromStr for DocumentKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "article" => Ok(DocumentKind::Article),
            "filing" => Ok(DocumentKind::Filing),
            "registry_extract" | "registry-extract" => Ok(DocumentKind::RegistryExtract),
            "report" => Ok(DocumentKind::Report),
            "press_release" | "press-release" => Ok(DocumentKind::PressRelease),
            "dataset" => Ok(DocumentKind::Dataset),
            "other" => Ok(DocumentKind::Other),
            _ => anyhow::bail!("Unknown document kind: {}", s),
        }
    }
}

/// The closed allow-list of storable media types.
///
/// Exactly six entries: one document format, one web-page format, four
/// image formats. Upload and snapshot paths reject anything else before
/// touching storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Pdf,
    Html,
    Png,
    Jpeg,
    Webp,
    Gif,
}

impl MediaType {
    /// Every allowed media type, in staging-probe order
    pub const ALL: [MediaType; 6] = [
        MediaType::Pdf,
        MediaType::Html,
        MediaType::Png,
        MediaType::Jpeg,
        MediaType::Webp,
        MediaType::Gif,
    ];

    /// The canonical MIME string
    pub fn mime(self) -> &'static str {
        match self {
            MediaType::Pdf => "application/pdf",
            MediaType::Html => "text/html",
            MediaType::Png => "image/png",
            MediaType::Jpeg => "image/jpeg",
            MediaType::Webp => "image/webp",
            MediaType::Gif => "image/gif",
        }
    }

    /// The storage-key extension for this media type
    pub fn extension(self) -> &'static str {
        match self {
            MediaType::Pdf => "pdf",
            MediaType::Html => "html",
            MediaType::Png => "png",
            MediaType::Jpeg => "jpg",
            MediaType::Webp => "webp",
            MediaType::Gif => "gif",
        }
    }

    /// Parse a MIME string (parameters such as `; charset=` are ignored)
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or("").trim();
        match essence.to_ascii_lowercase().as_str() {
            "application/pdf" => Some(MediaType::Pdf),
            "text/html" => Some(MediaType::Html),
            "image/png" => Some(MediaType::Png),
            "image/jpeg" => Some(MediaType::Jpeg),
            "image/webp" => Some(MediaType::Webp),
            "image/gif" => Some(MediaType::Gif),
            _ => None,
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.mime())
    }
}

/// A source document backing one or more evidence cards
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    /// Unique identifier
    pub id: Uuid,

    /// Human-readable title
    pub title: String,

    /// Publisher of the original document
    pub publisher: String,

    /// Where the document was originally retrieved from
    pub origin_url: String,

    /// When the document was retrieved from its origin
    pub retrieved_at: DateTime<Utc>,

    /// Declared kind of document
    pub kind: DocumentKind,

    /// Verification lifecycle status
    pub verification: VerificationStatus,

    /// SHA-256 of the verified bytes (hex); immutable once set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,

    /// Size of the verified bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub byte_length: Option<u64>,

    /// Media type of the verified bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<MediaType>,

    /// Content-addressed object key of the verified bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_key: Option<String>,

    /// Object key of the signed verification manifest
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_key: Option<String>,

    /// Signature over the manifest bytes (hex)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,

    /// Identifier of the signing key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signing_key_id: Option<String>,

    /// Signature algorithm identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signing_algorithm: Option<String>,

    /// When the record was created
    pub created_at: DateTime<Utc>,

    /// Actor that created the record
    pub created_by: String,

    /// When the record was last updated
    pub updated_at: DateTime<Utc>,

    /// Actor that last updated the record
    pub updated_by: String,
}

/// Input for creating a new source record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceInput {
    pub title: String,
    pub publisher: String,
    pub origin_url: String,
    pub retrieved_at: DateTime<Utc>,
    pub kind: DocumentKind,
}

impl Source {
    /// Create a new pending source from validated input
    pub fn new(input: SourceInput, actor: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: input.title,
            publisher: input.publisher,
            origin_url: input.origin_url,
            retrieved_at: input.retrieved_at,
            kind: input.kind,
            verification: VerificationStatus::Pending,
            sha256: None,
            byte_length: None,
            media_type: None,
            storage_key: None,
            manifest_key: None,
            signature: None,
            signing_key_id: None,
            signing_algorithm: None,
            created_at: now,
            created_by: actor.to_string(),
            updated_at: now,
            updated_by: actor.to_string(),
        }
    }

    /// Whether the source's bytes have been verified
    pub fn is_verified(&self) -> bool {
        self.verification == VerificationStatus::Verified
    }

    /// Suggested download filename: sanitized title plus the stored extension
    pub fn download_filename(&self) -> String {
        let stem: String = self
            .title
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
            .collect();
        let stem = stem.trim_matches('-').to_string();
        let stem = if stem.is_empty() { self.id.to_string() } else { stem };
        match self.media_type {
            Some(media) => format!("{}.{}", stem, media.extension()),
            None => stem,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type_allow_list_is_closed() {
        assert_eq!(MediaType::from_mime("application/pdf"), Some(MediaType::Pdf));
        assert_eq!(MediaType::from_mime("text/html; charset=utf-8"), Some(MediaType::Html));
        assert_eq!(MediaType::from_mime("IMAGE/JPEG"), Some(MediaType::Jpeg));

        assert_eq!(MediaType::from_mime("application/zip"), None);
        assert_eq!(MediaType::from_mime("text/plain"), None);
        assert_eq!(MediaType::from_mime("video/mp4"), None);
    }

    #[test]
    fn test_media_type_extension_round_trip() {
        for media in MediaType::ALL {
            assert_eq!(MediaType::from_mime(media.mime()), Some(media));
            assert!(!media.extension().contains('.'));
        }
    }

    #[test]
    fn test_new_source_is_pending() {
        let source = Source::new(
            SourceInput {
                title: "Annual Report 2025".to_string(),
                publisher: "Acme Corp".to_string(),
                origin_url: "https://example.com/report.pdf".to_string(),
                retrieved_at: Utc::now(),
                kind: DocumentKind::Report,
            },
            "editor-1",
        );

        assert_eq!(source.verification, VerificationStatus::Pending);
        assert!(source.sha256.is_none());
        assert_eq!(source.created_by, "editor-1");
    }

    #[test]
    fn test_download_filename() {
        let mut source = Source::new(
            SourceInput {
                title: "Annual Report, 2025!".to_string(),
                publisher: "Acme".to_string(),
                origin_url: "https://example.com/r.pdf".to_string(),
                retrieved_at: Utc::now(),
                kind: DocumentKind::Report,
            },
            "editor-1",
        );
        source.media_type = Some(MediaType::Pdf);

        assert_eq!(source.download_filename(), "annual-report--2025.pdf");
    }
}
