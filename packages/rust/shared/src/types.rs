//! Core domain types for bookdigest runs.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current schema version for the run manifest format.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Content units
// ---------------------------------------------------------------------------

/// What an archive member is, as far as the pipeline cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    /// A textual section (XHTML/HTML).
    Document,
    /// A binary asset such as an image.
    Asset,
    /// Anything else (stylesheets, fonts, navigation data).
    Other,
}

/// Read-only view of one archive member.
///
/// Any archive library can sit behind this trait; the core only needs the
/// name, the kind, and the raw bytes.
pub trait ContentUnit {
    /// Archive-relative name as the container lists it.
    fn raw_name(&self) -> &str;

    /// Member kind.
    fn kind(&self) -> UnitKind;

    /// Raw member bytes.
    fn body(&self) -> &[u8];

    /// Declared media type, when the container records one.
    fn media_type(&self) -> Option<&str> {
        None
    }

    /// The body decoded as UTF-8 (lossy).
    fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.body())
    }
}

/// An owned archive member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveItem {
    pub name: String,
    pub kind: UnitKind,
    pub media_type: Option<String>,
    pub content: Vec<u8>,
}

impl ArchiveItem {
    /// A textual section.
    pub fn document(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            kind: UnitKind::Document,
            media_type: Some("application/xhtml+xml".into()),
            content: content.into(),
        }
    }

    /// A binary asset with an explicit media type.
    pub fn asset(
        name: impl Into<String>,
        media_type: impl Into<String>,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: UnitKind::Asset,
            media_type: Some(media_type.into()),
            content: content.into(),
        }
    }

    /// Any other member.
    pub fn other(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            kind: UnitKind::Other,
            media_type: None,
            content: content.into(),
        }
    }
}

impl ContentUnit for ArchiveItem {
    fn raw_name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> UnitKind {
        self.kind
    }

    fn body(&self) -> &[u8] {
        &self.content
    }

    fn media_type(&self) -> Option<&str> {
        self.media_type.as_deref()
    }
}

/// Asset path → bytes. Ordered so logs and manifests are stable.
pub type AssetMap = BTreeMap<String, Vec<u8>>;

/// One image associated with a section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageContext {
    /// Where the image bytes were written.
    pub asset_path: PathBuf,
    /// The reference's `alt` text, or empty.
    pub alt_text: String,
}

impl ImageContext {
    /// File name part of `asset_path`, used for relative links.
    pub fn file_name(&self) -> String {
        self.asset_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// RunManifest
// ---------------------------------------------------------------------------

/// What happened to one document section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum SectionOutcome {
    /// Summary written.
    Summarized,
    /// Front/back matter; never sent to the generation service.
    Excluded { reason: String },
    /// Body below the minimum length.
    SkippedEmpty,
    /// Generation gave up (permanent error or retries exhausted).
    Failed { reason: String },
}

/// Manifest entry for one document section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionRecord {
    /// Name as it appears in the archive.
    pub raw_name: String,
    /// Canonical identifier (filename stem).
    pub identifier: String,
    /// Title extracted from the section body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(flatten)]
    pub outcome: SectionOutcome,
    /// Summary file name, when one was written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_file: Option<String>,
    /// SHA-256 of the summary file contents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    /// Image file names extracted for this section, in scan order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

/// The `manifest.json` written at the root of each book output folder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    /// Schema version for forward compatibility.
    pub schema_version: u32,
    /// Unique identifier for this run.
    pub run_id: RunId,
    /// Tool version that produced the output.
    pub tool_version: String,
    /// Book title from the package metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub book_title: Option<String>,
    /// Path of the source archive.
    pub source: String,
    /// Generation model.
    pub model: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    /// One record per document section, in archive order.
    pub sections: Vec<SectionRecord>,
    /// Book-level documents written after the per-section pass.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub synthesis: Vec<String>,
    /// Identifiers produced by more than one raw name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub collisions: BTreeMap<String, Vec<String>>,
}
