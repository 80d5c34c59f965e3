//! Summary and manifest writer.
//!
//! Every file is written atomically (temp file, then rename) and its SHA-256
//! is returned so the run manifest can record it.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

use bookdigest_shared::{BookDigestError, ImageContext, Result, RunManifest};

/// Name of the run manifest inside a book folder.
pub const MANIFEST_FILE: &str = "manifest.json";

/// A file written into the book folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFile {
    pub path: PathBuf,
    pub sha256: String,
    pub size_bytes: usize,
}

impl WrittenFile {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Render a section summary file.
///
/// ```text
/// # Chapter: <raw name>
///
/// <summary>
///
/// ## Images
///
/// - ![alt](chapter_1_image_1.png)
/// ```
///
/// The images block only appears when the section has images.
pub fn render_summary(raw_name: &str, summary: &str, images: &[ImageContext]) -> String {
    let mut content = format!("# Chapter: {raw_name}\n\n{}\n", summary.trim_end());

    if !images.is_empty() {
        content.push_str("\n## Images\n\n");
        for image in images {
            content.push_str(&format!("- ![{}]({})\n", image.alt_text, image.file_name()));
        }
    }

    content
}

/// Write `<identifier>.md` into `output_dir`.
#[instrument(skip(content), fields(dir = %output_dir.display()))]
pub fn write_summary(output_dir: &Path, identifier: &str, content: &str) -> Result<WrittenFile> {
    write_document(output_dir, &format!("{identifier}.md"), content)
}

/// Write an arbitrary text document into `output_dir` atomically.
pub fn write_document(output_dir: &Path, file_name: &str, content: &str) -> Result<WrittenFile> {
    std::fs::create_dir_all(output_dir).map_err(|e| BookDigestError::io(output_dir, e))?;

    let target = output_dir.join(file_name);
    let temp = output_dir.join(format!(".{file_name}.tmp"));

    std::fs::write(&temp, content).map_err(|e| BookDigestError::io(&temp, e))?;
    std::fs::rename(&temp, &target).map_err(|e| BookDigestError::io(&target, e))?;

    let sha256 = sha256_hex(content.as_bytes());
    debug!(file = %file_name, size = content.len(), "wrote document");

    Ok(WrittenFile {
        path: target,
        sha256,
        size_bytes: content.len(),
    })
}

/// Write `manifest.json` (pretty-printed).
pub fn write_manifest(output_dir: &Path, manifest: &RunManifest) -> Result<WrittenFile> {
    let json = serde_json::to_string_pretty(manifest).map_err(|e| {
        BookDigestError::validation(format!("JSON serialization failed: {e}"))
    })?;
    write_document(output_dir, MANIFEST_FILE, &json)
}

/// Read a previously written manifest back.
pub fn read_manifest(output_dir: &Path) -> Result<RunManifest> {
    let path = output_dir.join(MANIFEST_FILE);
    let content = std::fs::read_to_string(&path).map_err(|e| BookDigestError::io(&path, e))?;
    serde_json::from_str(&content)
        .map_err(|e| BookDigestError::validation(format!("invalid {MANIFEST_FILE}: {e}")))
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
