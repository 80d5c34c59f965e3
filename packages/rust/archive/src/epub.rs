//! EPUB container reader.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use tracing::{debug, info, instrument, warn};
use zip::ZipArchive;

use bookdigest_shared::{ArchiveItem, BookDigestError, Result, UnitKind};

use crate::ContentSource;
use crate::package::{self, CONTAINER_PATH};
use crate::paths;

/// Upper bound on the buffer reserved up front for one zip entry.
const MAX_PREALLOC_BYTES: usize = 8 * 1024 * 1024;

/// A fully loaded EPUB: package metadata plus every manifest item's bytes.
#[derive(Debug, Clone)]
pub struct EpubArchive {
    title: Option<String>,
    items: Vec<ArchiveItem>,
    /// Item names in spine (reading) order.
    spine: Vec<String>,
}

impl EpubArchive {
    /// Open and load an `.epub` file from disk.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| BookDigestError::io(path, e))?;
        Self::from_reader(BufReader::new(file))
    }

    /// Load an EPUB from any seekable reader.
    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self> {
        let mut zip = ZipArchive::new(reader)
            .map_err(|e| BookDigestError::Archive(format!("not a zip container: {e}")))?;

        let container = read_entry_string(&mut zip, CONTAINER_PATH)?;
        let opf_path = package::parse_container(&container)?;
        let opf = read_entry_string(&mut zip, &opf_path)?;
        let package = package::parse_package(&opf)?;

        let opf_dir = paths::parent_dir(&opf_path);
        debug!(%opf_path, items = package.manifest.len(), "package document parsed");

        let mut located = Vec::with_capacity(package.manifest.len());
        for entry in &package.manifest {
            match paths::resolve(opf_dir, &entry.href) {
                Ok(entry_path) => located.push((entry, entry_path)),
                Err(e) => warn!(href = %entry.href, error = %e, "unusable manifest href, skipping"),
            }
        }

        // Names are relative to the package directory, widened when the
        // manifest reaches above it, so they never start with `../`.
        let root = paths::common_dir(opf_dir, located.iter().map(|(_, p)| p.as_str()));

        let mut items = Vec::with_capacity(located.len());
        let mut names_by_id: HashMap<&str, String> = HashMap::new();

        for (entry, entry_path) in located {
            let content = match read_entry_bytes(&mut zip, &entry_path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(href = %entry.href, error = %e, "manifest item missing from archive, skipping");
                    continue;
                }
            };

            let name = paths::relative_to(&root, &entry_path).to_string();
            names_by_id.insert(entry.id.as_str(), name.clone());
            items.push(ArchiveItem {
                name,
                kind: entry.kind(),
                media_type: Some(entry.media_type.clone()).filter(|m| !m.is_empty()),
                content,
            });
        }

        let spine = package
            .spine
            .iter()
            .filter_map(|idref| names_by_id.get(idref.as_str()).cloned())
            .collect();

        info!(
            title = package.title.as_deref().unwrap_or("<untitled>"),
            items = items.len(),
            "EPUB loaded"
        );

        Ok(Self {
            title: package.title,
            items,
            spine,
        })
    }
}

impl ContentSource for EpubArchive {
    fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    fn units(&self) -> &[ArchiveItem] {
        &self.items
    }

    /// Spine documents in reading order, then any documents the spine omits.
    fn documents(&self) -> Vec<&ArchiveItem> {
        let mut ordered: Vec<&ArchiveItem> = self
            .spine
            .iter()
            .filter_map(|name| {
                self.items
                    .iter()
                    .find(|item| &item.name == name && item.kind == UnitKind::Document)
            })
            .collect();

        for item in &self.items {
            if item.kind == UnitKind::Document && !self.spine.contains(&item.name) {
                ordered.push(item);
            }
        }

        ordered
    }
}

fn read_entry_bytes<R: Read + Seek>(zip: &mut ZipArchive<R>, path: &str) -> Result<Vec<u8>> {
    let mut file = zip
        .by_name(path)
        .map_err(|e| BookDigestError::Archive(format!("{path}: {e}")))?;

    let mut buf = Vec::with_capacity(prealloc_hint(file.size()));
    file.read_to_end(&mut buf)
        .map_err(|e| BookDigestError::Archive(format!("{path}: read failed: {e}")))?;
    Ok(buf)
}

fn read_entry_string<R: Read + Seek>(zip: &mut ZipArchive<R>, path: &str) -> Result<String> {
    let bytes = read_entry_bytes(zip, path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Capacity to reserve for an entry whose header declares `declared` bytes.
/// The header is archive-controlled, so the reservation is capped.
fn prealloc_hint(declared: u64) -> usize {
    usize::try_from(declared)
        .unwrap_or(usize::MAX)
        .min(MAX_PREALLOC_BYTES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_entry_size_is_capped() {
        assert_eq!(prealloc_hint(10), 10);
        assert_eq!(prealloc_hint(0), 0);
        assert_eq!(prealloc_hint(u64::MAX), MAX_PREALLOC_BYTES);
        assert_eq!(prealloc_hint(MAX_PREALLOC_BYTES as u64 + 1), MAX_PREALLOC_BYTES);
    }
}
