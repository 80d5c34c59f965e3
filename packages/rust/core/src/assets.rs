//! Image extraction and association.
//!
//! Phase one ([`build_asset_map`]) collects every image member of the archive
//! into a path → bytes map. Phase two ([`AssetAssociator::associate`]) scans a
//! section's markup for image references, resolves them against the map and
//! writes each hit to `<identifier>_image_<n>.<ext>`, numbering per identifier.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use scraper::{ElementRef, Html};
use tracing::{debug, warn};

use bookdigest_archive::paths;
use bookdigest_shared::{AssetMap, ContentUnit, ImageContext, UnitKind};

use crate::normalize::normalize;

/// Extensions that mark a member as an image even without a media type.
const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "gif", "svg", "bmp"];

/// Extension used when a reference has none.
const FALLBACK_EXTENSION: &str = "bin";

/// Collect every image member into a map keyed by its archive-relative name.
///
/// A member counts as an image when it is an asset, declares an `image/`
/// media type, or carries a known image extension. Later duplicates replace
/// earlier ones.
pub fn build_asset_map<'a, U>(units: impl IntoIterator<Item = &'a U>) -> AssetMap
where
    U: ContentUnit + 'a,
{
    let mut map = AssetMap::new();
    for unit in units {
        if is_image(unit) {
            map.insert(unit.raw_name().to_string(), unit.body().to_vec());
        }
    }
    debug!(images = map.len(), "asset map built");
    map
}

fn is_image<U: ContentUnit + ?Sized>(unit: &U) -> bool {
    if unit.kind() == UnitKind::Asset {
        return true;
    }
    if unit
        .media_type()
        .is_some_and(|m| m.to_ascii_lowercase().starts_with("image/"))
    {
        return true;
    }
    extension_of(unit.raw_name())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// An image that resolved but could not be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetWriteFailure {
    /// The reference as written in the markup.
    pub reference: String,
    /// Where the write was attempted.
    pub path: PathBuf,
    pub error: String,
}

/// Images extracted for one section, in reference order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssociationContext {
    pub identifier: String,
    pub images: Vec<ImageContext>,
    pub failures: Vec<AssetWriteFailure>,
}

/// Per-run image writer. Owns the output directory, the asset map and one
/// sequence counter per identifier.
#[derive(Debug)]
pub struct AssetAssociator {
    output_dir: PathBuf,
    assets: AssetMap,
    counters: HashMap<String, u32>,
}

impl AssetAssociator {
    pub fn new(output_dir: impl Into<PathBuf>, assets: AssetMap) -> Self {
        Self {
            output_dir: output_dir.into(),
            assets,
            counters: HashMap::new(),
        }
    }

    /// Images written so far for `identifier`.
    pub fn counter(&self, identifier: &str) -> u32 {
        self.counters.get(identifier).copied().unwrap_or(0)
    }

    /// Extract and persist the images one section references.
    ///
    /// Unresolvable references are skipped. A failed write is recorded on the
    /// returned context and scanning continues.
    pub fn associate<U: ContentUnit + ?Sized>(&mut self, unit: &U) -> AssociationContext {
        let identifier = normalize(unit.raw_name());
        let mut context = AssociationContext {
            identifier: identifier.clone(),
            ..Default::default()
        };

        let body = unit.body_text();
        for reference in image_references(&body) {
            let Some(key) = self.resolve(unit.raw_name(), &reference.src) else {
                debug!(%identifier, src = %reference.src, "image reference not in archive");
                continue;
            };

            let counter = self.counters.entry(identifier.clone()).or_insert(0);
            *counter += 1;
            let extension = extension_of(&key).unwrap_or(FALLBACK_EXTENSION);
            let file_name = format!("{identifier}_image_{counter}.{extension}");
            let path = self.output_dir.join(&file_name);

            let bytes = &self.assets[&key];
            match write_asset(&self.output_dir, &path, bytes) {
                Ok(()) => {
                    debug!(%identifier, file = %file_name, bytes = bytes.len(), "image extracted");
                    context.images.push(ImageContext {
                        asset_path: path,
                        alt_text: reference.alt,
                    });
                }
                Err(e) => {
                    warn!(%identifier, path = %path.display(), error = %e, "failed to write image");
                    context.failures.push(AssetWriteFailure {
                        reference: reference.src,
                        path,
                        error: e.to_string(),
                    });
                }
            }
        }

        context
    }

    /// Map a reference onto an asset map key.
    ///
    /// The reference is first resolved from the archive root, which drops
    /// leading `../`, `./` and `/` markers. If that misses, it is resolved
    /// against the section's own directory. Both are percent-decoded like
    /// the map keys.
    fn resolve(&self, section_name: &str, src: &str) -> Option<String> {
        [paths::ROOT_DIR, paths::parent_dir(section_name)]
            .into_iter()
            .filter_map(|dir| paths::resolve(dir, src).ok())
            .find(|key| self.assets.contains_key(key))
    }
}

/// One `<img src>` or SVG `<image href>` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ImageReference {
    src: String,
    alt: String,
}

/// Image references in document order.
fn image_references(markup: &str) -> Vec<ImageReference> {
    let doc = Html::parse_document(markup);
    doc.root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter_map(|el| {
            let src = match el.value().name() {
                "img" => attr(&el, "src"),
                "image" => attr(&el, "href"),
                _ => None,
            }?;
            Some(ImageReference {
                src: src.trim().to_string(),
                alt: attr(&el, "alt").unwrap_or_default().trim().to_string(),
            })
        })
        .filter(|r| !r.src.is_empty())
        .collect()
}

/// Attribute lookup by local name, so `xlink:href` is found as `href`.
fn attr<'a>(el: &ElementRef<'a>, local_name: &str) -> Option<&'a str> {
    el.value()
        .attrs()
        .find(|(name, _)| *name == local_name)
        .map(|(_, value)| value)
}

/// Trailing dot-segment of the final path component.
fn extension_of(path: &str) -> Option<&str> {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty())
}

fn write_asset(dir: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    std::fs::write(path, bytes)
}
