//! Container and OPF package document parsing.
//!
//! Both documents are XML, but html5ever's forgiving parser copes with them
//! well enough for the handful of elements we read. Element names are matched
//! on their local part so `opf:item` and `item` are treated alike.

use scraper::{ElementRef, Html};

use bookdigest_shared::{BookDigestError, Result, UnitKind};

/// Path of the container document inside every EPUB.
pub(crate) const CONTAINER_PATH: &str = "META-INF/container.xml";

/// One `<item>` of the OPF manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ManifestEntry {
    pub id: String,
    pub href: String,
    pub media_type: String,
    pub properties: Vec<String>,
}

impl ManifestEntry {
    /// Map the declared media type (and cover property) onto a unit kind.
    pub fn kind(&self) -> UnitKind {
        let media_type = self.media_type.to_ascii_lowercase();
        if media_type == "application/xhtml+xml" || media_type == "text/html" {
            UnitKind::Document
        } else if media_type.starts_with("image/")
            || self.properties.iter().any(|p| p == "cover-image")
        {
            UnitKind::Asset
        } else {
            UnitKind::Other
        }
    }
}

/// The parts of the OPF package document the pipeline uses.
#[derive(Debug, Clone, Default)]
pub(crate) struct PackageDocument {
    pub title: Option<String>,
    pub manifest: Vec<ManifestEntry>,
    /// Manifest ids in reading order.
    pub spine: Vec<String>,
}

/// Return the package document path declared by `container.xml`.
pub(crate) fn parse_container(xml: &str) -> Result<String> {
    let doc = Html::parse_document(xml);

    elements(&doc, "rootfile")
        .filter_map(|el| el.value().attr("full-path"))
        .map(str::trim)
        .find(|p| !p.is_empty())
        .map(String::from)
        .ok_or_else(|| BookDigestError::parse("container.xml declares no rootfile"))
}

/// Parse title, manifest, and spine out of an OPF document.
pub(crate) fn parse_package(xml: &str) -> Result<PackageDocument> {
    let doc = Html::parse_document(xml);

    let title = elements(&doc, "title")
        .map(|el| el.text().collect::<String>().trim().to_string())
        .find(|t| !t.is_empty());

    let manifest: Vec<ManifestEntry> = elements(&doc, "item")
        .filter_map(|el| {
            let attrs = el.value();
            let id = attrs.attr("id")?.to_string();
            let href = attrs.attr("href")?.to_string();
            Some(ManifestEntry {
                id,
                href,
                media_type: attrs.attr("media-type").unwrap_or_default().to_string(),
                properties: attrs
                    .attr("properties")
                    .unwrap_or_default()
                    .split_whitespace()
                    .map(String::from)
                    .collect(),
            })
        })
        .collect();

    if manifest.is_empty() {
        return Err(BookDigestError::parse(
            "package document lists no manifest items",
        ));
    }

    let spine = elements(&doc, "itemref")
        .filter_map(|el| el.value().attr("idref"))
        .map(String::from)
        .collect();

    Ok(PackageDocument {
        title,
        manifest,
        spine,
    })
}

fn elements<'a>(doc: &'a Html, local_name: &'a str) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    doc.root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(move |el| {
            let name = el.value().name();
            name.rsplit(':').next().unwrap_or(name) == local_name
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTAINER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

    const OPF: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="uid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="uid">urn:isbn:9780000000000</dc:identifier>
    <dc:title>Workplace Poker: Are You Playing the Game</dc:title>
  </metadata>
  <manifest>
    <item id="nav" href="text/nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
    <item id="cover" href="images/cover.jpg" media-type="image/jpeg" properties="cover-image"/>
    <item id="c1" href="text/chapter_1.xhtml" media-type="application/xhtml+xml"/>
    <item id="css" href="styles/book.css" media-type="text/css"/>
  </manifest>
  <spine>
    <itemref idref="c1"/>
    <itemref idref="nav"/>
  </spine>
</package>"#;

    #[test]
    fn container_yields_rootfile_path() {
        assert_eq!(parse_container(CONTAINER).unwrap(), "OEBPS/content.opf");
    }

    #[test]
    fn container_without_rootfile_is_parse_error() {
        let err = parse_container("<container><rootfiles/></container>").unwrap_err();
        assert!(matches!(err, BookDigestError::Parse { .. }));
        assert!(err.to_string().contains("no rootfile"));
    }

    #[test]
    fn package_reads_title_manifest_and_spine() {
        let package = parse_package(OPF).unwrap();

        assert_eq!(
            package.title.as_deref(),
            Some("Workplace Poker: Are You Playing the Game")
        );
        let ids: Vec<&str> = package.manifest.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["nav", "cover", "c1", "css"]);
        assert_eq!(package.spine, vec!["c1".to_string(), "nav".to_string()]);
    }

    #[test]
    fn manifest_kinds() {
        let package = parse_package(OPF).unwrap();
        let kinds: Vec<UnitKind> = package.manifest.iter().map(ManifestEntry::kind).collect();
        assert_eq!(
            kinds,
            vec![
                UnitKind::Document,
                UnitKind::Asset,
                UnitKind::Document,
                UnitKind::Other
            ]
        );
    }

    #[test]
    fn empty_manifest_is_parse_error() {
        let err = parse_package("<package><manifest></manifest></package>").unwrap_err();
        assert!(matches!(err, BookDigestError::Parse { .. }));
        assert!(err.is_fatal());
    }
}
