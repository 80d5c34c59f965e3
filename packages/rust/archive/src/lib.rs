//! EPUB archive reading behind a small content-source abstraction.
//!
//! This crate provides:
//! - [`ContentSource`]: what the pipelines need from a book: title and members
//! - [`EpubArchive`]: loads an `.epub` (zip + container.xml + OPF) into memory
//! - [`MemoryBook`]: a source built from members already in memory
//! - [`paths`]: resolution of relative member references

mod epub;
mod package;
pub mod paths;

use bookdigest_shared::{ArchiveItem, UnitKind};

pub use epub::EpubArchive;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// A packaged book the pipelines can walk.
pub trait ContentSource {
    /// Title from the package metadata, if any.
    fn title(&self) -> Option<&str>;

    /// Every member, in manifest order.
    fn units(&self) -> &[ArchiveItem];

    /// Document members in the order they should be processed.
    fn documents(&self) -> Vec<&ArchiveItem> {
        self.units()
            .iter()
            .filter(|item| item.kind == UnitKind::Document)
            .collect()
    }
}

/// A book whose members are already in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryBook {
    pub title: Option<String>,
    pub items: Vec<ArchiveItem>,
}

impl MemoryBook {
    pub fn new(title: Option<&str>, items: Vec<ArchiveItem>) -> Self {
        Self {
            title: title.map(String::from),
            items,
        }
    }
}

impl ContentSource for MemoryBook {
    fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    fn units(&self) -> &[ArchiveItem] {
        &self.items
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use bookdigest_shared::{BookDigestError, ContentUnit};
    use zip::write::SimpleFileOptions;

    use super::*;

    const CONTAINER: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles><rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/></rootfiles>
</container>"#;

    const OPF: &str = r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/"><dc:title>Test Book: A Subtitle</dc:title></metadata>
  <manifest>
    <item id="img" href="images/test_image.jpg" media-type="image/jpeg"/>
    <item id="intro" href="text/introduction.xhtml" media-type="application/xhtml+xml"/>
    <item id="c1" href="text/chapter1.xhtml" media-type="application/xhtml+xml"/>
    <item id="ghost" href="text/missing.xhtml" media-type="application/xhtml+xml"/>
  </manifest>
  <spine><itemref idref="c1"/><itemref idref="intro"/></spine>
</package>"#;

    fn build_epub(entries: &[(&str, &str)]) -> Cursor<Vec<u8>> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .expect("start entry");
            writer.write_all(data.as_bytes()).expect("write entry");
        }
        let mut cursor = writer.finish().expect("finish zip");
        cursor.set_position(0);
        cursor
    }

    fn sample_epub() -> Cursor<Vec<u8>> {
        build_epub(&[
            ("mimetype", "application/epub+zip"),
            ("META-INF/container.xml", CONTAINER),
            ("OEBPS/content.opf", OPF),
            ("OEBPS/images/test_image.jpg", "fake_image_data"),
            ("OEBPS/text/introduction.xhtml", "<html><body><p>Intro</p></body></html>"),
            (
                "OEBPS/text/chapter1.xhtml",
                r#"<html><body><img src="../images/test_image.jpg"/></body></html>"#,
            ),
        ])
    }

    #[test]
    fn epub_loads_items_relative_to_package() {
        let book = EpubArchive::from_reader(sample_epub()).expect("load epub");

        assert_eq!(book.title(), Some("Test Book: A Subtitle"));
        let names: Vec<&str> = book.units().iter().map(|u| u.raw_name()).collect();
        // The missing manifest entry is skipped, order is manifest order.
        assert_eq!(
            names,
            vec![
                "images/test_image.jpg",
                "text/introduction.xhtml",
                "text/chapter1.xhtml"
            ]
        );
        assert_eq!(book.units()[0].kind(), UnitKind::Asset);
        assert_eq!(book.units()[0].body(), b"fake_image_data");
    }

    #[test]
    fn epub_documents_follow_spine() {
        let book = EpubArchive::from_reader(sample_epub()).expect("load epub");
        let docs: Vec<&str> = book.documents().iter().map(|u| u.raw_name()).collect();
        assert_eq!(docs, vec!["text/chapter1.xhtml", "text/introduction.xhtml"]);
    }

    #[test]
    fn nested_package_names_never_climb() {
        let container = CONTAINER.replace("OEBPS/content.opf", "OEBPS/pkg/content.opf");
        let opf = r#"<package><metadata/><manifest>
    <item id="img" href="../images/a%20b.png" media-type="image/png"/>
    <item id="c1" href="text/c1.xhtml" media-type="application/xhtml+xml"/>
  </manifest><spine><itemref idref="c1"/></spine></package>"#;
        let cursor = build_epub(&[
            ("META-INF/container.xml", container.as_str()),
            ("OEBPS/pkg/content.opf", opf),
            ("OEBPS/images/a b.png", "png"),
            ("OEBPS/pkg/text/c1.xhtml", "<p>One</p>"),
        ]);

        let book = EpubArchive::from_reader(cursor).expect("load epub");
        let names: Vec<&str> = book.units().iter().map(|u| u.raw_name()).collect();
        assert_eq!(names, vec!["images/a b.png", "pkg/text/c1.xhtml"]);
        assert_eq!(book.units()[0].body(), b"png");
        assert_eq!(book.documents().len(), 1);
    }

    #[test]
    fn encoded_hrefs_name_decoded_members() {
        let opf = OPF.replace("images/test_image.jpg", "images/test%5Fimage.jpg");
        let cursor = build_epub(&[
            ("META-INF/container.xml", CONTAINER),
            ("OEBPS/content.opf", opf.as_str()),
            ("OEBPS/images/test_image.jpg", "fake_image_data"),
        ]);

        let book = EpubArchive::from_reader(cursor).expect("load epub");
        assert_eq!(book.units()[0].raw_name(), "images/test_image.jpg");
    }

    #[test]
    fn package_without_manifest_is_rejected() {
        let cursor = build_epub(&[
            ("META-INF/container.xml", CONTAINER),
            ("OEBPS/content.opf", "<package><manifest/></package>"),
        ]);
        let err = EpubArchive::from_reader(cursor).unwrap_err();
        assert!(matches!(err, BookDigestError::Parse { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn epub_without_container_is_rejected() {
        let cursor = build_epub(&[("mimetype", "application/epub+zip")]);
        let err = EpubArchive::from_reader(cursor).unwrap_err();
        assert!(matches!(err, BookDigestError::Archive(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn non_zip_input_is_rejected() {
        let err = EpubArchive::from_reader(Cursor::new(b"plain text".to_vec())).unwrap_err();
        assert!(err.to_string().contains("not a zip container"));
    }

    #[test]
    fn memory_book_documents_keep_item_order() {
        let book = MemoryBook::new(
            None,
            vec![
                ArchiveItem::document("b.xhtml", "b"),
                ArchiveItem::asset("a.png", "image/png", vec![0]),
                ArchiveItem::document("a.xhtml", "a"),
            ],
        );
        let docs: Vec<&str> = book.documents().iter().map(|u| u.raw_name()).collect();
        assert_eq!(docs, vec!["b.xhtml", "a.xhtml"]);
        assert_eq!(book.title(), None);
    }
}
