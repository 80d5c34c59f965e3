//! XHTML-to-Markdown conversion and cleanup passes.
//!
//! Book sections arrive as XHTML. Before a section is sent to the generation
//! service it is converted to Markdown with the `htmd` crate, then run through
//! cleanup passes that normalize headings and whitespace and flatten image
//! references into plain captions.

mod cleanup;

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, instrument};

use bookdigest_shared::{BookDigestError, Result};

/// Title used when a section has no heading and no text.
pub const UNTITLED_SECTION: &str = "Untitled Chapter";

/// Tags whose content never helps a summary.
const SKIPPED_TAGS: [&str; 6] = ["script", "style", "nav", "iframe", "noscript", "svg"];

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Result of converting a section to Markdown.
#[derive(Debug, Clone)]
pub struct ConvertResult {
    /// The cleaned Markdown body.
    pub markdown: String,
    /// Section title (first heading, first text line, or a placeholder).
    pub title: String,
    /// Approximate word count of the body.
    pub word_count: usize,
}

// ---------------------------------------------------------------------------
// Converter
// ---------------------------------------------------------------------------

/// Convert a section's XHTML to clean Markdown.
///
/// 1. Takes the `<body>` content
/// 2. Turns `<table>` elements into Markdown tables
/// 3. Converts via `htmd`
/// 4. Runs the cleanup pipeline
#[instrument(skip(xhtml), fields(len = xhtml.len()))]
pub fn convert(xhtml: &str) -> Result<ConvertResult> {
    let title = extract_title(xhtml);
    let body_html = extract_body_html(xhtml);
    let body_html = preprocess_tables(&body_html);

    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(SKIPPED_TAGS.to_vec())
        .build();

    let raw_markdown = converter
        .convert(&body_html)
        .map_err(|e| BookDigestError::Conversion(format!("htmd conversion failed: {e}")))?;

    let markdown = cleanup::run_pipeline(&raw_markdown);
    let word_count = count_words(&markdown);

    debug!(%title, word_count, "section converted");

    Ok(ConvertResult {
        markdown,
        title,
        word_count,
    })
}

/// Extract a section title from its XHTML.
///
/// The first non-empty `h1`..`h6` wins (in heading-level order), then the first
/// non-empty line of text, then [`UNTITLED_SECTION`].
pub fn extract_title(xhtml: &str) -> String {
    let doc = Html::parse_document(xhtml);

    for level in ["h1", "h2", "h3", "h4", "h5", "h6"] {
        let Ok(selector) = Selector::parse(level) else {
            continue;
        };
        if let Some(text) = doc
            .select(&selector)
            .map(|el| collapse_whitespace(&el.text().collect::<String>()))
            .find(|t| !t.is_empty())
        {
            return text;
        }
    }

    let Ok(body_sel) = Selector::parse("body") else {
        return UNTITLED_SECTION.to_string();
    };
    doc.select(&body_sel)
        .next()
        .map(|body| body.text().collect::<String>())
        .and_then(|text| {
            text.lines()
                .map(str::trim)
                .find(|line| !line.is_empty())
                .map(String::from)
        })
        .unwrap_or_else(|| UNTITLED_SECTION.to_string())
}

// ---------------------------------------------------------------------------
// Table pre-processing
// ---------------------------------------------------------------------------

/// Replace `<table>` elements with Markdown table text before htmd runs,
/// since `htmd` 0.1 has no table support.
fn preprocess_tables(html: &str) -> String {
    let doc = Html::parse_fragment(html);
    let Ok(table_sel) = Selector::parse("table") else {
        return html.to_string();
    };

    let mut result = html.to_string();
    for table in doc.select(&table_sel) {
        let rendered = table_to_markdown(&table);
        result = result.replacen(&table.html(), &rendered, 1);
    }
    result
}

fn table_to_markdown(table: &scraper::ElementRef) -> String {
    let (Ok(tr_sel), Ok(cell_sel)) = (Selector::parse("tr"), Selector::parse("th, td")) else {
        return String::new();
    };

    let mut rows: Vec<Vec<String>> = table
        .select(&tr_sel)
        .map(|tr| {
            tr.select(&cell_sel)
                .map(|cell| collapse_whitespace(&cell.text().collect::<String>()))
                .collect::<Vec<_>>()
        })
        .filter(|row| !row.is_empty())
        .collect();

    let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
    if columns == 0 {
        return String::new();
    }
    for row in &mut rows {
        row.resize(columns, String::new());
    }

    let mut md = String::from("\n\n");
    for (i, row) in rows.iter().enumerate() {
        md.push_str(&format!("| {} |\n", row.join(" | ")));
        if i == 0 {
            md.push_str(&format!("|{}\n", " --- |".repeat(columns)));
        }
    }
    md.push('\n');
    md
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// The `<body>` inner HTML, or the input unchanged when there is no body.
fn extract_body_html(xhtml: &str) -> String {
    let doc = Html::parse_document(xhtml);
    Selector::parse("body")
        .ok()
        .and_then(|sel| doc.select(&sel).next().map(|body| body.inner_html()))
        .unwrap_or_else(|| xhtml.to_string())
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Count words in the Markdown body, ignoring fenced code.
fn count_words(md: &str) -> usize {
    static CODE_BLOCK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?s)```.*?```").expect("valid regex"));

    CODE_BLOCK_RE
        .replace_all(md, "")
        .split_whitespace()
        .filter(|w| !w.chars().all(|c| c == '#'))
        .count()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn load_fixture(name: &str) -> String {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../../../fixtures")
            .join(name);
        fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()))
    }

    #[test]
    fn convert_simple_section() {
        let xhtml = r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml"><head><title>ignored</title></head>
<body><h1>Chapter One</h1><p>Some <em>text</em>.</p></body></html>"#;
        let result = convert(xhtml).unwrap();

        assert!(result.markdown.contains("# Chapter One"));
        assert!(result.markdown.contains("Some"));
        assert!(!result.markdown.contains("ignored"));
        assert_eq!(result.title, "Chapter One");
        assert!(result.word_count >= 4);
    }

    #[test]
    fn convert_flattens_images_to_captions() {
        let xhtml = r#"<html><body><p>Before</p><img src="../images/fig1.png" alt="A chart"/><p>After</p></body></html>"#;
        let result = convert(xhtml).unwrap();

        assert!(result.markdown.contains("[Image: A chart]"));
        assert!(!result.markdown.contains("fig1.png"));
    }

    #[test]
    fn convert_tables() {
        let xhtml = r#"<html><body><table>
            <tr><th>Move</th><th>Effect</th></tr>
            <tr><td>Bluff</td><td>Pressure</td></tr>
        </table></body></html>"#;
        let result = convert(xhtml).unwrap();

        assert!(result.markdown.contains("| Move | Effect |"));
        assert!(result.markdown.contains("| Bluff | Pressure |"));
    }

    #[test]
    fn convert_no_html_tags_in_output() {
        let xhtml = r#"<html><body><section><div class="chapter"><p>Plain <span class="x">words</span>.</p></div></section></body></html>"#;
        let result = convert(xhtml).unwrap();
        assert!(!result.markdown.contains("<div"));
        assert!(!result.markdown.contains("<span"));
        assert!(result.markdown.contains("words"));
    }

    #[test]
    fn convert_fixture_chapter() {
        let xhtml = load_fixture("xhtml/chapter_with_images.xhtml");
        let result = convert(&xhtml).unwrap();

        assert_eq!(result.title, "Chapter 3: Reading the Table");
        assert!(result.markdown.contains("[Image: Seating chart]"));
        assert!(result.markdown.ends_with('\n'));
    }

    #[test]
    fn title_prefers_highest_heading_level() {
        let xhtml = "<html><body><h2>Second</h2><h1>First</h1></body></html>";
        assert_eq!(extract_title(xhtml), "First");
    }

    #[test]
    fn title_skips_empty_headings() {
        let xhtml = "<html><body><h1>  </h1><h3>Real   Title</h3></body></html>";
        assert_eq!(extract_title(xhtml), "Real Title");
    }

    #[test]
    fn title_falls_back_to_first_text_line() {
        let xhtml = "<html><body><p>\n   Opening line\n</p><p>Second</p></body></html>";
        assert_eq!(extract_title(xhtml), "Opening line");
    }

    #[test]
    fn title_placeholder_for_empty_section() {
        assert_eq!(extract_title("<html><body></body></html>"), UNTITLED_SECTION);
    }

    #[test]
    fn word_count_excludes_code_blocks() {
        let md = "# Title\n\nOne two three.\n\n```\nlots of code words here\n```\n";
        assert_eq!(count_words(md), 4);
    }
}
