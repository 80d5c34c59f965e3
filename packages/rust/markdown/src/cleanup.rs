//! Cleanup passes applied to converted section Markdown.
//!
//! Each pass is a `&str -> String` function; [`run_pipeline`] applies them in
//! a fixed order. The output is prompt text, so anything that only matters to
//! a renderer (image targets, layout tags) is dropped.

use std::sync::LazyLock;

use regex::Regex;

/// Run every cleanup pass over raw converter output.
pub(crate) fn run_pipeline(md: &str) -> String {
    let mut result = md.to_string();

    result = flatten_image_links(&result);
    result = normalize_headings(&result);
    result = strip_leftover_html(&result);
    result = drop_empty_emphasis(&result);
    result = normalize_whitespace(&result);
    result = clean_blank_lines(&result);
    result = ensure_trailing_newline(&result);

    result
}

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

/// Replace `![alt](target)` with `[Image: alt]`.
///
/// Image bytes are handled separately; the prompt only needs to know a figure
/// was there and what it shows.
fn flatten_image_links(md: &str) -> String {
    static IMAGE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"!\[([^\]]*)\]\([^)]*\)").expect("valid regex"));

    IMAGE_RE
        .replace_all(md, |caps: &regex::Captures| {
            let alt = caps[1].trim();
            if alt.is_empty() {
                "[Image]".to_string()
            } else {
                format!("[Image: {alt}]")
            }
        })
        .into_owned()
}

// ---------------------------------------------------------------------------
// Headings
// ---------------------------------------------------------------------------

/// Keep the first H1 and demote later ones to H2.
///
/// EPUB sections often repeat the chapter heading as a running title.
fn normalize_headings(md: &str) -> String {
    static H1_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^#\s+(.+)$").expect("valid regex"));

    let mut seen_h1 = false;
    md.lines()
        .map(|line| match H1_RE.captures(line) {
            Some(caps) if seen_h1 => format!("## {}", &caps[1]),
            Some(_) => {
                seen_h1 = true;
                line.to_string()
            }
            None => line.to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Stray markup
// ---------------------------------------------------------------------------

/// Remove layout tags that survived conversion, outside fenced code.
fn strip_leftover_html(md: &str) -> String {
    static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"</?(?:div|span|section|article|aside|header|footer|figure|figcaption|details|summary|epub:\w+|a|sup|sub|small|big|font|center)(?:\s[^>]*)?/?>",
        )
        .expect("valid regex")
    });

    let mut in_fence = false;
    md.lines()
        .map(|line| {
            if line.trim_start().starts_with("```") {
                in_fence = !in_fence;
                return line.to_string();
            }
            if in_fence {
                line.to_string()
            } else {
                TAG_RE.replace_all(line, "").into_owned()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Drop `**` and `__` pairs with nothing between them.
fn drop_empty_emphasis(md: &str) -> String {
    static EMPTY_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(\*\*\s*\*\*|__\s*__)").expect("valid regex"));

    EMPTY_RE.replace_all(md, "").into_owned()
}

// ---------------------------------------------------------------------------
// Whitespace
// ---------------------------------------------------------------------------

/// Trim trailing whitespace and turn lines of only spaces into blank lines.
fn normalize_whitespace(md: &str) -> String {
    md.lines()
        .map(|line| line.trim_end().replace('\u{a0}', " "))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Collapse three or more consecutive newlines into one blank line.
fn clean_blank_lines(md: &str) -> String {
    static BLANKS_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

    BLANKS_RE
        .replace_all(md.trim_start_matches('\n'), "\n\n")
        .into_owned()
}

fn ensure_trailing_newline(md: &str) -> String {
    format!("{}\n", md.trim_end_matches('\n'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn images_become_captions() {
        assert_eq!(
            flatten_image_links("See ![A chart](../images/c.png) here"),
            "See [Image: A chart] here"
        );
        assert_eq!(flatten_image_links("![](x.jpg)"), "[Image]");
    }

    #[test]
    fn plain_links_are_not_images() {
        let input = "[next](chapter2.xhtml)";
        assert_eq!(flatten_image_links(input), input);
    }

    #[test]
    fn duplicate_h1_is_demoted() {
        let input = "# Chapter 1\n\ntext\n\n# Chapter 1\n\n## Part";
        assert_eq!(
            normalize_headings(input),
            "# Chapter 1\n\ntext\n\n## Chapter 1\n\n## Part"
        );
    }

    #[test]
    fn epub_tags_are_stripped() {
        let input = "<epub:switch>Body <span class=\"x\">text</span></epub:switch>";
        assert_eq!(strip_leftover_html(input), "Body text");
    }

    #[test]
    fn fenced_code_keeps_markup() {
        let input = "```\n<span>kept</span>\n```";
        assert_eq!(strip_leftover_html(input), input);
    }

    #[test]
    fn empty_emphasis_removed() {
        assert_eq!(drop_empty_emphasis("a **** b"), "a  b");
        assert_eq!(drop_empty_emphasis("**bold**"), "**bold**");
    }

    #[test]
    fn blank_runs_collapse() {
        assert_eq!(clean_blank_lines("\n\nA\n\n\n\n\nB"), "A\n\nB");
        assert_eq!(clean_blank_lines("A\n\nB"), "A\n\nB");
    }

    #[test]
    fn whitespace_is_trimmed() {
        assert_eq!(normalize_whitespace("A  \nB\u{a0}\t"), "A\nB");
    }

    #[test]
    fn pipeline_output() {
        let input = "\n\n# Title\n\n<div>Body ![Fig](f.png)</div>   \n\n\n\n\n# Title\n\n\n";
        let result = run_pipeline(input);
        assert_eq!(result, "# Title\n\nBody [Image: Fig]\n\n## Title\n");
    }
}
