//! Canonical section identifiers.
//!
//! Archive member names are noisy (`text/9781400236015_Chapter13.xhtml`,
//! `C-3.html`, `frontmatter01.xhtml`). [`normalize`] maps every name onto a
//! short, stable identifier that is used as the stem for all derived files.
//! It is a total function: the same input always yields the same non-empty
//! output.

use std::sync::LazyLock;

use regex::Regex;

/// Identifier used when nothing usable survives normalization.
pub const UNKNOWN_SECTION: &str = "unknown_section";

/// Default book folder name for the summarize pipeline.
pub const DEFAULT_BOOK_FOLDER: &str = "processed_book";

/// Extensions stripped before pattern matching.
const KNOWN_EXTENSIONS: [&str; 9] = [
    ".md", ".html", ".xhtml", ".jpg", ".jpeg", ".png", ".gif", ".svg", ".bmp",
];

/// Directory segments that carry no meaning in EPUB member names.
const NOISE_SEGMENTS: [&str; 2] = ["text/", "xhtml/"];

/// Substring → identifier, checked in order; the first hit wins.
const KEYWORD_TABLE: &[(&str, &str)] = &[
    ("cover", "cover"),
    ("titlepage", "titlepage"),
    ("dedication", "dedication"),
    ("nav", "navigation"),
    ("introduction", "introduction"),
    ("acknowledgments", "acknowledgments"),
    ("about_the_author", "about_the_author"),
    ("ba1", "back_matter_1"),
    ("copyright", "copyright"),
    ("credits", "credits"),
    ("publisher", "publisher_info"),
    ("preface", "preface"),
    ("foreword", "foreword"),
    ("epilogue", "epilogue"),
    ("index", "index"),
    ("glossary", "glossary"),
    ("bibliography", "bibliography"),
    ("conclusion", "conclusion"),
    ("frontmatter", "frontmatter"),
];

static NUMBERED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:chapter|c|part)[_\- ]?(\d+)").expect("valid regex"));

static APPENDIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"appendix[_-]?([a-z]|\d+)").expect("valid regex"));

static LEADING_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]+_.*?_").expect("valid regex"));

static EPUB3_NOISE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_epub3_.*?_r\d+").expect("valid regex"));

static REVISION_NOISE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_r\d+").expect("valid regex"));

static DISALLOWED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9_-]+").expect("valid regex"));

static UNDERSCORE_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_+").expect("valid regex"));

/// Map a raw archive member name to its canonical identifier.
///
/// Rules, first match wins:
/// 1. numbered sections (`chapter`, `c`, `part` + digits) → `chapter_<N>`
/// 2. appendices → `appendix_<letter|number>` or `appendix`
/// 3. the keyword table (`nav` → `navigation`, `ba1` → `back_matter_1`, ...)
/// 4. prefix/revision noise removal followed by [`sanitize`]
pub fn normalize(raw_name: &str) -> String {
    let mut name = raw_name.to_lowercase();
    for segment in NOISE_SEGMENTS {
        name = name.replace(segment, "");
    }
    let name = strip_known_extension(&name);

    if let Some(caps) = NUMBERED_RE.captures(name) {
        return format!("chapter_{}", strip_leading_zeros(&caps[1]));
    }

    if name.contains("appendix") {
        return match APPENDIX_RE.captures(name) {
            Some(caps) => format!("appendix_{}", &caps[1]),
            None => "appendix".to_string(),
        };
    }

    if let Some((_, identifier)) = KEYWORD_TABLE
        .iter()
        .find(|(keyword, _)| name.contains(keyword))
    {
        return (*identifier).to_string();
    }

    let cleaned = LEADING_PREFIX_RE.replace(name, "");
    let cleaned = EPUB3_NOISE_RE.replace_all(&cleaned, "");
    let cleaned = REVISION_NOISE_RE.replace_all(&cleaned, "");
    sanitize(&cleaned)
}

/// Reduce a name to `[A-Za-z0-9_-]`, safe to use as a file stem.
///
/// The trailing extension is dropped, spaces and runs of other characters
/// become a single `_`, and `_` is trimmed from both ends. Never returns an
/// empty string. Applying it twice gives the same result as applying it once.
pub fn sanitize(name: &str) -> String {
    let stem = split_extension(name);
    let replaced = stem.replace(' ', "_");
    let replaced = DISALLOWED_RE.replace_all(&replaced, "_");
    let collapsed = UNDERSCORE_RUN_RE.replace_all(&replaced, "_");
    let trimmed = collapsed.trim_matches('_');

    if trimmed.is_empty() {
        UNKNOWN_SECTION.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Folder name for a book's output: the title up to the first `:`, sanitized.
pub fn book_output_folder(title: Option<&str>, default: &str) -> String {
    match title.map(str::trim).filter(|t| !t.is_empty()) {
        Some(title) => {
            let main_title = title.split(':').next().unwrap_or(title).trim();
            sanitize(main_title)
        }
        None => default.to_string(),
    }
}

/// Decimal digits without leading zeros; `"0"` when all digits are zero.
fn strip_leading_zeros(digits: &str) -> &str {
    match digits.trim_start_matches('0') {
        "" => "0",
        rest => rest,
    }
}

fn strip_known_extension(name: &str) -> &str {
    KNOWN_EXTENSIONS
        .iter()
        .find_map(|ext| name.strip_suffix(ext))
        .unwrap_or(name)
}

/// Everything before the last `.` of the final path component, ignoring a
/// leading dot (so `.hidden` keeps its name).
fn split_extension(name: &str) -> &str {
    let base_start = name.rfind(['/', '\\']).map_or(0, |i| i + 1);
    let base = &name[base_start..];
    let dot_search = base.trim_start_matches('.');
    let leading_dots = base.len() - dot_search.len();

    match dot_search.rfind('.') {
        Some(i) => &name[..base_start + leading_dots + i],
        None => name,
    }
}
