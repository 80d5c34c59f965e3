//! Front/back matter detection.
//!
//! A section is excluded when its name contains one of the name keywords, or
//! when the first `sniff_window` characters of its body contain one of the
//! content keywords. Both checks are case-insensitive substring matches.

use std::fmt;

use tracing::debug;

use bookdigest_shared::{ClassifierConfig, ContentUnit, UnitKind};

/// Why a section was excluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExclusionReason {
    /// The raw name contains this keyword.
    Name(String),
    /// The leading body text contains this keyword.
    Content(String),
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(keyword) => write!(f, "name contains {keyword:?}"),
            Self::Content(keyword) => write!(f, "content mentions {keyword:?}"),
        }
    }
}

/// Outcome of classifying one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Real content; process it.
    Include,
    /// Front/back matter.
    Excluded(ExclusionReason),
    /// Body shorter than the minimum length.
    SkippedEmpty,
}

impl Classification {
    pub fn is_included(&self) -> bool {
        matches!(self, Self::Include)
    }
}

/// Keyword lists and thresholds, lower-cased once up front.
#[derive(Debug, Clone)]
pub struct ClassificationRules {
    pub name_keywords: Vec<String>,
    pub content_keywords: Vec<String>,
    pub sniff_window: usize,
    /// Minimum trimmed body length, in characters.
    pub min_content_chars: usize,
}

impl ClassificationRules {
    pub fn from_config(config: &ClassifierConfig, min_content_chars: usize) -> Self {
        Self {
            name_keywords: lowercase_all(&config.name_keywords),
            content_keywords: lowercase_all(&config.content_keywords),
            sniff_window: config.sniff_window,
            min_content_chars,
        }
    }
}

impl Default for ClassificationRules {
    fn default() -> Self {
        Self::from_config(&ClassifierConfig::default(), 1)
    }
}

/// True when the name or the leading body text marks a unit as front/back matter.
pub fn is_excluded<S: AsRef<str>>(
    raw_name: &str,
    body: &str,
    name_keywords: &[S],
    content_keywords: &[S],
    sniff_window: usize,
) -> bool {
    name_match(raw_name, name_keywords).is_some()
        || content_match(body, content_keywords, sniff_window).is_some()
}

/// Decides which units are real content.
#[derive(Debug, Clone, Default)]
pub struct ContentClassifier {
    rules: ClassificationRules,
}

impl ContentClassifier {
    pub fn new(rules: ClassificationRules) -> Self {
        Self { rules }
    }

    /// Classify one unit. The content check only applies to documents.
    pub fn classify<U: ContentUnit + ?Sized>(&self, unit: &U) -> Classification {
        let raw_name = unit.raw_name();

        if let Some(keyword) = name_match(raw_name, &self.rules.name_keywords) {
            debug!(raw_name, keyword, "excluded by name");
            return Classification::Excluded(ExclusionReason::Name(keyword.to_string()));
        }

        let body = unit.body_text();
        if body.trim().chars().count() < self.rules.min_content_chars {
            debug!(raw_name, "body below minimum length");
            return Classification::SkippedEmpty;
        }

        if unit.kind() == UnitKind::Document {
            if let Some(keyword) =
                content_match(&body, &self.rules.content_keywords, self.rules.sniff_window)
            {
                debug!(raw_name, keyword, "excluded by content");
                return Classification::Excluded(ExclusionReason::Content(keyword.to_string()));
            }
        }

        Classification::Include
    }
}

/// Document units that are real content, in their original order.
pub fn filter_documents<'a, U: ContentUnit>(
    units: impl IntoIterator<Item = &'a U>,
    classifier: &ContentClassifier,
) -> Vec<&'a U>
where
    U: 'a,
{
    units
        .into_iter()
        .filter(|unit| unit.kind() == UnitKind::Document)
        .filter(|unit| classifier.classify(*unit).is_included())
        .collect()
}

fn name_match<'k, S: AsRef<str>>(raw_name: &str, keywords: &'k [S]) -> Option<&'k str> {
    let name = raw_name.to_lowercase();
    keywords
        .iter()
        .map(AsRef::as_ref)
        .find(|keyword| !keyword.is_empty() && name.contains(&keyword.to_lowercase()))
}

fn content_match<'k, S: AsRef<str>>(
    body: &str,
    keywords: &'k [S],
    sniff_window: usize,
) -> Option<&'k str> {
    let head: String = body.chars().take(sniff_window).collect::<String>().to_lowercase();
    keywords
        .iter()
        .map(AsRef::as_ref)
        .find(|keyword| !keyword.is_empty() && head.contains(&keyword.to_lowercase()))
}

fn lowercase_all(values: &[String]) -> Vec<String> {
    values.iter().map(|v| v.to_lowercase()).collect()
}
