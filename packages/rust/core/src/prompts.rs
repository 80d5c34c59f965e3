//! Prompt builders for section summaries and book-level synthesis.

use bookdigest_shared::ImageContext;

/// Appended when a section body is cut short.
pub const TRUNCATION_MARKER: &str = "\n\n[... section truncated ...]";

/// One finished section summary, as fed to the synthesis prompts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryEntry {
    pub identifier: String,
    pub title: String,
    pub summary: String,
}

/// Prompt for summarizing a single section.
///
/// `markdown` is cut to `max_chars` characters (plus [`TRUNCATION_MARKER`]).
/// Image alt texts are listed after the body so the summary can mention them.
pub fn section_prompt(
    title: &str,
    markdown: &str,
    images: &[ImageContext],
    max_chars: usize,
) -> String {
    let body = truncate_chars(markdown.trim(), max_chars);

    let mut prompt = format!(
        "You are summarizing one section of a book for a reader who wants to \
         retain its key ideas.\n\n\
         Write a concise Markdown summary of the section below:\n\
         - open with one sentence stating the section's main point\n\
         - follow with the most important ideas as bullet points\n\
         - bold key terms the first time they appear\n\
         - do not add an introduction or closing remarks\n\n\
         ## Section: {title}\n\n{body}\n"
    );

    let captions: Vec<&str> = images
        .iter()
        .map(|i| i.alt_text.trim())
        .filter(|alt| !alt.is_empty())
        .collect();
    if !captions.is_empty() {
        prompt.push_str("\n## Figures in this section\n\n");
        for caption in captions {
            prompt.push_str(&format!("- {caption}\n"));
        }
    }

    prompt
}

/// Prompt for the study guide: a structured outline built from every summary.
pub fn study_guide_prompt(summaries: &[SummaryEntry]) -> String {
    format!(
        "Turn the chapter summaries below into a one-page study guide for the \
         whole book. Output only the guide, in Markdown, using these headings:\n\n\
         ### 1. Central Idea\n\
         The book's main argument, the problem it addresses, and any core model.\n\n\
         ### 2. Core Concepts\n\
         Three to five concepts that carry the argument. For each, give a short \
         name, one line on the idea and nested bullets with supporting points.\n\n\
         ### 3. Putting It Into Practice\n\
         The concrete actions and step-by-step techniques the author recommends.\n\n\
         ### 4. Mindsets and Pitfalls\n\
         Attitudes the author encourages and mistakes to avoid.\n\n\
         ### 5. Examples Worth Remembering\n\
         One or two stories or cases and the concept each illustrates.\n\n\
         Prefer short bullet phrases over paragraphs and bold key terms.\n\n\
         ## Chapter Summaries\n\n{}",
        join_summaries(summaries)
    )
}

/// Prompt for the executive briefing: a high-level strategic read of the book.
pub fn executive_briefing_prompt(summaries: &[SummaryEntry]) -> String {
    format!(
        "Prepare an executive briefing on this book for a busy leader, based \
         only on the chapter summaries below. Output only the briefing, in \
         Markdown, using these headings:\n\n\
         ### 1. In Two Sentences\n\
         What the book is about and why it matters.\n\n\
         ### 2. The Framework\n\
         The author's central model and the problem it solves.\n\n\
         ### 3. Supporting Pillars\n\
         Three or four components of the argument, one short paragraph each.\n\n\
         ### 4. How the Argument Unfolds\n\
         How the book moves from its opening premise to its conclusion.\n\n\
         ### 5. Three Takeaways\n\
         The three most actionable lessons, as a numbered list.\n\n\
         ### 6. The Defining Example\n\
         The case that best shows the thesis in action, and why.\n\n\
         ## Chapter Summaries\n\n{}",
        join_summaries(summaries)
    )
}

fn join_summaries(summaries: &[SummaryEntry]) -> String {
    summaries
        .iter()
        .map(|s| format!("### {} ({})\n\n{}\n", s.title, s.identifier, s.summary.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// First `max_chars` characters of `text`, marked when anything was dropped.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{TRUNCATION_MARKER}", &text[..cut]),
        None => text.to_string(),
    }
}
