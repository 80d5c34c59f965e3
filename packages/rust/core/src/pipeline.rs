//! End-to-end pipelines: summarize a book, extract its images, or plan a run.
//!
//! `summarize_book`: credential check → asset map → per section
//! (classify → identify → extract images → convert → prompt → generate →
//! write) → synthesis → manifest.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{error, info, instrument, warn};

use bookdigest_archive::ContentSource;
use bookdigest_shared::{
    AppConfig, ArchiveItem, BookDigestError, CURRENT_SCHEMA_VERSION, ContentUnit, ImageContext,
    Result, RunId, RunManifest, SectionOutcome, SectionRecord,
};

use crate::assets::{AssetAssociator, build_asset_map};
use crate::classify::{Classification, ClassificationRules, ContentClassifier};
use crate::invoke::{InvokeOutcome, ResilientInvoker, RetryPolicy, Sleeper, TextGenerator};
use crate::normalize::{DEFAULT_BOOK_FOLDER, book_output_folder, normalize};
use crate::prompts::{self, SummaryEntry};
use crate::summary::{self, render_summary};

/// Default folder name for the image-only pipeline.
pub const DEFAULT_IMAGES_FOLDER: &str = "extracted_images";

/// Book-level documents, in the order they are generated.
pub const STUDY_GUIDE_FILE: &str = "study_guide.md";
pub const EXECUTIVE_BRIEFING_FILE: &str = "executive_briefing.md";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for the `summarize_book` pipeline.
#[derive(Debug, Clone)]
pub struct SummarizeConfig {
    /// Path of the source archive (recorded in the manifest).
    pub source: PathBuf,
    /// Root for the book folder. `None` means the archive's directory.
    pub output_root: Option<PathBuf>,
    /// Generation credential. Checked before anything else happens.
    pub credential: Option<String>,
    /// Env var the credential is read from, for the error message.
    pub api_key_env: String,
    /// Model name (recorded in the manifest).
    pub model: String,
    /// Tool version string.
    pub tool_version: String,
    pub rules: ClassificationRules,
    pub retry: RetryPolicy,
    /// Section bodies are cut to this many characters before prompting.
    pub max_prompt_chars: usize,
    /// Pause between consecutive generation calls.
    pub request_interval: Duration,
    /// Build the study guide and executive briefing.
    pub synthesize: bool,
}

impl SummarizeConfig {
    /// Build from the loaded app config. The credential is looked up in the
    /// configured env var; a missing one surfaces when the pipeline starts.
    pub fn from_app_config(config: &AppConfig, source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            output_root: config.defaults.output_dir.as_ref().map(PathBuf::from),
            credential: bookdigest_shared::validate_api_key(config).ok(),
            api_key_env: config.gemini.api_key_env.clone(),
            model: config.gemini.model.clone(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            rules: ClassificationRules::from_config(
                &config.classifier,
                config.defaults.min_content_chars,
            ),
            retry: RetryPolicy::from_config(&config.retry),
            max_prompt_chars: config.defaults.max_prompt_chars,
            request_interval: Duration::from_secs(config.defaults.request_interval_secs),
            synthesize: config.defaults.synthesize,
        }
    }

    /// Directory the book folder is created in.
    pub fn output_root(&self) -> PathBuf {
        self.output_root
            .clone()
            .unwrap_or_else(|| archive_dir(&self.source))
    }
}

/// Directory containing `source`, or `.` for a bare file name.
pub fn archive_dir(source: &Path) -> PathBuf {
    source
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Result of the `summarize_book` pipeline.
#[derive(Debug, Clone)]
pub struct SummarizeResult {
    /// The book folder everything was written to.
    pub output_dir: PathBuf,
    pub manifest: RunManifest,
    pub elapsed: Duration,
}

impl SummarizeResult {
    pub fn summarized(&self) -> usize {
        self.count(|o| matches!(o, SectionOutcome::Summarized))
    }

    pub fn excluded(&self) -> usize {
        self.count(|o| matches!(o, SectionOutcome::Excluded { .. }))
    }

    pub fn skipped_empty(&self) -> usize {
        self.count(|o| matches!(o, SectionOutcome::SkippedEmpty))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, SectionOutcome::Failed { .. }))
    }

    pub fn image_count(&self) -> usize {
        self.manifest.sections.iter().map(|s| s.images.len()).sum()
    }

    fn count(&self, pred: impl Fn(&SectionOutcome) -> bool) -> usize {
        self.manifest
            .sections
            .iter()
            .filter(|s| pred(&s.outcome))
            .count()
    }
}

/// Result of the `extract_images` pipeline.
#[derive(Debug, Clone, Default)]
pub struct ExtractImagesResult {
    pub output_dir: PathBuf,
    /// Identifier → image file names, for sections with at least one image.
    pub sections: BTreeMap<String, Vec<String>>,
    /// References that resolved but could not be written.
    pub failures: usize,
}

impl ExtractImagesResult {
    pub fn image_count(&self) -> usize {
        self.sections.values().map(Vec::len).sum()
    }
}

/// One row of a dry run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedSection {
    pub raw_name: String,
    pub identifier: String,
    pub classification: Classification,
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called before a section is processed.
    fn section_started(&self, raw_name: &str, current: usize, total: usize);
    /// Called once a section has an outcome.
    fn section_finished(&self, record: &SectionRecord);
    /// Called when the pipeline completes.
    fn done(&self, result: &SummarizeResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn section_started(&self, _raw_name: &str, _current: usize, _total: usize) {}
    fn section_finished(&self, _record: &SectionRecord) {}
    fn done(&self, _result: &SummarizeResult) {}
}

// ---------------------------------------------------------------------------
// summarize_book
// ---------------------------------------------------------------------------

/// Summarize every content section of a book, then synthesize book-level
/// documents and write the run manifest.
///
/// A missing credential fails the run before any file is written. Failures
/// of individual sections are recorded in the manifest and do not stop the
/// run.
#[instrument(skip_all, fields(source = %config.source.display()))]
pub async fn summarize_book<S, G, Z>(
    config: &SummarizeConfig,
    source: &S,
    generator: G,
    sleeper: Z,
    progress: &dyn ProgressReporter,
) -> Result<SummarizeResult>
where
    S: ContentSource + ?Sized,
    G: TextGenerator,
    Z: Sleeper,
{
    let start = Instant::now();
    let started_at = Utc::now();
    let run_id = RunId::new();

    let credential = config
        .credential
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| {
            BookDigestError::config(format!(
                "Gemini API key not found. Set the {} environment variable.",
                config.api_key_env
            ))
        })?;

    let output_dir = config
        .output_root()
        .join(book_output_folder(source.title(), DEFAULT_BOOK_FOLDER));
    info!(%run_id, output = %output_dir.display(), "starting summarize pipeline");

    // --- Phase 1: Assets ---
    progress.phase("Indexing images");
    let mut associator = AssetAssociator::new(&output_dir, build_asset_map(source.units()));

    // --- Phase 2: Sections ---
    progress.phase("Summarizing sections");
    let classifier = ContentClassifier::new(config.rules.clone());
    let invoker = ResilientInvoker::with_sleeper(generator, sleeper, config.retry.clone());
    let mut pacer = Pacer::new(config.request_interval);

    let documents = source.documents();
    let total = documents.len();
    let mut sections = Vec::with_capacity(total);
    let mut summaries = Vec::new();
    let mut owners: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for (i, unit) in documents.into_iter().enumerate() {
        let raw_name = unit.raw_name();
        progress.section_started(raw_name, i + 1, total);

        let record = match classifier.classify(unit) {
            Classification::Excluded(reason) => {
                info!(raw_name, %reason, "skipping non-chapter section");
                skipped_record(unit, SectionOutcome::Excluded {
                    reason: reason.to_string(),
                })
            }
            Classification::SkippedEmpty => {
                info!(raw_name, "skipping empty section");
                skipped_record(unit, SectionOutcome::SkippedEmpty)
            }
            Classification::Include => {
                let identifier = normalize(raw_name);
                let names = owners.entry(identifier.clone()).or_default();
                if !names.is_empty() {
                    warn!(
                        %identifier,
                        raw_name,
                        previous = ?names,
                        "identifier collision, later section overwrites earlier output"
                    );
                }
                names.push(raw_name.to_string());

                let section = SectionJob {
                    unit,
                    identifier,
                    output_dir: &output_dir,
                    max_prompt_chars: config.max_prompt_chars,
                    min_content_chars: config.rules.min_content_chars,
                };
                section
                    .run(&mut associator, &invoker, credential, &mut pacer, &mut summaries)
                    .await
            }
        };

        progress.section_finished(&record);
        sections.push(record);
    }

    // --- Phase 3: Synthesis ---
    let mut synthesis = Vec::new();
    if config.synthesize && !summaries.is_empty() {
        progress.phase("Synthesizing book documents");
        let documents: [(&str, fn(&[SummaryEntry]) -> String); 2] = [
            (STUDY_GUIDE_FILE, prompts::study_guide_prompt),
            (EXECUTIVE_BRIEFING_FILE, prompts::executive_briefing_prompt),
        ];

        for (file_name, build_prompt) in documents {
            let prompt = build_prompt(&summaries);
            pacer.wait(invoker.sleeper()).await;
            let outcome = invoker.invoke_detailed(&prompt, credential).await;
            match outcome {
                InvokeOutcome::Succeeded { text, .. } => {
                    match summary::write_document(&output_dir, file_name, &format!("{}\n", text.trim_end())) {
                        Ok(_) => synthesis.push(file_name.to_string()),
                        Err(e) => error!(file = file_name, error = %e, "failed to write book document"),
                    }
                }
                other => warn!(
                    file = file_name,
                    reason = %other.failure_reason().unwrap_or_default(),
                    "book document not generated"
                ),
            }
        }
    } else if config.synthesize {
        info!("no section summaries, skipping synthesis");
    }

    // --- Phase 4: Manifest ---
    progress.phase("Writing manifest");
    let collisions: BTreeMap<String, Vec<String>> = owners
        .into_iter()
        .filter(|(_, names)| names.len() > 1)
        .collect();

    let manifest = RunManifest {
        schema_version: CURRENT_SCHEMA_VERSION,
        run_id,
        tool_version: config.tool_version.clone(),
        book_title: source.title().map(String::from),
        source: config.source.display().to_string(),
        model: config.model.clone(),
        started_at,
        completed_at: Utc::now(),
        sections,
        synthesis,
        collisions,
    };
    summary::write_manifest(&output_dir, &manifest)?;

    let result = SummarizeResult {
        output_dir,
        manifest,
        elapsed: start.elapsed(),
    };
    progress.done(&result);

    info!(
        summarized = result.summarized(),
        excluded = result.excluded(),
        skipped = result.skipped_empty(),
        failed = result.failed(),
        images = result.image_count(),
        elapsed_ms = result.elapsed.as_millis() as u64,
        "summarize pipeline complete"
    );

    Ok(result)
}

/// One included section on its way to a summary file.
struct SectionJob<'a> {
    unit: &'a ArchiveItem,
    identifier: String,
    output_dir: &'a Path,
    max_prompt_chars: usize,
    min_content_chars: usize,
}

impl SectionJob<'_> {
    async fn run<G: TextGenerator, Z: Sleeper>(
        self,
        associator: &mut AssetAssociator,
        invoker: &ResilientInvoker<G, Z>,
        credential: &str,
        pacer: &mut Pacer,
        summaries: &mut Vec<SummaryEntry>,
    ) -> SectionRecord {
        let raw_name = self.unit.raw_name();
        let association = associator.associate(self.unit);
        for failure in &association.failures {
            warn!(
                identifier = %self.identifier,
                reference = %failure.reference,
                error = %failure.error,
                "image not extracted"
            );
        }
        let images = association.images;
        let image_names: Vec<String> = images.iter().map(ImageContext::file_name).collect();

        let mut record = SectionRecord {
            raw_name: raw_name.to_string(),
            identifier: self.identifier.clone(),
            title: None,
            outcome: SectionOutcome::Summarized,
            summary_file: None,
            sha256: None,
            images: image_names,
        };

        let converted = match bookdigest_markdown::convert(&self.unit.body_text()) {
            Ok(c) => c,
            Err(e) => {
                warn!(raw_name, error = %e, "conversion failed, skipping section");
                record.outcome = SectionOutcome::Failed {
                    reason: e.to_string(),
                };
                return record;
            }
        };
        record.title = Some(converted.title.clone());

        if converted.markdown.trim().chars().count() < self.min_content_chars {
            info!(raw_name, "section has no text after conversion, skipping");
            record.outcome = SectionOutcome::SkippedEmpty;
            return record;
        }

        info!(raw_name, identifier = %self.identifier, words = converted.word_count, "summarizing section");
        let prompt = prompts::section_prompt(
            &converted.title,
            &converted.markdown,
            &images,
            self.max_prompt_chars,
        );

        pacer.wait(invoker.sleeper()).await;
        let text = match invoker.invoke_detailed(&prompt, credential).await {
            InvokeOutcome::Succeeded { text, .. } => text,
            other => {
                let reason = other.failure_reason().unwrap_or_default();
                warn!(raw_name, %reason, "summarization failed");
                record.outcome = SectionOutcome::Failed { reason };
                return record;
            }
        };

        let content = render_summary(raw_name, &text, &images);
        match summary::write_summary(self.output_dir, &self.identifier, &content) {
            Ok(written) => {
                info!(raw_name, file = %written.path.display(), "summary written");
                record.summary_file = Some(written.file_name());
                record.sha256 = Some(written.sha256);
                summaries.push(SummaryEntry {
                    identifier: self.identifier,
                    title: converted.title,
                    summary: text,
                });
            }
            Err(e) => {
                error!(raw_name, error = %e, "failed to write summary");
                record.outcome = SectionOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        }

        record
    }
}

fn skipped_record(unit: &ArchiveItem, outcome: SectionOutcome) -> SectionRecord {
    SectionRecord {
        raw_name: unit.raw_name().to_string(),
        identifier: normalize(unit.raw_name()),
        title: None,
        outcome,
        summary_file: None,
        sha256: None,
        images: Vec::new(),
    }
}

/// Fixed pause between consecutive generation calls. The first call is not delayed.
struct Pacer {
    interval: Duration,
    called: bool,
}

impl Pacer {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            called: false,
        }
    }

    async fn wait<Z: Sleeper>(&mut self, sleeper: &Z) {
        if self.called && !self.interval.is_zero() {
            sleeper.sleep(self.interval).await;
        }
        self.called = true;
    }
}

// ---------------------------------------------------------------------------
// extract_images
// ---------------------------------------------------------------------------

/// Extract every referenced image of every document section.
///
/// No classification and no credential: all documents are scanned. Files land
/// in `<output_root>/<book folder>` named exactly as `summarize_book` names them.
#[instrument(skip_all, fields(root = %output_root.display()))]
pub fn extract_images<S: ContentSource + ?Sized>(
    source: &S,
    output_root: &Path,
) -> Result<ExtractImagesResult> {
    let output_dir = output_root.join(book_output_folder(source.title(), DEFAULT_IMAGES_FOLDER));
    let assets = build_asset_map(source.units());
    if assets.is_empty() {
        warn!("archive contains no images");
    }

    let mut associator = AssetAssociator::new(&output_dir, assets);
    let mut result = ExtractImagesResult {
        output_dir: output_dir.clone(),
        ..Default::default()
    };

    for unit in source.documents() {
        let context = associator.associate(unit);
        result.failures += context.failures.len();
        if !context.images.is_empty() {
            result
                .sections
                .entry(context.identifier)
                .or_default()
                .extend(context.images.iter().map(ImageContext::file_name));
        }
    }

    info!(
        images = result.image_count(),
        failures = result.failures,
        output = %output_dir.display(),
        "image extraction complete"
    );

    Ok(result)
}

// ---------------------------------------------------------------------------
// plan_book
// ---------------------------------------------------------------------------

/// Dry run: each document's identifier and classification, in processing order.
pub fn plan_book<S: ContentSource + ?Sized>(
    source: &S,
    classifier: &ContentClassifier,
) -> Vec<PlannedSection> {
    source
        .documents()
        .into_iter()
        .map(|unit| PlannedSection {
            raw_name: unit.raw_name().to_string(),
            identifier: normalize(unit.raw_name()),
            classification: classifier.classify(unit),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
