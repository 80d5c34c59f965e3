//! Core pipeline orchestration and domain logic for bookdigest.
//!
//! This crate ties together section naming, front/back matter detection,
//! image extraction, resilient text generation, and summary writing into
//! end-to-end workflows (e.g., `summarize_book`).

pub mod assets;
pub mod classify;
pub mod gemini;
pub mod invoke;
pub mod normalize;
pub mod pipeline;
pub mod prompts;
pub mod summary;

pub use assets::{AssetAssociator, AssociationContext, build_asset_map};
pub use classify::{Classification, ClassificationRules, ContentClassifier, ExclusionReason};
pub use gemini::GeminiClient;
pub use invoke::{InvokeOutcome, ResilientInvoker, RetryPolicy, Sleeper, TextGenerator, TokioSleeper};
pub use normalize::{book_output_folder, normalize, sanitize};
pub use pipeline::{
    ExtractImagesResult, PlannedSection, ProgressReporter, SilentProgress, SummarizeConfig,
    SummarizeResult, extract_images, plan_book, summarize_book,
};
