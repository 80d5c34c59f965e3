//! Shared types, error model, and configuration for bookdigest.
//!
//! This crate is the foundation depended on by all other bookdigest crates.
//! It provides:
//! - [`BookDigestError`]: the unified error type
//! - Domain types ([`ContentUnit`], [`ArchiveItem`], [`ImageContext`], [`RunManifest`])
//! - Configuration ([`AppConfig`], config loading, credential lookup)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ClassifierConfig, DefaultsConfig, GeminiConfig, RetryConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from, validate_api_key,
};
pub use error::{BookDigestError, Result};
pub use types::{
    ArchiveItem, AssetMap, CURRENT_SCHEMA_VERSION, ContentUnit, ImageContext, RunId,
    RunManifest, SectionOutcome, SectionRecord, UnitKind,
};
