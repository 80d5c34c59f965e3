//! Application configuration for bookdigest.
//!
//! User config lives at `~/.bookdigest/bookdigest.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BookDigestError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "bookdigest.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".bookdigest";

// ---------------------------------------------------------------------------
// Config structs (matching bookdigest.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Gemini generation service settings.
    #[serde(default)]
    pub gemini: GeminiConfig,

    /// Backoff policy for rate-limited generation calls.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Front/back matter exclusion rules.
    #[serde(default)]
    pub classifier: ClassifierConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Root directory for book output folders. Unset means "next to the EPUB".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<String>,

    /// Sections whose trimmed body is shorter than this are skipped.
    #[serde(default = "default_min_content_chars")]
    pub min_content_chars: usize,

    /// Section bodies longer than this are truncated before prompting.
    #[serde(default = "default_max_prompt_chars")]
    pub max_prompt_chars: usize,

    /// Pause between consecutive generation calls, in seconds.
    #[serde(default = "default_request_interval_secs")]
    pub request_interval_secs: u64,

    /// Whether to build the book-level study guide and briefing.
    #[serde(default = "default_true")]
    pub synthesize: bool,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            min_content_chars: default_min_content_chars(),
            max_prompt_chars: default_max_prompt_chars(),
            request_interval_secs: default_request_interval_secs(),
            synthesize: true,
        }
    }
}

fn default_min_content_chars() -> usize {
    1
}
fn default_max_prompt_chars() -> usize {
    60_000
}
fn default_request_interval_secs() -> u64 {
    5
}
fn default_true() -> bool {
    true
}

/// `[gemini]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model used for every generation call.
    #[serde(default = "default_model")]
    pub model: String,

    /// API endpoint root.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            model: default_model(),
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".into()
}
fn default_model() -> String {
    "gemini-2.5-flash".into()
}
fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com".into()
}
fn default_timeout_secs() -> u64 {
    120
}

/// `[retry]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt before giving up.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry, in seconds.
    #[serde(default = "default_initial_delay_secs")]
    pub initial_delay_secs: u64,

    /// Factor applied to the delay after every retry.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_secs: default_initial_delay_secs(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

fn default_max_retries() -> u32 {
    5
}
fn default_initial_delay_secs() -> u64 {
    1
}
fn default_backoff_multiplier() -> u32 {
    2
}

/// `[classifier]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Case-insensitive substrings of the raw section name that mark front/back matter.
    #[serde(default = "default_name_keywords")]
    pub name_keywords: Vec<String>,

    /// Substrings looked for in the leading part of the section body.
    #[serde(default = "default_content_keywords")]
    pub content_keywords: Vec<String>,

    /// Number of leading body characters inspected for content keywords.
    #[serde(default = "default_sniff_window")]
    pub sniff_window: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            name_keywords: default_name_keywords(),
            content_keywords: default_content_keywords(),
            sniff_window: default_sniff_window(),
        }
    }
}

fn default_name_keywords() -> Vec<String> {
    [
        "cover",
        "titlepage",
        "dedication",
        "nav",
        "introduction",
        "acknowledgments",
        "about_the_author",
        "ba1",
        "copyright",
        "credits",
        "publisher",
        "preface",
        "foreword",
        "epilogue",
        "appendix",
        "index",
        "glossary",
        "bibliography",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_content_keywords() -> Vec<String> {
    [
        "dedication",
        "copyright",
        "acknowledgments",
        "title page",
        "table of contents",
        "epigraph",
        "author's note",
        "publisher",
        "isbn",
        "frontmatter",
        "halftitle",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_sniff_window() -> usize {
    1024
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.bookdigest/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| BookDigestError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.bookdigest/bookdigest.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| BookDigestError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        BookDigestError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| BookDigestError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| BookDigestError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| BookDigestError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the Gemini API key from the configured env var.
///
/// A missing or empty key is a configuration error and halts the run.
pub fn validate_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.gemini.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val),
        _ => Err(BookDigestError::config(format!(
            "Gemini API key not found. Set the {var_name} environment variable \
             (a .env file in the working directory is also read)."
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("GEMINI_API_KEY"));
        assert!(toml_str.contains("sniff_window"));
        assert!(!toml_str.contains("output_dir"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.retry.max_retries, 5);
        assert_eq!(parsed.retry.initial_delay_secs, 1);
        assert_eq!(parsed.retry.backoff_multiplier, 2);
        assert_eq!(parsed.classifier.sniff_window, 1024);
        assert_eq!(parsed.gemini.api_key_env, "GEMINI_API_KEY");
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[defaults]
output_dir = "/tmp/books"
request_interval_secs = 0

[classifier]
name_keywords = ["cover"]
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.defaults.output_dir.as_deref(), Some("/tmp/books"));
        assert_eq!(config.defaults.request_interval_secs, 0);
        assert_eq!(config.defaults.min_content_chars, 1);
        assert_eq!(config.classifier.name_keywords, vec!["cover".to_string()]);
        assert!(config.classifier.content_keywords.contains(&"isbn".to_string()));
        assert_eq!(config.gemini.model, "gemini-2.5-flash");
    }

    #[test]
    fn default_name_keywords_keep_order() {
        let keywords = ClassifierConfig::default().name_keywords;
        assert_eq!(keywords.first().map(String::as_str), Some("cover"));
        assert_eq!(keywords.last().map(String::as_str), Some("bibliography"));
        assert_eq!(keywords.len(), 18);
    }

    #[test]
    fn api_key_validation() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.gemini.api_key_env = "BD_TEST_NONEXISTENT_KEY_12345".into();
        let result = validate_api_key(&config);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("API key not found"));
    }
}
