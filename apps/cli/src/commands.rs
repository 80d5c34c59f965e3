//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use bookdigest_archive::EpubArchive;
use bookdigest_core::pipeline::{
    self, ProgressReporter, SummarizeConfig, SummarizeResult, archive_dir,
};
use bookdigest_core::{Classification, ClassificationRules, ContentClassifier, GeminiClient, TokioSleeper};
use bookdigest_shared::{
    AppConfig, SectionOutcome, SectionRecord, init_config, load_config, load_config_from,
    validate_api_key,
};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// bookdigest: summarize EPUB books section by section.
#[derive(Parser)]
#[command(
    name = "bookdigest",
    version,
    about = "Summarize EPUB books chapter by chapter with Gemini.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of the default location.
    #[arg(long, env = "BOOKDIGEST_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Summarize every content section of an EPUB.
    Summarize {
        /// Path to the .epub file.
        epub: PathBuf,

        /// Directory the book folder is created in (defaults to the EPUB's directory).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Gemini model to use (overrides config).
        #[arg(short, long)]
        model: Option<String>,

        /// Skip the study guide and executive briefing.
        #[arg(long)]
        no_synthesis: bool,
    },

    /// Extract the images referenced by each section, without summarizing.
    ExtractImages {
        /// Path to the .epub file.
        epub: PathBuf,

        /// Directory the image folder is created in (defaults to the EPUB's directory).
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Show how each section would be named and classified.
    Plan {
        /// Path to the .epub file.
        epub: PathBuf,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "bookdigest=info",
        1 => "bookdigest=debug",
        _ => "bookdigest=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    match cli.command {
        Command::Summarize {
            epub,
            out,
            model,
            no_synthesis,
        } => {
            cmd_summarize(
                config_path.as_deref(),
                &epub,
                out,
                model,
                no_synthesis,
            )
            .await
        }
        Command::ExtractImages { epub, out } => cmd_extract_images(&epub, out),
        Command::Plan { epub } => cmd_plan(config_path.as_deref(), &epub),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path.as_deref()),
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    Ok(match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    })
}

fn open_archive(epub: &Path) -> Result<EpubArchive> {
    if !epub.is_file() {
        return Err(eyre!("EPUB file not found: {}", epub.display()));
    }
    Ok(EpubArchive::open(epub)?)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_summarize(
    config_path: Option<&Path>,
    epub: &Path,
    out: Option<PathBuf>,
    model: Option<String>,
    no_synthesis: bool,
) -> Result<()> {
    let mut config = resolve_config(config_path)?;
    if let Some(model) = model {
        config.gemini.model = model;
    }

    // Validate API key before doing anything
    let credential = validate_api_key(&config)?;

    let mut summarize = SummarizeConfig::from_app_config(&config, epub);
    summarize.credential = Some(credential);
    if out.is_some() {
        summarize.output_root = out;
    }
    if no_synthesis {
        summarize.synthesize = false;
    }

    let book = open_archive(epub)?;
    let client = GeminiClient::new(&config.gemini)?;

    info!(
        epub = %epub.display(),
        model = client.model(),
        "summarizing book"
    );

    let reporter = CliProgress::new();
    let result = pipeline::summarize_book(&summarize, &book, client, TokioSleeper, &reporter).await?;

    println!();
    println!("  Book summarized.");
    println!("  Summarized: {}", result.summarized());
    println!("  Excluded:   {}", result.excluded());
    println!("  Empty:      {}", result.skipped_empty());
    println!("  Failed:     {}", result.failed());
    println!("  Images:     {}", result.image_count());
    if !result.manifest.synthesis.is_empty() {
        println!("  Documents:  {}", result.manifest.synthesis.join(", "));
    }
    if !result.manifest.collisions.is_empty() {
        println!(
            "  Collisions: {} (see manifest.json)",
            result.manifest.collisions.len()
        );
    }
    println!("  Path:       {}", result.output_dir.display());
    println!("  Time:       {:.1}s", result.elapsed.as_secs_f64());
    println!();

    Ok(())
}

fn cmd_extract_images(epub: &Path, out: Option<PathBuf>) -> Result<()> {
    let book = open_archive(epub)?;
    let root = out.unwrap_or_else(|| archive_dir(epub));

    let result = pipeline::extract_images(&book, &root)?;

    println!();
    println!("  Images extracted: {}", result.image_count());
    println!("  Sections:         {}", result.sections.len());
    if result.failures > 0 {
        println!("  Failed writes:    {}", result.failures);
    }
    println!("  Path:             {}", result.output_dir.display());
    println!();

    Ok(())
}

fn cmd_plan(config_path: Option<&Path>, epub: &Path) -> Result<()> {
    let config = resolve_config(config_path)?;
    let book = open_archive(epub)?;
    let classifier = ContentClassifier::new(ClassificationRules::from_config(
        &config.classifier,
        config.defaults.min_content_chars,
    ));

    let plan = pipeline::plan_book(&book, &classifier);
    let included = plan
        .iter()
        .filter(|p| p.classification.is_included())
        .count();

    println!("{:<24} {:<28} SECTION", "IDENTIFIER", "STATUS");
    for section in &plan {
        println!(
            "{:<24} {:<28} {}",
            section.identifier,
            plan_status(&section.classification),
            section.raw_name
        );
    }
    println!();
    println!("  {included} of {} sections will be summarized.", plan.len());

    Ok(())
}

fn plan_status(classification: &Classification) -> String {
    match classification {
        Classification::Include => "summarize".into(),
        Classification::Excluded(reason) => format!("skip ({reason})"),
        Classification::SkippedEmpty => "skip (empty)".into(),
    }
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn section_started(&self, raw_name: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Section [{current}/{total}] {raw_name}"));
    }

    fn section_finished(&self, record: &SectionRecord) {
        if let SectionOutcome::Failed { reason } = &record.outcome {
            self.spinner
                .println(format!("  ✗ {}: {reason}", record.raw_name));
        }
    }

    fn done(&self, _result: &SummarizeResult) {
        self.spinner.finish_and_clear();
    }
}
