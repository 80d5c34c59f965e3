//! bookdigest CLI: chapter-by-chapter summaries of EPUB books.
//!
//! Splits a book into sections, skips front and back matter, extracts the
//! images each section references, and writes one Markdown summary per
//! section plus book-level study documents.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
