use clap::{Args, Parser, Subcommand};
use convocatis_text::{FormatStyle, RecordId};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "conv-text")]
#[command(about = "A CLI tool for parsing and paginating structured prayer texts")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Parser configuration file (JSON)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse one text into sections and pages
    Parse(ParseArgs),

    /// Report page and section statistics for texts
    Analyze(AnalyzeArgs),

    /// Check libraries for dangling references and reference cycles
    Validate(ValidateArgs),
}

#[derive(Args)]
pub struct ParserOverrides {
    /// Output style for page content
    #[arg(long, value_enum)]
    pub format: Option<FormatStyle>,

    /// Reference nesting ceiling
    #[arg(long, value_name = "DEPTH")]
    pub max_depth: Option<usize>,

    /// Upper bound on pages per text
    #[arg(long, value_name = "PAGES")]
    pub max_pages: Option<usize>,
}

#[derive(Args)]
pub struct ParseArgs {
    /// Library sources (JSON files, directories or URLs)
    #[arg(required = true, value_name = "LIBRARY")]
    pub libraries: Vec<String>,

    /// Record id of the text to parse
    #[arg(short, long)]
    pub rid: RecordId,

    /// Print pages without section grouping
    #[arg(long)]
    pub flat: bool,

    #[command(flatten)]
    pub overrides: ParserOverrides,

    /// Write the parse result to a JSON file
    #[arg(long, value_name = "FILE")]
    pub json_output: Option<PathBuf>,
}

#[derive(Args)]
pub struct AnalyzeArgs {
    /// Library sources (JSON files, directories or URLs)
    #[arg(required = true, value_name = "LIBRARY")]
    pub libraries: Vec<String>,

    /// Only analyze this record id
    #[arg(short, long)]
    pub rid: Option<RecordId>,

    #[command(flatten)]
    pub overrides: ParserOverrides,

    /// Output analysis to JSON file
    #[arg(long, value_name = "FILE")]
    pub json_output: Option<PathBuf>,

    /// Show per-section details
    #[arg(long)]
    pub detailed: bool,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Library sources (JSON files, directories or URLs)
    #[arg(required = true, value_name = "LIBRARY")]
    pub libraries: Vec<String>,

    /// Treat reference cycles as failures
    #[arg(long)]
    pub strict: bool,
}
