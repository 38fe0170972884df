mod cli;

use anyhow::Context;
use clap::Parser;
use cli::{AnalyzeArgs, Cli, Commands, ParseArgs, ParserOverrides, ValidateArgs};
use convocatis_text::{
    CancelFlag, ConvocatisError, LibraryAuditor, LibraryFetcher, Page, ParsedText, ParserConfig,
    ReadingNavigator, Result, TextLibrary, TextParser,
};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match &cli.command {
        Commands::Parse(args) => handle_parse_command(args, cli.config.as_deref()).await,
        Commands::Analyze(args) => handle_analyze_command(args, cli.config.as_deref()).await,
        Commands::Validate(args) => handle_validate_command(args, cli.config.as_deref()).await,
    };

    if let Err(e) = result {
        error!("Operation failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

fn load_config(path: Option<&Path>, overrides: Option<&ParserOverrides>) -> Result<ParserConfig> {
    let mut config = match path {
        Some(path) => ParserConfig::load_from_path(path)?,
        None => ParserConfig::default(),
    };

    if let Some(overrides) = overrides {
        if let Some(format) = overrides.format {
            config.format_style = format;
        }
        if let Some(max_depth) = overrides.max_depth {
            config.max_depth = max_depth;
        }
        if let Some(max_pages) = overrides.max_pages {
            config.max_pages = max_pages;
        }
    }

    config.validate()?;
    Ok(config)
}

async fn load_libraries(sources: &[String]) -> Result<TextLibrary> {
    let validated = LibraryFetcher::validate_sources(sources).await?;
    info!("Validated {} library sources", validated.len());

    let library = LibraryFetcher::fetch_multiple(&validated).await?;
    info!(
        "Library ready: {} texts ({} skipped as deleted)",
        library.len(),
        library.metadata.skipped_texts
    );
    Ok(library)
}

async fn handle_parse_command(args: &ParseArgs, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path, Some(&args.overrides))?;
    let library = load_libraries(&args.libraries).await?;

    let text = library
        .get(args.rid)
        .cloned()
        .ok_or(ConvocatisError::TextNotFound { rid: args.rid })?;

    let parser = Arc::new(TextParser::new(library, config));

    // Ctrl-C stops the parse between chunks
    let cancel = CancelFlag::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling parse");
            on_interrupt.cancel();
        }
    });

    let parsed = parser
        .parse_in_background(text, cancel)
        .await
        .ok_or(ConvocatisError::Cancelled)?;

    if args.flat {
        print_flat(&parsed);
    } else {
        print_sections(&parsed);
    }

    if !parsed.diagnostics.dangling_references.is_empty() {
        warn!(
            "Dangling references: {:?}",
            parsed.diagnostics.dangling_references
        );
    }

    if let Some(json_path) = &args.json_output {
        let json_content = serde_json::to_string_pretty(&parsed)
            .context("Failed to serialize parse result")?;

        tokio::fs::write(json_path, json_content)
            .await
            .context("Failed to write JSON parse file")?;

        info!("Parse result written to: {}", json_path.display());
    }

    Ok(())
}

fn print_sections(parsed: &ParsedText) {
    println!("\n=== {} (RID {}) ===", parsed.title, parsed.rid);

    for section in &parsed.sections {
        let header = section.header.as_deref().unwrap_or("(untitled)");
        println!(
            "\n--- Section {}/{}: {} ---",
            section.index + 1,
            section.total,
            header
        );
        for page in &section.pages {
            print_page(page);
        }
    }
}

fn print_flat(parsed: &ParsedText) {
    println!("\n=== {} (RID {}) ===", parsed.title, parsed.rid);
    for page in parsed.pages() {
        print_page(&page);
    }
}

fn print_page(page: &Page) {
    let repetition = page
        .repetition
        .map(|r| format!(" [{}/{}]", r.index(), r.total()))
        .unwrap_or_default();
    let banner = page
        .static_header
        .as_ref()
        .map(|h| format!(" <{}>", h))
        .unwrap_or_default();

    println!("  Page {}{}{}: {}", page.ordinal, repetition, banner, page.content);
}

async fn handle_analyze_command(args: &AnalyzeArgs, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path, Some(&args.overrides))?;
    let library = load_libraries(&args.libraries).await?;

    let texts: Vec<_> = match args.rid {
        Some(rid) => vec![library
            .get(rid)
            .cloned()
            .ok_or(ConvocatisError::TextNotFound { rid })?],
        None => library.texts().cloned().collect(),
    };
    info!("Starting analysis of {} texts", texts.len());

    let parser = TextParser::new(library, config);
    let mut all_analyses = BTreeMap::new();

    for text in texts {
        let parsed = parser.parse(&text);
        let stats = parser.get_parsing_stats(&parsed);

        println!("\n=== Analysis for '{}' (RID {}) ===", parsed.title, parsed.rid);
        println!("Total pages: {}", parsed.page_count());
        println!("Sections: {}", parsed.sections.len());
        if let Some(repeated) = stats.get("repeated_pages") {
            println!("Repeated pages: {}", repeated.as_u64().unwrap_or(0));
        }
        if !parsed.diagnostics.dangling_references.is_empty() {
            println!(
                "Dangling references: {:?}",
                parsed.diagnostics.dangling_references
            );
        }
        if !parsed.diagnostics.depth_limited_references.is_empty() {
            println!(
                "References cut at depth limit: {:?}",
                parsed.diagnostics.depth_limited_references
            );
        }
        if parsed.diagnostics.truncated {
            println!("Page limit reached, output truncated");
        }

        if args.detailed {
            let navigator = ReadingNavigator::new(&parsed.sections);
            println!("\nSection Details:");
            for section in &parsed.sections {
                let first = section.pages.first().map(|p| p.ordinal).unwrap_or(0);
                let last = section.pages.last().map(|p| p.ordinal).unwrap_or(0);
                let progress = navigator
                    .header_progress(first.saturating_sub(1))
                    .map(|p| format!(" (header {}/{})", p.current, p.total))
                    .unwrap_or_default();
                println!(
                    "  Section {}: Pages {}-{} {}{}",
                    section.index + 1,
                    first,
                    last,
                    section.header.as_deref().unwrap_or("(untitled)"),
                    progress
                );
            }
        }

        all_analyses.insert(
            parsed.rid,
            serde_json::json!({
                "title": parsed.title,
                "stats": stats,
                "diagnostics": parsed.diagnostics,
            }),
        );
    }

    if let Some(json_path) = &args.json_output {
        let json_content = serde_json::to_string_pretty(&all_analyses)
            .context("Failed to serialize analysis results")?;

        tokio::fs::write(json_path, json_content)
            .await
            .context("Failed to write JSON analysis file")?;

        info!("Analysis results written to: {}", json_path.display());
    }

    Ok(())
}

async fn handle_validate_command(args: &ValidateArgs, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path, None)?;
    let library = load_libraries(&args.libraries).await?;

    let report = LibraryAuditor::new(&config).audit(&library);

    println!("\n=== Validation Summary ===");
    println!("Texts checked: {}", report.texts_checked);
    println!("References checked: {}", report.references_checked);

    for dangling in &report.dangling {
        println!(
            "  - RID {} references missing RID {}",
            dangling.source, dangling.target
        );
    }
    for cycle in &report.cycles {
        let path: Vec<String> = cycle.iter().map(|rid| rid.to_string()).collect();
        println!("  - Reference cycle: {} -> {}", path.join(" -> "), path[0]);
    }

    let failures = report.dangling.len() + if args.strict { report.cycles.len() } else { 0 };
    if failures > 0 {
        return Err(ConvocatisError::InvalidLibrary {
            reason: format!("{} reference problems found", failures),
        });
    }

    println!("All references resolve!");
    Ok(())
}
