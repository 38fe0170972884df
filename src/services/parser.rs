use crate::error::{ConvocatisError, Result};
use crate::services::expander::{Block, Expander, PageDraft};
use crate::services::formatter::{formatter_for, ContentFormatter};
use crate::services::scanner::MarkupScanner;
use crate::services::sections::{build_sections, Entry};
use crate::services::store::ReferenceStore;
use crate::types::{Diagnostics, HeaderSection, Page, ParsedText, ParserConfig, RawText};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Cooperative cancellation, checked before each top-level chunk.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Parses stored texts into pages and header sections.
///
/// All entry points are total: a failing store or an internal fault
/// produces a single page holding the raw markup.
pub struct TextParser<S> {
    store: S,
    config: ParserConfig,
    scanner: MarkupScanner,
    formatter: Box<dyn ContentFormatter>,
}

impl<S: ReferenceStore> TextParser<S> {
    pub fn new(store: S, config: ParserConfig) -> Self {
        Self {
            scanner: MarkupScanner::new(&config),
            formatter: formatter_for(config.format_style),
            store,
            config,
        }
    }

    pub fn with_formatter(mut self, formatter: Box<dyn ContentFormatter>) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    pub fn parse(&self, text: &RawText) -> ParsedText {
        self.parse_guarded(text, None)
            .unwrap_or_else(|_| self.fallback(text))
    }

    pub fn parse_sections(&self, text: &RawText) -> Vec<HeaderSection> {
        self.parse(text).sections
    }

    pub fn parse_pages(&self, text: &RawText) -> Vec<Page> {
        self.parse(text).into_pages()
    }

    /// Returns `None` when `cancel` was raised before parsing finished.
    pub fn parse_cancellable(&self, text: &RawText, cancel: &CancelFlag) -> Option<ParsedText> {
        self.parse_guarded(text, Some(cancel)).ok()
    }

    /// Runs the parse on tokio's blocking pool, since store lookups block.
    pub async fn parse_in_background(
        self: Arc<Self>,
        text: RawText,
        cancel: CancelFlag,
    ) -> Option<ParsedText>
    where
        S: 'static,
    {
        let parser = Arc::clone(&self);
        let fallback_text = text.clone();

        match tokio::task::spawn_blocking(move || parser.parse_cancellable(&text, &cancel)).await {
            Ok(parsed) => parsed,
            Err(e) => {
                error!("Background parse of '{}' failed: {}", fallback_text.title, e);
                Some(self.fallback(&fallback_text))
            }
        }
    }

    fn parse_guarded(&self, text: &RawText, cancel: Option<&CancelFlag>) -> Result<ParsedText> {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run(text, cancel)));

        match outcome {
            Ok(Ok(parsed)) => Ok(parsed),
            Ok(Err(ConvocatisError::Cancelled)) => {
                info!("Parsing of RID={} cancelled", text.rid);
                Err(ConvocatisError::Cancelled)
            }
            Ok(Err(e)) => {
                error!("Error parsing text '{}': {}", text.title, e);
                Ok(self.fallback(text))
            }
            Err(_) => {
                error!("Parser fault on text '{}', falling back to raw markup", text.title);
                Ok(self.fallback(text))
            }
        }
    }

    fn run(&self, text: &RawText, cancel: Option<&CancelFlag>) -> Result<ParsedText> {
        info!("Parsing text RID={}: {}", text.rid, text.title);

        let mut expander = Expander::new(&self.scanner, &self.store, &self.config, cancel);
        let blocks = expander.expand(&text.body, 0)?;
        let diagnostics = expander.finish();

        let sections = self.assemble(blocks);
        debug!(
            "Parsed RID={} into {} sections, {} store lookups",
            text.rid,
            sections.len(),
            diagnostics.store_lookups
        );

        Ok(ParsedText {
            rid: text.rid,
            title: text.title.clone(),
            sections,
            diagnostics,
        })
    }

    fn assemble(&self, blocks: Vec<Block>) -> Vec<HeaderSection> {
        let mut ordinal = 0;
        let mut entries: Vec<Entry> = blocks
            .into_iter()
            .map(|block| match block {
                Block::Header(text) => Entry::Header(text),
                Block::Page(draft) => {
                    ordinal += 1;
                    Entry::Page(self.finish_page(draft, ordinal))
                }
            })
            .collect();

        // The reader always gets at least one page
        if ordinal == 0 {
            entries.push(Entry::Page(self.finish_page(PageDraft::default(), 1)));
        }

        build_sections(entries)
    }

    fn finish_page(&self, draft: PageDraft, ordinal: usize) -> Page {
        Page {
            ordinal,
            content: self.formatter.format(&draft.text),
            plain_text: draft.text,
            static_header: draft.static_header,
            repetition: draft.repetition,
        }
    }

    fn fallback(&self, text: &RawText) -> ParsedText {
        let page = Page {
            ordinal: 1,
            content: text.body.clone(),
            plain_text: text.body.clone(),
            static_header: None,
            repetition: None,
        };

        ParsedText {
            rid: text.rid,
            title: text.title.clone(),
            sections: vec![HeaderSection {
                header: None,
                pages: vec![page],
                index: 0,
                total: 1,
            }],
            diagnostics: Diagnostics {
                fell_back: true,
                ..Diagnostics::default()
            },
        }
    }

    pub fn get_parsing_stats(&self, parsed: &ParsedText) -> HashMap<String, serde_json::Value> {
        let mut stats = HashMap::new();
        let pages = parsed.pages();

        stats.insert("total_pages".to_string(), pages.len().into());
        stats.insert("total_sections".to_string(), parsed.sections.len().into());

        let titled_sections = parsed.sections.iter().filter(|s| s.header.is_some()).count();
        stats.insert("titled_sections".to_string(), titled_sections.into());

        let repeated_pages = pages.iter().filter(|p| p.is_repetition()).count();
        stats.insert("repeated_pages".to_string(), repeated_pages.into());

        let with_static_header = pages.iter().filter(|p| p.static_header.is_some()).count();
        stats.insert("pages_with_static_header".to_string(), with_static_header.into());

        stats.insert(
            "dangling_references".to_string(),
            parsed.diagnostics.dangling_references.len().into(),
        );
        stats.insert(
            "depth_limited_references".to_string(),
            parsed.diagnostics.depth_limited_references.len().into(),
        );
        stats.insert("truncated".to_string(), parsed.diagnostics.truncated.into());
        stats.insert("fell_back".to_string(), parsed.diagnostics.fell_back.into());

        stats
    }
}
