use crate::error::{ConvocatisError, Result};
use crate::services::parser::CancelFlag;
use crate::services::resolver::{ReferenceResolver, Resolution};
use crate::services::scanner::{MarkupScanner, Segment};
use crate::services::store::ReferenceStore;
use crate::types::{Diagnostics, ParserConfig, RecordId, Repetition};
use tracing::{debug, warn};

/// Unformatted page produced by expansion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageDraft {
    pub text: String,
    pub static_header: Option<String>,
    pub repetition: Option<Repetition>,
}

impl PageDraft {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

/// Expansion output, in reading order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Header(String),
    Page(PageDraft),
}

impl Block {
    fn is_page(&self) -> bool {
        matches!(self, Block::Page(_))
    }
}

/// Expands scanned markup into blocks, resolving repetitions and references.
///
/// Repetition and reference expansion call back into [`Expander::expand`]
/// with an explicit depth, bounded by the resolver's ceiling.
pub struct Expander<'a, S: ?Sized> {
    scanner: &'a MarkupScanner,
    resolver: ReferenceResolver<'a, S>,
    cancel: Option<&'a CancelFlag>,
    max_pages: usize,
    live_pages: usize,
    truncated: bool,
}

impl<'a, S: ReferenceStore + ?Sized> Expander<'a, S> {
    pub fn new(
        scanner: &'a MarkupScanner,
        store: &'a S,
        config: &ParserConfig,
        cancel: Option<&'a CancelFlag>,
    ) -> Self {
        Self {
            scanner,
            resolver: ReferenceResolver::new(store, config),
            cancel,
            max_pages: config.max_pages,
            live_pages: 0,
            truncated: false,
        }
    }

    pub fn expand(&mut self, raw: &str, depth: usize) -> Result<Vec<Block>> {
        let chunks = self.scanner.scan(raw);
        let mut blocks = Vec::new();
        // Header text eligible for hoisting onto an immediately following repetition
        let mut hoistable: Option<String> = None;

        for (position, chunk) in chunks.into_iter().enumerate() {
            if depth == 0 {
                self.check_cancelled()?;
            }
            debug!("Expanding chunk {} at depth {}", position + 1, depth);

            for segment in chunk.segments {
                if self.truncated {
                    return Ok(blocks);
                }
                match segment {
                    Segment::Header(text) => {
                        hoistable = Some(text.clone());
                        blocks.push(Block::Header(text));
                    }
                    Segment::Plain(text) => {
                        hoistable = None;
                        let text = self.resolve_inline(&text, depth)?;
                        self.push_page(&mut blocks, PageDraft::new(text));
                    }
                    Segment::Reference(rid) => {
                        hoistable = None;
                        let unit = self.expand_reference(rid, depth)?;
                        blocks.extend(unit);
                    }
                    Segment::Repetition { count, inner } => {
                        let static_header = hoistable.take();
                        let unit = self.repetition_unit(&inner, depth)?;
                        self.repeat(&mut blocks, unit, count, static_header);
                    }
                }
            }
        }

        Ok(blocks)
    }

    pub fn finish(self) -> Diagnostics {
        let mut diagnostics = self.resolver.into_diagnostics();
        diagnostics.truncated = self.truncated;
        diagnostics
    }

    fn check_cancelled(&self) -> Result<()> {
        match self.cancel {
            Some(flag) if flag.is_cancelled() => {
                debug!("Parse cancelled between chunks");
                Err(ConvocatisError::Cancelled)
            }
            _ => Ok(()),
        }
    }

    fn expand_reference(&mut self, rid: RecordId, depth: usize) -> Result<Vec<Block>> {
        if self.truncated {
            return Ok(Vec::new());
        }
        match self.resolver.resolve(rid, depth)? {
            Resolution::Expand(text) => self.expand(&text.body, depth + 1),
            Resolution::Literal(markup) => {
                let mut blocks = Vec::new();
                self.push_page(&mut blocks, PageDraft::new(markup));
                Ok(blocks)
            }
            Resolution::Missing => Ok(Vec::new()),
        }
    }

    /// The content of one repetition, resolved once. Never page-less
    /// unless the page limit was already reached.
    fn repetition_unit(&mut self, inner: &str, depth: usize) -> Result<Vec<Block>> {
        if self.truncated {
            return Ok(Vec::new());
        }
        let mut unit = match self.scanner.classify_body(inner) {
            Segment::Reference(rid) => self.expand_reference(rid, depth)?,
            // Same text, so the depth does not grow
            _ if self.scanner.contains_header(inner) => self.expand(inner, depth)?,
            _ => {
                let text = self.resolve_inline(inner, depth)?;
                let mut blocks = Vec::new();
                self.push_page(&mut blocks, PageDraft::new(text));
                blocks
            }
        };

        if !unit.iter().any(Block::is_page) {
            self.push_page(&mut unit, PageDraft::default());
        }
        Ok(unit)
    }

    fn repeat(
        &mut self,
        blocks: &mut Vec<Block>,
        unit: Vec<Block>,
        count: u32,
        static_header: Option<String>,
    ) {
        let unit_has_header = unit.iter().any(|block| matches!(block, Block::Header(_)));
        let static_header = if unit_has_header { None } else { static_header };

        for index in 1..=count {
            let repetition = Repetition::new(index, count);
            for block in &unit {
                match block {
                    Block::Header(text) => blocks.push(Block::Header(text.clone())),
                    Block::Page(draft) => {
                        // The first copy was counted when the unit was built
                        if index > 1 && !self.reserve_page() {
                            return;
                        }
                        blocks.push(Block::Page(PageDraft {
                            text: draft.text.clone(),
                            static_header: static_header
                                .clone()
                                .or_else(|| draft.static_header.clone()),
                            repetition,
                        }));
                    }
                }
            }
        }
    }

    /// Replaces every inline `%RID` token with the flattened target text.
    fn resolve_inline(&mut self, text: &str, depth: usize) -> Result<String> {
        let references = self.scanner.inline_references(text);
        if references.is_empty() || self.truncated {
            return Ok(text.to_string());
        }

        let mut resolved = String::with_capacity(text.len());
        let mut last = 0;
        for (range, rid) in references {
            resolved.push_str(&text[last..range.start]);
            let replacement = match self.resolver.resolve(rid, depth)? {
                Resolution::Expand(target) => {
                    let blocks = self.expand(&target.body, depth + 1)?;
                    self.release_pages(&blocks);
                    flatten(&blocks)
                }
                Resolution::Literal(markup) => markup,
                Resolution::Missing => String::new(),
            };
            resolved.push_str(&replacement);
            last = range.end;
        }
        resolved.push_str(&text[last..]);

        Ok(resolved)
    }

    fn push_page(&mut self, blocks: &mut Vec<Block>, draft: PageDraft) {
        if self.reserve_page() {
            blocks.push(Block::Page(draft));
        }
    }

    fn reserve_page(&mut self) -> bool {
        if self.live_pages >= self.max_pages {
            if !self.truncated {
                warn!("Page limit {} reached, dropping further pages", self.max_pages);
                self.truncated = true;
            }
            return false;
        }
        self.live_pages += 1;
        true
    }

    fn release_pages(&mut self, blocks: &[Block]) {
        let pages = blocks.iter().filter(|block| block.is_page()).count();
        self.live_pages = self.live_pages.saturating_sub(pages);
    }
}

/// Headers and page texts joined by blank lines.
fn flatten(blocks: &[Block]) -> String {
    blocks
        .iter()
        .map(|block| match block {
            Block::Header(text) => text.as_str(),
            Block::Page(draft) => draft.text.as_str(),
        })
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::store::TextLibrary;
    use crate::types::RawText;
    use pretty_assertions::assert_eq;

    fn expand_with(
        library: &TextLibrary,
        config: &ParserConfig,
        raw: &str,
    ) -> (Vec<Block>, Diagnostics) {
        let scanner = MarkupScanner::new(config);
        let mut expander = Expander::new(&scanner, library, config, None);
        let blocks = expander.expand(raw, 0).unwrap();
        (blocks, expander.finish())
    }

    fn expand(library: &TextLibrary, raw: &str) -> Vec<Block> {
        expand_with(library, &ParserConfig::default(), raw).0
    }

    fn page(text: &str) -> Block {
        Block::Page(PageDraft::new(text))
    }

    fn repeated(text: &str, index: u32, total: u32, header: Option<&str>) -> Block {
        Block::Page(PageDraft {
            text: text.to_string(),
            static_header: header.map(str::to_string),
            repetition: Repetition::new(index, total),
        })
    }

    #[test]
    fn test_header_only_piece_hoists_onto_repetition() {
        let library = TextLibrary::from_texts(Vec::new());
        let blocks = expand(&library, ">>Decade<<|2^Hail Mary|Glory Be");

        assert_eq!(
            blocks,
            vec![
                Block::Header("Decade".to_string()),
                repeated("Hail Mary", 1, 2, Some("Decade")),
                repeated("Hail Mary", 2, 2, Some("Decade")),
                page("Glory Be"),
            ]
        );
    }

    #[test]
    fn test_header_with_content_does_not_hoist() {
        let library = TextLibrary::from_texts(Vec::new());
        let blocks = expand(&library, ">>Decade<<Our Father|2^Hail Mary");

        assert_eq!(
            blocks,
            vec![
                Block::Header("Decade".to_string()),
                page("Our Father"),
                repeated("Hail Mary", 1, 2, None),
                repeated("Hail Mary", 2, 2, None),
            ]
        );
    }

    #[test]
    fn test_repeated_reference_with_own_header_is_not_hoisted() {
        let library = TextLibrary::from_texts(vec![RawText::new(5, "Mystery", ">>Mystery<<Pray")]);
        let blocks = expand(&library, ">>Outer<<|2^%5");

        assert_eq!(
            blocks,
            vec![
                Block::Header("Outer".to_string()),
                Block::Header("Mystery".to_string()),
                repeated("Pray", 1, 2, None),
                Block::Header("Mystery".to_string()),
                repeated("Pray", 2, 2, None),
            ]
        );
    }

    #[test]
    fn test_inline_repetition_repeats_its_header() {
        let library = TextLibrary::from_texts(Vec::new());
        let blocks = expand(&library, ">>Outer<<|2^>>Mystery<<Pray");

        assert_eq!(
            blocks,
            vec![
                Block::Header("Outer".to_string()),
                Block::Header("Mystery".to_string()),
                repeated("Pray", 1, 2, None),
                Block::Header("Mystery".to_string()),
                repeated("Pray", 2, 2, None),
            ]
        );
    }

    #[test]
    fn test_reference_splices_pages_and_headers() {
        let library =
            TextLibrary::from_texts(vec![RawText::new(42, "Greeting", "Hello|>>Part<<World")]);
        let blocks = expand(&library, "Before|%42|After");

        assert_eq!(
            blocks,
            vec![
                page("Before"),
                page("Hello"),
                Block::Header("Part".to_string()),
                page("World"),
                page("After"),
            ]
        );
    }

    #[test]
    fn test_inline_reference_is_flattened() {
        let library = TextLibrary::from_texts(vec![RawText::new(3, "Amen", "Amen|>>So be it<<")]);
        let blocks = expand(&library, "Glory be to the Father. %3");

        assert_eq!(blocks, vec![page("Glory be to the Father. Amen\n\nSo be it")]);
    }

    #[test]
    fn test_missing_reference_in_repetition_yields_empty_pages() {
        let library = TextLibrary::from_texts(Vec::new());
        let (blocks, diagnostics) = expand_with(&library, &ParserConfig::default(), "3^%99");

        assert_eq!(
            blocks,
            vec![
                repeated("", 1, 3, None),
                repeated("", 2, 3, None),
                repeated("", 3, 3, None),
            ]
        );
        assert_eq!(diagnostics.dangling_references, vec![99]);
    }

    #[test]
    fn test_self_reference_stops_at_depth_ceiling() {
        let library = TextLibrary::from_texts(vec![RawText::new(1, "Loop", "Again|%1")]);
        let (blocks, diagnostics) = expand_with(&library, &ParserConfig::default(), "%1");

        // Depths 1 through 5 each contribute "Again"; the ceiling returns the raw markup.
        let mut expected = vec![page("Again"); 5];
        expected.push(page("Again|%1"));
        assert_eq!(blocks, expected);
        assert_eq!(diagnostics.depth_limited_references, vec![1]);
    }

    #[test]
    fn test_page_limit_truncates() {
        let library = TextLibrary::from_texts(vec![RawText::new(7, "Many", "1000^x")]);
        let config = ParserConfig {
            max_pages: 1500,
            ..ParserConfig::default()
        };
        let (blocks, diagnostics) = expand_with(&library, &config, "1000^%7");

        assert_eq!(blocks.len(), 1500);
        assert!(diagnostics.truncated);
    }

    #[test]
    fn test_page_limit_stops_reference_fan_out() {
        let wide = vec!["%1"; 32].join("|");
        let library = TextLibrary::from_texts(vec![RawText::new(1, "Wide", wide)]);
        let config = ParserConfig {
            max_pages: 100,
            memoize_references: false,
            ..ParserConfig::default()
        };
        let (blocks, diagnostics) = expand_with(&library, &config, "%1");

        assert_eq!(blocks.len(), 100);
        assert!(diagnostics.truncated);
        // Roughly one lookup per emitted page, not one per leaf of the full tree
        assert!(diagnostics.store_lookups < 200);
    }

    #[test]
    fn test_inline_expansion_over_limit_is_truncated() {
        let library = TextLibrary::from_texts(vec![RawText::new(5, "Litany", "a|b|c|d")]);
        let config = ParserConfig {
            max_pages: 3,
            ..ParserConfig::default()
        };
        let (blocks, diagnostics) = expand_with(&library, &config, "Pray %5");

        // The fourth page of the target did not fit, so the inline text lacks it
        assert_eq!(blocks, vec![page("Pray a\n\nb\n\nc")]);
        assert!(diagnostics.truncated);

        let (blocks, diagnostics) = expand_with(&library, &ParserConfig::default(), "Pray %5");
        assert_eq!(blocks, vec![page("Pray a\n\nb\n\nc\n\nd")]);
        assert!(!diagnostics.truncated);
    }

    #[test]
    fn test_cancelled_flag_stops_expansion() {
        let library = TextLibrary::from_texts(Vec::new());
        let config = ParserConfig::default();
        let scanner = MarkupScanner::new(&config);
        let cancel = CancelFlag::new();
        cancel.cancel();

        let mut expander = Expander::new(&scanner, &library, &config, Some(&cancel));
        assert!(matches!(
            expander.expand("a|b", 0),
            Err(ConvocatisError::Cancelled)
        ));
    }
}
