//! Reading-position helpers derived from parsed sections.
//!
//! Positions are 0-based indexes into the flat page list.

use crate::types::{HeaderSection, Page};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageWithHeader {
    pub page: Page,
    pub header: Option<String>,
    pub section_index: usize,
}

/// `current` is 1-based among sections that carry a header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HeaderProgress {
    pub current: usize,
    pub total: usize,
}

impl HeaderProgress {
    pub fn percent(&self) -> usize {
        if self.total == 0 {
            return 100;
        }
        self.current * 100 / self.total
    }
}

/// Everything a reading screen needs to know about one position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionStatus {
    pub position: usize,
    pub header: Option<String>,
    pub header_progress: Option<HeaderProgress>,
    pub repetition: Option<(u32, u32)>,
    pub is_first: bool,
    pub is_last: bool,
    pub previous_header: Option<usize>,
    pub next_header: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct ReadingNavigator {
    pages: Vec<PageWithHeader>,
    // Section index -> rank among titled sections
    titled_rank: Vec<Option<usize>>,
    titled_total: usize,
}

impl ReadingNavigator {
    pub fn new(sections: &[HeaderSection]) -> Self {
        let pages = sections
            .iter()
            .enumerate()
            .flat_map(|(section_index, section)| {
                section.pages.iter().map(move |page| PageWithHeader {
                    page: page.clone(),
                    header: section.header.clone(),
                    section_index,
                })
            })
            .collect();

        let mut titled_total = 0;
        let titled_rank = sections
            .iter()
            .map(|section| {
                section.header.as_ref().map(|_| {
                    titled_total += 1;
                    titled_total
                })
            })
            .collect();

        Self {
            pages,
            titled_rank,
            titled_total,
        }
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn page(&self, position: usize) -> Option<&PageWithHeader> {
        self.pages.get(position)
    }

    pub fn pages(&self) -> &[PageWithHeader] {
        &self.pages
    }

    /// A saved position outside the current text restarts at the beginning.
    pub fn restore_position(&self, saved: usize) -> usize {
        if saved < self.pages.len() {
            saved
        } else {
            0
        }
    }

    pub fn next_page(&self, position: usize) -> Option<usize> {
        let next = position + 1;
        (next < self.pages.len()).then_some(next)
    }

    pub fn previous_page(&self, position: usize) -> Option<usize> {
        if position < self.pages.len() {
            position.checked_sub(1)
        } else {
            None
        }
    }

    /// First page of the next titled section after `position`.
    pub fn next_header(&self, position: usize) -> Option<usize> {
        let current = self.pages.get(position)?.section_index;
        self.pages
            .iter()
            .enumerate()
            .skip(position + 1)
            .find(|(_, p)| p.section_index != current && p.header.is_some())
            .map(|(i, _)| i)
    }

    /// First page of the closest titled section before the current one.
    pub fn previous_header(&self, position: usize) -> Option<usize> {
        let current = self.pages.get(position)?.section_index;
        let (found, target) = self.pages[..position]
            .iter()
            .enumerate()
            .rev()
            .find(|(_, p)| p.section_index != current && p.header.is_some())
            .map(|(i, p)| (i, p.section_index))?;

        let start = self.pages[..found]
            .iter()
            .rposition(|p| p.section_index != target)
            .map_or(0, |i| i + 1);
        Some(start)
    }

    pub fn header_progress(&self, position: usize) -> Option<HeaderProgress> {
        let page = self.pages.get(position)?;
        let current = self.titled_rank.get(page.section_index).copied().flatten()?;
        Some(HeaderProgress {
            current,
            total: self.titled_total,
        })
    }

    pub fn repetition_indicator(&self, position: usize) -> Option<(u32, u32)> {
        let repetition = self.pages.get(position)?.page.repetition?;
        Some((repetition.index(), repetition.total()))
    }

    pub fn status(&self, position: usize) -> Option<PositionStatus> {
        let page = self.pages.get(position)?;
        Some(PositionStatus {
            position,
            header: page.header.clone(),
            header_progress: self.header_progress(position),
            repetition: self.repetition_indicator(position),
            is_first: position == 0,
            is_last: position + 1 == self.pages.len(),
            previous_header: self.previous_header(position),
            next_header: self.next_header(position),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::parser::TextParser;
    use crate::services::store::TextLibrary;
    use crate::types::{ParserConfig, RawText};

    fn navigator(markup: &str) -> ReadingNavigator {
        let parser = TextParser::new(TextLibrary::from_texts(Vec::new()), ParserConfig::default());
        ReadingNavigator::new(&parser.parse_sections(&RawText::new(1, "t", markup)))
    }

    #[test]
    fn test_flattens_sections_with_headers() {
        let nav = navigator("Intro|>>One<<|2^a|>>Two<<|b");

        assert_eq!(nav.len(), 4);
        let headers: Vec<_> = nav.pages().iter().map(|p| p.header.as_deref()).collect();
        assert_eq!(headers, vec![None, Some("One"), Some("One"), Some("Two")]);
    }

    #[test]
    fn test_header_jumps() {
        // positions: 0 Intro | 1,2 One | 3 Two | 4,5 Three
        let nav = navigator("Intro|>>One<<|2^a|>>Two<<|b|>>Three<<|c|d");

        assert_eq!(nav.next_header(0), Some(1));
        assert_eq!(nav.next_header(1), Some(3));
        assert_eq!(nav.next_header(3), Some(4));
        assert_eq!(nav.next_header(5), None);

        assert_eq!(nav.previous_header(5), Some(3));
        assert_eq!(nav.previous_header(3), Some(1));
        assert_eq!(nav.previous_header(2), None);
        assert_eq!(nav.previous_header(0), None);
        assert_eq!(nav.next_header(99), None);
    }

    #[test]
    fn test_same_header_text_in_distinct_sections() {
        let nav = navigator(">>Ave<<|x|>>Ave<<|y");

        assert_eq!(nav.next_header(0), Some(1));
        assert_eq!(nav.previous_header(1), Some(0));
    }

    #[test]
    fn test_header_progress_counts_titled_sections_only() {
        let nav = navigator("Intro|>>One<<|a|>>Two<<|b");

        assert_eq!(nav.header_progress(0), None);
        assert_eq!(
            nav.header_progress(1),
            Some(HeaderProgress { current: 1, total: 2 })
        );
        let last = nav.header_progress(2).unwrap();
        assert_eq!((last.current, last.total, last.percent()), (2, 2, 100));
    }

    #[test]
    fn test_page_steps_and_restore() {
        let nav = navigator("a|b|c");

        assert_eq!(nav.next_page(0), Some(1));
        assert_eq!(nav.next_page(2), None);
        assert_eq!(nav.previous_page(0), None);
        assert_eq!(nav.previous_page(2), Some(1));
        assert_eq!(nav.restore_position(2), 2);
        assert_eq!(nav.restore_position(3), 0);
    }

    #[test]
    fn test_status_reports_repetition() {
        let nav = navigator(">>Decade<<|3^Ave");
        let status = nav.status(1).unwrap();

        assert_eq!(status.repetition, Some((2, 3)));
        assert_eq!(status.header.as_deref(), Some("Decade"));
        assert!(!status.is_first);
        assert!(!status.is_last);
        assert_eq!(status.next_header, None);
        assert!(nav.status(3).is_none());
    }
}
