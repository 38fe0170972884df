use crate::types::{HeaderSection, Page};

/// Input to the section builder: structural header markers and finished pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Header(String),
    Page(Page),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum BuilderState {
    NoHeaderYet,
    InSection(String),
}

/// Groups pages into sections keyed by the most recent header marker.
#[derive(Debug)]
pub struct SectionBuilder {
    state: BuilderState,
    pages: Vec<Page>,
    sections: Vec<HeaderSection>,
}

impl SectionBuilder {
    pub fn new() -> Self {
        Self {
            state: BuilderState::NoHeaderYet,
            pages: Vec::new(),
            sections: Vec::new(),
        }
    }

    pub fn accept(mut self, entry: Entry) -> Self {
        match entry {
            Entry::Header(text) => {
                self.flush();
                self.state = BuilderState::InSection(text);
            }
            Entry::Page(page) => self.pages.push(page),
        }
        self
    }

    pub fn finish(mut self) -> Vec<HeaderSection> {
        self.flush();

        let total = self.sections.len();
        for (index, section) in self.sections.iter_mut().enumerate() {
            section.index = index;
            section.total = total;
        }
        self.sections
    }

    fn flush(&mut self) {
        if self.pages.is_empty() {
            return;
        }

        let header = match &self.state {
            BuilderState::NoHeaderYet => None,
            BuilderState::InSection(text) => Some(text.clone()),
        };
        self.sections.push(HeaderSection {
            header,
            pages: std::mem::take(&mut self.pages),
            index: 0,
            total: 0,
        });
    }
}

impl Default for SectionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn build_sections(entries: impl IntoIterator<Item = Entry>) -> Vec<HeaderSection> {
    entries
        .into_iter()
        .fold(SectionBuilder::new(), SectionBuilder::accept)
        .finish()
}
