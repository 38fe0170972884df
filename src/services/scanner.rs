//! Tokenizer for the text markup language.
//!
//! ```text
//! Intro|>>Part One<<|2^Hail Mary|%42|>>Part Two<<|Glory Be
//! ```
//!
//! - `|` separates pages
//! - `>>header<<` opens a section
//! - `N^content` repeats content N times
//! - `%RID` includes another stored text

use crate::types::{ParserConfig, RecordId};
use regex::Regex;
use std::ops::Range;
use tracing::debug;

/// A classified span of raw markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Literal page text. May still hold inline `%RID` tokens.
    Plain(String),
    Header(String),
    Repetition { count: u32, inner: String },
    /// A body consisting of nothing but a reference marker.
    Reference(RecordId),
}

/// Segments of one pipe-delimited piece.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Chunk {
    pub segments: Vec<Segment>,
}

enum ScanState {
    Idle { start: usize },
    InHeader { open: usize },
}

/// Legacy imports store the header delimiters HTML-escaped.
pub fn unescape_delimiters(raw: &str) -> String {
    raw.replace("&gt;&gt;", ">>").replace("&lt;&lt;", "<<")
}

pub struct MarkupScanner {
    repetition_pattern: Regex,
    reference_pattern: Regex,
    inline_reference_pattern: Regex,
    max_repetitions: u32,
    residue_threshold: usize,
}

impl MarkupScanner {
    pub fn new(config: &ParserConfig) -> Self {
        Self {
            repetition_pattern: Regex::new(r"(?s)^(\d+)\^(.*)$").unwrap(),
            reference_pattern: Regex::new(r"^%(\d+)$").unwrap(),
            inline_reference_pattern: Regex::new(r"%(\d+)").unwrap(),
            max_repetitions: config.max_repetitions,
            residue_threshold: config.header_residue_threshold,
        }
    }

    /// Splits raw markup into chunks. Blank pieces are dropped.
    pub fn scan(&self, raw: &str) -> Vec<Chunk> {
        let text = unescape_delimiters(raw);
        let chunks: Vec<Chunk> = text
            .split('|')
            .map(|piece| self.scan_chunk(piece))
            .filter(|chunk| !chunk.segments.is_empty())
            .collect();

        debug!("Scanned {} chunks", chunks.len());
        chunks
    }

    /// Scans one pipe-free piece of markup.
    pub fn scan_chunk(&self, piece: &str) -> Chunk {
        let mut segments = Vec::new();
        let mut state = ScanState::Idle { start: 0 };
        let mut pos = 0;

        while pos < piece.len() {
            let rest = &piece[pos..];
            state = match state {
                ScanState::Idle { start } if rest.starts_with(">>") && rest[2..].contains("<<") => {
                    if let Some(repetition) = self.repetition_through_header(&piece[start..]) {
                        segments.push(repetition);
                        return Chunk { segments };
                    }
                    self.push_body(&piece[start..pos], &mut segments);
                    pos += 2;
                    ScanState::InHeader { open: pos }
                }
                ScanState::InHeader { open } if rest.starts_with("<<") => {
                    let header = piece[open..pos].trim();
                    if !header.is_empty() {
                        segments.push(Segment::Header(header.to_string()));
                    }
                    pos += 2;
                    ScanState::Idle { start: pos }
                }
                other => {
                    pos += rest.chars().next().map_or(1, char::len_utf8);
                    other
                }
            };
        }

        match state {
            ScanState::Idle { start } => self.push_body(&piece[start..], &mut segments),
            // A closing `<<` is confirmed before entering the header state.
            ScanState::InHeader { open } => self.push_body(&piece[open - 2..], &mut segments),
        }

        Chunk { segments }
    }

    fn push_body(&self, body: &str, segments: &mut Vec<Segment>) {
        let body = body.trim();
        if body.is_empty() {
            return;
        }

        if matches!(segments.last(), Some(Segment::Header(_))) && self.is_header_residue(body) {
            debug!("Dropping header residue: {:?}", body);
            return;
        }

        segments.push(self.classify_body(body));
    }

    /// A repetition prefix running into a header repeats the rest of the
    /// piece, header included.
    fn repetition_through_header(&self, rest: &str) -> Option<Segment> {
        match self.classify_body(rest.trim()) {
            repetition @ Segment::Repetition { .. } => Some(repetition),
            _ => None,
        }
    }

    fn is_header_residue(&self, body: &str) -> bool {
        body.chars().count() < self.residue_threshold && !body.chars().any(char::is_alphanumeric)
    }

    /// Classifies a trimmed, header-free body.
    pub fn classify_body(&self, body: &str) -> Segment {
        if let Some(captures) = self.repetition_pattern.captures(body) {
            match captures[1].parse::<u32>() {
                Ok(count) if (1..=self.max_repetitions).contains(&count) => {
                    return Segment::Repetition {
                        count,
                        inner: captures[2].trim().to_string(),
                    };
                }
                _ => debug!("Repetition count {} out of range, keeping literal", &captures[1]),
            }
            return Segment::Plain(body.to_string());
        }

        if let Some(captures) = self.reference_pattern.captures(body) {
            if let Ok(rid) = captures[1].parse::<RecordId>() {
                return Segment::Reference(rid);
            }
        }

        Segment::Plain(body.to_string())
    }

    /// Whether `markup` holds a header, including one inside a repetition.
    pub fn contains_header(&self, markup: &str) -> bool {
        self.scan(markup)
            .iter()
            .flat_map(|chunk| &chunk.segments)
            .any(|segment| match segment {
                Segment::Header(_) => true,
                Segment::Repetition { inner, .. } => self.contains_header(inner),
                _ => false,
            })
    }

    /// Byte ranges and ids of every `%RID` token in `text`.
    pub fn inline_references(&self, text: &str) -> Vec<(Range<usize>, RecordId)> {
        self.inline_reference_pattern
            .captures_iter(text)
            .filter_map(|captures| {
                let whole = captures.get(0)?;
                let rid = captures[1].parse::<RecordId>().ok()?;
                Some((whole.range(), rid))
            })
            .collect()
    }

    /// Every record id referenced anywhere in `raw`, in order of appearance.
    pub fn referenced_ids(&self, raw: &str) -> Vec<RecordId> {
        self.inline_references(&unescape_delimiters(raw))
            .into_iter()
            .map(|(_, rid)| rid)
            .collect()
    }
}

impl Default for MarkupScanner {
    fn default() -> Self {
        Self::new(&ParserConfig::default())
    }
}
