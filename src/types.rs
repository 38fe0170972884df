use crate::error::{ConvocatisError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Identifier of a stored text (the `RID` in `%RID` markers).
pub type RecordId = u64;

/// A stored text as handed over by the reference store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawText {
    pub rid: RecordId,
    pub title: String,
    /// Raw markup body.
    #[serde(alias = "raw_content", alias = "string")]
    pub body: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub category_type: Option<i32>,
    #[serde(default)]
    pub category_code: Option<String>,
}

impl RawText {
    pub fn new(rid: RecordId, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            rid,
            title: title.into(),
            body: body.into(),
            language: None,
            category_type: None,
            category_code: None,
        }
    }
}

/// "This page is the `index`th of `total` repeats."
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repetition {
    index: u32,
    total: u32,
}

impl Repetition {
    /// Returns `None` unless `1 <= index <= total`.
    pub fn new(index: u32, total: u32) -> Option<Self> {
        (index >= 1 && index <= total).then_some(Self { index, total })
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn total(&self) -> u32 {
        self.total
    }
}

/// One renderable page of a parsed text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// 1-based position within the parse result.
    pub ordinal: usize,
    /// Resolved content after formatting.
    pub content: String,
    /// Resolved content before formatting.
    pub plain_text: String,
    /// Header shown as a banner across a run of repeated pages.
    pub static_header: Option<String>,
    pub repetition: Option<Repetition>,
}

impl Page {
    pub fn repetition_index(&self) -> Option<u32> {
        self.repetition.map(|r| r.index())
    }

    pub fn repetition_total(&self) -> Option<u32> {
        self.repetition.map(|r| r.total())
    }

    pub fn is_repetition(&self) -> bool {
        self.repetition.is_some()
    }
}

/// A contiguous run of pages under one structural header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderSection {
    /// `None` for content that precedes the first header.
    pub header: Option<String>,
    pub pages: Vec<Page>,
    /// 0-based position among all sections of the text.
    pub index: usize,
    pub total: usize,
}

/// Things worth knowing about a parse that never surface as errors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub dangling_references: Vec<RecordId>,
    pub depth_limited_references: Vec<RecordId>,
    pub truncated: bool,
    pub fell_back: bool,
    pub store_lookups: usize,
}

/// Result of parsing one text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedText {
    pub rid: RecordId,
    pub title: String,
    pub sections: Vec<HeaderSection>,
    pub diagnostics: Diagnostics,
}

impl ParsedText {
    /// Flat page list, in reading order.
    pub fn pages(&self) -> Vec<Page> {
        self.sections
            .iter()
            .flat_map(|section| section.pages.iter().cloned())
            .collect()
    }

    pub fn page_count(&self) -> usize {
        self.sections.iter().map(|s| s.pages.len()).sum()
    }

    pub fn into_pages(self) -> Vec<Page> {
        self.sections.into_iter().flat_map(|s| s.pages).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FormatStyle {
    /// Paragraph and line-break markup (`<p>`, `<br>`)
    #[default]
    Html,
    /// Normalized plain text
    Plain,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Reference nesting ceiling; at this depth markup is returned unresolved.
    pub max_depth: usize,
    /// Largest accepted `N` in `N^`; larger counts are literal text.
    pub max_repetitions: u32,
    /// A body shorter than this right after a header, with no
    /// alphanumerics, is treated as leftover header markup.
    pub header_residue_threshold: usize,
    /// Upper bound on pages produced for one text.
    pub max_pages: usize,
    pub memoize_references: bool,
    pub format_style: FormatStyle,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_depth: 5,
            max_repetitions: 1000,
            header_residue_threshold: 3,
            max_pages: 10_000,
            memoize_references: true,
            format_style: FormatStyle::Html,
        }
    }
}

impl ParserConfig {
    /// Reads a JSON config file; missing keys keep their defaults.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConvocatisError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path)?;
        let config: ParserConfig =
            serde_json::from_str(&content).map_err(|e| ConvocatisError::Config {
                reason: format!("{}: {}", path.display(), e),
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_repetitions == 0 {
            return Err(ConvocatisError::Config {
                reason: "max_repetitions must be greater than 0".to_string(),
            });
        }

        if self.max_pages == 0 {
            return Err(ConvocatisError::Config {
                reason: "max_pages must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceType {
    LocalFile,
    Url,
    Directory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryMetadata {
    pub source: String,
    pub source_type: SourceType,
    pub loaded_at: String,
    pub total_texts: usize,
    pub skipped_texts: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repetition_bounds() {
        assert!(Repetition::new(1, 1).is_some());
        assert!(Repetition::new(3, 3).is_some());
        assert!(Repetition::new(0, 3).is_none());
        assert!(Repetition::new(4, 3).is_none());
    }

    #[test]
    fn test_config_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parser.json");
        std::fs::write(&path, r#"{ "max_depth": 3, "format_style": "plain" }"#).unwrap();

        let config = ParserConfig::load_from_path(&path).unwrap();
        assert_eq!(config.max_depth, 3);
        assert_eq!(config.format_style, FormatStyle::Plain);
        assert_eq!(config.max_repetitions, 1000);
        assert!(config.memoize_references);
    }

    #[test]
    fn test_config_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parser.json");
        std::fs::write(&path, r#"{ "max_pages": 0 }"#).unwrap();

        assert!(matches!(
            ParserConfig::load_from_path(&path),
            Err(ConvocatisError::Config { .. })
        ));
        assert!(matches!(
            ParserConfig::load_from_path(dir.path().join("missing.json")),
            Err(ConvocatisError::FileNotFound { .. })
        ));
    }

    #[test]
    fn test_parsed_text_flat_view() {
        let page = |ordinal: usize| Page {
            ordinal,
            content: String::new(),
            plain_text: String::new(),
            static_header: None,
            repetition: None,
        };
        let parsed = ParsedText {
            rid: 1,
            title: "t".to_string(),
            sections: vec![
                HeaderSection {
                    header: None,
                    pages: vec![page(1)],
                    index: 0,
                    total: 2,
                },
                HeaderSection {
                    header: Some("H".to_string()),
                    pages: vec![page(2), page(3)],
                    index: 1,
                    total: 2,
                },
            ],
            diagnostics: Diagnostics::default(),
        };

        assert_eq!(parsed.page_count(), 3);
        let ordinals: Vec<usize> = parsed.into_pages().iter().map(|p| p.ordinal).collect();
        assert_eq!(ordinals, vec![1, 2, 3]);
    }
}
