//! # Convocatis Text
//!
//! Parser and paginator for the markup used in stored prayer texts.
//! A text is split into pages on `|`, grouped into sections by `>>header<<`
//! markers, with `N^` repetitions and `%RID` references to other texts
//! resolved against a [`ReferenceStore`].
//!
//! ## Example Usage
//!
//! ```rust
//! use convocatis_text::{ParserConfig, RawText, TextLibrary, TextParser};
//!
//! let library = TextLibrary::from_texts(vec![
//!     RawText::new(42, "Hail Mary", "Hail Mary, full of grace"),
//! ]);
//! let parser = TextParser::new(library, ParserConfig::default());
//!
//! let decade = RawText::new(1, "Decade", "Our Father|>>Decade<<|10^%42|Glory Be");
//! let sections = parser.parse_sections(&decade);
//!
//! assert_eq!(sections.len(), 2);
//! assert_eq!(sections[1].header.as_deref(), Some("Decade"));
//! assert_eq!(sections[1].pages.len(), 11);
//! assert_eq!(sections[1].pages[0].repetition_index(), Some(1));
//! ```

pub mod error;
pub mod services;
pub mod types;

// Re-export main types and services for easier usage
pub use error::{ConvocatisError, Result};
pub use services::{
    AuditReport, CancelFlag, ContentFormatter, LibraryAuditor, LibraryFetcher, MarkupScanner,
    ReadingNavigator, ReferenceStore, TextLibrary, TextParser,
};
pub use types::{
    Diagnostics, FormatStyle, HeaderSection, LibraryMetadata, Page, ParsedText, ParserConfig,
    RawText, RecordId, Repetition, SourceType,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
