pub mod auditor;
pub mod expander;
pub mod fetcher;
pub mod formatter;
pub mod navigation;
pub mod parser;
pub mod resolver;
pub mod scanner;
pub mod sections;
pub mod store;

pub use auditor::{AuditReport, LibraryAuditor};
pub use fetcher::LibraryFetcher;
pub use formatter::{ContentFormatter, HtmlFormatter, PlainFormatter};
pub use navigation::ReadingNavigator;
pub use parser::{CancelFlag, TextParser};
pub use scanner::{MarkupScanner, Segment};
pub use sections::SectionBuilder;
pub use store::{ReferenceStore, TextLibrary};
