use convocatis_text::{
    FormatStyle, LibraryAuditor, LibraryFetcher, ParserConfig, ReadingNavigator, TextParser,
};
use pretty_assertions::assert_eq;
use std::fs;
use tempfile::TempDir;

const PRAYERS: &str = r#"{
    "language": "en",
    "texts": [
        { "rid": 10, "title": "Rosary", "body": "%11|>>First Decade<<|10^%12|%13" },
        { "rid": 11, "title": "Our Father", "body": "Our Father, who art in heaven" },
        { "rid": 12, "title": "Hail Mary", "body": "Hail Mary, full of grace" },
        { "rid": 13, "title": "Glory Be", "body": "Glory be to the Father" },
        { "rid": 14, "title": "--delete-Old Rosary", "body": "%99" }
    ]
}"#;

const BROKEN: &str = r#"[
    { "rid": 20, "title": "Loop A", "body": "%21" },
    { "rid": 21, "title": "Loop B", "body": "%20|%404" }
]"#;

fn write_library(dir: &TempDir, name: &str, content: &str) -> String {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path.to_str().unwrap().to_string()
}

#[tokio::test]
async fn test_loaded_library_parses_and_navigates() {
    let dir = TempDir::new().unwrap();
    let source = write_library(&dir, "prayers.json", PRAYERS);

    let library = LibraryFetcher::fetch_multiple(&[source]).await.unwrap();
    assert_eq!(library.len(), 4);
    assert_eq!(library.metadata.skipped_texts, 1);

    let rosary = library.get(10).cloned().unwrap();
    let config = ParserConfig {
        format_style: FormatStyle::Plain,
        ..ParserConfig::default()
    };
    let parsed = TextParser::new(library, config).parse(&rosary);

    assert_eq!(parsed.page_count(), 12);
    assert_eq!(parsed.sections.len(), 2);
    assert_eq!(parsed.sections[1].header.as_deref(), Some("First Decade"));
    assert!(parsed.diagnostics.dangling_references.is_empty());

    let navigator = ReadingNavigator::new(&parsed.sections);
    assert_eq!(navigator.next_header(0), Some(1));
    assert_eq!(navigator.repetition_indicator(10), Some((10, 10)));
    assert_eq!(navigator.page(11).unwrap().page.plain_text, "Glory be to the Father");
}

#[tokio::test]
async fn test_audit_of_merged_directory() {
    let dir = TempDir::new().unwrap();
    write_library(&dir, "a_prayers.json", PRAYERS);
    write_library(&dir, "b_broken.json", BROKEN);

    let library = LibraryFetcher::fetch_library(dir.path().to_str().unwrap())
        .await
        .unwrap();
    assert_eq!(library.len(), 6);

    let report = LibraryAuditor::new(&ParserConfig::default()).audit(&library);

    assert_eq!(report.texts_checked, 6);
    assert_eq!(report.cycles, vec![vec![20, 21]]);
    assert_eq!(report.dangling.len(), 1);
    assert_eq!((report.dangling[0].source, report.dangling[0].target), (21, 404));
    assert!(!report.is_clean());
}
