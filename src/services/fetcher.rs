use crate::error::{ConvocatisError, Result};
use crate::services::store::TextLibrary;
use crate::types::{LibraryMetadata, RawText, SourceType};
use serde::Deserialize;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, warn};
use url::Url;
use walkdir::WalkDir;

/// Titles with this prefix mark texts withdrawn upstream.
const DELETED_TITLE_PREFIX: &str = "--delete-";

#[derive(Deserialize)]
#[serde(untagged)]
enum LibraryFile {
    Document {
        #[serde(default)]
        language: Option<String>,
        texts: Vec<RawText>,
    },
    Texts(Vec<RawText>),
}

pub struct LibraryFetcher;

impl LibraryFetcher {
    /// Loads a library from a URL, a JSON file, or a directory of JSON files.
    pub async fn fetch_library(source: &str) -> Result<TextLibrary> {
        if Self::is_url(source) {
            return Self::fetch_from_url(source).await;
        }

        let path = Path::new(source);
        if path.is_dir() {
            Self::fetch_from_directory(path).await
        } else {
            Self::fetch_from_file(source).await
        }
    }

    /// Loads every source and merges them; later sources win on id clashes.
    pub async fn fetch_multiple(sources: &[String]) -> Result<TextLibrary> {
        let mut merged: Option<TextLibrary> = None;

        for source in sources {
            match Self::fetch_library(source).await {
                Ok(library) => {
                    info!("Loaded {} texts from: {}", library.len(), source);
                    merged = Some(match merged.take() {
                        Some(mut existing) => {
                            existing.merge(library);
                            existing
                        }
                        None => library,
                    });
                }
                Err(e) => {
                    warn!("Failed to load library from {}: {}", source, e);
                    return Err(e);
                }
            }
        }

        merged.ok_or_else(|| ConvocatisError::InvalidLibrary {
            reason: "No library sources given".to_string(),
        })
    }

    async fn fetch_from_url(url: &str) -> Result<TextLibrary> {
        info!("Fetching library from URL: {}", url);

        Url::parse(url)?;
        let client = reqwest::Client::new();
        let response = client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(ConvocatisError::HttpStatus {
                status: response.status().as_u16(),
            });
        }

        let content = response.text().await?;
        Self::parse_library(&content, url, SourceType::Url)
    }

    async fn fetch_from_file(file_path: &str) -> Result<TextLibrary> {
        info!("Reading library file: {}", file_path);

        let path = Path::new(file_path);
        if !path.exists() {
            return Err(ConvocatisError::FileNotFound {
                path: file_path.to_string(),
            });
        }

        let content = fs::read_to_string(path).await?;
        Self::parse_library(&content, file_path, SourceType::LocalFile)
    }

    async fn fetch_from_directory(dir: &Path) -> Result<TextLibrary> {
        info!("Scanning library directory: {}", dir.display());

        let mut files = Vec::new();
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(std::io::Error::from)?;
            let is_json = entry.path().extension().and_then(|e| e.to_str()) == Some("json");
            if entry.file_type().is_file() && is_json {
                files.push(entry.into_path());
            }
        }

        if files.is_empty() {
            return Err(ConvocatisError::InvalidLibrary {
                reason: format!("No .json libraries found in {}", dir.display()),
            });
        }

        let metadata = Self::metadata(dir.display().to_string(), SourceType::Directory);
        let mut library = TextLibrary::new(Vec::new(), metadata);
        for file in files {
            debug!("Loading {}", file.display());
            let content = fs::read_to_string(&file).await?;
            let source = file.display().to_string();
            library.merge(Self::parse_library(&content, &source, SourceType::LocalFile)?);
        }

        Ok(library)
    }

    /// Parses library JSON: either `{ "language": .., "texts": [..] }` or a bare array.
    pub fn parse_library(
        content: &str,
        source: &str,
        source_type: SourceType,
    ) -> Result<TextLibrary> {
        let file: LibraryFile =
            serde_json::from_str(content).map_err(|e| ConvocatisError::InvalidLibrary {
                reason: format!("{}: {}", source, e),
            })?;

        let (language, texts) = match file {
            LibraryFile::Document { language, texts } => (language, texts),
            LibraryFile::Texts(texts) => (None, texts),
        };

        let mut skipped = 0;
        let texts: Vec<RawText> = texts
            .into_iter()
            .filter_map(|mut text| {
                text.title = text.title.trim().to_string();
                if Self::is_deleted(&text.title) {
                    debug!("Skipping deleted text RID={}", text.rid);
                    skipped += 1;
                    return None;
                }
                if text.language.is_none() {
                    text.language = language.clone();
                }
                Some(text)
            })
            .collect();

        let mut metadata = Self::metadata(source.to_string(), source_type);
        metadata.skipped_texts = skipped;
        Ok(TextLibrary::new(texts, metadata))
    }

    fn is_deleted(title: &str) -> bool {
        title
            .get(..DELETED_TITLE_PREFIX.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(DELETED_TITLE_PREFIX))
    }

    fn metadata(source: String, source_type: SourceType) -> LibraryMetadata {
        LibraryMetadata {
            source,
            source_type,
            loaded_at: chrono::Utc::now().to_rfc3339(),
            total_texts: 0,
            skipped_texts: 0,
        }
    }

    fn is_url(source: &str) -> bool {
        source.starts_with("http://") || source.starts_with("https://")
    }

    pub async fn validate_sources(sources: &[String]) -> Result<Vec<String>> {
        let mut validated = Vec::new();

        for source in sources {
            if Self::is_url(source) {
                Url::parse(source)?;
                validated.push(source.clone());
            } else if Path::new(source).exists() {
                validated.push(source.clone());
            } else {
                return Err(ConvocatisError::FileNotFound {
                    path: source.clone(),
                });
            }
        }

        Ok(validated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::store::ReferenceStore;

    const LIBRARY: &str = r#"{
        "language": "lv",
        "texts": [
            { "rid": 1, "title": " Tēvs mūsu ", "body": "Tēvs mūsu..." },
            { "rid": 2, "title": "--DELETE-old", "body": "gone" },
            {
                "rid": 3, "title": "Credo", "raw_content": "%1",
                "language": "la", "category_type": 2, "category_code": "7"
            }
        ]
    }"#;

    #[test]
    fn test_parse_library_document() {
        let library =
            LibraryFetcher::parse_library(LIBRARY, "texts.json", SourceType::LocalFile).unwrap();

        assert_eq!(library.len(), 2);
        assert_eq!(library.metadata.skipped_texts, 1);
        assert_eq!(library.metadata.total_texts, 2);

        let first = library.lookup(1).unwrap().unwrap();
        assert_eq!(first.title, "Tēvs mūsu");
        assert_eq!(first.language.as_deref(), Some("lv"));

        let credo = library.get(3).unwrap();
        assert_eq!(credo.body, "%1");
        assert_eq!(credo.language.as_deref(), Some("la"));
        assert_eq!(credo.category_type, Some(2));
        assert!(library.get(2).is_none());
    }

    #[test]
    fn test_parse_library_bare_array() {
        let content = r#"[{ "rid": 5, "title": "Amen", "body": "Amen" }]"#;
        let library =
            LibraryFetcher::parse_library(content, "a.json", SourceType::LocalFile).unwrap();

        assert_eq!(library.len(), 1);
        assert_eq!(library.get(5).unwrap().language, None);
    }

    #[test]
    fn test_invalid_library_json() {
        let result =
            LibraryFetcher::parse_library("{\"texts\": 3}", "bad.json", SourceType::LocalFile);
        assert!(matches!(result, Err(ConvocatisError::InvalidLibrary { .. })));
    }

    #[tokio::test]
    async fn test_fetch_from_file_and_directory() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("a.json");
        let second = dir.path().join("b.json");
        std::fs::write(&first, LIBRARY).unwrap();
        let replacement = r#"[{ "rid": 1, "title": "Our Father", "body": "Our Father..." }]"#;
        std::fs::write(&second, replacement).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let single = LibraryFetcher::fetch_library(first.to_str().unwrap()).await.unwrap();
        assert_eq!(single.len(), 2);

        let all = LibraryFetcher::fetch_library(dir.path().to_str().unwrap()).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all.metadata.source_type, SourceType::Directory);
        assert_eq!(all.metadata.skipped_texts, 1);
        // b.json sorts after a.json and replaces RID 1
        assert_eq!(all.get(1).unwrap().title, "Our Father");
    }

    #[tokio::test]
    async fn test_missing_sources() {
        let missing = LibraryFetcher::fetch_library("/definitely/not/here.json").await;
        assert!(matches!(missing, Err(ConvocatisError::FileNotFound { .. })));

        let invalid = LibraryFetcher::validate_sources(&["nope.json".to_string()]).await;
        assert!(invalid.is_err());

        let empty = LibraryFetcher::fetch_multiple(&[]).await;
        assert!(matches!(empty, Err(ConvocatisError::InvalidLibrary { .. })));
    }
}
