use crate::error::Result;
use crate::types::{LibraryMetadata, RawText, RecordId, SourceType};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Read-only access to stored texts by record id.
///
/// Unknown ids yield `Ok(None)`. An `Err` means the store itself failed.
pub trait ReferenceStore: Send + Sync {
    fn lookup(&self, rid: RecordId) -> Result<Option<RawText>>;
}

impl<S: ReferenceStore + ?Sized> ReferenceStore for &S {
    fn lookup(&self, rid: RecordId) -> Result<Option<RawText>> {
        (**self).lookup(rid)
    }
}

impl<S: ReferenceStore + ?Sized> ReferenceStore for Arc<S> {
    fn lookup(&self, rid: RecordId) -> Result<Option<RawText>> {
        (**self).lookup(rid)
    }
}

impl ReferenceStore for HashMap<RecordId, RawText> {
    fn lookup(&self, rid: RecordId) -> Result<Option<RawText>> {
        Ok(self.get(&rid).cloned())
    }
}

/// In-memory collection of texts, ordered by record id.
#[derive(Debug, Clone)]
pub struct TextLibrary {
    texts: BTreeMap<RecordId, RawText>,
    pub metadata: LibraryMetadata,
}

impl TextLibrary {
    pub fn new(texts: impl IntoIterator<Item = RawText>, metadata: LibraryMetadata) -> Self {
        let mut library = Self {
            texts: BTreeMap::new(),
            metadata,
        };
        library.extend(texts);
        library
    }

    pub fn from_texts(texts: impl IntoIterator<Item = RawText>) -> Self {
        Self::new(
            texts,
            LibraryMetadata {
                source: "memory".to_string(),
                source_type: SourceType::LocalFile,
                loaded_at: chrono::Utc::now().to_rfc3339(),
                total_texts: 0,
                skipped_texts: 0,
            },
        )
    }

    /// Later texts replace earlier ones with the same id.
    pub fn extend(&mut self, texts: impl IntoIterator<Item = RawText>) {
        for text in texts {
            self.texts.insert(text.rid, text);
        }
        self.metadata.total_texts = self.texts.len();
    }

    pub fn merge(&mut self, other: TextLibrary) {
        self.metadata.skipped_texts += other.metadata.skipped_texts;
        self.extend(other.texts.into_values());
    }

    pub fn get(&self, rid: RecordId) -> Option<&RawText> {
        self.texts.get(&rid)
    }

    pub fn texts(&self) -> impl Iterator<Item = &RawText> {
        self.texts.values()
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }
}

impl ReferenceStore for TextLibrary {
    fn lookup(&self, rid: RecordId) -> Result<Option<RawText>> {
        Ok(self.texts.get(&rid).cloned())
    }
}
