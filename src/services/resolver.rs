use crate::error::Result;
use crate::services::store::ReferenceStore;
use crate::types::{Diagnostics, ParserConfig, RawText, RecordId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of looking up a `%RID` marker at a given depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Target found below the depth ceiling. Its body is expanded one level deeper.
    Expand(Arc<RawText>),
    /// Depth ceiling reached. The target's markup is used verbatim.
    Literal(String),
    /// No such record. Substituted with empty content.
    Missing,
}

/// Resolves reference markers against a store for the duration of one parse.
pub struct ReferenceResolver<'a, S: ?Sized> {
    store: &'a S,
    max_depth: usize,
    memoize: bool,
    cache: HashMap<RecordId, Option<Arc<RawText>>>,
    diagnostics: Diagnostics,
}

impl<'a, S: ReferenceStore + ?Sized> ReferenceResolver<'a, S> {
    pub fn new(store: &'a S, config: &ParserConfig) -> Self {
        Self {
            store,
            max_depth: config.max_depth,
            memoize: config.memoize_references,
            cache: HashMap::new(),
            diagnostics: Diagnostics::default(),
        }
    }

    /// `depth` is the nesting level of the markup holding the marker.
    pub fn resolve(&mut self, rid: RecordId, depth: usize) -> Result<Resolution> {
        let target = self.fetch(rid)?;

        match target {
            None => {
                warn!("Referenced text not found: RID={}", rid);
                push_unique(&mut self.diagnostics.dangling_references, rid);
                Ok(Resolution::Missing)
            }
            Some(text) if depth >= self.max_depth => {
                warn!(
                    "Max recursion depth {} reached at RID={}, keeping markup unresolved",
                    self.max_depth, rid
                );
                push_unique(&mut self.diagnostics.depth_limited_references, rid);
                Ok(Resolution::Literal(text.body.clone()))
            }
            Some(text) => {
                debug!("Resolving RID={} at depth {}", rid, depth);
                Ok(Resolution::Expand(text))
            }
        }
    }

    fn fetch(&mut self, rid: RecordId) -> Result<Option<Arc<RawText>>> {
        if self.memoize {
            if let Some(cached) = self.cache.get(&rid) {
                return Ok(cached.clone());
            }
        }

        self.diagnostics.store_lookups += 1;
        let fetched = self.store.lookup(rid)?.map(Arc::new);

        if self.memoize {
            self.cache.insert(rid, fetched.clone());
        }
        Ok(fetched)
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Diagnostics {
        self.diagnostics
    }
}

fn push_unique(ids: &mut Vec<RecordId>, rid: RecordId) {
    if !ids.contains(&rid) {
        ids.push(rid);
    }
}
