//! Query execution context
//!
//! A `QueryContext` pins one published snapshot and one mapping snapshot
//! so a query sees a consistent view, however many refreshes run during
//! its execution.

use std::collections::HashSet;
use std::sync::Arc;

use roaring::RoaringBitmap;

use crate::schema::{FieldDeclaration, Mapping};
use crate::segment::{DocNo, IndexSnapshot, SealedSegment};
use crate::tokenizer::Tokenizer;

pub struct QueryContext<'a> {
    snapshot: Arc<IndexSnapshot>,
    mapping: Arc<Mapping>,
    tokenizer: &'a Tokenizer,
}

impl<'a> QueryContext<'a> {
    pub fn new(snapshot: Arc<IndexSnapshot>, mapping: Arc<Mapping>, tokenizer: &'a Tokenizer) -> Self {
        Self {
            snapshot,
            mapping,
            tokenizer,
        }
    }

    pub fn snapshot(&self) -> &IndexSnapshot {
        &self.snapshot
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        self.tokenizer
    }

    pub fn field(&self, name: &str) -> Option<&FieldDeclaration> {
        self.mapping.get_field(name)
    }

    /// Run `matches` against every segment and collect the ids of live
    /// hits, in segment order then docno order, without duplicates
    pub fn collect_ids<F>(&self, mut matches: F) -> Vec<String>
    where
        F: FnMut(&SealedSegment) -> RoaringBitmap,
    {
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        for segment in self.snapshot.segments() {
            let hits = self.snapshot.live(segment, matches(segment));
            for docno in hits {
                if let Some(doc_id) = segment.doc_id(DocNo::new(docno)) {
                    if seen.insert(doc_id) {
                        ids.push(doc_id.to_string());
                    }
                }
            }
        }
        ids
    }
}
