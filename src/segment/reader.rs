//! Immutable sealed segments
//!
//! A sealed segment never changes after it is built. Deletes against it are
//! tracked outside the segment, in the published snapshot.

use std::collections::HashMap;

use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};

use super::docno_map::DocNoMap;
use super::docvalues::{ColumnValue, DocValues};
use super::postings::InvertedIndex;
use super::stored::{StoredDocument, StoredFields};
use super::types::{DocNo, SegmentId};
use crate::error::{MapstoreError, Result};

/// Metadata for a sealed segment, recorded in the manifest
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentMeta {
    pub id: SegmentId,
    /// Refresh generation that produced the segment
    pub generation: u64,
    pub doc_count: u32,
    /// Size in bytes of the encoded segment files
    pub size_bytes: u64,
}

/// Read access shared by the open buffer and sealed segments
pub trait SegmentSource {
    fn docs(&self) -> &DocNoMap;
    fn doc_values(&self) -> &DocValues;
    fn stored(&self, docno: DocNo) -> Option<&StoredDocument>;
    /// Visit every `(field, term, docs)` posting
    fn for_each_posting(&self, f: &mut dyn FnMut(&str, &str, &RoaringBitmap));
}

/// An immutable, self-contained segment
#[derive(Clone, Debug)]
pub struct SealedSegment {
    meta: SegmentMeta,
    docs: DocNoMap,
    doc_values: DocValues,
    postings: InvertedIndex,
    stored: StoredFields,
    /// doc_id -> docno lookup
    doc_ids: HashMap<String, DocNo>,
}

impl SealedSegment {
    /// Assemble a segment, checking that all parts agree on the doc count
    pub fn from_parts(
        meta: SegmentMeta,
        docs: DocNoMap,
        doc_values: DocValues,
        postings: InvertedIndex,
        stored: StoredFields,
    ) -> Result<Self> {
        let doc_count = docs.len();
        if meta.doc_count as usize != doc_count || stored.len() != doc_count {
            return Err(MapstoreError::Corrupted(format!(
                "{}: doc count mismatch (meta {}, docno map {}, stored {})",
                meta.id,
                meta.doc_count,
                doc_count,
                stored.len()
            )));
        }
        if let Some((field, column)) = doc_values.columns().find(|(_, c)| c.len() != doc_count) {
            return Err(MapstoreError::Corrupted(format!(
                "{}: column [{}] holds {} values for {} docs",
                meta.id,
                field,
                column.len(),
                doc_count
            )));
        }

        let doc_ids = docs
            .live_docs()
            .map(|(docno, entry)| (entry.doc_id.clone(), docno))
            .collect();

        Ok(Self {
            meta,
            docs,
            doc_values,
            postings,
            stored,
            doc_ids,
        })
    }

    pub fn meta(&self) -> &SegmentMeta {
        &self.meta
    }

    pub fn id(&self) -> SegmentId {
        self.meta.id
    }

    pub fn generation(&self) -> u64 {
        self.meta.generation
    }

    pub fn doc_count(&self) -> u32 {
        self.meta.doc_count
    }

    pub fn postings(&self) -> &InvertedIndex {
        &self.postings
    }

    pub fn stored_fields(&self) -> &StoredFields {
        &self.stored
    }

    /// Docno holding `doc_id`, if the segment contains it
    pub fn docno_of(&self, doc_id: &str) -> Option<DocNo> {
        self.doc_ids.get(doc_id).copied()
    }

    pub fn doc_id(&self, docno: DocNo) -> Option<&str> {
        self.docs.get_doc_id(docno)
    }

    /// Docs whose `field` value lies in `[min, max]`. Empty when this
    /// segment has no numeric column for the field.
    pub fn range_query(&self, field: &str, min: i64, max: i64) -> RoaringBitmap {
        self.doc_values
            .column(field)
            .and_then(|c| c.range_query(min, max))
            .unwrap_or_default()
    }

    /// Docs whose `field` doc value equals `value`
    pub fn value_docs(&self, field: &str, value: &ColumnValue) -> RoaringBitmap {
        self.doc_values
            .column(field)
            .map(|c| c.equals_query(value))
            .unwrap_or_default()
    }

    /// Docs containing `term` in `field`
    pub fn term_docs(&self, field: &str, term: &str) -> RoaringBitmap {
        self.postings
            .get(field, term)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of docs not in `deleted`
    pub fn live_count(&self, deleted: Option<&RoaringBitmap>) -> u32 {
        let deleted = deleted.map_or(0, |d| d.len()) as u32;
        self.meta.doc_count.saturating_sub(deleted)
    }
}

impl SegmentSource for SealedSegment {
    fn docs(&self) -> &DocNoMap {
        &self.docs
    }

    fn doc_values(&self) -> &DocValues {
        &self.doc_values
    }

    fn stored(&self, docno: DocNo) -> Option<&StoredDocument> {
        self.stored.get(docno)
    }

    fn for_each_posting(&self, f: &mut dyn FnMut(&str, &str, &RoaringBitmap)) {
        for (field, dict) in self.postings.fields() {
            for (term, docs) in dict.terms() {
                f(field, &term, docs);
            }
        }
    }
}
