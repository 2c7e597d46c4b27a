//! The open segment: in-memory buffer for recent writes
//!
//! Documents are appended here until a refresh seals the buffer into an
//! immutable segment. A document is appended as a unit: its columns,
//! postings and stored fields either all land or none do.

use std::collections::BTreeSet;

use roaring::RoaringBitmap;

use super::docno_map::DocNoMap;
use super::docvalues::DocValues;
use super::postings::PostingsBuilder;
use super::reader::{SealedSegment, SegmentSource};
use super::stored::{StoredDocument, StoredFields};
use super::types::{DocNo, SegmentId, Version};
use super::writer::SegmentBuilder;
use crate::config::BufferConfig;
use crate::error::{MapstoreError, Result};
use crate::schema::ParsedDocument;

/// Where a buffered document came from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocOrigin {
    /// A document id not present in any sealed segment
    New,
    /// A new copy of a document whose previous copy lives in this segment
    Replaces(SegmentId),
}

/// Mutable open segment
#[derive(Debug, Default)]
pub struct SegmentBuffer {
    docs: DocNoMap,
    /// Origin per docno
    origins: Vec<DocOrigin>,
    doc_values: DocValues,
    postings: PostingsBuilder,
    stored: StoredFields,
    /// Approximate size in bytes
    size_bytes: usize,
}

impl SegmentBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parsed document and return its docno
    pub fn add(
        &mut self,
        doc: &ParsedDocument,
        version: Version,
        origin: DocOrigin,
    ) -> Result<DocNo> {
        // Check every column first so a failure leaves the buffer untouched
        let mut columns = Vec::new();
        for field in doc.fields.iter().filter(|f| f.declaration.columnar()) {
            let Some(value) = field.value.column_value() else {
                continue;
            };
            if let Some(column) = self.doc_values.column(&field.declaration.name) {
                if column.kind() != value.kind() {
                    return Err(MapstoreError::InvalidValue {
                        field: field.declaration.name.clone(),
                        reason: format!(
                            "column holds {:?} values, got {:?}",
                            column.kind(),
                            value.kind()
                        ),
                    });
                }
            }
            columns.push((field.declaration.name.as_str(), value));
        }

        let docno = self.docs.add(doc.id.clone(), version);
        self.origins.push(origin);

        for (field, value) in &columns {
            // Kinds were checked above
            if self.doc_values.append(field, docno, value).is_err() {
                return Err(MapstoreError::Corrupted(format!(
                    "column [{}] changed kind during append",
                    field
                )));
            }
        }

        let mut stored = StoredDocument {
            fields: Default::default(),
            source: doc.source.clone(),
        };
        for field in &doc.fields {
            if !field.terms.is_empty() {
                self.postings.add(&field.declaration.name, &field.terms, docno);
            }
            if field.declaration.stored() {
                stored
                    .fields
                    .insert(field.declaration.name.clone(), field.value.clone());
            }
        }
        self.stored.push(stored);
        self.size_bytes += doc.estimated_bytes();

        Ok(docno)
    }

    /// Drop a buffered document, returning the origin the replacing copy
    /// should inherit
    pub fn delete(&mut self, docno: DocNo) -> Option<DocOrigin> {
        if !self.docs.is_live(docno) {
            return None;
        }
        self.docs.delete(docno);
        self.origin(docno)
    }

    pub fn origin(&self, docno: DocNo) -> Option<DocOrigin> {
        self.origins.get(docno.as_usize()).copied()
    }

    /// Number of docs including dropped ones
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn live_count(&self) -> usize {
        self.docs.live_count()
    }

    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    /// Check if the buffer crossed a refresh threshold
    pub fn should_seal(&self, config: &BufferConfig) -> bool {
        self.size_bytes >= config.max_bytes || self.live_count() >= config.max_docs
    }

    /// Sealed segments holding the previous copies of live buffered docs
    pub fn replaced_segments(&self) -> BTreeSet<SegmentId> {
        self.docs
            .live_docs()
            .filter_map(|(docno, _)| match self.origin(docno) {
                Some(DocOrigin::Replaces(id)) => Some(id),
                _ => None,
            })
            .collect()
    }

    /// True when the buffer holds live docs and every one of them replaces
    /// a document from a sealed segment
    pub fn is_update_only(&self) -> bool {
        self.live_count() > 0
            && self
                .docs
                .live_docs()
                .all(|(docno, _)| matches!(self.origin(docno), Some(DocOrigin::Replaces(_))))
    }

    /// Build an immutable segment from the live docs. The buffer itself is
    /// not consumed so a failed refresh can retry.
    pub fn seal(&self, id: SegmentId, generation: u64) -> Result<SealedSegment> {
        let mut builder = SegmentBuilder::new();
        builder.copy_from(self, None)?;
        builder.finish(id, generation)
    }
}

impl SegmentSource for SegmentBuffer {
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
        for (field, term, docs) in self.postings.iter() {
            f(field, term, docs);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Document;
    use crate::schema::{DocumentParser, DynamicTemplate, FieldMapping, Mapping};

    fn mapping() -> Mapping {
        Mapping::new()
            .field(
                "name",
                FieldMapping::text()
                    .with_index(true)
                    .with_store(true)
                    .with_doc_values(false),
            )
            .unwrap()
            .dynamic_template(
                DynamicTemplate::new(
                    "dv",
                    "dv_*",
                    FieldMapping::integer()
                        .with_index(false)
                        .with_store(false)
                        .with_doc_values(true),
                )
                .unwrap(),
            )
            .unwrap()
            .with_source_enabled(false)
    }

    fn parse(id: &str, value: i64, name: &str) -> ParsedDocument {
        let doc = Document::new(id)
            .with_field("dv_field", value)
            .with_field("name", name);
        DocumentParser::default().parse(&mapping(), &doc).unwrap()
    }

    #[test]
    fn test_add_routes_fields_to_forms() {
        let mut buffer = SegmentBuffer::new();
        let docno = buffer
            .add(&parse("0", 100, "one hundred"), Version::FIRST, DocOrigin::New)
            .unwrap();

        assert_eq!(docno, DocNo(0));
        assert_eq!(buffer.live_count(), 1);
        assert!(buffer.size_bytes() > 0);

        let column = buffer.doc_values().column("dv_field").unwrap();
        assert_eq!(column.get(docno), Some(crate::segment::ColumnValue::Numeric(100)));
        assert!(buffer.doc_values().column("name").is_none());

        let stored = buffer.stored(docno).unwrap();
        assert!(stored.fields.contains_key("name"));
        assert!(!stored.fields.contains_key("dv_field"));
        assert!(stored.source.is_none());
    }

    #[test]
    fn test_seal_drops_deleted_docs() {
        let mut buffer = SegmentBuffer::new();
        let first = buffer
            .add(&parse("0", 100, "one hundred"), Version::FIRST, DocOrigin::New)
            .unwrap();
        buffer
            .add(&parse("1", 200, "two hundred"), Version::FIRST, DocOrigin::New)
            .unwrap();
        assert_eq!(buffer.delete(first), Some(DocOrigin::New));
        assert_eq!(buffer.delete(first), None);

        let segment = buffer.seal(SegmentId::new(1), 1).unwrap();
        assert_eq!(segment.doc_count(), 1);
        assert_eq!(segment.doc_id(DocNo(0)), Some("1"));
        assert_eq!(segment.range_query("dv_field", 200, 200).len(), 1);
        assert_eq!(segment.term_docs("name", "two").len(), 1);
        assert!(segment.term_docs("name", "one").is_empty());

        // Sealing leaves the buffer intact for a retry
        assert_eq!(buffer.live_count(), 1);
    }

    #[test]
    fn test_update_only_detection() {
        let mut buffer = SegmentBuffer::new();
        assert!(!buffer.is_update_only());

        buffer
            .add(
                &parse("0", 1009, "one hundred"),
                Version::new(2),
                DocOrigin::Replaces(SegmentId::new(0)),
            )
            .unwrap();
        assert!(buffer.is_update_only());
        assert_eq!(
            buffer.replaced_segments().into_iter().collect::<Vec<_>>(),
            vec![SegmentId::new(0)]
        );

        buffer
            .add(&parse("2", 5, "five"), Version::FIRST, DocOrigin::New)
            .unwrap();
        assert!(!buffer.is_update_only());
    }

    #[test]
    fn test_should_seal() {
        let mut buffer = SegmentBuffer::new();
        let config = BufferConfig {
            max_docs: 2,
            max_bytes: usize::MAX,
        };
        buffer
            .add(&parse("0", 1, "a"), Version::FIRST, DocOrigin::New)
            .unwrap();
        assert!(!buffer.should_seal(&config));
        buffer
            .add(&parse("1", 2, "b"), Version::FIRST, DocOrigin::New)
            .unwrap();
        assert!(buffer.should_seal(&config));
    }
}
