//! Segment writer for creating new immutable segments
//!
//! Both sealing the open buffer and merging sealed segments copy live
//! documents into a [`SegmentBuilder`], renumbering them densely. The
//! finished segment can be encoded into [`SegmentFiles`] for persistence.

use crc32fast::Hasher;
use roaring::RoaringBitmap;

use super::docno_map::DocNoMap;
use super::docvalues::DocValues;
use super::postings::{remap_bitmap, InvertedIndex, PostingsBuilder};
use super::reader::{SealedSegment, SegmentMeta, SegmentSource};
use super::stored::StoredFields;
use super::types::{DocNo, SegmentId};
use crate::error::{MapstoreError, Result};

/// Accumulates documents for a new sealed segment
#[derive(Debug, Default)]
pub struct SegmentBuilder {
    docs: DocNoMap,
    doc_values: DocValues,
    postings: PostingsBuilder,
    stored: StoredFields,
}

impl SegmentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of docs copied so far
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Copy the docs of `source` that are live in its docno map and not in
    /// `deleted`, renumbering them after the docs already copied
    pub fn copy_from<S: SegmentSource + ?Sized>(
        &mut self,
        source: &S,
        deleted: Option<&RoaringBitmap>,
    ) -> Result<()> {
        let docs = source.docs();
        let mut remap = vec![None; docs.len()];

        for (old, entry) in docs.live_docs() {
            if deleted.map_or(false, |d| d.contains(old.as_u32())) {
                continue;
            }
            let stored = source.stored(old).cloned().unwrap_or_default();
            let new = self.docs.add(entry.doc_id.clone(), entry.version);
            self.stored.push(stored);
            remap[old.as_usize()] = Some(new);
        }

        for (field, column) in source.doc_values().columns() {
            for (old, new) in remap.iter().enumerate() {
                let Some(new) = new else { continue };
                if let Some(value) = column.get(DocNo::new(old as u32)) {
                    self.doc_values
                        .append(field, *new, &value)
                        .map_err(|mismatch| {
                            MapstoreError::Corrupted(format!(
                                "column [{}] holds {:?} values, found {:?}",
                                field, mismatch.expected, mismatch.actual
                            ))
                        })?;
                }
            }
        }

        let postings = &mut self.postings;
        source.for_each_posting(&mut |field, term, docs| {
            postings.add_bitmap(field, term, &remap_bitmap(docs, &remap));
        });

        Ok(())
    }

    /// Seal the accumulated docs into an immutable segment
    pub fn finish(mut self, id: SegmentId, generation: u64) -> Result<SealedSegment> {
        let doc_count = self.docs.len();
        self.doc_values.finish(doc_count);
        let postings = self.postings.build()?;
        let meta = SegmentMeta {
            id,
            generation,
            doc_count: doc_count as u32,
            size_bytes: 0,
        };
        SealedSegment::from_parts(meta, self.docs, self.doc_values, postings, self.stored)
    }
}

/// Merge segments into one, dropping deleted docs. Inputs are copied in
/// the given order.
pub fn merge_segments(
    inputs: &[(&SealedSegment, Option<&RoaringBitmap>)],
    id: SegmentId,
    generation: u64,
) -> Result<SealedSegment> {
    let mut builder = SegmentBuilder::new();
    for (segment, deleted) in inputs {
        builder.copy_from(*segment, *deleted)?;
    }
    builder.finish(id, generation)
}

/// Encoded files of a sealed segment
#[derive(Clone, Debug)]
pub struct SegmentFiles {
    pub docno_map: Vec<u8>,
    pub doc_values: Vec<u8>,
    pub postings: Vec<u8>,
    pub stored: Vec<u8>,
}

impl SegmentFiles {
    pub const DOCNO_MAP: &'static str = "docno_map.bin";
    pub const DOC_VALUES: &'static str = "doc_values.bin";
    pub const POSTINGS: &'static str = "postings.bin";
    pub const STORED: &'static str = "stored.bin";

    /// Encode every part of a segment
    pub fn encode(segment: &SealedSegment) -> Result<Self> {
        Ok(Self {
            docno_map: segment.docs().serialize()?,
            doc_values: segment.doc_values().serialize()?,
            postings: segment.postings().serialize()?,
            stored: segment.stored_fields().serialize()?,
        })
    }

    /// Decode a segment previously written with [`SegmentFiles::encode`]
    pub fn decode(&self, meta: SegmentMeta) -> Result<SealedSegment> {
        let docs = DocNoMap::deserialize(&self.docno_map)?;
        let doc_values = DocValues::deserialize(&self.doc_values)?;
        let postings = InvertedIndex::deserialize(&self.postings)?;
        let stored = StoredFields::deserialize(&self.stored)?;
        SealedSegment::from_parts(meta, docs, doc_values, postings, stored)
    }

    /// File names paired with their contents
    pub fn parts(&self) -> [(&'static str, &[u8]); 4] {
        [
            (Self::DOCNO_MAP, self.docno_map.as_slice()),
            (Self::DOC_VALUES, self.doc_values.as_slice()),
            (Self::POSTINGS, self.postings.as_slice()),
            (Self::STORED, self.stored.as_slice()),
        ]
    }

    pub fn size_bytes(&self) -> u64 {
        self.parts().iter().map(|(_, data)| data.len() as u64).sum()
    }

    /// CRC32 over all parts, in `parts()` order. The manifest records this
    /// value and it is verified when the segment is loaded.
    pub fn checksum(&self) -> u64 {
        let mut hasher = Hasher::new();
        for (_, data) in self.parts() {
            hasher.update(data);
        }
        hasher.finalize() as u64
    }
}
