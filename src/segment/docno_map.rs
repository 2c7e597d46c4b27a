//! Dense document number mapping
//!
//! Each segment allocates a dense `docno: u32` in `[0..max_doc)` space and
//! keeps a `docno -> (doc_id, version)` array. Sealed segments never change
//! this array; deletes against them are tracked by the segment manager.

use std::io;

use roaring::RoaringBitmap;

use super::codec::{
    decode_vbyte, decode_vbyte_u64, encode_vbyte, encode_vbyte_u64, read_bitmap, read_string,
    write_bitmap, write_bytes,
};
use super::types::{DocNo, DocNoEntry, Version};

/// Dense document number mapping for a segment
#[derive(Clone, Debug, Default)]
pub struct DocNoMap {
    /// Dense array: docno -> (doc_id, version)
    entries: Vec<DocNoEntry>,
    /// Docnos superseded before the segment was sealed
    deleted: RoaringBitmap,
}

impl DocNoMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            deleted: RoaringBitmap::new(),
        }
    }

    /// Add a new document and return its docno
    pub fn add(&mut self, doc_id: impl Into<String>, version: Version) -> DocNo {
        let docno = DocNo::new(self.entries.len() as u32);
        self.entries.push(DocNoEntry::new(doc_id, version));
        docno
    }

    pub fn get(&self, docno: DocNo) -> Option<&DocNoEntry> {
        self.entries.get(docno.as_usize())
    }

    pub fn get_doc_id(&self, docno: DocNo) -> Option<&str> {
        self.get(docno).map(|e| e.doc_id.as_str())
    }

    /// Mark a docno as deleted
    pub fn delete(&mut self, docno: DocNo) {
        if docno.as_usize() < self.entries.len() {
            self.deleted.insert(docno.as_u32());
        }
    }

    pub fn is_deleted(&self, docno: DocNo) -> bool {
        self.deleted.contains(docno.as_u32())
    }

    /// Check if a docno is live (exists and not deleted)
    pub fn is_live(&self, docno: DocNo) -> bool {
        docno.as_usize() < self.entries.len() && !self.deleted.contains(docno.as_u32())
    }

    /// Number of documents (including deleted)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn live_count(&self) -> usize {
        self.entries.len() - self.deleted.len() as usize
    }

    pub fn deleted_count(&self) -> usize {
        self.deleted.len() as usize
    }

    pub fn deleted_bitset(&self) -> &RoaringBitmap {
        &self.deleted
    }

    /// Iterate over live documents
    pub fn live_docs(&self) -> impl Iterator<Item = (DocNo, &DocNoEntry)> {
        self.entries
            .iter()
            .enumerate()
            .filter(move |(i, _)| !self.deleted.contains(*i as u32))
            .map(|(i, entry)| (DocNo::new(i as u32), entry))
    }

    pub fn serialize(&self) -> io::Result<Vec<u8>> {
        let mut output = Vec::new();
        encode_vbyte(self.entries.len() as u32, &mut output);
        for entry in &self.entries {
            write_bytes(entry.doc_id.as_bytes(), &mut output);
            encode_vbyte_u64(entry.version.0, &mut output);
        }
        write_bitmap(&self.deleted, &mut output)?;
        Ok(output)
    }

    pub fn deserialize(data: &[u8]) -> io::Result<Self> {
        let mut pos = 0;
        let count = decode_vbyte(data, &mut pos)? as usize;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let doc_id = read_string(data, &mut pos)?;
            let version = Version::new(decode_vbyte_u64(data, &mut pos)?);
            entries.push(DocNoEntry { doc_id, version });
        }
        let deleted = read_bitmap(data, &mut pos)?;
        if deleted.max().map_or(false, |max| max as usize >= count) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Deleted docno beyond segment size",
            ));
        }
        Ok(Self { entries, deleted })
    }
}
