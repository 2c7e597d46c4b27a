//! Inverted index for searchable fields
//!
//! While a segment is open, postings live in sorted maps of
//! `term -> RoaringBitmap` per field. Sealing turns every field into an
//! FST term dictionary whose outputs index into the posting bitmaps.

use std::collections::BTreeMap;
use std::io;

use fst::{Map, MapBuilder, Streamer};
use roaring::RoaringBitmap;

use super::codec::{
    decode_vbyte, encode_vbyte, read_bitmap, read_bytes, read_string, write_bitmap, write_bytes,
};
use super::types::DocNo;

/// Mutable postings of an open segment
#[derive(Clone, Debug, Default)]
pub struct PostingsBuilder {
    fields: BTreeMap<String, BTreeMap<String, RoaringBitmap>>,
}

impl PostingsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `docno` contains each of `terms` in `field`
    pub fn add(&mut self, field: &str, terms: &[String], docno: DocNo) {
        if terms.is_empty() {
            return;
        }
        let dict = self.fields.entry(field.to_string()).or_default();
        for term in terms {
            dict.entry(term.clone()).or_default().insert(docno.as_u32());
        }
    }

    /// Union a whole posting bitmap into `field:term`
    pub fn add_bitmap(&mut self, field: &str, term: &str, docs: &RoaringBitmap) {
        if docs.is_empty() {
            return;
        }
        let posting = self
            .fields
            .entry(field.to_string())
            .or_default()
            .entry(term.to_string())
            .or_default();
        *posting |= docs;
    }

    pub fn get(&self, field: &str, term: &str) -> Option<&RoaringBitmap> {
        self.fields.get(field).and_then(|dict| dict.get(term))
    }

    pub fn term_count(&self) -> usize {
        self.fields.values().map(|dict| dict.len()).sum()
    }

    /// Every `(field, term, docs)` posting, ordered by field then term
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &RoaringBitmap)> {
        self.fields.iter().flat_map(|(field, dict)| {
            dict.iter()
                .map(move |(term, docs)| (field.as_str(), term.as_str(), docs))
        })
    }

    /// Build the sealed term dictionaries
    pub fn build(&self) -> io::Result<InvertedIndex> {
        let mut fields = BTreeMap::new();
        for (field, dict) in &self.fields {
            let terms = dict
                .iter()
                .filter(|(_, docs)| !docs.is_empty())
                .map(|(term, docs)| (term.as_str(), docs.clone()));
            let dictionary = TermDictionary::build(terms)?;
            if !dictionary.is_empty() {
                fields.insert(field.clone(), dictionary);
            }
        }
        Ok(InvertedIndex { fields })
    }
}

/// Renumber the docs of a bitmap, dropping those mapped to `None`
pub fn remap_bitmap(docs: &RoaringBitmap, remap: &[Option<DocNo>]) -> RoaringBitmap {
    docs.iter()
        .filter_map(|docno| remap.get(docno as usize).copied().flatten())
        .map(DocNo::as_u32)
        .collect()
}

/// Term dictionary backed by an FST
///
/// The FST maps each term to an index into the posting bitmaps.
#[derive(Clone)]
pub struct TermDictionary {
    fst: Map<Vec<u8>>,
    postings: Vec<RoaringBitmap>,
}

impl TermDictionary {
    /// Build from terms in lexicographic order
    pub fn build<'a>(terms: impl IntoIterator<Item = (&'a str, RoaringBitmap)>) -> io::Result<Self> {
        let mut builder = MapBuilder::memory();
        let mut postings = Vec::new();
        for (term, docs) in terms {
            builder
                .insert(term.as_bytes(), postings.len() as u64)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            postings.push(docs);
        }
        let fst_data = builder
            .into_inner()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Self::from_parts(fst_data, postings)
    }

    fn from_parts(fst_data: Vec<u8>, postings: Vec<RoaringBitmap>) -> io::Result<Self> {
        let fst = Map::new(fst_data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        if fst.len() != postings.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Term count does not match posting count",
            ));
        }
        Ok(Self { fst, postings })
    }

    /// Look up the docs containing a term
    pub fn get(&self, term: &str) -> Option<&RoaringBitmap> {
        self.fst
            .get(term.as_bytes())
            .and_then(|idx| self.postings.get(idx as usize))
    }

    pub fn len(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    /// All terms with their postings, in term order
    pub fn terms(&self) -> Vec<(String, &RoaringBitmap)> {
        let mut results = Vec::with_capacity(self.postings.len());
        let mut stream = self.fst.stream();
        while let Some((key, idx)) = stream.next() {
            if let (Ok(term), Some(docs)) =
                (std::str::from_utf8(key), self.postings.get(idx as usize))
            {
                results.push((term.to_string(), docs));
            }
        }
        results
    }

    fn serialize_into(&self, output: &mut Vec<u8>) -> io::Result<()> {
        write_bytes(self.fst.as_fst().as_bytes(), output);
        encode_vbyte(self.postings.len() as u32, output);
        for docs in &self.postings {
            write_bitmap(docs, output)?;
        }
        Ok(())
    }

    fn deserialize(data: &[u8], pos: &mut usize) -> io::Result<Self> {
        let fst_data = read_bytes(data, pos)?.to_vec();
        let count = decode_vbyte(data, pos)? as usize;
        let mut postings = Vec::with_capacity(count);
        for _ in 0..count {
            postings.push(read_bitmap(data, pos)?);
        }
        Self::from_parts(fst_data, postings)
    }
}

impl std::fmt::Debug for TermDictionary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TermDictionary")
            .field("terms", &self.postings.len())
            .finish()
    }
}

/// Sealed inverted index of a segment, one term dictionary per field
#[derive(Clone, Debug, Default)]
pub struct InvertedIndex {
    fields: BTreeMap<String, TermDictionary>,
}

impl InvertedIndex {
    pub fn field(&self, name: &str) -> Option<&TermDictionary> {
        self.fields.get(name)
    }

    pub fn get(&self, field: &str, term: &str) -> Option<&RoaringBitmap> {
        self.fields.get(field).and_then(|dict| dict.get(term))
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &TermDictionary)> {
        self.fields.iter().map(|(name, dict)| (name.as_str(), dict))
    }

    pub fn serialize(&self) -> io::Result<Vec<u8>> {
        let mut output = Vec::new();
        encode_vbyte(self.fields.len() as u32, &mut output);
        for (name, dict) in &self.fields {
            write_bytes(name.as_bytes(), &mut output);
            dict.serialize_into(&mut output)?;
        }
        Ok(output)
    }

    pub fn deserialize(data: &[u8]) -> io::Result<Self> {
        let mut pos = 0;
        let count = decode_vbyte(data, &mut pos)? as usize;
        let mut fields = BTreeMap::new();
        for _ in 0..count {
            let name = read_string(data, &mut pos)?;
            let dict = TermDictionary::deserialize(data, &mut pos)?;
            fields.insert(name, dict);
        }
        Ok(Self { fields })
    }
}
