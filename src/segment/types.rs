//! Core types for the segment-based store

use serde::{Deserialize, Serialize};
use std::fmt;

/// Segment identifier (monotonically increasing per index)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SegmentId(pub u64);

impl SegmentId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Directory name used when the segment is persisted
    pub fn dir_name(&self) -> String {
        self.to_string()
    }

    /// Parse a directory name produced by [`SegmentId::dir_name`]
    pub fn from_dir_name(name: &str) -> Option<Self> {
        name.strip_prefix("segment_")?.parse().ok().map(Self)
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "segment_{}", self.0)
    }
}

/// Dense document number within a segment (0..max_doc)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocNo(pub u32);

impl DocNo {
    pub fn new(n: u32) -> Self {
        Self(n)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }

    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// Per-document version, bumped on every successful write
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version(pub u64);

impl Version {
    pub const FIRST: Version = Version(1);

    pub fn new(v: u64) -> Self {
        Self(v)
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

/// Entry in the document number mapping
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DocNoEntry {
    /// External document ID
    pub doc_id: String,
    /// Document version
    pub version: Version,
}

impl DocNoEntry {
    pub fn new(doc_id: impl Into<String>, version: Version) -> Self {
        Self {
            doc_id: doc_id.into(),
            version,
        }
    }
}

/// Summary of a sealed segment, as reported by `list_segments`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentInfo {
    pub id: SegmentId,
    /// Refresh generation that sealed the segment
    pub generation: u64,
    pub doc_count: u32,
    pub live_doc_count: u32,
    pub deleted_doc_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_id() {
        let id = SegmentId::new(42);
        assert_eq!(id.0, 42);
        assert_eq!(id.next().0, 43);
        assert_eq!(format!("{}", id), "segment_42");
        assert_eq!(SegmentId::from_dir_name(&id.dir_name()), Some(id));
        assert_eq!(SegmentId::from_dir_name("manifest.bin"), None);
    }

    #[test]
    fn test_docno_and_version() {
        let docno = DocNo::new(100);
        assert_eq!(docno.as_u32(), 100);
        assert_eq!(docno.as_usize(), 100);
        assert_eq!(Version::FIRST.next(), Version::new(2));
    }
}
