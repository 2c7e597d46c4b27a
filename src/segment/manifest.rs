//! Segment manifest for tracking live segments
//!
//! Commit order on refresh:
//! 1. Write new segment files, fsync
//! 2. Write `segments.manifest.tmp`, fsync
//! 3. Rename to `segments.manifest`
//! 4. Only then publish the snapshot and reclaim merged-away segments

use std::collections::HashMap;

use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};

use super::reader::SegmentMeta;
use super::types::SegmentId;
use crate::error::{MapstoreError, Result};
use crate::schema::Mapping;

/// Manifest entry for a segment
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub meta: SegmentMeta,
    /// CRC32 of the segment files
    pub checksum: u64,
    /// Tombstoned docnos of the segment
    pub deleted: Vec<u32>,
}

impl ManifestEntry {
    pub fn new(meta: SegmentMeta, checksum: u64) -> Self {
        Self {
            meta,
            checksum,
            deleted: Vec::new(),
        }
    }

    pub fn deleted_bitmap(&self) -> RoaringBitmap {
        self.deleted.iter().copied().collect()
    }
}

/// The manifest lists the segments of the last committed snapshot
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SegmentManifest {
    /// Manifest format version
    pub version: u32,
    /// Refresh generation of the commit
    pub generation: u64,
    pub next_segment_id: SegmentId,
    /// Segments, oldest first
    pub segments: Vec<ManifestEntry>,
    /// Mapping at commit time, as JSON
    pub mapping: String,
}

impl SegmentManifest {
    /// Current manifest format version
    pub const VERSION: u32 = 1;

    pub fn new(
        generation: u64,
        next_segment_id: SegmentId,
        segments: Vec<ManifestEntry>,
        mapping: &Mapping,
    ) -> Result<Self> {
        Ok(Self {
            version: Self::VERSION,
            generation,
            next_segment_id,
            segments,
            mapping: serde_json::to_string(mapping)?,
        })
    }

    pub fn mapping(&self) -> Result<Mapping> {
        Ok(serde_json::from_str(&self.mapping)?)
    }

    /// Tombstones per segment, skipping segments without any
    pub fn deletes(&self) -> HashMap<SegmentId, RoaringBitmap> {
        self.segments
            .iter()
            .filter(|e| !e.deleted.is_empty())
            .map(|e| (e.meta.id, e.deleted_bitmap()))
            .collect()
    }

    pub fn total_doc_count(&self) -> u64 {
        self.segments.iter().map(|e| e.meta.doc_count as u64).sum()
    }

    pub fn total_size_bytes(&self) -> u64 {
        self.segments.iter().map(|e| e.meta.size_bytes).sum()
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn get_segment(&self, segment_id: SegmentId) -> Option<&ManifestEntry> {
        self.segments.iter().find(|e| e.meta.id == segment_id)
    }

    pub fn to_bincode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bincode(data: &[u8]) -> Result<Self> {
        let manifest: Self = bincode::deserialize(data)?;
        if manifest.version != Self::VERSION {
            return Err(MapstoreError::Corrupted(format!(
                "unsupported manifest version {}",
                manifest.version
            )));
        }
        Ok(manifest)
    }

    /// Human readable form, used by the CLI
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
