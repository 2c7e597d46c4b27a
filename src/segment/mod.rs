//! Segment-based storage
//!
//! Immutable segment files with an open in-memory segment for recent
//! writes.
//!
//! # Architecture
//!
//! - `SegmentBuffer`: the open segment receiving writes
//! - `SealedSegment`: an immutable segment with doc values, postings and
//!   stored fields
//! - `SegmentManager`: open segment + published snapshot, refresh and merges
//! - `SegmentManifest` / `SegmentStore`: the on-disk commit point

mod buffer;
mod codec;
mod docno_map;
mod docvalues;
mod manager;
mod manifest;
mod merge;
mod postings;
mod reader;
mod store;
mod stored;
mod types;
mod writer;

pub use buffer::*;
pub use docno_map::*;
pub use docvalues::*;
pub use manager::*;
pub use manifest::*;
pub use merge::*;
pub use postings::*;
pub use reader::*;
pub use store::*;
pub use stored::*;
pub use types::*;
pub use writer::*;
