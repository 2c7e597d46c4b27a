//! Persistent storage for segment files and the manifest
//!
//! Layout under the base directory:
//! - `segment_<id>/` with one file per segment part
//! - `segments.manifest`, replaced atomically through a temp file

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::manifest::{ManifestEntry, SegmentManifest};
use super::reader::{SealedSegment, SegmentMeta};
use super::types::SegmentId;
use super::writer::SegmentFiles;
use crate::error::{MapstoreError, Result};

const MANIFEST_FILE: &str = "segments.manifest";
const MANIFEST_TMP_FILE: &str = "segments.manifest.tmp";

/// On-disk segment store
#[derive(Debug)]
pub struct SegmentStore {
    base_dir: PathBuf,
}

impl SegmentStore {
    pub fn open<P: AsRef<Path>>(base_dir: P) -> io::Result<Self> {
        fs::create_dir_all(&base_dir)?;
        Ok(Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn segment_dir(&self, id: SegmentId) -> PathBuf {
        self.base_dir.join(id.dir_name())
    }

    /// Write every part of a segment and fsync it. Returns the manifest
    /// entry describing the written files.
    pub fn write_segment(&self, segment: &SealedSegment) -> io::Result<ManifestEntry> {
        let files = SegmentFiles::encode(segment)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let dir = self.segment_dir(segment.id());
        fs::create_dir_all(&dir)?;

        for (name, data) in files.parts() {
            write_synced(&dir.join(name), data)?;
        }

        let meta = SegmentMeta {
            size_bytes: files.size_bytes(),
            ..segment.meta().clone()
        };
        debug!(segment = %meta.id, bytes = meta.size_bytes, "wrote segment files");
        Ok(ManifestEntry::new(meta, files.checksum()))
    }

    /// Load a segment, verifying the checksum recorded in the manifest
    pub fn read_segment(&self, entry: &ManifestEntry) -> Result<SealedSegment> {
        let dir = self.segment_dir(entry.meta.id);
        let files = SegmentFiles {
            docno_map: fs::read(dir.join(SegmentFiles::DOCNO_MAP))?,
            doc_values: fs::read(dir.join(SegmentFiles::DOC_VALUES))?,
            postings: fs::read(dir.join(SegmentFiles::POSTINGS))?,
            stored: fs::read(dir.join(SegmentFiles::STORED))?,
        };

        let checksum = files.checksum();
        if checksum != entry.checksum {
            return Err(MapstoreError::Corrupted(format!(
                "{}: checksum mismatch (manifest {:#x}, files {:#x})",
                entry.meta.id, entry.checksum, checksum
            )));
        }
        files.decode(entry.meta.clone())
    }

    pub fn remove_segment(&self, id: SegmentId) -> io::Result<()> {
        let dir = self.segment_dir(id);
        if dir.exists() {
            fs::remove_dir_all(dir)?;
        }
        Ok(())
    }

    /// Write the manifest to a temp file, then rename it into place
    pub fn save_manifest(&self, manifest: &SegmentManifest) -> io::Result<()> {
        let bytes = manifest
            .to_bincode()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let tmp = self.base_dir.join(MANIFEST_TMP_FILE);
        write_synced(&tmp, &bytes)?;
        fs::rename(&tmp, self.base_dir.join(MANIFEST_FILE))?;
        Ok(())
    }

    /// Load the last committed manifest, if any
    pub fn load_manifest(&self) -> Result<Option<SegmentManifest>> {
        let path = self.base_dir.join(MANIFEST_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(path)?;
        SegmentManifest::from_bincode(&bytes).map(Some)
    }

    /// Remove segment directories the manifest does not reference, left
    /// behind by a failed refresh or an interrupted cleanup
    pub fn remove_unreferenced(&self, referenced: &HashSet<SegmentId>) -> io::Result<Vec<SegmentId>> {
        let mut removed = Vec::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(id) = name.to_str().and_then(SegmentId::from_dir_name) else {
                continue;
            };
            if !referenced.contains(&id) && entry.path().is_dir() {
                fs::remove_dir_all(entry.path())?;
                removed.push(id);
            }
        }
        if !removed.is_empty() {
            info!(count = removed.len(), "removed unreferenced segment directories");
        }
        Ok(removed)
    }
}

fn write_synced(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(data)?;
    file.sync_all()
}
