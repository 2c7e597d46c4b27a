//! Segment manager
//!
//! Owns the open segment and the published snapshot of sealed segments.
//! Writers serialize on one mutex; readers load the snapshot through an
//! `ArcSwap` and never block writers.
//!
//! A refresh seals the open segment, applies pending tombstones, runs the
//! merge policy and commits the result: segment files and the manifest are
//! written first, and only a fully persisted plan is published. On failure
//! the open segment and pending tombstones stay as they were.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use roaring::RoaringBitmap;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::buffer::{DocOrigin, SegmentBuffer};
use super::manifest::{ManifestEntry, SegmentManifest};
use super::merge::{MergeCandidate, RefreshMergePolicy};
use super::reader::{SealedSegment, SegmentSource};
use super::store::SegmentStore;
use super::types::{DocNo, SegmentId, SegmentInfo, Version};
use super::writer::merge_segments;
use crate::config::IndexConfig;
use crate::error::{MapstoreError, Result};
use crate::models::{Document, WriteOutcome, WriteResult};
use crate::schema::{DocumentParser, FieldValue, Mapping, MappingRegistry};
use crate::tokenizer::Tokenizer;

/// Point-in-time view of the sealed segments
#[derive(Debug, Default)]
pub struct IndexSnapshot {
    generation: u64,
    /// Oldest first
    segments: Vec<Arc<SealedSegment>>,
    deletes: HashMap<SegmentId, RoaringBitmap>,
}

impl IndexSnapshot {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn segments(&self) -> &[Arc<SealedSegment>] {
        &self.segments
    }

    pub fn segment(&self, id: SegmentId) -> Option<&Arc<SealedSegment>> {
        self.segments.iter().find(|s| s.id() == id)
    }

    /// Tombstones of a segment
    pub fn deleted(&self, id: SegmentId) -> Option<&RoaringBitmap> {
        self.deletes.get(&id)
    }

    /// Remove tombstoned docs of `segment` from `docs`
    pub fn live(&self, segment: &SealedSegment, mut docs: RoaringBitmap) -> RoaringBitmap {
        if let Some(deleted) = self.deleted(segment.id()) {
            docs -= deleted;
        }
        docs
    }

    pub fn segment_infos(&self) -> Vec<SegmentInfo> {
        infos(&self.segments, &self.deletes)
    }

    /// Live docs across all segments
    pub fn doc_count(&self) -> u64 {
        self.segments
            .iter()
            .map(|s| s.live_count(self.deleted(s.id())) as u64)
            .sum()
    }
}

fn infos(
    segments: &[Arc<SealedSegment>],
    deletes: &HashMap<SegmentId, RoaringBitmap>,
) -> Vec<SegmentInfo> {
    segments
        .iter()
        .map(|segment| {
            let deleted = deletes.get(&segment.id());
            let live = segment.live_count(deleted);
            SegmentInfo {
                id: segment.id(),
                generation: segment.generation(),
                doc_count: segment.doc_count(),
                live_doc_count: live,
                deleted_doc_count: segment.doc_count() - live,
            }
        })
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DocLocation {
    Buffer(DocNo),
    Segment(SegmentId, DocNo),
}

/// Where the current copy of a document lives
#[derive(Clone, Copy, Debug)]
struct LocatedDoc {
    location: DocLocation,
    version: Version,
}

struct WriterState {
    buffer: SegmentBuffer,
    /// Tombstones against published segments, applied at the next refresh
    pending_deletes: HashMap<SegmentId, RoaringBitmap>,
    locations: HashMap<String, LocatedDoc>,
    /// Manifest entries of segments already on disk
    persisted: HashMap<SegmentId, ManifestEntry>,
    /// Mapping recorded by the last commit
    committed_mapping: Arc<Mapping>,
    next_segment_id: SegmentId,
    generation: u64,
}

impl WriterState {
    /// Origin a new copy of a located document inherits
    fn origin_of(&self, location: DocLocation) -> DocOrigin {
        match location {
            DocLocation::Buffer(docno) => self.buffer.origin(docno).unwrap_or(DocOrigin::New),
            DocLocation::Segment(id, _) => DocOrigin::Replaces(id),
        }
    }

    /// Tombstone the current copy of `doc_id`, returning its version
    fn tombstone(&mut self, doc_id: &str) -> Option<Version> {
        let located = self.locations.remove(doc_id)?;
        match located.location {
            DocLocation::Buffer(docno) => {
                self.buffer.delete(docno);
            }
            DocLocation::Segment(id, docno) => {
                self.pending_deletes
                    .entry(id)
                    .or_default()
                    .insert(docno.as_u32());
            }
        }
        Some(located.version)
    }

    fn has_pending_deletes(&self) -> bool {
        self.pending_deletes.values().any(|d| !d.is_empty())
    }
}

/// The next snapshot, assembled during a refresh or force merge
struct RefreshPlan {
    generation: u64,
    next_segment_id: SegmentId,
    segments: Vec<Arc<SealedSegment>>,
    deletes: HashMap<SegmentId, RoaringBitmap>,
}

impl RefreshPlan {
    fn new(
        snapshot: &IndexSnapshot,
        pending: &HashMap<SegmentId, RoaringBitmap>,
        next_segment_id: SegmentId,
        generation: u64,
    ) -> Self {
        let mut deletes = snapshot.deletes.clone();
        for (id, docs) in pending {
            *deletes.entry(*id).or_default() |= docs;
        }
        Self {
            generation,
            next_segment_id,
            segments: snapshot.segments.clone(),
            deletes,
        }
    }

    fn allocate_id(&mut self) -> SegmentId {
        let id = self.next_segment_id;
        self.next_segment_id = id.next();
        id
    }

    fn infos(&self) -> Vec<SegmentInfo> {
        infos(&self.segments, &self.deletes)
    }

    /// Replace the candidate's segments with their merge, placed where the
    /// oldest input was
    fn merge(&mut self, candidate: &MergeCandidate) -> Result<()> {
        let selected = |s: &Arc<SealedSegment>| candidate.segment_ids.contains(&s.id());
        let Some(position) = self.segments.iter().position(selected) else {
            return Ok(());
        };
        let id = self.allocate_id();

        let inputs: Vec<(&SealedSegment, Option<&RoaringBitmap>)> = self
            .segments
            .iter()
            .filter(|s| selected(*s))
            .map(|s| (s.as_ref(), self.deletes.get(&s.id())))
            .collect();
        let merged = merge_segments(&inputs, id, self.generation)?;

        debug!(
            reason = ?candidate.reason,
            inputs = ?candidate.segment_ids,
            segment = %id,
            docs = merged.doc_count(),
            "Merged segments"
        );

        self.segments.retain(|s| !selected(s));
        for merged in &candidate.segment_ids {
            self.deletes.remove(merged);
        }
        if merged.doc_count() > 0 {
            self.segments.insert(position, Arc::new(merged));
        }
        Ok(())
    }

    /// Drop segments without any live doc
    fn drop_fully_deleted(&mut self) {
        let deletes = &self.deletes;
        self.segments
            .retain(|s| s.live_count(deletes.get(&s.id())) > 0);
        let kept: HashSet<SegmentId> = self.segments.iter().map(|s| s.id()).collect();
        self.deletes.retain(|id, _| kept.contains(id));
    }
}

/// Manages the open segment and the sealed segments of one index
pub struct SegmentManager {
    config: IndexConfig,
    registry: Arc<MappingRegistry>,
    parser: DocumentParser,
    policy: RefreshMergePolicy,
    store: Option<SegmentStore>,
    writer: Mutex<WriterState>,
    published: ArcSwap<IndexSnapshot>,
}

impl SegmentManager {
    /// Open a manager, recovering the last committed state when the
    /// configuration has a data directory
    pub fn open(config: IndexConfig) -> Result<Self> {
        let store = match config.segments_dir() {
            Some(dir) => Some(SegmentStore::open(dir)?),
            None => None,
        };

        let mut mapping = Mapping::new();
        let mut snapshot = IndexSnapshot::default();
        let mut persisted = HashMap::new();
        let mut next_segment_id = SegmentId::new(0);

        if let Some(store) = &store {
            if let Some(manifest) = store.load_manifest()? {
                mapping = manifest.mapping()?;
                for entry in &manifest.segments {
                    let segment = store.read_segment(entry)?;
                    persisted.insert(entry.meta.id, entry.clone());
                    snapshot.segments.push(Arc::new(segment));
                }
                snapshot.deletes = manifest.deletes();
                snapshot.generation = manifest.generation;
                next_segment_id = manifest.next_segment_id;
                info!(
                    generation = manifest.generation,
                    segments = manifest.segment_count(),
                    docs = snapshot.doc_count(),
                    "Recovered segments"
                );
            }
            let referenced: HashSet<SegmentId> = persisted.keys().copied().collect();
            store.remove_unreferenced(&referenced)?;
        }

        let mut locations = HashMap::new();
        for segment in &snapshot.segments {
            let deleted = snapshot.deleted(segment.id());
            for (docno, entry) in segment.docs().live_docs() {
                if deleted.map_or(false, |d| d.contains(docno.as_u32())) {
                    continue;
                }
                locations.insert(
                    entry.doc_id.clone(),
                    LocatedDoc {
                        location: DocLocation::Segment(segment.id(), docno),
                        version: entry.version,
                    },
                );
            }
        }

        let registry = Arc::new(MappingRegistry::new(mapping));
        let state = WriterState {
            buffer: SegmentBuffer::new(),
            pending_deletes: HashMap::new(),
            locations,
            persisted,
            committed_mapping: registry.snapshot(),
            next_segment_id,
            generation: snapshot.generation,
        };

        Ok(Self {
            parser: DocumentParser::new(Tokenizer::new(&config.analyzer)),
            policy: RefreshMergePolicy::new(config.merge.clone()),
            config,
            registry,
            store,
            writer: Mutex::new(state),
            published: ArcSwap::from_pointee(snapshot),
        })
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<MappingRegistry> {
        &self.registry
    }

    /// Merge a mapping definition into the registry between writes
    pub fn define_mapping(&self, mapping: Mapping) -> Result<()> {
        let _state = self.writer.lock();
        self.registry.define_mapping(mapping)
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        self.parser.tokenizer()
    }

    /// Current published snapshot
    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        self.published.load_full()
    }

    /// Index a document, replacing any existing document with the same id
    pub fn index(&self, doc: Document) -> Result<WriteResult> {
        let mut state = self.writer.lock();
        let result = self.write_locked(&mut state, doc)?;
        self.maybe_refresh(&mut state);
        Ok(result)
    }

    /// Overlay `changes` onto the current copy of a document
    pub fn update(&self, doc_id: &str, changes: &Map<String, Value>) -> Result<WriteResult> {
        let mut state = self.writer.lock();
        let located = state
            .locations
            .get(doc_id)
            .copied()
            .ok_or_else(|| MapstoreError::DocumentNotFound(doc_id.to_string()))?;

        let mapping = self.registry.snapshot();
        if !mapping.source_enabled {
            debug!(doc_id, "Rebuilding document without _source from stored fields and doc values");
        }
        let mut doc = self.reconstruct(&state, &mapping, doc_id, located.location)?;
        if !doc.apply_update(changes) {
            debug!(doc_id, "Update is a no-op");
            return Ok(WriteResult::new(doc_id, WriteOutcome::Noop, Some(located.version)));
        }

        let result = self.write_locked(&mut state, doc)?;
        self.maybe_refresh(&mut state);
        Ok(result)
    }

    pub fn delete(&self, doc_id: &str) -> Result<WriteResult> {
        let mut state = self.writer.lock();
        Ok(match state.tombstone(doc_id) {
            Some(version) => WriteResult::new(doc_id, WriteOutcome::Deleted, Some(version.next())),
            None => WriteResult::new(doc_id, WriteOutcome::NotFound, None),
        })
    }

    /// Realtime get: sees writes that are not yet refreshed
    pub fn get(&self, doc_id: &str) -> Result<Option<Document>> {
        let state = self.writer.lock();
        let Some(located) = state.locations.get(doc_id).copied() else {
            return Ok(None);
        };
        let mapping = self.registry.snapshot();
        self.reconstruct(&state, &mapping, doc_id, located.location)
            .map(Some)
    }

    /// Seal the open segment and publish a new snapshot. Returns the
    /// number of segments sealed.
    pub fn refresh(&self) -> Result<usize> {
        let mut state = self.writer.lock();
        self.refresh_locked(&mut state)
    }

    /// Refresh, then merge until at most `max_segments` remain. Returns
    /// the resulting segment count.
    pub fn force_merge(&self, max_segments: usize) -> Result<usize> {
        let mut state = self.writer.lock();
        self.refresh_locked(&mut state)?;

        let snapshot = self.published.load_full();
        let mut plan = RefreshPlan::new(
            &snapshot,
            &HashMap::new(),
            state.next_segment_id,
            state.generation + 1,
        );
        let Some(candidate) = self.policy.find_forced(&plan.infos(), max_segments) else {
            return Ok(snapshot.segments.len());
        };
        plan.merge(&candidate)?;

        let count = plan.segments.len();
        let mapping = self.registry.snapshot();
        self.commit(&mut state, plan, mapping)?;
        info!(segments = count, "Force merge complete");
        Ok(count)
    }

    pub fn list_segments(&self) -> Vec<SegmentInfo> {
        self.published.load().segment_infos()
    }

    /// Live docs visible to search
    pub fn doc_count(&self) -> u64 {
        self.published.load().doc_count()
    }

    fn write_locked(&self, state: &mut WriterState, doc: Document) -> Result<WriteResult> {
        let mapping = self.registry.snapshot();
        let parsed = self.parser.parse(&mapping, &doc)?;

        let previous = state.locations.get(&doc.id).copied();
        let (version, origin, outcome) = match previous {
            Some(located) => (
                located.version.next(),
                state.origin_of(located.location),
                WriteOutcome::Updated,
            ),
            None => (Version::FIRST, DocOrigin::New, WriteOutcome::Created),
        };

        let docno = state.buffer.add(&parsed, version, origin)?;
        // Mapping changes hold the writer lock, so this cannot conflict
        self.registry.register(&parsed.new_declarations)?;
        if previous.is_some() {
            state.tombstone(&doc.id);
        }
        state.locations.insert(
            doc.id.clone(),
            LocatedDoc {
                location: DocLocation::Buffer(docno),
                version,
            },
        );

        Ok(WriteResult::new(doc.id, outcome, Some(version)))
    }

    fn maybe_refresh(&self, state: &mut WriterState) {
        if state.buffer.should_seal(&self.config.buffer) {
            if let Err(e) = self.refresh_locked(state) {
                warn!(error = %e, "Automatic refresh failed, open segment kept");
            }
        }
    }

    fn reconstruct(
        &self,
        state: &WriterState,
        mapping: &Mapping,
        doc_id: &str,
        location: DocLocation,
    ) -> Result<Document> {
        match location {
            DocLocation::Buffer(docno) => rebuild_document(&state.buffer, docno, doc_id, mapping),
            DocLocation::Segment(id, docno) => {
                let snapshot = self.published.load();
                let segment = snapshot.segment(id).ok_or_else(|| {
                    MapstoreError::Corrupted(format!("{} holding [{}] is not published", id, doc_id))
                })?;
                rebuild_document(segment.as_ref(), docno, doc_id, mapping)
            }
        }
    }

    fn refresh_locked(&self, state: &mut WriterState) -> Result<usize> {
        let mapping = self.registry.snapshot();
        let mapping_changed =
            self.store.is_some() && !Arc::ptr_eq(&mapping, &state.committed_mapping);
        if state.buffer.is_empty() && !state.has_pending_deletes() && !mapping_changed {
            return Ok(0);
        }

        let snapshot = self.published.load_full();
        let mut plan = RefreshPlan::new(
            &snapshot,
            &state.pending_deletes,
            state.next_segment_id,
            state.generation + 1,
        );

        let mut sealed = 0;
        if state.buffer.live_count() > 0 {
            let id = plan.allocate_id();
            let segment = state.buffer.seal(id, plan.generation)?;
            plan.segments.push(Arc::new(segment));
            sealed = 1;

            if state.buffer.is_update_only() {
                let replaced = state.buffer.replaced_segments();
                if let Some(candidate) = self.policy.find_fold(&plan.infos(), id, &replaced) {
                    plan.merge(&candidate)?;
                }
            }
        }

        plan.drop_fully_deleted();
        if let Some(candidate) = self.policy.find_overflow(&plan.infos()) {
            plan.merge(&candidate)?;
        }

        let generation = plan.generation;
        let segments = plan.segments.len();
        self.commit(state, plan, mapping)?;
        info!(generation, sealed, segments, "Refresh complete");
        Ok(sealed)
    }

    /// Persist the plan, then publish it. Nothing is published and the
    /// writer state is left untouched when persistence fails.
    fn commit(&self, state: &mut WriterState, plan: RefreshPlan, mapping: Arc<Mapping>) -> Result<()> {
        let previous: HashSet<SegmentId> = self
            .published
            .load()
            .segments
            .iter()
            .map(|s| s.id())
            .collect();

        let mut written = Vec::new();
        if let Some(store) = &self.store {
            let mut entries = Vec::with_capacity(plan.segments.len());
            for segment in &plan.segments {
                let mut entry = match state.persisted.get(&segment.id()) {
                    Some(entry) => entry.clone(),
                    None => {
                        let entry = store.write_segment(segment).map_err(|source| {
                            MapstoreError::PartialRefreshFailure {
                                segment: segment.id(),
                                source,
                            }
                        })?;
                        written.push(entry.clone());
                        entry
                    }
                };
                entry.deleted = plan
                    .deletes
                    .get(&segment.id())
                    .map(|d| d.iter().collect())
                    .unwrap_or_default();
                entries.push(entry);
            }

            let manifest =
                SegmentManifest::new(plan.generation, plan.next_segment_id, entries, &mapping)?;
            store.save_manifest(&manifest).map_err(|source| {
                MapstoreError::PartialRefreshFailure {
                    segment: plan
                        .segments
                        .last()
                        .map_or(plan.next_segment_id, |s| s.id()),
                    source,
                }
            })?;
        }

        // Committed: reclaim merged-away segments and repoint moved docs
        let current: HashSet<SegmentId> = plan.segments.iter().map(|s| s.id()).collect();
        for id in previous.difference(&current) {
            state.persisted.remove(id);
            if let Some(store) = &self.store {
                if let Err(e) = store.remove_segment(*id) {
                    warn!(segment = %id, error = %e, "Failed to remove merged segment files");
                }
            }
        }
        for entry in written {
            state.persisted.insert(entry.meta.id, entry);
        }

        for segment in plan.segments.iter().filter(|s| !previous.contains(&s.id())) {
            for (docno, entry) in segment.docs().live_docs() {
                state.locations.insert(
                    entry.doc_id.clone(),
                    LocatedDoc {
                        location: DocLocation::Segment(segment.id(), docno),
                        version: entry.version,
                    },
                );
            }
        }

        state.buffer = SegmentBuffer::new();
        state.pending_deletes.clear();
        state.next_segment_id = plan.next_segment_id;
        state.generation = plan.generation;
        state.committed_mapping = mapping;

        let deletes = plan
            .deletes
            .into_iter()
            .filter(|(_, d)| !d.is_empty())
            .collect();
        self.published.store(Arc::new(IndexSnapshot {
            generation: plan.generation,
            segments: plan.segments,
            deletes,
        }));
        Ok(())
    }
}

/// Rebuild a document from `_source`, or from stored fields plus doc
/// values when source is disabled. Fields that were only searchable cannot
/// be recovered in the latter case.
fn rebuild_document<S: SegmentSource + ?Sized>(
    source: &S,
    docno: DocNo,
    doc_id: &str,
    mapping: &Mapping,
) -> Result<Document> {
    let stored = source.stored(docno).ok_or_else(|| {
        MapstoreError::Corrupted(format!("no stored entry for [{}] at docno {}", doc_id, docno.0))
    })?;

    if let Some(bytes) = &stored.source {
        let fields: Map<String, Value> = serde_json::from_slice(bytes)?;
        return Ok(Document {
            id: doc_id.to_string(),
            fields,
        });
    }

    let mut fields: Map<String, Value> = stored
        .fields
        .iter()
        .map(|(name, value)| (name.clone(), value.to_json()))
        .collect();
    for (name, column) in source.doc_values().columns() {
        if fields.contains_key(name) {
            continue;
        }
        let (Some(value), Some(decl)) = (column.get(docno), mapping.get_field(name)) else {
            continue;
        };
        if let Some(value) = FieldValue::from_column_value(decl.field_type, value) {
            fields.insert(name.to_string(), value.to_json());
        }
    }
    Ok(Document {
        id: doc_id.to_string(),
        fields,
    })
}
