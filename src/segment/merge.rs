//! Refresh-time merge policy
//!
//! Two merges can run during a refresh:
//! - a fold merge, combining a segment made only of updated documents with
//!   the newest segment that held their previous copies, so an update never
//!   changes the reported segment count;
//! - an overflow merge, combining the smallest segments once the segment
//!   count exceeds `max_segments`.
//!
//! `force_merge` uses the same smallest-first selection down to a caller
//! supplied segment count.

use std::collections::BTreeSet;

use super::types::{SegmentId, SegmentInfo};
use crate::config::MergePolicyConfig;

/// Reason why segments should be merged
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeReason {
    /// Update-only segment folded into the segment it supersedes
    Fold,
    /// Too many segments after a refresh
    Overflow,
    /// Requested through `force_merge`
    Forced,
}

/// A planned merge
#[derive(Clone, Debug, PartialEq)]
pub struct MergeCandidate {
    /// Segments to merge, in snapshot order
    pub segment_ids: Vec<SegmentId>,
    pub reason: MergeReason,
}

/// Merge policy applied at refresh time
#[derive(Clone, Debug, Default)]
pub struct RefreshMergePolicy {
    config: MergePolicyConfig,
}

impl RefreshMergePolicy {
    pub fn new(config: MergePolicyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MergePolicyConfig {
        &self.config
    }

    /// Fold an update-only segment into the newest segment it supersedes.
    ///
    /// `segments` is in snapshot order (oldest first) and includes the new
    /// segment, `replaced` lists the segments its docs supersede.
    pub fn find_fold(
        &self,
        segments: &[SegmentInfo],
        new_segment: SegmentId,
        replaced: &BTreeSet<SegmentId>,
    ) -> Option<MergeCandidate> {
        if !self.config.fold_update_segments {
            return None;
        }
        let target = segments
            .iter()
            .rev()
            .map(|s| s.id)
            .find(|id| *id != new_segment && replaced.contains(id))?;

        Some(MergeCandidate {
            segment_ids: in_snapshot_order(segments, &[target, new_segment]),
            reason: MergeReason::Fold,
        })
    }

    /// Merge the smallest segments once there are more than `max_segments`
    pub fn find_overflow(&self, segments: &[SegmentInfo]) -> Option<MergeCandidate> {
        smallest_down_to(segments, self.config.max_segments.max(1), MergeReason::Overflow)
    }

    /// Merge the smallest segments until at most `max_segments` remain
    pub fn find_forced(&self, segments: &[SegmentInfo], max_segments: usize) -> Option<MergeCandidate> {
        smallest_down_to(segments, max_segments.max(1), MergeReason::Forced)
    }
}

/// Pick the `len - target + 1` segments with the fewest live docs
fn smallest_down_to(
    segments: &[SegmentInfo],
    target: usize,
    reason: MergeReason,
) -> Option<MergeCandidate> {
    if segments.len() <= target {
        return None;
    }
    let merge_count = segments.len() - target + 1;

    let mut by_size: Vec<&SegmentInfo> = segments.iter().collect();
    // Stable sort keeps older segments first among equal sizes
    by_size.sort_by_key(|s| s.live_doc_count);
    let picked: Vec<SegmentId> = by_size.iter().take(merge_count).map(|s| s.id).collect();

    Some(MergeCandidate {
        segment_ids: in_snapshot_order(segments, &picked),
        reason,
    })
}

fn in_snapshot_order(segments: &[SegmentInfo], ids: &[SegmentId]) -> Vec<SegmentId> {
    segments
        .iter()
        .map(|s| s.id)
        .filter(|id| ids.contains(id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(id: u64, live: u32) -> SegmentInfo {
        SegmentInfo {
            id: SegmentId::new(id),
            generation: id,
            doc_count: live,
            live_doc_count: live,
            deleted_doc_count: 0,
        }
    }

    #[test]
    fn test_fold_targets_newest_replaced_segment() {
        let policy = RefreshMergePolicy::default();
        let segments = vec![info(0, 10), info(1, 5), info(2, 1)];
        let replaced: BTreeSet<_> = [SegmentId::new(0), SegmentId::new(1)].into_iter().collect();

        let candidate = policy
            .find_fold(&segments, SegmentId::new(2), &replaced)
            .unwrap();
        assert_eq!(candidate.reason, MergeReason::Fold);
        assert_eq!(
            candidate.segment_ids,
            vec![SegmentId::new(1), SegmentId::new(2)]
        );
    }

    #[test]
    fn test_fold_skips_missing_or_disabled() {
        let segments = vec![info(3, 1)];
        let replaced: BTreeSet<_> = [SegmentId::new(0)].into_iter().collect();
        let policy = RefreshMergePolicy::default();
        assert!(policy.find_fold(&segments, SegmentId::new(3), &replaced).is_none());

        let disabled = RefreshMergePolicy::new(MergePolicyConfig {
            fold_update_segments: false,
            max_segments: 10,
        });
        let segments = vec![info(0, 2), info(3, 1)];
        assert!(disabled.find_fold(&segments, SegmentId::new(3), &replaced).is_none());
    }

    #[test]
    fn test_overflow_merges_smallest() {
        let policy = RefreshMergePolicy::new(MergePolicyConfig {
            fold_update_segments: true,
            max_segments: 3,
        });
        let segments = vec![info(0, 100), info(1, 2), info(2, 50), info(3, 1)];
        assert!(policy.find_overflow(&segments[..3]).is_none());

        let candidate = policy.find_overflow(&segments).unwrap();
        assert_eq!(candidate.reason, MergeReason::Overflow);
        assert_eq!(
            candidate.segment_ids,
            vec![SegmentId::new(1), SegmentId::new(3)]
        );
    }

    #[test]
    fn test_forced_merge_to_one() {
        let policy = RefreshMergePolicy::default();
        let segments = vec![info(0, 4), info(1, 2), info(2, 3)];
        let candidate = policy.find_forced(&segments, 1).unwrap();
        assert_eq!(candidate.segment_ids.len(), 3);
        assert_eq!(candidate.segment_ids[0], SegmentId::new(0));
        assert!(policy.find_forced(&segments, 3).is_none());
    }
}
