//! Snapshot-aware compaction iterator (component B): wraps the merged
//! input cursor with dedup, snapshot pinning, and an optional filter.

use crate::engine::utils::{MergeIterator, Record};
use crate::engine::RangeTombstone;

use super::traits::{FilterDecision, FlushCompactionFilter, MergeOperator, SnapshotChecker};
use super::tombstone::RangeTombstoneAggregator;
use super::FlushError;

/// Wraps a [`MergeIterator`] with snapshot-aware deduplication, an
/// optional flush-stage compaction filter, and a side channel that
/// collects range tombstones into a [`RangeTombstoneAggregator`].
///
/// Yields `Err(FlushError::Corruption(..))` in place of a record the
/// moment an internal-key ordering violation is observed — flush never
/// silently drops a corrupt key.
pub struct CompactionIterator<'a> {
    inner: MergeIterator<'a>,
    tombstones: RangeTombstoneAggregator,
    snapshots: Vec<u64>,
    earliest_write_conflict_snapshot: Option<u64>,
    snapshot_checker: &'a dyn SnapshotChecker,
    #[allow(dead_code)]
    merge_operator: &'a dyn MergeOperator,
    filter: Option<&'a dyn FlushCompactionFilter>,
    last_raw_key: Option<(Vec<u8>, u64)>,
    emitted_count: usize,
}

impl<'a> CompactionIterator<'a> {
    /// Constructs the iterator. Fails with [`FlushError::NotSupported`] if
    /// `filter` is present but declares it cannot ignore snapshots — this
    /// is checked once, up front, before any I/O happens.
    pub fn new(
        cursor: MergeIterator<'a>,
        snapshots: Vec<u64>,
        earliest_write_conflict_snapshot: Option<u64>,
        snapshot_checker: &'a dyn SnapshotChecker,
        merge_operator: &'a dyn MergeOperator,
        filter: Option<&'a dyn FlushCompactionFilter>,
    ) -> Result<Self, FlushError> {
        if let Some(f) = filter {
            if !f.ignores_snapshots() {
                return Err(FlushError::NotSupported(
                    "compaction filter cannot ignore snapshots".into(),
                ));
            }
        }

        Ok(Self {
            inner: cursor,
            tombstones: RangeTombstoneAggregator::new(),
            snapshots,
            earliest_write_conflict_snapshot,
            snapshot_checker,
            merge_operator,
            filter,
            last_raw_key: None,
            emitted_count: 0,
        })
    }

    /// Number of point records emitted so far.
    pub fn emitted_count(&self) -> usize {
        self.emitted_count
    }

    /// Consumes the iterator's collected range tombstones. Call only once
    /// the `Iterator` has been fully drained.
    pub fn into_range_tombstones(self) -> Vec<RangeTombstone> {
        self.tombstones.finish(&self.snapshots)
    }

    fn is_pinned(&self, lsn: u64) -> bool {
        self.snapshot_checker.is_pinned(lsn, &self.snapshots)
            || self
                .earliest_write_conflict_snapshot
                .is_some_and(|s| lsn >= s)
    }
}

impl<'a> Iterator for CompactionIterator<'a> {
    type Item = Result<Record, FlushError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let record = self.inner.next()?;

            if let Record::RangeDelete {
                start,
                end,
                lsn,
                timestamp,
            } = record
            {
                self.tombstones.add(RangeTombstone {
                    start,
                    end,
                    lsn,
                    timestamp,
                });
                continue;
            }

            let key = record.key().to_vec();
            let lsn = record.lsn();

            let same_key = self
                .last_raw_key
                .as_ref()
                .is_some_and(|(k, _)| k == &key);

            if same_key {
                let (_, last_lsn) = self.last_raw_key.as_ref().unwrap();
                if lsn > *last_lsn {
                    return Some(Err(FlushError::Corruption(format!(
                        "internal-key ordering violation at key {key:?}: lsn {lsn} follows lsn {last_lsn}"
                    ))));
                }
            }
            self.last_raw_key = Some((key, lsn));

            if same_key && !self.is_pinned(lsn) {
                continue;
            }

            let decision = match &record {
                Record::Put { key, value, lsn, .. } => {
                    self.filter.map(|f| f.filter(key, value, *lsn))
                }
                _ => None,
            };

            let record = match decision {
                Some(FilterDecision::Remove) => continue,
                Some(FilterDecision::ChangeValue(new_value)) => match record {
                    Record::Put {
                        key,
                        lsn,
                        timestamp,
                        ..
                    } => Record::Put {
                        key,
                        value: new_value,
                        lsn,
                        timestamp,
                    },
                    other => other,
                },
                Some(FilterDecision::Keep) | None => record,
            };

            self.emitted_count += 1;
            return Some(Ok(record));
        }
    }
}
