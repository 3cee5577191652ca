//! Polymorphism seams consumed by [`crate::flush::compaction_iter`]:
//! snapshot visibility, merge-operator folding, and an optional
//! compaction filter.
//!
//! These are object-safe traits selected via `Box<dyn Trait>`, the same
//! idiom [`crate::compaction::CompactionStrategyType`] already uses to
//! pick `CompactionStrategy` implementations — not a generic parameter.

/// Classifies whether a sequence number is pinned by a live snapshot.
///
/// Defaulted to [`NoSnapshotChecker`] ("nothing pinned") when the caller
/// has no live snapshots to honor.
pub trait SnapshotChecker: Send + Sync {
    /// Returns `true` if `lsn` must be preserved because some entry in
    /// `snapshots` can still observe it.
    fn is_pinned(&self, lsn: u64, snapshots: &[u64]) -> bool;
}

/// The default checker: nothing is pinned, so only the highest-LSN
/// version of each key survives deduplication.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSnapshotChecker;

impl SnapshotChecker for NoSnapshotChecker {
    fn is_pinned(&self, _lsn: u64, _snapshots: &[u64]) -> bool {
        false
    }
}

/// Folds a sequence of same-key merge-operand records into a single
/// resolved value.
///
/// This crate's [`crate::engine::Record`] has no `Merge` variant — no
/// write path produces merge operands — so [`IdentityMergeOperator`] never
/// actually gets records to fold. The trait is still defined and threaded
/// through [`crate::flush::compaction_iter::CompactionIterator`] so a
/// future writer path that adds a `Record::Merge` variant has a seam to
/// plug into.
pub trait MergeOperator: Send + Sync {
    /// Combines `operands` (oldest first) into a single resolved value.
    fn full_merge(&self, key: &[u8], operands: &[Vec<u8>]) -> Vec<u8>;
}

/// A merge operator with nothing to fold.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityMergeOperator;

impl MergeOperator for IdentityMergeOperator {
    fn full_merge(&self, _key: &[u8], operands: &[Vec<u8>]) -> Vec<u8> {
        operands.last().cloned().unwrap_or_default()
    }
}

/// What a [`FlushCompactionFilter`] wants done with a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterDecision {
    /// Emit the record unchanged.
    Keep,
    /// Drop the record from the output.
    Remove,
    /// Emit the record with a replacement value (point puts only).
    ChangeValue(Vec<u8>),
}

/// The flush-stage variant of a compaction filter: inspects each point
/// record and decides whether to keep, drop, or rewrite it.
pub trait FlushCompactionFilter: Send + Sync {
    /// Decides the fate of a single point record.
    fn filter(&self, key: &[u8], value: &[u8], lsn: u64) -> FilterDecision;

    /// Whether this filter is safe to apply without regard to live
    /// snapshots. If `false`, [`crate::flush::compaction_iter::CompactionIterator::new`]
    /// fails with [`crate::flush::FlushError::NotSupported`] before any
    /// I/O happens.
    fn ignores_snapshots(&self) -> bool;
}
