//! Flush engine: converts sealed, immutable memtables into an on-disk
//! sorted L0 table, or re-packs them via the mempurge path.
//!
//! Laid out as five components, matching the pipeline a [`job::FlushJob`]
//! drives end to end:
//!
//! - [`cursor`] (A): merges each input memtable's record stream into one
//!   total-ordered cursor over the engine's shared [`crate::engine::Record`]
//!   type.
//! - [`compaction_iter`] (B): wraps that cursor with snapshot-aware
//!   deduplication, range-tombstone aggregation ([`tombstone`]), and an
//!   optional filter ([`traits`]).
//! - [`table_writer`] (C): drives [`crate::sstable::SstWriter`] to build the
//!   output file and its metadata.
//! - [`mempurge`] (D): the disk-avoiding alternative path.
//! - [`job`] (E): owns the `Created -> Picked -> Running -> {Installed,
//!   RolledBack}` state machine and the install/rollback critical section.
//!
//! [`stats`] carries reporting types threaded through the whole pipeline.

pub mod compaction_iter;
pub mod cursor;
pub mod io_stats;
pub mod job;
pub mod mempurge;
pub mod reason;
pub mod stats;
pub mod table_writer;
pub mod tombstone;
pub mod traits;


pub use job::{FlushJob, FlushOutcome, JobState};
pub use mempurge::MempurgePolicy;
pub use reason::FlushReason;
pub use stats::{FlushStats, MemtableFlushMeta};
pub use table_writer::FileMetaData;
pub use traits::{FilterDecision, FlushCompactionFilter, MergeOperator, SnapshotChecker};

/// Errors a flush job can fail with.
///
/// A failed job always rolls back: the picked memtables return to
/// `EngineInner::frozen` and no partial state is left registered in the
/// manifest.
#[derive(Debug, thiserror::Error)]
pub enum FlushError {
    /// A requested combination of options is not supported, e.g. a filter
    /// that cannot ignore snapshots.
    #[error("not supported: {0}")]
    NotSupported(String),
    /// The job was abandoned mid-run, e.g. a mempurge that overflowed its
    /// replacement memtable.
    #[error("flush aborted: {0}")]
    Aborted(String),
    /// The column family was dropped while the job was running.
    #[error("column family dropped")]
    ColumnFamilyDropped,
    /// The engine is shutting down.
    #[error("shutdown in progress")]
    ShutdownInProgress,
    /// An internal-key ordering invariant was violated.
    #[error("corruption: {0}")]
    Corruption(String),
    #[error(transparent)]
    Memtable(#[from] crate::memtable::MemtableError),
    #[error(transparent)]
    SSTable(#[from] crate::sstable::SSTableError),
    #[error(transparent)]
    Manifest(#[from] crate::manifest::ManifestError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
