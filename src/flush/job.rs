//! Install / rollback (component E): drives the job state machine against
//! the engine's coarse `Arc<RwLock<EngineInner>>` and its manifest.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tracing::{debug, info, warn};

use crate::engine::utils::Record;
use crate::engine::{EngineConfig, EngineInner, SSTABLE_DIR};
use crate::memtable::FrozenMemtable;
use crate::sstable::SSTable;

use super::compaction_iter::CompactionIterator;
use super::cursor::build_input_cursor;
use super::mempurge::{attempt_mempurge, MempurgeOutcome, MempurgePolicy};
use super::reason::FlushReason;
use super::stats::{FlushStats, MemtableFlushMeta};
use super::table_writer::{build_table, FileMetaData};
use super::traits::{
    FlushCompactionFilter, IdentityMergeOperator, MergeOperator, NoSnapshotChecker, SnapshotChecker,
};
use super::FlushError;

/// Lifecycle state of a [`FlushJob`], matching the `Created -> Picked ->
/// Running -> {Installed, RolledBack}` state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Created,
    Picked,
    Running,
    Installed,
    RolledBack,
}

/// Result of a successfully installed (or trivially empty) flush.
pub enum FlushOutcome {
    /// A new on-disk table was installed as the newest L0 SSTable.
    Table(FileMetaData),
    /// The inputs were re-packed into a new memtable; no table was built
    /// and the manifest was left untouched.
    Mempurge,
    /// The picked set was empty — a legal no-op.
    Empty,
}

enum RunResult {
    Empty,
    Table(FileMetaData),
    Mempurge(FrozenMemtable),
}

/// One flush attempt over a sealed set of memtables.
///
/// `pick` is a one-shot call under the engine's write lock; `run` performs
/// the merge / compaction-iterator / (mempurge or table-writer) pipeline
/// with the lock released, then re-acquires it to install or roll back.
pub struct FlushJob {
    state: JobState,
    reason: FlushReason,
    snapshots: Vec<u64>,
    earliest_write_conflict_snapshot: Option<u64>,
    snapshot_checker: Box<dyn SnapshotChecker>,
    merge_operator: Box<dyn MergeOperator>,
    filter: Option<Box<dyn FlushCompactionFilter>>,
    full_history_ts_low: Option<u64>,
    shutting_down: Arc<AtomicBool>,
    column_family_dropped: Arc<AtomicBool>,
    picked: Vec<FrozenMemtable>,
    stats: FlushStats,
}

impl FlushJob {
    pub fn new(reason: FlushReason) -> Self {
        Self {
            state: JobState::Created,
            reason,
            snapshots: Vec::new(),
            earliest_write_conflict_snapshot: None,
            snapshot_checker: Box::new(NoSnapshotChecker),
            merge_operator: Box::new(IdentityMergeOperator),
            filter: None,
            full_history_ts_low: None,
            shutting_down: Arc::new(AtomicBool::new(false)),
            column_family_dropped: Arc::new(AtomicBool::new(false)),
            picked: Vec::new(),
            stats: FlushStats::default(),
        }
    }

    pub fn with_snapshots(
        mut self,
        snapshots: Vec<u64>,
        earliest_write_conflict_snapshot: Option<u64>,
    ) -> Self {
        self.snapshots = snapshots;
        self.earliest_write_conflict_snapshot = earliest_write_conflict_snapshot;
        self
    }

    pub fn with_snapshot_checker(mut self, checker: Box<dyn SnapshotChecker>) -> Self {
        self.snapshot_checker = checker;
        self
    }

    pub fn with_merge_operator(mut self, operator: Box<dyn MergeOperator>) -> Self {
        self.merge_operator = operator;
        self
    }

    pub fn with_filter(mut self, filter: Box<dyn FlushCompactionFilter>) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_full_history_ts_low(mut self, ts: Option<u64>) -> Self {
        self.full_history_ts_low = ts;
        self
    }

    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutting_down = flag;
        self
    }

    pub fn with_column_family_dropped_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.column_family_dropped = flag;
        self
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn stats(&self) -> &FlushStats {
        &self.stats
    }

    /// Moves sealed memtables out of `inner.frozen`. One-shot: calling
    /// this twice on the same job is a programmer error.
    pub fn pick(&mut self, inner: &mut EngineInner, max_count: Option<usize>) {
        assert_eq!(
            self.state,
            JobState::Created,
            "FlushJob::pick called more than once"
        );
        self.picked = pick_memtables_to_flush(inner, max_count);
        self.state = JobState::Picked;
        debug!(
            picked = self.picked.len(),
            reason = %self.reason,
            "flush job picked memtables"
        );
    }

    /// Runs the I/O phase with the engine's write lock released, then
    /// re-acquires it to install the result or roll back on failure.
    pub fn run(
        &mut self,
        inner: &Arc<RwLock<EngineInner>>,
        data_dir: &str,
        config: &EngineConfig,
    ) -> Result<FlushOutcome, FlushError> {
        assert_eq!(
            self.state,
            JobState::Picked,
            "FlushJob::run called before pick"
        );
        self.state = JobState::Running;

        if self.picked.is_empty() {
            self.state = JobState::Installed;
            return Ok(FlushOutcome::Empty);
        }

        if let Some(ts) = self.full_history_ts_low {
            tracing::trace!(full_history_ts_low = ts, "flush honoring ts watermark (no-op, timestamp-less keys)");
        }

        let io_result = self.run_io(inner, data_dir, config);

        let mut guard = inner
            .write()
            .map_err(|_| FlushError::Io(std::io::Error::other("engine lock poisoned")))?;

        // Cancellation supersedes an OK status but must never override an
        // existing I/O failure — only consult the flags once `io_result`
        // itself is `Ok`.
        if io_result.is_ok() {
            if self.column_family_dropped.load(Ordering::Acquire) {
                let picked = std::mem::take(&mut self.picked);
                rollback_flush(&mut guard, picked, None);
                self.state = JobState::RolledBack;
                return Err(FlushError::ColumnFamilyDropped);
            }
            if self.shutting_down.load(Ordering::Acquire) {
                let picked = std::mem::take(&mut self.picked);
                rollback_flush(&mut guard, picked, None);
                self.state = JobState::RolledBack;
                return Err(FlushError::ShutdownInProgress);
            }
        }

        match io_result {
            Ok(RunResult::Empty) => {
                // Non-empty input, zero-size output (e.g. everything was
                // tombstoned away): the inputs still retire normally, the
                // manifest just gets no add-file record.
                let picked = std::mem::take(&mut self.picked);
                if config.write_manifest {
                    try_install_results(&mut guard, &picked, None)?;
                }
                self.state = JobState::Installed;
                info!("flush produced zero-size output, inputs retired with no new SSTable");
                Ok(FlushOutcome::Empty)
            }
            Ok(RunResult::Table(meta)) => {
                let picked = std::mem::take(&mut self.picked);
                if config.write_manifest {
                    try_install_results(&mut guard, &picked, Some(&meta))?;
                    drop(guard);
                    if config.sync_output_dir {
                        sync_sstable_dir(data_dir)?;
                    }
                } else {
                    // Deferred install: the table is already durable on
                    // disk, but the manifest transaction is left to the
                    // caller, who can batch this result together with
                    // other flushes via `try_install_results` directly.
                    // The picked memtables are not returned to `frozen` —
                    // their data already lives in `meta` on disk, so a
                    // retry through the normal path would just duplicate
                    // it.
                    drop(picked);
                }
                self.state = JobState::Installed;
                info!(
                    file_number = meta.file_number,
                    file_size = meta.file_size,
                    write_manifest = config.write_manifest,
                    "flush installed new SSTable"
                );
                Ok(FlushOutcome::Table(meta))
            }
            Ok(RunResult::Mempurge(frozen)) => {
                // The inputs' own WALs are left registered in the manifest
                // untouched: mempurge writes nothing durable, so a crash
                // before the next real flush simply replays them again.
                std::mem::take(&mut self.picked);
                guard.frozen.push(frozen);
                self.state = JobState::Installed;
                self.stats.mempurged = true;
                info!("flush installed via mempurge, no SSTable written");
                Ok(FlushOutcome::Mempurge)
            }
            Err(e) => {
                let picked = std::mem::take(&mut self.picked);
                warn!(error = %e, "flush failed, rolling back");
                rollback_flush(&mut guard, picked, None);
                self.state = JobState::RolledBack;
                Err(e)
            }
        }
    }

    fn run_io(
        &mut self,
        inner: &Arc<RwLock<EngineInner>>,
        data_dir: &str,
        config: &EngineConfig,
    ) -> Result<RunResult, FlushError> {
        let io_before = config.measure_io.then(super::io_stats::snapshot);
        let result = self.run_io_inner(inner, data_dir, config);
        if let Some(before) = io_before {
            let (read, written) = super::io_stats::delta_since(before);
            self.stats.io_bytes_read = read;
            self.stats.io_bytes_written = written;
        }
        result
    }

    fn run_io_inner(
        &mut self,
        inner: &Arc<RwLock<EngineInner>>,
        data_dir: &str,
        config: &EngineConfig,
    ) -> Result<RunResult, FlushError> {
        let input_metas: Vec<MemtableFlushMeta> = self
            .picked
            .iter()
            .map(MemtableFlushMeta::compute)
            .collect::<Result<_, _>>()?;
        self.stats.inputs = input_metas.clone();

        if config.mempurge_policy.should_attempt(&self.picked, self.reason) {
            if let Some(frozen) = self.try_mempurge(data_dir, config)? {
                return Ok(RunResult::Mempurge(frozen));
            }
        }

        let (point_entries, range_tombstones) = self.collect_filtered_entries()?;
        self.stats.emitted_point_entries = point_entries.len();
        self.stats.emitted_range_tombstones = range_tombstones.len();

        let sstable_id = {
            let guard = inner
                .read()
                .map_err(|_| FlushError::Io(std::io::Error::other("engine lock poisoned")))?;
            guard.manifest.allocate_sst_id()?
        };
        let path = PathBuf::from(format!(
            "{}/{}/sstable-{:06}.sst",
            data_dir, SSTABLE_DIR, sstable_id
        ));

        match build_table(
            sstable_id,
            path,
            point_entries,
            range_tombstones,
            &input_metas,
            config.flush_verify_memtable_count,
        )? {
            Some(meta) => {
                self.stats.bytes_written = meta.file_size;
                Ok(RunResult::Table(meta))
            }
            None => Ok(RunResult::Empty),
        }
    }

    fn try_mempurge(
        &mut self,
        data_dir: &str,
        config: &EngineConfig,
    ) -> Result<Option<FrozenMemtable>, FlushError> {
        let (points, tombstones) = self.collect_filtered_entries()?;
        let records: Vec<Record> = points
            .into_iter()
            .map(|e| match e.value {
                Some(value) => Record::Put {
                    key: e.key,
                    value,
                    lsn: e.lsn,
                    timestamp: e.timestamp,
                },
                None => Record::Delete {
                    key: e.key,
                    lsn: e.lsn,
                    timestamp: e.timestamp,
                },
            })
            .collect();

        let min_id = self
            .picked
            .iter()
            .map(|m| m.memtable.wal.wal_seq())
            .min()
            .unwrap_or(0);
        let scratch_path = format!("{}/memtables/mempurge-{:06}.log", data_dir, min_id);

        match attempt_mempurge(&scratch_path, records, tombstones, config)? {
            MempurgeOutcome::Installed(frozen) => Ok(Some(frozen)),
            MempurgeOutcome::FellBack(Some(err)) => {
                info!(%err, "mempurge aborted, falling back to disk flush");
                Ok(None)
            }
            MempurgeOutcome::FellBack(None) => Ok(None),
        }
    }

    fn collect_filtered_entries(
        &self,
    ) -> Result<
        (
            Vec<crate::engine::PointEntry>,
            Vec<crate::engine::RangeTombstone>,
        ),
        FlushError,
    > {
        let cursor = build_input_cursor(&self.picked)?;
        let mut iter = CompactionIterator::new(
            cursor,
            self.snapshots.clone(),
            self.earliest_write_conflict_snapshot,
            self.snapshot_checker.as_ref(),
            self.merge_operator.as_ref(),
            self.filter.as_deref(),
        )?;

        let mut point_entries = Vec::new();
        while let Some(record) = iter.next() {
            match record? {
                Record::Put {
                    key,
                    value,
                    lsn,
                    timestamp,
                } => point_entries.push(crate::engine::PointEntry {
                    key,
                    value: Some(value),
                    lsn,
                    timestamp,
                }),
                Record::Delete { key, lsn, timestamp } => {
                    point_entries.push(crate::engine::PointEntry {
                        key,
                        value: None,
                        lsn,
                        timestamp,
                    })
                }
                Record::RangeDelete { .. } => unreachable!("range deletes are routed to the aggregator"),
            }
        }

        let range_tombstones = iter.into_range_tombstones();
        Ok((point_entries, range_tombstones))
    }
}

/// Picks the oldest-first prefix of `inner.frozen` for a flush job.
///
/// `inner.frozen` is stored newest-first (see `Engine::freeze_active`), so
/// the oldest sealed memtables sit at the tail; this pops up to
/// `max_count` of them (or all of them when `max_count` is `None`) and
/// returns them in ascending creation order, matching the sealed set `S`
/// invariant.
pub fn pick_memtables_to_flush(
    inner: &mut EngineInner,
    max_count: Option<usize>,
) -> Vec<FrozenMemtable> {
    let available = inner.frozen.len();
    let count = max_count.unwrap_or(available).min(available);
    if count == 0 {
        return Vec::new();
    }

    let split_at = available - count;
    let mut picked = inner.frozen.split_off(split_at);
    picked.reverse();
    picked
}

/// Returns borrowed memtables to the immutable list after a failed run,
/// un-picking them so a retry can select them again.
///
/// `_output_file_number` mirrors the spec's `rollback_flush(S,
/// output_file_number)` signature but is otherwise unused: this crate
/// never pre-allocates a file number before the disk path actually writes
/// one, so there is no dangling number to release on rollback.
pub fn rollback_flush(
    inner: &mut EngineInner,
    mut memtables: Vec<FrozenMemtable>,
    _output_file_number: Option<u64>,
) {
    memtables.reverse();
    inner.frozen.extend(memtables);
}

/// Installs a completed on-disk flush under the caller's already-held
/// write lock: opens and registers the new SSTable, retires the flushed
/// memtables' WALs from the manifest, advances the log number, and
/// checkpoints.
pub fn try_install_results(
    inner: &mut EngineInner,
    picked: &[FrozenMemtable],
    meta: Option<&FileMetaData>,
) -> Result<(), FlushError> {
    if let Some(meta) = meta {
        let mut sstable = SSTable::open(&meta.path)?;
        sstable.id = meta.file_number;
        inner.sstables.insert(0, sstable);
        inner.manifest.add_sstable(meta.manifest_entry())?;
    }

    for frozen in picked {
        inner.manifest.remove_frozen_wal(frozen.memtable.wal.wal_seq())?;
    }

    let max_lsn = picked.iter().map(|m| m.max_lsn()).max().unwrap_or(0);
    inner.manifest.update_lsn(max_lsn)?;
    inner.manifest.checkpoint()?;

    Ok(())
}

fn sync_sstable_dir(data_dir: &str) -> Result<(), FlushError> {
    let sstable_dir = format!("{data_dir}/{SSTABLE_DIR}");
    if let Ok(dir) = std::fs::File::open(&sstable_dir) {
        dir.sync_all()?;
    }
    Ok(())
}
