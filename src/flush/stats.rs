//! Reporting and stats: per-memtable identity snapshots and aggregate
//! counters for a completed flush job.

use crate::memtable::{FrozenMemtable, MemtableError, MemtableRecord};

/// A computed snapshot of the identity fields a sealed memtable is
/// expected to expose (`id`, `next_log_number`, sizes, counts).
///
/// The engine crate has no background memory accountant, so this is
/// computed with a single pass over `iter_for_flush()` rather than
/// tracked incrementally as writes land.
#[derive(Debug, Clone, Default)]
pub struct MemtableFlushMeta {
    /// Identity of the memtable — its WAL sequence number.
    pub id: u64,
    /// Log number beyond which recovery no longer needs earlier WALs.
    pub next_log_number: u64,
    /// Total number of emitted records (point + range tombstone).
    pub entry_count: usize,
    /// Number of point/range deletions among `entry_count`.
    pub delete_count: usize,
    /// Approximate key+value byte size of the memtable's contents.
    pub data_size: usize,
    /// Minimum timestamp across the memtable's contents, 0 if empty.
    pub oldest_key_time: u64,
    /// Minimum LSN across the memtable's contents, 0 if empty.
    pub earliest_sequence: u64,
}

impl MemtableFlushMeta {
    /// Computes a snapshot from a sealed memtable.
    pub fn compute(frozen: &FrozenMemtable) -> Result<Self, MemtableError> {
        let id = frozen.memtable.wal.wal_seq();

        let mut entry_count = 0usize;
        let mut delete_count = 0usize;
        let mut data_size = 0usize;
        let mut earliest_sequence = u64::MAX;
        let mut oldest_key_time = u64::MAX;

        for record in frozen.iter_for_flush()? {
            entry_count += 1;
            match &record {
                MemtableRecord::Put {
                    key,
                    value,
                    lsn,
                    timestamp,
                } => {
                    data_size += key.len() + value.len();
                    earliest_sequence = earliest_sequence.min(*lsn);
                    oldest_key_time = oldest_key_time.min(*timestamp);
                }
                MemtableRecord::Delete {
                    key,
                    lsn,
                    timestamp,
                } => {
                    delete_count += 1;
                    data_size += key.len();
                    earliest_sequence = earliest_sequence.min(*lsn);
                    oldest_key_time = oldest_key_time.min(*timestamp);
                }
                MemtableRecord::RangeDelete {
                    start,
                    end,
                    lsn,
                    timestamp,
                } => {
                    delete_count += 1;
                    data_size += start.len() + end.len();
                    earliest_sequence = earliest_sequence.min(*lsn);
                    oldest_key_time = oldest_key_time.min(*timestamp);
                }
            }
        }

        if entry_count == 0 {
            earliest_sequence = 0;
            oldest_key_time = 0;
        }

        Ok(Self {
            id,
            next_log_number: id + 1,
            entry_count,
            delete_count,
            data_size,
            oldest_key_time,
            earliest_sequence,
        })
    }
}

/// Aggregate statistics for one completed (or attempted) flush job.
#[derive(Debug, Clone, Default)]
pub struct FlushStats {
    /// Per-input identity snapshots, in the order they were picked.
    pub inputs: Vec<MemtableFlushMeta>,
    /// Point entries actually written to the output (table or memtable).
    pub emitted_point_entries: usize,
    /// Range tombstone stripes actually written to the output.
    pub emitted_range_tombstones: usize,
    /// Bytes written to the output SSTable file; 0 for a mempurge.
    pub bytes_written: u64,
    /// Whether this job installed via the mempurge path.
    pub mempurged: bool,
    /// Bytes read from disk during this job's I/O phase. Only populated
    /// when [`EngineConfig::measure_io`](crate::engine::EngineConfig::measure_io)
    /// is set; 0 otherwise.
    pub io_bytes_read: u64,
    /// Bytes written to disk during this job's I/O phase. Only populated
    /// when [`EngineConfig::measure_io`](crate::engine::EngineConfig::measure_io)
    /// is set; 0 otherwise.
    pub io_bytes_written: u64,
}
