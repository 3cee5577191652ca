//! Mempurge path (component D): attempts to re-pack sealed memtables back
//! into a fresh in-memory memtable instead of writing a new SSTable.

use std::path::Path;

use tracing::{info, warn};

use crate::engine::utils::Record;
use crate::engine::EngineConfig;
use crate::memtable::{FrozenMemtable, Memtable, MemtableError};

use super::cursor::record_to_memtable_record;
use super::reason::FlushReason;
use super::FlushError;

/// Decides whether a flush should attempt mempurge before falling back to
/// the on-disk path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MempurgePolicy {
    /// Always attempt mempurge.
    Always,
    /// Attempt mempurge unless any input was itself a previous mempurge
    /// output — prevents infinite re-pack cycles.
    Alternate,
    /// Never attempt mempurge.
    #[default]
    Disabled,
}

impl MempurgePolicy {
    /// Whether mempurge should be attempted for this set of inputs, given
    /// the reason the flush was triggered.
    ///
    /// Mempurge is only eligible when the flush was triggered by write
    /// buffer pressure — there is no point avoiding I/O for, say, a
    /// manual or shutdown-triggered flush.
    pub fn should_attempt(&self, inputs: &[FrozenMemtable], reason: FlushReason) -> bool {
        if inputs.is_empty() || reason != FlushReason::WriteBufferFull {
            return false;
        }
        match self {
            MempurgePolicy::Disabled => false,
            MempurgePolicy::Always => true,
            MempurgePolicy::Alternate => !inputs.iter().any(|m| m.mempurge_output),
        }
    }
}

/// Outcome of an attempted mempurge.
pub enum MempurgeOutcome {
    /// Mempurge produced a replacement memtable that fits within the
    /// configured write buffer.
    Installed(FrozenMemtable),
    /// Mempurge overflowed and was abandoned (`Some`), or nothing was
    /// emitted to purge (`None`); either way the caller falls back to the
    /// on-disk flush path.
    FellBack(Option<FlushError>),
}

/// Attempts to re-pack `records` (the already-merged, snapshot-filtered
/// point stream) plus `range_tombstones` (the aggregator's final
/// non-overlapping stripes) into a new memtable.
///
/// Targets a fresh `memtable::Memtable` opened against a scratch WAL path,
/// removed again on abort, so the procedure reuses the engine crate's
/// existing overflow accounting in `Memtable::insert_preserving_lsn`
/// (which already returns `MemtableError::FlushRequired` when a record
/// would overflow the write buffer) rather than hand-rolling a second
/// in-memory size tracker.
pub fn attempt_mempurge(
    scratch_wal_path: impl AsRef<Path>,
    records: Vec<Record>,
    range_tombstones: Vec<crate::engine::RangeTombstone>,
    config: &EngineConfig,
) -> Result<MempurgeOutcome, FlushError> {
    let scratch_wal_path = scratch_wal_path.as_ref();
    let new_mem = Memtable::new(scratch_wal_path, None, config.write_buffer_size)?;

    let mut emitted = 0usize;
    for record in records {
        let memtable_record = record_to_memtable_record(record);
        match new_mem.insert_preserving_lsn(memtable_record) {
            Ok(()) => emitted += 1,
            Err(MemtableError::FlushRequired) => {
                let _ = std::fs::remove_file(scratch_wal_path);
                warn!("mempurge overflow: filled more than one memtable");
                return Ok(MempurgeOutcome::FellBack(Some(FlushError::Aborted(
                    "Mempurge filled more than one memtable.".into(),
                ))));
            }
            Err(e) => {
                let _ = std::fs::remove_file(scratch_wal_path);
                return Err(e.into());
            }
        }
    }

    for tombstone in range_tombstones {
        let record = Record::RangeDelete {
            start: tombstone.start,
            end: tombstone.end,
            lsn: tombstone.lsn,
            timestamp: tombstone.timestamp,
        };
        match new_mem.insert_preserving_lsn(record_to_memtable_record(record)) {
            Ok(()) => emitted += 1,
            Err(MemtableError::FlushRequired) => {
                let _ = std::fs::remove_file(scratch_wal_path);
                warn!("mempurge overflow replaying range tombstones");
                return Ok(MempurgeOutcome::FellBack(Some(FlushError::Aborted(
                    "Mempurge filled more than one memtable.".into(),
                ))));
            }
            Err(e) => {
                let _ = std::fs::remove_file(scratch_wal_path);
                return Err(e.into());
            }
        }
    }

    if emitted == 0 {
        let _ = std::fs::remove_file(scratch_wal_path);
        return Ok(MempurgeOutcome::FellBack(None));
    }

    info!(emitted, "mempurge succeeded, re-packed into a new memtable");
    let mut frozen = new_mem.frozen()?;
    frozen.mempurge_output = true;
    Ok(MempurgeOutcome::Installed(frozen))
}
