//! Merging input cursor (component A): builds one internal-key stream per
//! sealed memtable and merges them via the engine's existing k-way merge
//! iterator.

use crate::engine::utils::{MergeIterator, Record};
use crate::memtable::{FrozenMemtable, MemtableError, MemtableRecord};

/// Converts a memtable-level record into the shared engine [`Record`]
/// type.
///
/// The two enums carry the same fields under different names — this is
/// the seam that resolves the mismatch between `FrozenMemtable::iter_for_flush`
/// (memtable vocabulary) and `engine::utils::MergeIterator` (engine
/// vocabulary).
pub fn memtable_record_to_record(record: MemtableRecord) -> Record {
    match record {
        MemtableRecord::Put {
            key,
            value,
            lsn,
            timestamp,
        } => Record::Put {
            key,
            value,
            lsn,
            timestamp,
        },
        MemtableRecord::Delete { key, lsn, timestamp } => Record::Delete { key, lsn, timestamp },
        MemtableRecord::RangeDelete {
            start,
            end,
            lsn,
            timestamp,
        } => Record::RangeDelete {
            start,
            end,
            lsn,
            timestamp,
        },
    }
}

/// The inverse conversion, used by the mempurge path when replaying a
/// filtered record back into a fresh memtable.
pub fn record_to_memtable_record(record: Record) -> MemtableRecord {
    match record {
        Record::Put {
            key,
            value,
            lsn,
            timestamp,
        } => MemtableRecord::Put {
            key,
            value,
            lsn,
            timestamp,
        },
        Record::Delete { key, lsn, timestamp } => MemtableRecord::Delete { key, lsn, timestamp },
        Record::RangeDelete {
            start,
            end,
            lsn,
            timestamp,
        } => MemtableRecord::RangeDelete {
            start,
            end,
            lsn,
            timestamp,
        },
    }
}

/// Builds the merged, total-order record stream over every sealed
/// memtable in `inputs`, in internal-key order (key ASC, LSN DESC).
///
/// Each memtable's `iter_for_flush()` is already a total-order scan over a
/// `BTreeMap` with no bloom filter to short-circuit, satisfying "total-order
/// seek, bloom short-circuit disabled" for free.
pub fn build_input_cursor<'a>(
    inputs: &'a [FrozenMemtable],
) -> Result<MergeIterator<'a>, MemtableError> {
    let mut iters: Vec<Box<dyn Iterator<Item = Record> + 'a>> = Vec::with_capacity(inputs.len());
    for memtable in inputs {
        let iter = memtable.iter_for_flush()?.map(memtable_record_to_record);
        iters.push(Box::new(iter));
    }
    Ok(MergeIterator::new(iters))
}
