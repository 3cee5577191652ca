//! Thread-local IO byte counters: snapshotted before and after a flush's
//! I/O phase to compute how many bytes that single flush pushed through
//! the filesystem, without needing a process-wide accountant.
//!
//! Only [`EngineConfig::measure_io`](crate::engine::EngineConfig::measure_io)
//! gates whether [`FlushJob::run_io`](super::job::FlushJob) reads these
//! counters; the counters themselves are always updated by actual file
//! I/O, since zeroing them out on the common path would just move the
//! branch from here to every call site instead.

use std::cell::Cell;

thread_local! {
    static BYTES_READ: Cell<u64> = const { Cell::new(0) };
    static BYTES_WRITTEN: Cell<u64> = const { Cell::new(0) };
}

/// Adds `n` to this thread's read counter. Call at the point an actual
/// file read completes.
pub fn record_read(n: u64) {
    BYTES_READ.with(|c| c.set(c.get() + n));
}

/// Adds `n` to this thread's write counter. Call at the point an actual
/// file write completes.
pub fn record_written(n: u64) {
    BYTES_WRITTEN.with(|c| c.set(c.get() + n));
}

/// This thread's current `(bytes_read, bytes_written)` counters.
pub fn snapshot() -> (u64, u64) {
    (BYTES_READ.with(Cell::get), BYTES_WRITTEN.with(Cell::get))
}

/// The `(bytes_read, bytes_written)` delta since an earlier [`snapshot`].
pub fn delta_since(since: (u64, u64)) -> (u64, u64) {
    let now = snapshot();
    (now.0 - since.0, now.1 - since.1)
}
