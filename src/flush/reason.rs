//! Flush reasons, surfaced as structured `tracing` fields on every
//! flush-related log line.

/// Why a flush was triggered.
///
/// Mirrors the reason taxonomy post-flush event subscribers expect to see;
/// carried through [`crate::flush::job::FlushJob`] purely for reporting —
/// the job's own behavior only distinguishes
/// [`FlushReason::WriteBufferFull`] (the one reason mempurge is eligible
/// for) from everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushReason {
    #[default]
    Others,
    GetLiveFiles,
    ShutDown,
    ExternalFileIngestion,
    ManualCompaction,
    WriteBufferManager,
    WriteBufferFull,
    Test,
    DeleteFiles,
    AutoCompaction,
    ManualFlush,
    ErrorRecovery,
    WalFull,
}

impl std::fmt::Display for FlushReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}
