//! Platform layer error types.
//!
//! Two families live here:
//!
//! - [`PalError`]: the host could not provide a service (no counter, no
//!   entropy). These are environment failures.
//! - [`InvariantViolation`]: the engine broke the protection call discipline.
//!   These are defects in the caller, never transient.
//!
//! Neither is meant to be handled by the engine. The infallible entry points
//! report them through [`fatal`] and [`violation`], which log and then panic.

/// Errors from the host facilities behind the platform layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PalError {
    /// The counter backing the clock could not be read.
    #[error("clock source unavailable: {reason}")]
    ClockUnavailable { reason: String },

    /// The clock backend reported a zero frequency or timebase.
    #[error("clock source reported an unusable resolution: {reason}")]
    InvalidResolution { reason: String },

    /// A single attempt to obtain a generator context failed.
    #[error("entropy context unavailable: {reason}")]
    EntropyContext { reason: String },

    /// Neither an existing generator context nor a fresh one could be obtained.
    #[error("entropy source unavailable: acquire failed ({acquire}), create failed ({create})")]
    EntropyUnavailable { acquire: String, create: String },

    /// A query against an already initialised generator context failed.
    #[error("entropy query failed: {reason}")]
    EntropyQuery { reason: String },
}

/// A detected defect in the protect/unprotect call discipline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    /// `protect()` was entered while the calling context already held protection.
    #[error("nested protect: protection entered at depth {depth}")]
    NestedProtect { depth: u32 },

    /// `unprotect()` ran without a matching `protect()` on this guard.
    #[error("unmatched unprotect: release attempted at depth {depth}")]
    UnmatchedRelease { depth: u32 },

    /// Protection was held at a point that requires it not to be.
    #[error("protection held before scheduling: depth {depth} after entry")]
    ProtectedBeforeScheduling { depth: u32 },
}

/// Reports an unrecoverable host failure and aborts the current call path.
#[cold]
#[track_caller]
pub fn fatal(err: &PalError) -> ! {
    tracing::error!(error = %err, "fatal platform failure");
    panic!("fatal platform failure: {err}");
}

/// Reports a call-discipline defect and aborts the current call path.
#[cold]
#[track_caller]
pub fn violation(v: InvariantViolation) -> ! {
    tracing::error!(violation = %v, "platform invariant violated");
    panic!("platform invariant violated: {v}");
}
