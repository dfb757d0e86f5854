//! Protection guard serialising external entry into the stack.
//!
//! The stack runs as one logical thread. Hosts still call into it from
//! several real threads (timer tick, packet injection, API calls), so every
//! such entry is bracketed by [`Guard::protect`] / [`Guard::unprotect`].
//!
//! # Primitive
//!
//! The underlying lock is re-entrant: the thread that owns it can enter again
//! without blocking. That matches the critical sections the stack was written
//! against, and it is what lets a nested `protect()` be *detected* instead of
//! deadlocking.
//!
//! # Checks
//!
//! [`GuardChecks`] turns on two independent checks. Either one enables the
//! depth counter.
//!
//! - `nested`: `protect()` at depth 1 is a violation, and a release must
//!   find depth exactly 1.
//! - `scheduling`: enables [`Guard::assert_not_protected`].
//!
//! With both off the guard is a plain re-entrant lock and nesting is silently
//! allowed.
//!
//! # Ordering
//!
//! Depth is raised only after the lock is owned and lowered before it is
//! given up, so a depth of 1 is only ever observed by the legitimate holder.

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use serde::{Deserialize, Serialize};

use crate::error::{InvariantViolation, violation};

/// Which invariant checks a [`Guard`] enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardChecks {
    /// Reject nested `protect()` and require depth 1 on release.
    pub nested: bool,
    /// Make `assert_not_protected()` live (a no-op otherwise).
    pub scheduling: bool,
}

impl GuardChecks {
    pub const CHECKED: Self = Self {
        nested: true,
        scheduling: true,
    };

    pub const UNCHECKED: Self = Self {
        nested: false,
        scheduling: false,
    };

    /// Whether the depth counter is maintained.
    pub const fn counts_depth(self) -> bool {
        self.nested || self.scheduling
    }
}

impl Default for GuardChecks {
    /// Checked in debug builds, unchecked in release builds.
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::CHECKED
        } else {
            Self::UNCHECKED
        }
    }
}

// ============================================================================
// Re-entrant critical section
// ============================================================================

#[derive(Debug, Default)]
struct Ownership {
    owner: Option<ThreadId>,
    entries: u32,
}

/// Re-entrant lock built on a mutex and a condition variable.
#[derive(Debug, Default)]
struct CriticalSection {
    ownership: Mutex<Ownership>,
    released: Condvar,
}

impl CriticalSection {
    fn ownership(&self) -> MutexGuard<'_, Ownership> {
        // Ownership is updated in single statements; a poisoned lock is still consistent.
        self.ownership
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn enter(&self) {
        let me = thread::current().id();
        let mut state = self.ownership();
        if state.owner == Some(me) {
            state.entries += 1;
            return;
        }
        while state.owner.is_some() {
            state = self
                .released
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.owner = Some(me);
        state.entries = 1;
    }

    fn leave(&self) {
        let mut state = self.ownership();
        debug_assert_eq!(
            state.owner,
            Some(thread::current().id()),
            "critical section left by a thread that does not own it"
        );
        state.entries = state.entries.saturating_sub(1);
        if state.entries == 0 {
            state.owner = None;
            drop(state);
            self.released.notify_one();
        }
    }

    fn held_by_current_thread(&self) -> bool {
        self.ownership().owner == Some(thread::current().id())
    }
}

// ============================================================================
// Guard
// ============================================================================

/// The process-wide protection guard.
///
/// One instance serialises every external entry into one stack. Share it by
/// reference (or `Arc`) between the contexts that call in.
#[derive(Debug, Default)]
pub struct Guard {
    section: CriticalSection,
    /// Protection depth; only touched by the section owner.
    depth: AtomicU32,
    checks: GuardChecks,
}

impl Guard {
    pub fn new(checks: GuardChecks) -> Self {
        Self {
            section: CriticalSection::default(),
            depth: AtomicU32::new(0),
            checks,
        }
    }

    pub fn checked() -> Self {
        Self::new(GuardChecks::CHECKED)
    }

    pub fn unchecked() -> Self {
        Self::new(GuardChecks::UNCHECKED)
    }

    pub fn checks(&self) -> GuardChecks {
        self.checks
    }

    /// Current depth. Always 0 when no check is enabled.
    pub fn depth(&self) -> u32 {
        self.depth.load(Ordering::Relaxed)
    }

    /// Whether the calling thread is inside a protection section.
    pub fn is_held_by_current_thread(&self) -> bool {
        self.section.held_by_current_thread()
    }

    /// Enters protection, blocking while another context holds it.
    ///
    /// # Panics
    ///
    /// With nested checking on, panics if the calling context already holds
    /// protection.
    pub fn protect(&self) -> ProtectToken<'_> {
        self.try_protect().unwrap_or_else(|v| violation(v))
    }

    /// Like [`Guard::protect`], but reports a nested entry instead of panicking.
    /// The guard is left exactly as it was when an error is returned.
    pub fn try_protect(&self) -> Result<ProtectToken<'_>, InvariantViolation> {
        self.section.enter();

        if self.checks.nested {
            let depth = self.depth();
            if depth != 0 {
                self.section.leave();
                return Err(InvariantViolation::NestedProtect { depth });
            }
        }
        if self.checks.counts_depth() {
            self.depth.fetch_add(1, Ordering::Relaxed);
        }

        Ok(ProtectToken {
            guard: self,
            _not_send: PhantomData,
        })
    }

    /// Leaves protection.
    ///
    /// # Panics
    ///
    /// Panics on an unmatched release: a token from another guard, or a
    /// depth that does not match the checks in force.
    pub fn unprotect(&self, token: ProtectToken<'_>) {
        if let Err(v) = self.try_unprotect(token) {
            violation(v);
        }
    }

    /// Like [`Guard::unprotect`], but reports violations instead of panicking.
    ///
    /// A token from another guard is released on its own guard and the
    /// violation is reported against this one.
    pub fn try_unprotect(&self, token: ProtectToken<'_>) -> Result<(), InvariantViolation> {
        if !std::ptr::eq(token.guard, self) {
            return Err(InvariantViolation::UnmatchedRelease {
                depth: self.depth(),
            });
        }
        let result = self.release();
        std::mem::forget(token);
        result
    }

    /// Runs `f` inside a protection section. Protection is released on every
    /// exit path, including unwinding.
    pub fn with<R>(&self, f: impl FnOnce() -> R) -> R {
        let token = self.protect();
        let out = f();
        self.unprotect(token);
        out
    }

    /// Checks that the calling context does not hold protection.
    ///
    /// Place this before anything that can call back into the stack: the
    /// callback must enter through its own `protect()`.
    ///
    /// # Panics
    ///
    /// With scheduling checks on, panics if the caller holds protection.
    pub fn assert_not_protected(&self) {
        if let Err(v) = self.try_assert_not_protected() {
            violation(v);
        }
    }

    /// Like [`Guard::assert_not_protected`], but reports instead of panicking.
    pub fn try_assert_not_protected(&self) -> Result<(), InvariantViolation> {
        if !self.checks.scheduling {
            return Ok(());
        }

        self.section.enter();
        let depth = self.depth.fetch_add(1, Ordering::Relaxed) + 1;
        self.depth.fetch_sub(1, Ordering::Relaxed);
        self.section.leave();

        if depth == 1 {
            Ok(())
        } else {
            Err(InvariantViolation::ProtectedBeforeScheduling { depth })
        }
    }

    /// Lowers depth and leaves the section. The section is always left, even
    /// when the depth check fails, so a reported violation cannot also wedge
    /// other contexts.
    fn release(&self) -> Result<(), InvariantViolation> {
        let mut result = Ok(());

        if self.checks.counts_depth() {
            let depth = self.depth();
            let balanced = if self.checks.nested {
                depth == 1
            } else {
                depth > 0
            };
            if !balanced {
                result = Err(InvariantViolation::UnmatchedRelease { depth });
            }
            self.depth.store(depth.saturating_sub(1), Ordering::Relaxed);
        }

        self.section.leave();
        result
    }
}

/// Proof of an open protection section.
///
/// Created only by [`Guard::protect`], consumed by [`Guard::unprotect`].
/// Dropping it releases protection too, which is what makes early returns and
/// `?` safe inside a section. It cannot leave the thread that entered.
#[must_use = "dropping the token releases protection immediately"]
pub struct ProtectToken<'a> {
    guard: &'a Guard,
    _not_send: PhantomData<*const ()>,
}

impl ProtectToken<'_> {
    /// Depth of the guard this token belongs to.
    pub fn depth(&self) -> u32 {
        self.guard.depth()
    }
}

impl fmt::Debug for ProtectToken<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtectToken")
            .field("depth", &self.depth())
            .finish_non_exhaustive()
    }
}

impl Drop for ProtectToken<'_> {
    fn drop(&mut self) {
        if let Err(v) = self.guard.release() {
            if thread::panicking() {
                tracing::error!(violation = %v, "unbalanced release while unwinding");
            } else {
                violation(v);
            }
        }
    }
}
