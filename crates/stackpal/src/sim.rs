//! Deterministic backends for simulation and tests.
//!
//! - [`ManualCounter`]: a tick counter that only moves when told to, with a
//!   switch to make reads fail.
//! - [`SeededEntropy`]: a seeded generator backend whose acquire, create and
//!   query paths can each be made to fail.
//! - [`SharedBuffer`]: a cloneable in-memory writer for capturing diagnostics.
//!
//! All three are cheap handles over shared state: keep a clone, move the other
//! into the platform, and drive it from the test.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use crate::clock::{CounterResolution, TimeSource};
use crate::error::PalError;
use crate::rng::{EntropySource, RandomBackend};

// ============================================================================
// Clock
// ============================================================================

/// Tick counter advanced by hand.
#[derive(Debug, Clone)]
pub struct ManualCounter {
    ticks: Arc<AtomicU64>,
    resolution: CounterResolution,
    failing: Arc<AtomicBool>,
}

impl ManualCounter {
    pub fn new(resolution: CounterResolution) -> Self {
        Self {
            ticks: Arc::new(AtomicU64::new(0)),
            resolution,
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A counter ticking once per millisecond.
    pub fn millis() -> Self {
        Self::new(CounterResolution::MILLISECONDS)
    }

    pub fn advance(&self, ticks: u64) {
        self.ticks.fetch_add(ticks, Ordering::SeqCst);
    }

    /// Sets the raw reading. May move backwards, like a stepped wall clock.
    pub fn set(&self, ticks: u64) {
        self.ticks.store(ticks, Ordering::SeqCst);
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Makes every subsequent read fail (or succeed again).
    pub fn fail_reads(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl TimeSource for ManualCounter {
    fn read(&self) -> Result<u64, PalError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PalError::ClockUnavailable {
                reason: "simulated counter failure".to_string(),
            });
        }
        Ok(self.ticks())
    }

    fn resolution(&self) -> Result<CounterResolution, PalError> {
        Ok(self.resolution)
    }
}

// ============================================================================
// Entropy
// ============================================================================

/// Seeded generator backend with fault injection.
///
/// `acquire` yields a generator seeded with `seed`; `create` yields one seeded
/// with `seed + 1`, so tests can tell the two paths apart by output.
#[derive(Debug, Clone)]
pub struct SeededEntropy {
    seed: u64,
    fail_acquire: bool,
    fail_create: bool,
    fail_queries: Arc<AtomicBool>,
    opened: Arc<AtomicU64>,
}

impl SeededEntropy {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            fail_acquire: false,
            fail_create: false,
            fail_queries: Arc::new(AtomicBool::new(false)),
            opened: Arc::new(AtomicU64::new(0)),
        }
    }

    #[must_use]
    pub fn failing_acquire(mut self) -> Self {
        self.fail_acquire = true;
        self
    }

    #[must_use]
    pub fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    /// Makes queries on already opened contexts fail (or succeed again).
    pub fn fail_queries(&self, failing: bool) {
        self.fail_queries.store(failing, Ordering::SeqCst);
    }

    /// Number of contexts successfully handed out.
    pub fn contexts_opened(&self) -> u64 {
        self.opened.load(Ordering::SeqCst)
    }

    fn open(&self, seed: u64) -> SeededContext {
        self.opened.fetch_add(1, Ordering::SeqCst);
        SeededContext {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            fail_queries: Arc::clone(&self.fail_queries),
        }
    }
}

/// Context handed out by [`SeededEntropy`].
#[derive(Debug)]
pub struct SeededContext {
    rng: Mutex<StdRng>,
    fail_queries: Arc<AtomicBool>,
}

impl EntropySource for SeededContext {
    fn fill(&self, dest: &mut [u8]) -> Result<(), PalError> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(PalError::EntropyQuery {
                reason: "simulated query failure".to_string(),
            });
        }
        self.rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .fill_bytes(dest);
        Ok(())
    }
}

impl RandomBackend for SeededEntropy {
    type Context = SeededContext;

    fn acquire(&self) -> Result<SeededContext, PalError> {
        if self.fail_acquire {
            return Err(PalError::EntropyContext {
                reason: "simulated acquire failure".to_string(),
            });
        }
        Ok(self.open(self.seed))
    }

    fn create(&self) -> Result<SeededContext, PalError> {
        if self.fail_create {
            return Err(PalError::EntropyContext {
                reason: "simulated create failure".to_string(),
            });
        }
        Ok(self.open(self.seed.wrapping_add(1)))
    }
}

// ============================================================================
// Diagnostics capture
// ============================================================================

/// In-memory writer shared between a sink and the test reading it.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        let bytes = self.bytes.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::SecureRng;

    #[test]
    fn manual_counter_clones_share_ticks() {
        let counter = ManualCounter::millis();
        let handle = counter.clone();

        handle.advance(5);
        handle.advance(7);
        assert_eq!(counter.read().unwrap(), 12);
        assert_eq!(
            counter.resolution().unwrap(),
            CounterResolution::frequency(1_000).unwrap()
        );
    }

    #[test]
    fn acquire_and_create_paths_differ() {
        let existing = SecureRng::new(SeededEntropy::new(99));
        let created = SecureRng::new(SeededEntropy::new(99).failing_acquire());

        let a: Vec<u32> = (0..8).map(|_| existing.next_u32()).collect();
        let b: Vec<u32> = (0..8).map(|_| created.next_u32()).collect();
        assert_ne!(a, b);
    }

    #[test]
    fn shared_buffer_collects_writes() {
        let buffer = SharedBuffer::new();
        let mut writer = buffer.clone();
        write!(writer, "tcp {} ", 1).unwrap();
        write!(writer, "udp {}", 2).unwrap();

        assert_eq!(buffer.contents(), "tcp 1 udp 2");
    }
}
