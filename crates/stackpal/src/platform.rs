//! The platform facade handed to the engine.
//!
//! [`Platform`] owns one of each service and exposes the narrow surface the
//! engine calls: `now`, `next_random_u32`, `protect`/`unprotect`,
//! `assert_not_protected` and `diagnostic`.
//!
//! # Initialisation
//!
//! [`Platform::init`] eagerly attaches the entropy context and calibrates the
//! clock. It is optional: each service initialises itself on first use, and
//! `protect()` on a never-initialised platform runs `init` first so a failing
//! host is detected at the engine's first entry rather than mid-operation.

use std::fmt;

use crate::clock::{Clock, HostCounter, TimeSource, Timestamp};
use crate::diag::DiagnosticSink;
use crate::error::{PalError, fatal};
use crate::guard::{Guard, GuardChecks, ProtectToken};
use crate::options::StackOptions;
use crate::rng::{OsEntropy, RandomBackend, SecureRng};

/// All platform services for one engine instance.
#[derive(Debug)]
pub struct Platform<C: TimeSource = HostCounter, B: RandomBackend = OsEntropy> {
    clock: Clock<C>,
    rng: SecureRng<B>,
    guard: Guard,
    diag: DiagnosticSink,
    options: StackOptions,
}

impl Platform {
    /// Host counter, OS entropy, default checks, diagnostics on stdout.
    pub fn host() -> Self {
        Self::builder(HostCounter::new(), OsEntropy).build()
    }
}

impl<C: TimeSource, B: RandomBackend> Platform<C, B> {
    pub fn builder(source: C, backend: B) -> PlatformBuilder<C, B> {
        PlatformBuilder::new(source, backend)
    }

    /// Attaches the entropy context and calibrates the clock. Idempotent; a
    /// failure is remembered and returned again on later calls.
    pub fn init(&self) -> Result<(), PalError> {
        let acquisition = self.rng.init()?;
        let calibration = self.clock.calibrate()?;
        tracing::info!(
            ?acquisition,
            resolution = ?calibration.resolution,
            checks = ?self.guard.checks(),
            "platform initialised"
        );
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.clock.is_calibrated() && self.rng.acquisition().is_some()
    }

    /// Milliseconds since calibration, wrapping at 2^32.
    pub fn now(&self) -> u32 {
        self.clock.now().as_millis()
    }

    /// Same reading as [`Platform::now`].
    pub fn jiffies(&self) -> u32 {
        self.clock.jiffies().as_millis()
    }

    pub fn timestamp(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn next_random_u32(&self) -> u32 {
        self.rng.next_u32()
    }

    /// Enters protection, initialising the platform first if needed.
    ///
    /// # Panics
    ///
    /// Panics if initialisation fails or, under nested checking, if the
    /// caller already holds protection.
    pub fn protect(&self) -> ProtectToken<'_> {
        if !self.is_initialized()
            && let Err(e) = self.init()
        {
            fatal(&e);
        }
        self.guard.protect()
    }

    pub fn unprotect(&self, token: ProtectToken<'_>) {
        self.guard.unprotect(token);
    }

    pub fn assert_not_protected(&self) {
        self.guard.assert_not_protected();
    }

    pub fn diagnostic(&self, args: fmt::Arguments<'_>) {
        self.diag.diagnostic(args);
    }

    pub fn clock(&self) -> &Clock<C> {
        &self.clock
    }

    pub fn rng(&self) -> &SecureRng<B> {
        &self.rng
    }

    pub fn guard(&self) -> &Guard {
        &self.guard
    }

    pub fn options(&self) -> &StackOptions {
        &self.options
    }
}

/// Assembles a [`Platform`] from its backends.
#[derive(Debug)]
pub struct PlatformBuilder<C, B> {
    source: C,
    backend: B,
    checks: GuardChecks,
    diag: DiagnosticSink,
    options: StackOptions,
}

impl<C: TimeSource, B: RandomBackend> PlatformBuilder<C, B> {
    pub fn new(source: C, backend: B) -> Self {
        Self {
            source,
            backend,
            checks: GuardChecks::default(),
            diag: DiagnosticSink::default(),
            options: StackOptions::default(),
        }
    }

    #[must_use]
    pub fn checks(mut self, checks: GuardChecks) -> Self {
        self.checks = checks;
        self
    }

    #[must_use]
    pub fn diagnostics(mut self, sink: DiagnosticSink) -> Self {
        self.diag = sink;
        self
    }

    #[must_use]
    pub fn options(mut self, options: StackOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> Platform<C, B> {
        Platform {
            clock: Clock::new(self.source),
            rng: SecureRng::new(self.backend),
            guard: Guard::new(self.checks),
            diag: self.diag,
            options: self.options,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform_diag;
    use crate::rng::Acquisition;
    use crate::sim::{ManualCounter, SeededEntropy, SharedBuffer};

    fn sim_platform(
        counter: &ManualCounter,
        entropy: &SeededEntropy,
    ) -> Platform<ManualCounter, SeededEntropy> {
        Platform::builder(counter.clone(), entropy.clone())
            .checks(GuardChecks::CHECKED)
            .build()
    }

    #[test]
    fn init_attaches_and_calibrates() {
        let counter = ManualCounter::millis();
        counter.set(5_000);
        let platform = sim_platform(&counter, &SeededEntropy::new(1));
        assert!(!platform.is_initialized());

        platform.init().unwrap();
        assert!(platform.is_initialized());
        assert_eq!(platform.rng().acquisition(), Some(Acquisition::Existing));
        assert_eq!(platform.now(), 0);

        counter.advance(42);
        assert_eq!(platform.now(), 42);
        assert_eq!(platform.jiffies(), 42);
    }

    #[test]
    fn protect_initialises_lazily() {
        let counter = ManualCounter::millis();
        let entropy = SeededEntropy::new(1);
        let platform = sim_platform(&counter, &entropy);

        let token = platform.protect();
        assert!(platform.is_initialized());
        assert_eq!(entropy.contexts_opened(), 1);
        platform.unprotect(token);

        // Already initialised: no second context.
        let token = platform.protect();
        platform.unprotect(token);
        assert_eq!(entropy.contexts_opened(), 1);
    }

    #[test]
    #[should_panic(expected = "entropy source unavailable")]
    fn protect_fails_hard_when_init_fails() {
        let entropy = SeededEntropy::new(1).failing_acquire().failing_create();
        let platform = sim_platform(&ManualCounter::millis(), &entropy);
        let _token = platform.protect();
    }

    #[test]
    fn init_failure_is_sticky() {
        let counter = ManualCounter::millis();
        counter.fail_reads(true);
        let platform = sim_platform(&counter, &SeededEntropy::new(1));

        assert!(matches!(platform.init(), Err(PalError::ClockUnavailable { .. })));
        counter.fail_reads(false);
        assert!(platform.init().is_err());
        assert!(!platform.is_initialized());
    }

    #[test]
    fn diagnostics_go_to_configured_sink() {
        let buffer = SharedBuffer::new();
        let platform = Platform::builder(ManualCounter::millis(), SeededEntropy::new(1))
            .diagnostics(DiagnosticSink::to_writer(buffer.clone()))
            .build();

        platform_diag!(platform, "tcp_slowtmr: {} active\n", 2);
        assert_eq!(buffer.contents(), "tcp_slowtmr: 2 active\n");
    }

    #[test]
    fn builder_carries_options_and_checks() {
        let mut options = StackOptions::default();
        options.sizing.max_tcp_pcbs = 64;

        let platform = Platform::builder(ManualCounter::millis(), SeededEntropy::new(1))
            .checks(GuardChecks::UNCHECKED)
            .options(options.clone())
            .build();

        assert_eq!(platform.options(), &options);
        assert_eq!(platform.guard().checks(), GuardChecks::UNCHECKED);
    }

    #[test]
    fn host_platform_serves_all_calls() {
        let platform = Platform::host();
        platform.init().unwrap();

        platform.assert_not_protected();
        let token = platform.protect();
        let _ = platform.next_random_u32();
        let _ = platform.now();
        platform.unprotect(token);
    }
}
