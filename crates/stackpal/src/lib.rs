//! # stackpal: Platform Abstraction Layer for a Userspace TCP/IP Engine
//!
//! This crate supplies the handful of host services an embedded network
//! engine needs and cannot provide itself:
//!
//! - **Clock** ([`Clock`]): milliseconds since calibration as a wrapping `u32`,
//!   derived from a high-resolution counter
//! - **Secure RNG** ([`SecureRng`]): uniformly distributed words from a host
//!   generator, with an acquire-then-create fallback
//! - **Protection guard** ([`Guard`]): the single serialisation point for
//!   every external entry into the engine, with optional call-discipline checks
//! - **Diagnostic sink** ([`DiagnosticSink`]): best-effort formatted output
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │           network engine (caller)            │
//! └──────────────────────┬───────────────────────┘
//!                        │ now / random / protect / diag
//! ┌──────────────────────┴───────────────────────┐
//! │                   Platform                   │
//! │ ┌───────┐ ┌───────────┐ ┌───────┐ ┌────────┐ │
//! │ │ Clock │ │ SecureRng │ │ Guard │ │  Diag  │ │
//! │ └───┬───┘ └─────┬─────┘ └───────┘ └────────┘ │
//! └─────┼───────────┼────────────────────────────┘
//!       │           │
//!   TimeSource  RandomBackend
//!   HostCounter OsEntropy
//!   WallCounter
//! ```
//!
//! # Features
//!
//! - `sim`: Deterministic clock and entropy backends (the `sim` module) for driving an
//!   engine under test

mod clock;
mod diag;
mod error;
mod guard;
mod options;
mod platform;
mod rng;

#[cfg(any(test, feature = "sim"))]
pub mod sim;

pub use clock::{
    Calibration, Clock, CounterResolution, HostCounter, TimeSource, Timestamp, WallCounter,
};
pub use diag::{DiagTarget, DiagnosticSink};
pub use error::{InvariantViolation, PalError, fatal, violation};
pub use guard::{Guard, GuardChecks, ProtectToken};
pub use options::{
    AllocationStrategy, ChecksumPolicy, EngineTiming, MAX_UNSCALED_WINDOW, OptionsError,
    Protocols, Sizing, StackOptions,
};
pub use platform::{Platform, PlatformBuilder};
pub use rng::{Acquisition, EntropySource, OsContext, OsEntropy, RandomBackend, SecureRng};
