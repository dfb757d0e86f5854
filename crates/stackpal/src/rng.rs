//! Secure random words from a host generator.
//!
//! A [`RandomBackend`] knows how to obtain a generator context two ways:
//! attach to one the host already provides ([`RandomBackend::acquire`]) or
//! build a fresh one ([`RandomBackend::create`]). [`SecureRng`] tries the
//! first, falls back to the second, and keeps whichever succeeded for the rest
//! of its life. Each query is one read of the requested width from that
//! context; nothing is buffered.
//!
//! # Failure policy
//!
//! - Both acquisition paths failing: fatal for [`SecureRng::next_u32`],
//!   reported as [`PalError::EntropyUnavailable`] by the `try_` methods.
//! - A query failing after initialisation: [`SecureRng::next_u32`] aborts, as
//!   a working context is assumed to stay working. [`SecureRng::try_next_u32`]
//!   hands the error back instead.

use std::fmt::Debug;
use std::sync::{Mutex, OnceLock, PoisonError};

use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng};

use crate::error::{PalError, fatal};

/// An initialised generator context.
pub trait EntropySource: Send + Sync {
    /// Fills `dest` with fresh random bytes.
    fn fill(&self, dest: &mut [u8]) -> Result<(), PalError>;
}

/// A host facility that can hand out generator contexts.
pub trait RandomBackend: Send + Sync {
    type Context: EntropySource + Debug;

    /// Attaches to the generator the host already provides.
    fn acquire(&self) -> Result<Self::Context, PalError>;

    /// Builds a new generator context. Used when [`RandomBackend::acquire`] fails.
    fn create(&self) -> Result<Self::Context, PalError>;
}

/// Which acquisition path produced the live context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquisition {
    Existing,
    Created,
}

/// Lazily initialised secure random source.
#[derive(Debug)]
pub struct SecureRng<B: RandomBackend> {
    backend: B,
    context: OnceLock<Result<(Acquisition, B::Context), PalError>>,
}

impl<B: RandomBackend> SecureRng<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            context: OnceLock::new(),
        }
    }

    /// Initialises the context if needed and reports how it was obtained.
    pub fn init(&self) -> Result<Acquisition, PalError> {
        self.context().map(|(acquisition, _)| *acquisition)
    }

    /// The acquisition path, once a context is live.
    pub fn acquisition(&self) -> Option<Acquisition> {
        match self.context.get() {
            Some(Ok((acquisition, _))) => Some(*acquisition),
            _ => None,
        }
    }

    pub fn try_fill(&self, dest: &mut [u8]) -> Result<(), PalError> {
        let (_, context) = self.context()?;
        context.fill(dest)
    }

    pub fn try_next_u32(&self) -> Result<u32, PalError> {
        let mut bytes = [0u8; 4];
        self.try_fill(&mut bytes)?;
        Ok(u32::from_ne_bytes(bytes))
    }

    pub fn try_next_u64(&self) -> Result<u64, PalError> {
        let mut bytes = [0u8; 8];
        self.try_fill(&mut bytes)?;
        Ok(u64::from_ne_bytes(bytes))
    }

    /// A uniformly distributed 32-bit word. Any failure is fatal.
    pub fn next_u32(&self) -> u32 {
        self.try_next_u32().unwrap_or_else(|e| fatal(&e))
    }

    /// A uniformly distributed 64-bit word. Any failure is fatal.
    pub fn next_u64(&self) -> u64 {
        self.try_next_u64().unwrap_or_else(|e| fatal(&e))
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn context(&self) -> Result<&(Acquisition, B::Context), PalError> {
        self.context
            .get_or_init(|| Self::open(&self.backend))
            .as_ref()
            .map_err(Clone::clone)
    }

    fn open(backend: &B) -> Result<(Acquisition, B::Context), PalError> {
        let acquire_err = match backend.acquire() {
            Ok(context) => {
                tracing::debug!("attached to existing entropy context");
                return Ok((Acquisition::Existing, context));
            }
            Err(e) => e,
        };

        tracing::warn!(error = %acquire_err, "entropy context acquisition failed, creating a new one");
        match backend.create() {
            Ok(context) => {
                tracing::debug!("created new entropy context");
                Ok((Acquisition::Created, context))
            }
            Err(create_err) => Err(PalError::EntropyUnavailable {
                acquire: acquire_err.to_string(),
                create: create_err.to_string(),
            }),
        }
    }
}

// ============================================================================
// Host backend
// ============================================================================

/// Operating-system entropy.
///
/// `acquire` attaches to the kernel generator directly (after a probe read),
/// and every query then goes to the kernel.
///
/// `create` seeds a userspace ChaCha-based [`StdRng`] from the same kernel
/// generator. It only succeeds where `acquire` failed transiently, since both
/// paths read the same facility. Once created, queries are served by the
/// userspace generator and no longer reach the host; its output is only as
/// fresh as that single seed.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsEntropy;

/// Context handed out by [`OsEntropy`].
#[derive(Debug)]
pub enum OsContext {
    /// Every query goes to the kernel.
    Kernel,
    /// Userspace CSPRNG seeded once from the kernel.
    Seeded(Mutex<StdRng>),
}

impl EntropySource for OsContext {
    fn fill(&self, dest: &mut [u8]) -> Result<(), PalError> {
        match self {
            Self::Kernel => getrandom::fill(dest).map_err(|e| PalError::EntropyQuery {
                reason: e.to_string(),
            }),
            Self::Seeded(rng) => rng
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .try_fill_bytes(dest)
                .map_err(|e| PalError::EntropyQuery {
                    reason: e.to_string(),
                }),
        }
    }
}

impl RandomBackend for OsEntropy {
    type Context = OsContext;

    fn acquire(&self) -> Result<OsContext, PalError> {
        let mut probe = [0u8; 4];
        getrandom::fill(&mut probe).map_err(|e| PalError::EntropyContext {
            reason: format!("kernel generator: {e}"),
        })?;
        Ok(OsContext::Kernel)
    }

    fn create(&self) -> Result<OsContext, PalError> {
        StdRng::from_rng(OsRng)
            .map(|rng| OsContext::Seeded(Mutex::new(rng)))
            .map_err(|e| PalError::EntropyContext {
                reason: format!("seeding userspace generator: {e}"),
            })
    }
}
