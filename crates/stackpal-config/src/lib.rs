//! Configuration management for stackpal
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. Environment variables (STACKPAL__* prefix, `__` between keys)
//! 2. stackpal.local.toml (gitignored, local overrides)
//! 3. stackpal.toml (git-tracked, project config)
//! 4. ~/.config/stackpal/config.toml (user defaults)
//! 5. Built-in defaults (lowest precedence)
//!
//! ```toml
//! [guard]
//! nested = true
//! scheduling = true
//!
//! [clock]
//! source = "monotonic"
//!
//! [diagnostics]
//! target = "stderr"
//!
//! [stack.sizing]
//! tcp_mss = 1460
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use stackpal::{
    DiagTarget, DiagnosticSink, GuardChecks, HostCounter, OsEntropy, Platform, StackOptions,
    TimeSource, WallCounter,
};

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::Paths;

/// Platform built from configuration: the counter is picked at runtime.
pub type ConfiguredPlatform = Platform<Box<dyn TimeSource>, OsEntropy>;

/// Main stackpal configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PalConfig {
    pub guard: GuardChecks,
    pub clock: ClockConfig,
    pub rng: RngConfig,
    pub diagnostics: DiagnosticsConfig,
    pub stack: StackOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    pub source: ClockSource,
}

/// Host counter backing the clock.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ClockSource {
    /// Monotonic high-resolution counter.
    #[default]
    Monotonic,
    /// Wall time; steps backwards are absorbed by the clock.
    Wall,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RngConfig {
    /// Attach the entropy context and calibrate the clock when the platform
    /// is built, instead of at first use.
    pub eager_init: bool,
}

impl Default for RngConfig {
    fn default() -> Self {
        Self { eager_init: true }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub target: DiagTarget,
}

impl PalConfig {
    /// Load configuration from specific project directory
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    /// Every guard check on, diagnostics on stderr.
    pub fn development() -> Self {
        Self {
            guard: GuardChecks::CHECKED,
            diagnostics: DiagnosticsConfig {
                target: DiagTarget::Stderr,
            },
            ..Default::default()
        }
    }

    /// Guard checks off, diagnostics routed into the log.
    pub fn production() -> Self {
        Self {
            guard: GuardChecks::UNCHECKED,
            diagnostics: DiagnosticsConfig {
                target: DiagTarget::Tracing,
            },
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.stack
            .validate()
            .map_err(|e| ConfigError::ValidationError(format!("stack: {e}")))
    }

    /// Builds the platform this configuration describes.
    pub fn build_platform(&self) -> Result<ConfiguredPlatform> {
        self.validate()?;

        let source: Box<dyn TimeSource> = match self.clock.source {
            ClockSource::Monotonic => Box::new(HostCounter::new()),
            ClockSource::Wall => Box::new(WallCounter),
        };
        let platform = Platform::builder(source, OsEntropy)
            .checks(self.guard)
            .diagnostics(DiagnosticSink::new(self.diagnostics.target))
            .options(self.stack.clone())
            .build();

        if self.rng.eager_init {
            platform
                .init()
                .context("Failed to initialise platform services")?;
        }
        Ok(platform)
    }
}
