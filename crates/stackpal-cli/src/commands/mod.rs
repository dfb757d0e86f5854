//! CLI command implementations.

pub mod clock;
pub mod config;
pub mod probe;
pub mod random;
pub mod version;
