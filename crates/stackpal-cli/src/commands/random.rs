//! Random command: draw words from the secure generator.

use std::path::Path;

use anyhow::{Context, Result};
use stackpal_config::PalConfig;

pub fn run(project: &Path, count: u32) -> Result<()> {
    let config = PalConfig::load_from_dir(project).context("Failed to load configuration")?;
    let platform = config.build_platform()?;

    for _ in 0..count {
        let word = platform
            .rng()
            .try_next_u32()
            .context("Entropy query failed")?;
        println!("{word:#010x}");
    }
    Ok(())
}
