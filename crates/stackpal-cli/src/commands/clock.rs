//! Clock command: sample the platform clock at a fixed interval.

use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use stackpal_config::PalConfig;

use crate::style::print_sample_table;

pub fn run(project: &Path, samples: u32, interval_ms: u64) -> Result<()> {
    let config = PalConfig::load_from_dir(project).context("Failed to load configuration")?;
    let platform = config.build_platform()?;

    let mut rows = Vec::with_capacity(samples as usize);
    let mut previous = platform.timestamp();
    for i in 0..samples {
        if i > 0 {
            thread::sleep(Duration::from_millis(interval_ms));
        }
        let now = platform.timestamp();
        rows.push(vec![
            i.to_string(),
            now.to_string(),
            format!("+{}", now.wrapping_elapsed_since(previous)),
        ]);
        previous = now;
    }

    print_sample_table(&["sample", "now", "delta ms"], &rows);
    Ok(())
}
