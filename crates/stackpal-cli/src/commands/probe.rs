//! Probe command: exercise every platform service once against the host.

use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use stackpal_config::PalConfig;

use crate::style::{Outcome, print_info_table, print_outcome, print_section};

const SLEEP: Duration = Duration::from_millis(50);
/// Accepted range for the measured sleep, in milliseconds.
const TOLERANCE_MS: std::ops::RangeInclusive<u32> = 40..=200;

pub fn run(project: &Path) -> Result<()> {
    let config = PalConfig::load_from_dir(project).context("Failed to load configuration")?;
    let platform = config.build_platform()?;
    platform
        .init()
        .context("Failed to initialise platform services")?;

    let t0 = platform.now();
    thread::sleep(SLEEP);
    let t1 = platform.now();
    let elapsed = t1.wrapping_sub(t0);

    let token = platform.protect();
    platform.unprotect(token);
    platform.guard().try_assert_not_protected()?;

    let word = platform.rng().try_next_u32()?;
    tracing::debug!(t0, t1, word, "probe complete");

    print_section("Platform probe", &[]);
    print_info_table(&[
        ("Clock source", format!("{:?}", config.clock.source)),
        ("Entropy context", format!("{:?}", platform.rng().acquisition())),
        ("Guard checks", format!("{:?}", platform.guard().checks())),
        ("Diagnostics", config.diagnostics.target.to_string()),
        ("T0", format!("{t0} ms")),
        ("T1", format!("{t1} ms")),
        ("Slept", format!("{} ms, measured {elapsed} ms", SLEEP.as_millis())),
        ("Random word", format!("{word:#010x}")),
    ]);

    if !TOLERANCE_MS.contains(&elapsed) {
        bail!(
            "clock out of tolerance: slept {} ms, measured {elapsed} ms",
            SLEEP.as_millis()
        );
    }
    if !platform.guard().checks().counts_depth() {
        print_outcome(
            Outcome::Warning,
            "Guard checks are off: protect/unprotect misuse will not be detected",
        );
    }
    print_outcome(Outcome::Passed, "All platform services responded");
    Ok(())
}
