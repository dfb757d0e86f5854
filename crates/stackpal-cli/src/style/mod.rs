//! Terminal styling: semantic colors, status lines, the version banner and
//! comfy-table rendering.

use std::sync::atomic::{AtomicBool, Ordering};

pub mod banner;
pub mod colors;
pub mod output;
pub mod table;

pub use output::{Outcome, print_outcome, print_section};
pub use table::{print_info_table, print_sample_table};

static NO_COLOR: AtomicBool = AtomicBool::new(false);

/// Turns styling off for the rest of the process (`--no-color`).
pub fn set_no_color(value: bool) {
    NO_COLOR.store(value, Ordering::Relaxed);
}

pub fn no_color() -> bool {
    NO_COLOR.load(Ordering::Relaxed)
}
