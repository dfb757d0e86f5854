//! Version command implementation.

use crate::style::banner::print_version_banner;
use crate::style::print_section;

/// Version information for the CLI.
const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn run() {
    print_version_banner(VERSION);
    let guard_default = if cfg!(debug_assertions) {
        "on by default (debug build)"
    } else {
        "off by default (release build)"
    };
    print_section(
        "Build info:",
        &[
            ("Target", std::env::consts::ARCH.to_string()),
            ("OS", std::env::consts::OS.to_string()),
            ("Guard checks", guard_default.to_string()),
        ],
    );
}
