//! Version banner.

use super::colors::SemanticStyle;

/// Prints the version banner.
pub fn print_version_banner(version: &str) {
    println!();
    println!(
        "  {} {} {}",
        "◇".info(),
        "stackpal".header(),
        format!("v{version}").muted()
    );
    println!("  {}", "Platform services for a userspace TCP/IP stack".muted());
    println!();
}
