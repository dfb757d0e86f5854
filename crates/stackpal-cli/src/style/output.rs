//! Line-oriented status and section output.

use super::colors::SemanticStyle;

/// Marker printed in front of a one-line outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Passed,
    Failed,
    Warning,
}

/// Prints a one-line outcome. Failures go to stderr.
pub fn print_outcome(outcome: Outcome, msg: &str) {
    match outcome {
        Outcome::Passed => println!("{} {msg}", "✓".success()),
        Outcome::Failed => eprintln!("{} {msg}", "✗".error()),
        Outcome::Warning => println!("{} {msg}", "⚠".warning()),
    }
}

/// Prints a heading, its indented `key: value` fields, then a blank line.
pub fn print_section(title: &str, fields: &[(&str, String)]) {
    println!("{}", title.header());
    for (key, value) in fields {
        println!("  {}: {value}", key.muted());
    }
    println!();
}
