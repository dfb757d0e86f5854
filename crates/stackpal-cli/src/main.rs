//! stackpal command-line tool.
//!
//! Probes and inspects the platform services (clock, entropy, protection
//! guard) a userspace TCP/IP stack runs on.
//!
//! # Quick Start
//!
//! ```bash
//! # Check that every service works on this host
//! stackpal probe
//!
//! # Watch the clock advance
//! stackpal clock --samples 5 --interval-ms 100
//!
//! # Inspect the merged configuration
//! stackpal config show --format toml
//! ```

mod commands;
mod style;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// stackpal - platform services for a userspace TCP/IP stack.
#[derive(Parser)]
#[command(name = "stackpal")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Directory holding stackpal.toml / stackpal.local.toml.
    #[arg(short, long, global = true, default_value = ".")]
    project: PathBuf,

    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version information.
    Version,

    /// Exercise clock, entropy and guard once and report the results.
    Probe,

    /// Sample the platform clock.
    Clock {
        /// Number of samples to take.
        #[arg(short, long, default_value = "5")]
        samples: u32,

        /// Pause between samples, in milliseconds.
        #[arg(short, long, default_value = "100")]
        interval_ms: u64,
    },

    /// Draw 32-bit words from the secure generator.
    Random {
        /// Number of words to draw.
        #[arg(short, long, default_value = "8")]
        count: u32,
    },

    /// Configuration commands.
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the merged configuration.
    Show {
        /// Output format (text, toml, json).
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Load and validate the configuration.
    Validate,
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    style::set_no_color(cli.no_color);

    match cli.command {
        Commands::Version => {
            commands::version::run();
            Ok(())
        }
        Commands::Probe => commands::probe::run(&cli.project),
        Commands::Clock {
            samples,
            interval_ms,
        } => commands::clock::run(&cli.project, samples, interval_ms),
        Commands::Random { count } => commands::random::run(&cli.project, count),
        Commands::Config(cmd) => match cmd {
            ConfigCommands::Show { format } => commands::config::show(&cli.project, &format),
            ConfigCommands::Validate => commands::config::validate(&cli.project),
        },
    }
}
