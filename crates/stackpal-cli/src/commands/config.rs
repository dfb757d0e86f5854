//! Configuration management commands.

use anyhow::{Context, Result};
use stackpal_config::PalConfig;
use std::path::Path;

use crate::style::{Outcome, print_outcome, print_section};

/// Show current configuration.
pub fn show(project: &Path, format: &str) -> Result<()> {
    let config = PalConfig::load_from_dir(project).context("Failed to load configuration")?;

    match format {
        "json" => {
            let json = serde_json::to_string_pretty(&config)?;
            println!("{json}");
        }
        "toml" => {
            let toml_str = toml::to_string_pretty(&config)?;
            println!("{toml_str}");
        }
        _ => print_text(&config),
    }

    Ok(())
}

fn print_text(config: &PalConfig) {
    let stack = &config.stack;

    print_section("stackpal configuration", &[]);
    print_section(
        "Guard:",
        &[
            ("Nested check", config.guard.nested.to_string()),
            ("Scheduling check", config.guard.scheduling.to_string()),
        ],
    );
    print_section("Clock:", &[("Source", format!("{:?}", config.clock.source))]);
    print_section("RNG:", &[("Eager init", config.rng.eager_init.to_string())]);
    print_section(
        "Diagnostics:",
        &[("Target", config.diagnostics.target.to_string())],
    );

    let p = &stack.protocols;
    let enabled: Vec<&str> = [
        ("tcp", p.tcp),
        ("udp", p.udp),
        ("udp-lite", p.udp_lite),
        ("icmp", p.icmp),
        ("raw", p.raw),
        ("ipv6", p.ipv6),
        ("ipv6-autoconfig", p.ipv6_autoconfig),
        ("ipv6-mld", p.ipv6_mld),
        ("arp", p.arp),
        ("dhcp", p.dhcp),
        ("autoip", p.autoip),
        ("igmp", p.igmp),
        ("dns", p.dns),
        ("ip-forward", p.ip_forward),
        ("loopif", p.loopback_interface),
        ("tcp-timestamps", p.tcp_timestamps),
    ]
    .into_iter()
    .filter_map(|(name, on)| on.then_some(name))
    .collect();

    let sizing = &stack.sizing;
    print_section(
        "Stack:",
        &[
            ("Protocols", enabled.join(", ")),
            ("Default TTL", stack.ip_default_ttl.to_string()),
            ("TCP MSS", sizing.tcp_mss.to_string()),
            ("TCP window", sizing.tcp_wnd.to_string()),
            ("TCP send buffer", sizing.tcp_snd_buf.to_string()),
            ("Memory", sizing.mem_size.to_string()),
            (
                "PCBs (tcp/listen/udp)",
                format!(
                    "{}/{}/{}",
                    sizing.max_tcp_pcbs, sizing.max_tcp_listen_pcbs, sizing.max_udp_pcbs
                ),
            ),
            ("Allocation", format!("{:?}", stack.allocation)),
            ("Checksum on copy", stack.checksums.on_copy.to_string()),
            (
                "Poll interval",
                format!("{} ms", stack.timing.poll_interval_ms),
            ),
        ],
    );
}

/// Validate configuration files.
pub fn validate(project: &Path) -> Result<()> {
    println!("Validating configuration in {}...", project.display());

    match PalConfig::load_from_dir(project) {
        Ok(_) => {
            print_outcome(Outcome::Passed, "Configuration is valid");
            Ok(())
        }
        Err(e) => {
            print_outcome(Outcome::Failed, &format!("Configuration validation failed: {e:#}"));
            Err(e)
        }
    }
}
