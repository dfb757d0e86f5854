//! Build options for the network engine that runs on top of this layer.
//!
//! These are fixed for a given build of the engine. They are carried here so a
//! host can load, inspect and validate them alongside the platform settings.
//! `StackOptions::default()` is the reference configuration: a userspace
//! TCP/UDP relay with IPv6, no link-layer protocols and no checksum
//! verification on input.

use serde::{Deserialize, Serialize};

/// Largest receive window that fits the TCP header without window scaling.
pub const MAX_UNSCALED_WINDOW: u32 = 65_535;

/// Complete engine build configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackOptions {
    pub ip_default_ttl: u8,
    pub allocation: AllocationStrategy,
    pub protocols: Protocols,
    pub sizing: Sizing,
    pub checksums: ChecksumPolicy,
    pub timing: EngineTiming,
}

impl Default for StackOptions {
    fn default() -> Self {
        Self {
            ip_default_ttl: 64,
            allocation: AllocationStrategy::default(),
            protocols: Protocols::default(),
            sizing: Sizing::default(),
            checksums: ChecksumPolicy::default(),
            timing: EngineTiming::default(),
        }
    }
}

/// Protocol modules compiled into the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Protocols {
    pub tcp: bool,
    pub udp: bool,
    pub udp_lite: bool,
    pub icmp: bool,
    pub raw: bool,
    pub ipv6: bool,
    pub ipv6_autoconfig: bool,
    pub ipv6_mld: bool,
    pub arp: bool,
    pub dhcp: bool,
    pub autoip: bool,
    pub igmp: bool,
    pub dns: bool,
    pub ip_forward: bool,
    pub loopback_interface: bool,
    pub tcp_timestamps: bool,
}

impl Default for Protocols {
    fn default() -> Self {
        Self {
            tcp: true,
            udp: true,
            udp_lite: false,
            icmp: true,
            raw: true,
            ipv6: true,
            ipv6_autoconfig: true,
            ipv6_mld: false,
            arp: false,
            dhcp: false,
            autoip: false,
            igmp: false,
            dns: false,
            ip_forward: false,
            loopback_interface: true,
            tcp_timestamps: true,
        }
    }
}

/// Memory and connection limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sizing {
    /// Maximum segment size in bytes.
    pub tcp_mss: u16,
    /// Receive window in bytes.
    pub tcp_wnd: u32,
    /// Send buffer in bytes.
    pub tcp_snd_buf: u32,
    /// Heap reserved for packet buffers, in bytes.
    pub mem_size: u32,
    pub max_tcp_pcbs: u16,
    pub max_tcp_listen_pcbs: u16,
    pub max_udp_pcbs: u16,
    pub tcp_listen_backlog: u8,
}

impl Default for Sizing {
    fn default() -> Self {
        let tcp_wnd = 32 * 1024;
        Self {
            tcp_mss: 1460,
            tcp_wnd,
            tcp_snd_buf: tcp_wnd,
            mem_size: 128 * 1024,
            max_tcp_pcbs: 16,
            max_tcp_listen_pcbs: 1,
            max_udp_pcbs: 1,
            tcp_listen_backlog: 0xff,
        }
    }
}

/// Which checksums are verified on input, and whether output checksums are
/// folded into the copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChecksumPolicy {
    pub check_ip: bool,
    pub check_udp: bool,
    pub check_tcp: bool,
    pub check_icmp: bool,
    pub check_icmp6: bool,
    pub on_copy: bool,
}

impl Default for ChecksumPolicy {
    fn default() -> Self {
        Self {
            check_ip: false,
            check_udp: false,
            check_tcp: false,
            check_icmp: false,
            check_icmp6: false,
            on_copy: true,
        }
    }
}

/// Where engine memory comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AllocationStrategy {
    /// Every allocation goes to the host allocator.
    #[default]
    HostAllocator,
    /// Fixed pools sized from [`Sizing`], carved out at start-up.
    StaticPools,
}

/// Engine timer cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineTiming {
    /// How often the host drives the engine's timeout processing.
    pub poll_interval_ms: u32,
    /// TCP poll callback period, in engine ticks.
    pub tcp_poll_interval: u8,
}

impl Default for EngineTiming {
    fn default() -> Self {
        Self {
            poll_interval_ms: 250,
            tcp_poll_interval: 8,
        }
    }
}

/// A combination of options the engine cannot run with.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OptionsError {
    #[error("tcp_snd_buf ({snd_buf}) must be at least twice tcp_mss ({mss})")]
    SendBufferTooSmall { snd_buf: u32, mss: u16 },

    #[error("tcp_wnd ({wnd}) must be at least tcp_mss ({mss})")]
    WindowBelowMss { wnd: u32, mss: u16 },

    #[error("tcp_wnd ({wnd}) exceeds 65535 and window scaling is not available")]
    WindowTooLarge { wnd: u32 },

    #[error("{name} must be non-zero")]
    Zero { name: &'static str },

    #[error("at least one transport protocol (tcp or udp) must be enabled")]
    NoTransport,

    #[error("ipv6 requires icmp")]
    Ipv6WithoutIcmp,
}

impl StackOptions {
    /// Checks the cross-field constraints between options.
    pub fn validate(&self) -> Result<(), OptionsError> {
        let sizing = &self.sizing;
        let protocols = &self.protocols;

        for (name, value) in [
            ("tcp_mss", u32::from(sizing.tcp_mss)),
            ("mem_size", sizing.mem_size),
            ("max_tcp_pcbs", u32::from(sizing.max_tcp_pcbs)),
            ("max_tcp_listen_pcbs", u32::from(sizing.max_tcp_listen_pcbs)),
            ("max_udp_pcbs", u32::from(sizing.max_udp_pcbs)),
            ("ip_default_ttl", u32::from(self.ip_default_ttl)),
            ("poll_interval_ms", self.timing.poll_interval_ms),
            ("tcp_poll_interval", u32::from(self.timing.tcp_poll_interval)),
        ] {
            if value == 0 {
                return Err(OptionsError::Zero { name });
            }
        }

        if !protocols.tcp && !protocols.udp {
            return Err(OptionsError::NoTransport);
        }
        if protocols.ipv6 && !protocols.icmp {
            return Err(OptionsError::Ipv6WithoutIcmp);
        }

        if protocols.tcp {
            let mss = u32::from(sizing.tcp_mss);
            if sizing.tcp_snd_buf < 2 * mss {
                return Err(OptionsError::SendBufferTooSmall {
                    snd_buf: sizing.tcp_snd_buf,
                    mss: sizing.tcp_mss,
                });
            }
            if sizing.tcp_wnd < mss {
                return Err(OptionsError::WindowBelowMss {
                    wnd: sizing.tcp_wnd,
                    mss: sizing.tcp_mss,
                });
            }
            if sizing.tcp_wnd > MAX_UNSCALED_WINDOW {
                return Err(OptionsError::WindowTooLarge {
                    wnd: sizing.tcp_wnd,
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test]
    fn reference_configuration_is_valid() {
        let options = StackOptions::default();
        options.validate().unwrap();

        assert_eq!(options.sizing.tcp_snd_buf, options.sizing.tcp_wnd);
        assert_eq!(options.sizing.mem_size, 131_072);
        assert!(!options.protocols.arp);
        assert!(options.protocols.ipv6_autoconfig);
        assert!(!options.checksums.check_tcp);
        assert!(options.checksums.on_copy);
        assert_eq!(options.allocation, AllocationStrategy::HostAllocator);
    }

    #[test_case(|o: &mut StackOptions| { o.sizing.tcp_snd_buf = 2000; }
        => OptionsError::SendBufferTooSmall { snd_buf: 2000, mss: 1460 }; "send buffer below two segments")]
    #[test_case(|o: &mut StackOptions| { o.sizing.tcp_wnd = 1000; o.sizing.tcp_snd_buf = 4000; }
        => OptionsError::WindowBelowMss { wnd: 1000, mss: 1460 }; "window below mss")]
    #[test_case(|o: &mut StackOptions| { o.sizing.tcp_wnd = 131_072; }
        => OptionsError::WindowTooLarge { wnd: 131_072 }; "window needs scaling")]
    #[test_case(|o: &mut StackOptions| { o.sizing.max_tcp_pcbs = 0; }
        => OptionsError::Zero { name: "max_tcp_pcbs" }; "no tcp pcbs")]
    #[test_case(|o: &mut StackOptions| { o.timing.poll_interval_ms = 0; }
        => OptionsError::Zero { name: "poll_interval_ms" }; "zero poll interval")]
    #[test_case(|o: &mut StackOptions| { o.protocols.tcp = false; o.protocols.udp = false; }
        => OptionsError::NoTransport; "no transport")]
    #[test_case(|o: &mut StackOptions| { o.protocols.icmp = false; }
        => OptionsError::Ipv6WithoutIcmp; "ipv6 without icmp")]
    fn invalid_combinations_are_rejected(edit: fn(&mut StackOptions)) -> OptionsError {
        let mut options = StackOptions::default();
        edit(&mut options);
        options.validate().unwrap_err()
    }

    #[test]
    fn udp_only_build_skips_tcp_sizing() {
        let mut options = StackOptions::default();
        options.protocols.tcp = false;
        options.sizing.tcp_snd_buf = 0;
        options.validate().unwrap();
    }

    #[test]
    fn partial_table_fills_from_defaults() {
        let options: StackOptions = serde_json::from_str(
            r#"{ "sizing": { "tcp_mss": 536 }, "allocation": "static-pools" }"#,
        )
        .unwrap();

        assert_eq!(options.sizing.tcp_mss, 536);
        assert_eq!(options.sizing.tcp_wnd, 32 * 1024);
        assert_eq!(options.allocation, AllocationStrategy::StaticPools);
        assert_eq!(options.protocols, Protocols::default());
        options.validate().unwrap();
    }
}
