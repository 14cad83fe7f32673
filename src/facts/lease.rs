// file: src/facts/lease.rs
// version: 1.0.0
// guid: 0e5c7a92-4d61-48b3-9f75-2ab80c3e6d14

//! dhclient lease-file parsing
//!
//! The VM reconfiguration path reads the guest's lease file over SSH to learn
//! which gateway, interface and DNS servers DHCP handed out before the stanza
//! is rewritten to static values.

use std::net::Ipv4Addr;
use std::str::FromStr;

/// Values of interest from the most recent lease block
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeaseInfo {
    pub interface: Option<String>,
    pub gateway: Option<Ipv4Addr>,
    pub dns_servers: Vec<Ipv4Addr>,
}

/// Parse a dhclient.leases body; the last lease block wins
pub fn parse_lease_file(contents: &str) -> LeaseInfo {
    let mut current = LeaseInfo::default();
    let mut last_complete = LeaseInfo::default();

    for raw in contents.lines() {
        let line = raw.trim().trim_end_matches(';');

        if line.starts_with("lease") && line.ends_with('{') {
            current = LeaseInfo::default();
        } else if line == "}" {
            last_complete = current.clone();
        } else if let Some(rest) = line.strip_prefix("interface ") {
            current.interface = Some(rest.trim_matches('"').to_string());
        } else if let Some(rest) = line.strip_prefix("option routers ") {
            current.gateway = Ipv4Addr::from_str(rest.trim()).ok();
        } else if let Some(rest) = line.strip_prefix("option domain-name-servers ") {
            current.dns_servers = rest
                .split(',')
                .filter_map(|s| Ipv4Addr::from_str(s.trim()).ok())
                .collect();
        }
    }

    last_complete
}
