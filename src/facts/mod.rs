// file: src/facts/mod.rs
// version: 1.0.0
// guid: a6d91f34-5c07-4e82-b9a6-340fe8d172c9

//! Machine identity facts
//!
//! Determines the interface carrying the static address, the public IP if
//! any, and validates the FQDN. Enumeration goes through `ip -j addr show`
//! so the kernel's own `dynamic` flag decides whether an address is
//! DHCP-leased.

pub mod lease;

use crate::{process, BootstrapError, Result};
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use tracing::{debug, info};

/// Identity of the machine being provisioned
#[derive(Debug, Clone)]
pub struct NetworkFacts {
    /// Interface carrying the static address
    pub interface: String,
    /// The static IPv4 address itself
    pub address: Ipv4Addr,
    pub prefix_len: u8,
    pub netmask: Ipv4Addr,
    pub gateway: Option<Ipv4Addr>,
    pub dns_servers: Vec<Ipv4Addr>,
    /// Any non-private address bound to the host; last one wins on ties
    pub public_ip: Option<IpAddr>,
    /// Locally resolvable FQDN
    pub fqdn: String,
}

/// One interface with its addresses, as reported by `ip -j addr show`
#[derive(Debug, Deserialize)]
pub struct IfaceAddrs {
    pub ifname: String,
    #[serde(default)]
    pub addr_info: Vec<AddrInfo>,
}

#[derive(Debug, Deserialize)]
pub struct AddrInfo {
    pub family: String,
    pub local: String,
    pub prefixlen: u8,
    /// Set by the kernel when the address was leased via DHCP
    #[serde(default)]
    pub dynamic: bool,
}

/// Candidate selection over a synthetic or live address table
#[derive(Debug, PartialEq)]
pub struct Selection {
    pub interface: String,
    pub address: Ipv4Addr,
    pub prefix_len: u8,
    pub public_ip: Option<IpAddr>,
}

/// Collect network facts for the session FQDN
///
/// Fails with `NoStaticInterface` / `AmbiguousInterface` when the address
/// table does not identify exactly one static candidate, and with
/// `Unresolvable` when the FQDN has no local resolution.
pub async fn collect(fqdn: &str) -> Result<NetworkFacts> {
    let interfaces = enumerate_interfaces().await?;
    let selection = select_interface(&interfaces)?;
    assemble(selection, fqdn).await
}

/// Collect network facts for an operator-chosen interface
///
/// Bypasses automatic selection entirely: the name is looked up in the
/// address table and taken as-is, so a host that automatic selection would
/// reject as ambiguous (or empty) can still be provisioned by naming the
/// interface. The dhcp-check stage still validates the choice afterwards.
pub async fn collect_named(interface: &str, fqdn: &str) -> Result<NetworkFacts> {
    let interfaces = enumerate_interfaces().await?;
    let selection = select_named(&interfaces, interface)?;
    assemble(selection, fqdn).await
}

async fn assemble(selection: Selection, fqdn: &str) -> Result<NetworkFacts> {
    info!(
        "Selected interface {} ({}/{})",
        selection.interface, selection.address, selection.prefix_len
    );

    let gateway = default_gateway().await?;
    let dns_servers = match tokio::fs::read_to_string("/etc/resolv.conf").await {
        Ok(contents) => parse_resolv_conf(&contents),
        Err(_) => Vec::new(),
    };

    validate_fqdn(fqdn).await?;

    Ok(NetworkFacts {
        netmask: netmask_from_prefix(selection.prefix_len),
        interface: selection.interface,
        address: selection.address,
        prefix_len: selection.prefix_len,
        gateway,
        dns_servers,
        public_ip: selection.public_ip,
        fqdn: fqdn.to_string(),
    })
}

/// Enumerate all interfaces and their addresses
pub async fn enumerate_interfaces() -> Result<Vec<IfaceAddrs>> {
    let output = process::run_checked("ip", &["-j", "addr", "show"]).await?;
    let interfaces: Vec<IfaceAddrs> = serde_json::from_str(&output)?;
    Ok(interfaces)
}

/// Pick the single static private interface and the public IP (last wins)
pub fn select_interface(interfaces: &[IfaceAddrs]) -> Result<Selection> {
    let mut candidates: Vec<(String, Ipv4Addr, u8)> = Vec::new();
    let mut public_ip: Option<IpAddr> = None;

    for iface in interfaces {
        for addr in &iface.addr_info {
            if addr.family != "inet" {
                continue;
            }
            let Ok(ip) = Ipv4Addr::from_str(&addr.local) else {
                continue;
            };

            if ip.is_loopback() {
                continue;
            }

            if is_private(ip) {
                if !addr.dynamic && !candidates.iter().any(|(name, _, _)| name == &iface.ifname) {
                    candidates.push((iface.ifname.clone(), ip, addr.prefixlen));
                }
            } else {
                // Last one wins on multiple public addresses, as the
                // historical installer behaved.
                public_ip = Some(IpAddr::V4(ip));
            }
        }
    }

    if candidates.is_empty() {
        return Err(BootstrapError::NoStaticInterface);
    }
    if candidates.len() > 1 {
        let names: Vec<&str> = candidates.iter().map(|(n, _, _)| n.as_str()).collect();
        return Err(BootstrapError::AmbiguousInterface(names.join(", ")));
    }

    let (interface, address, prefix_len) = candidates.remove(0);
    Ok(Selection {
        interface,
        address,
        prefix_len,
        public_ip,
    })
}

/// Take the named interface from the address table, ambiguity or not
///
/// The public-IP scan still covers the whole table (last wins), but the
/// operational interface is exactly the one named, with its first
/// non-loopback IPv4 address. Whether that address is DHCP-leased is
/// checked separately by `ensure_not_dhcp`.
pub fn select_named(interfaces: &[IfaceAddrs], name: &str) -> Result<Selection> {
    let mut public_ip: Option<IpAddr> = None;
    for iface in interfaces {
        for addr in &iface.addr_info {
            if addr.family != "inet" {
                continue;
            }
            let Ok(ip) = Ipv4Addr::from_str(&addr.local) else {
                continue;
            };
            if !ip.is_loopback() && !is_private(ip) {
                public_ip = Some(IpAddr::V4(ip));
            }
        }
    }

    let iface = interfaces
        .iter()
        .find(|iface| iface.ifname == name)
        .ok_or_else(|| BootstrapError::prerequisite(format!("interface {} not found", name)))?;

    let (address, prefix_len) = iface
        .addr_info
        .iter()
        .filter(|addr| addr.family == "inet")
        .filter_map(|addr| {
            Ipv4Addr::from_str(&addr.local)
                .ok()
                .filter(|ip| !ip.is_loopback())
                .map(|ip| (ip, addr.prefixlen))
        })
        .next()
        .ok_or_else(|| {
            BootstrapError::prerequisite(format!("interface {} carries no IPv4 address", name))
        })?;

    Ok(Selection {
        interface: name.to_string(),
        address,
        prefix_len,
        public_ip,
    })
}

/// RFC1918 plus link-local, the "reachable only on the LAN" class
pub fn is_private(ip: Ipv4Addr) -> bool {
    ip.is_private() || ip.is_link_local()
}

/// Verify the chosen interface does not hold a DHCP-leased address
pub async fn ensure_not_dhcp(interface: &str) -> Result<()> {
    let interfaces = enumerate_interfaces().await?;
    check_not_dhcp(&interfaces, interface)
}

/// DHCP check over a synthetic or live address table
pub fn check_not_dhcp(interfaces: &[IfaceAddrs], interface: &str) -> Result<()> {
    let iface = interfaces
        .iter()
        .find(|i| i.ifname == interface)
        .ok_or_else(|| {
            BootstrapError::prerequisite(format!("interface `{}` does not exist", interface))
        })?;

    let leased = iface
        .addr_info
        .iter()
        .any(|a| a.family == "inet" && a.dynamic);

    if leased {
        return Err(BootstrapError::DhcpManagedInterface(interface.to_string()));
    }
    Ok(())
}

/// FQDN validity: non-empty domain component, a literal /etc/hosts entry,
/// and a successful reachability probe. Any failure is fatal; operators fix
/// DNS/hosts state and rerun.
pub async fn validate_fqdn(fqdn: &str) -> Result<()> {
    if !has_domain_component(fqdn) {
        return Err(BootstrapError::Unresolvable(
            fqdn.to_string(),
            "missing domain component".to_string(),
        ));
    }

    let hosts = tokio::fs::read_to_string("/etc/hosts")
        .await
        .map_err(|e| BootstrapError::Unresolvable(fqdn.to_string(), e.to_string()))?;
    if !hosts_file_contains(&hosts, fqdn) {
        return Err(BootstrapError::Unresolvable(
            fqdn.to_string(),
            "no /etc/hosts entry".to_string(),
        ));
    }

    let reachable = process::check_silent("ping", &["-c", "1", "-W", "2", fqdn]).await?;
    if !reachable {
        return Err(BootstrapError::Unresolvable(
            fqdn.to_string(),
            format!("ping -c 1 {} failed", fqdn),
        ));
    }

    debug!("FQDN {} resolves locally", fqdn);
    Ok(())
}

/// A valid FQDN needs at least one dot with a non-empty domain after it
pub fn has_domain_component(fqdn: &str) -> bool {
    match fqdn.split_once('.') {
        Some((host, domain)) => !host.is_empty() && !domain.is_empty(),
        None => false,
    }
}

/// Literal entry check against the local host-alias table
pub fn hosts_file_contains(contents: &str, fqdn: &str) -> bool {
    contents
        .lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .any(|line| line.split_whitespace().skip(1).any(|name| name == fqdn))
}

/// Default gateway from `ip -j route show default`
pub async fn default_gateway() -> Result<Option<Ipv4Addr>> {
    let output = process::run_checked("ip", &["-j", "route", "show", "default"]).await?;
    if output.trim().is_empty() {
        return Ok(None);
    }

    #[derive(Deserialize)]
    struct IpRoute {
        gateway: Option<String>,
    }

    let routes: Vec<IpRoute> = serde_json::from_str(&output)?;
    Ok(routes
        .first()
        .and_then(|r| r.gateway.as_deref())
        .and_then(|g| Ipv4Addr::from_str(g).ok()))
}

/// Nameservers from a resolv.conf body
pub fn parse_resolv_conf(contents: &str) -> Vec<Ipv4Addr> {
    contents
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            match (parts.next(), parts.next()) {
                (Some("nameserver"), Some(addr)) => Ipv4Addr::from_str(addr).ok(),
                _ => None,
            }
        })
        .collect()
}

/// Dotted-quad netmask for a prefix length
pub fn netmask_from_prefix(prefix_len: u8) -> Ipv4Addr {
    let mask: u32 = if prefix_len == 0 {
        0
    } else {
        !0u32 << (32 - u32::from(prefix_len.min(32)))
    };
    Ipv4Addr::from(mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iface(name: &str, addrs: Vec<AddrInfo>) -> IfaceAddrs {
        IfaceAddrs {
            ifname: name.to_string(),
            addr_info: addrs,
        }
    }

    fn inet(local: &str, prefixlen: u8, dynamic: bool) -> AddrInfo {
        AddrInfo {
            family: "inet".to_string(),
            local: local.to_string(),
            prefixlen,
            dynamic,
        }
    }

    #[test]
    fn test_single_static_interface_selected() {
        let table = vec![
            iface("lo", vec![inet("127.0.0.1", 8, false)]),
            iface("eth0", vec![inet("192.168.1.20", 24, true)]),
            iface("eth1", vec![inet("192.168.56.10", 24, false)]),
        ];
        let sel = select_interface(&table).unwrap();
        assert_eq!(sel.interface, "eth1");
        assert_eq!(sel.address, Ipv4Addr::new(192, 168, 56, 10));
        assert_eq!(sel.prefix_len, 24);
        assert!(sel.public_ip.is_none());
    }

    #[test]
    fn test_no_static_interface() {
        let table = vec![
            iface("lo", vec![inet("127.0.0.1", 8, false)]),
            iface("eth0", vec![inet("10.0.2.15", 24, true)]),
        ];
        assert!(matches!(
            select_interface(&table),
            Err(BootstrapError::NoStaticInterface)
        ));
    }

    #[test]
    fn test_ambiguous_interfaces() {
        let table = vec![
            iface("eth0", vec![inet("192.168.1.10", 24, false)]),
            iface("eth1", vec![inet("10.1.1.10", 24, false)]),
        ];
        match select_interface(&table) {
            Err(BootstrapError::AmbiguousInterface(names)) => {
                assert!(names.contains("eth0") && names.contains("eth1"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_named_interface_overrides_ambiguity() {
        // Two static candidates: automatic selection refuses, naming one
        // must succeed with exactly that interface.
        let table = vec![
            iface("eth0", vec![inet("192.168.1.10", 24, false)]),
            iface("eth1", vec![inet("10.1.1.10", 24, false)]),
        ];
        assert!(matches!(
            select_interface(&table),
            Err(BootstrapError::AmbiguousInterface(_))
        ));

        let sel = select_named(&table, "eth0").unwrap();
        assert_eq!(sel.interface, "eth0");
        assert_eq!(sel.address, Ipv4Addr::new(192, 168, 1, 10));
    }

    #[test]
    fn test_named_interface_accepts_dynamic_address() {
        // A DHCP-leased choice passes selection; the dhcp check rejects it
        // in its own stage with a clearer diagnosis.
        let table = vec![iface("eth0", vec![inet("10.0.2.15", 24, true)])];
        let sel = select_named(&table, "eth0").unwrap();
        assert_eq!(sel.address, Ipv4Addr::new(10, 0, 2, 15));
    }

    #[test]
    fn test_named_interface_missing_or_empty() {
        let table = vec![iface("eth0", vec![inet("192.168.1.10", 24, false)])];
        assert!(select_named(&table, "eth7").is_err());

        let bare = vec![iface("eth0", vec![])];
        assert!(select_named(&bare, "eth0").is_err());
    }

    #[test]
    fn test_named_interface_sees_public_ip_elsewhere() {
        let table = vec![
            iface("eth0", vec![inet("192.168.1.10", 24, false)]),
            iface("eth2", vec![inet("203.0.113.44", 32, false)]),
        ];
        let sel = select_named(&table, "eth0").unwrap();
        assert_eq!(sel.public_ip, Some("203.0.113.44".parse().unwrap()));
    }

    #[test]
    fn test_public_ip_last_wins() {
        let table = vec![
            iface(
                "eth0",
                vec![
                    inet("192.168.1.10", 24, false),
                    inet("198.51.100.7", 32, false),
                    inet("203.0.113.44", 32, false),
                ],
            ),
        ];
        let sel = select_interface(&table).unwrap();
        assert_eq!(sel.interface, "eth0");
        assert_eq!(sel.public_ip, Some("203.0.113.44".parse().unwrap()));
    }

    #[test]
    fn test_check_not_dhcp() {
        let table = vec![
            iface("eth0", vec![inet("192.168.1.10", 24, false)]),
            iface("eth1", vec![inet("10.0.2.15", 24, true)]),
        ];
        assert!(check_not_dhcp(&table, "eth0").is_ok());
        assert!(matches!(
            check_not_dhcp(&table, "eth1"),
            Err(BootstrapError::DhcpManagedInterface(_))
        ));
        assert!(check_not_dhcp(&table, "eth7").is_err());
    }

    #[test]
    fn test_has_domain_component() {
        assert!(has_domain_component("medulla.example.com"));
        assert!(!has_domain_component("medulla"));
        assert!(!has_domain_component("medulla."));
        assert!(!has_domain_component(".example.com"));
    }

    #[test]
    fn test_hosts_file_contains() {
        let hosts = "\
127.0.0.1 localhost
# 10.0.0.1 commented.example.com
192.168.56.10 medulla.example.com medulla
";
        assert!(hosts_file_contains(hosts, "medulla.example.com"));
        assert!(hosts_file_contains(hosts, "medulla"));
        assert!(!hosts_file_contains(hosts, "commented.example.com"));
        assert!(!hosts_file_contains(hosts, "other.example.com"));
    }

    #[test]
    fn test_parse_resolv_conf() {
        let body = "search example.com\nnameserver 192.168.1.1\nnameserver 9.9.9.9\n";
        let servers = parse_resolv_conf(body);
        assert_eq!(
            servers,
            vec![
                Ipv4Addr::new(192, 168, 1, 1),
                Ipv4Addr::new(9, 9, 9, 9)
            ]
        );
    }

    #[test]
    fn test_netmask_from_prefix() {
        assert_eq!(netmask_from_prefix(24), Ipv4Addr::new(255, 255, 255, 0));
        assert_eq!(netmask_from_prefix(16), Ipv4Addr::new(255, 255, 0, 0));
        assert_eq!(netmask_from_prefix(32), Ipv4Addr::new(255, 255, 255, 255));
        assert_eq!(netmask_from_prefix(0), Ipv4Addr::new(0, 0, 0, 0));
    }

    #[test]
    fn test_parse_ip_json_fixture() {
        let json = r#"[
            {"ifname": "eth1", "addr_info": [
                {"family": "inet", "local": "192.168.56.10", "prefixlen": 24},
                {"family": "inet6", "local": "fe80::1", "prefixlen": 64}
            ]},
            {"ifname": "eth0", "addr_info": [
                {"family": "inet", "local": "10.0.2.15", "prefixlen": 24, "dynamic": true}
            ]}
        ]"#;
        let table: Vec<IfaceAddrs> = serde_json::from_str(json).unwrap();
        let sel = select_interface(&table).unwrap();
        assert_eq!(sel.interface, "eth1");
    }
}
