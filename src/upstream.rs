//! Upstream server sets and the per-query routing decision.
//!
//! Custom servers are fixed at startup. System servers come from the host
//! resolver configuration and are swapped wholesale on every ingest, so a
//! reader always sees one complete set.

use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv6Addr, SocketAddr, SocketAddrV6};
use std::sync::Arc;

use arc_swap::ArcSwap;
use rustc_hash::FxHashSet;
use tracing::info;

/// Address that marks the host resolver as pointing back at a local stub.
pub const LOOPBACK_RESOLVER: &str = "127.0.0.1";

/// Public server used instead of a loopback-only host configuration.
pub const FALLBACK_SERVER: &str = "1.1.1.1";

/// Where an upstream server came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Supplied by the operator on the command line.
    Custom,
    /// Learned from the host resolver configuration.
    System,
}

/// A DNS server queries may be forwarded to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamServer {
    host: Arc<str>,
    origin: Origin,
}

impl UpstreamServer {
    pub fn new(host: &str, origin: Origin) -> Self {
        let host = host.trim_start_matches('[').trim_end_matches(']');
        Self {
            host: Arc::from(host),
            origin,
        }
    }

    pub fn custom(host: &str) -> Self {
        Self::new(host, Origin::Custom)
    }

    pub fn system(host: &str) -> Self {
        Self::new(host, Origin::System)
    }

    /// Host as configured, without brackets.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    /// `host:port` string suitable for address resolution. IPv6 literals
    /// are wrapped in brackets.
    pub fn target(&self, port: u16) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, port)
        } else {
            format!("{}:{}", self.host, port)
        }
    }

    /// Socket address for an IP literal host, `None` for anything that
    /// needs name resolution.
    ///
    /// Link-local IPv6 servers from resolv.conf carry a zone
    /// (`fe80::1%en0`). Numeric zones are taken as the scope id, named
    /// ones are looked up as interfaces.
    pub fn socket_addr(&self, port: u16) -> Option<io::Result<SocketAddr>> {
        if let Ok(ip) = self.host.parse::<IpAddr>() {
            return Some(Ok(SocketAddr::new(ip, port)));
        }
        let (addr, zone) = self.host.split_once('%')?;
        let ip = addr.parse::<Ipv6Addr>().ok()?;
        let scope_id = match zone.parse::<u32>() {
            Ok(index) => index,
            Err(_) => match nix::net::if_::if_nametoindex(zone) {
                Ok(index) => index,
                Err(errno) => return Some(Err(io::Error::from(errno))),
            },
        };
        Some(Ok(SocketAddr::V6(SocketAddrV6::new(ip, port, 0, scope_id))))
    }
}

impl fmt::Display for UpstreamServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.host)
    }
}

/// A domain suffix routed to the custom servers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomDomain(String);

impl CustomDomain {
    pub fn new(domain: &str) -> Self {
        Self(domain.trim().trim_end_matches('.').to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Label-aware, case-insensitive suffix match. `name` may carry the
    /// trailing root label.
    pub fn matches(&self, name: &str) -> bool {
        let name = name.strip_suffix('.').unwrap_or(name);
        let suffix = self.0.as_str();
        if name.len() < suffix.len() {
            return false;
        }
        let split = name.len() - suffix.len();
        if !name.is_char_boundary(split) || !name[split..].eq_ignore_ascii_case(suffix) {
            return false;
        }
        split == 0 || name.as_bytes()[split - 1] == b'.'
    }
}

impl fmt::Display for CustomDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Holds both upstream sets and answers routing questions.
pub struct UpstreamRegistry {
    custom: Vec<UpstreamServer>,
    domains: Vec<CustomDomain>,
    system: ArcSwap<Vec<UpstreamServer>>,
}

impl UpstreamRegistry {
    pub fn new(domains: Vec<CustomDomain>) -> Self {
        Self {
            custom: Vec::new(),
            domains,
            system: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Register the operator-supplied servers. Duplicates are dropped,
    /// keeping the first occurrence.
    ///
    /// Takes `&mut self` so it can only happen before the registry is
    /// shared with request handlers.
    pub fn add_custom_servers<I, S>(&mut self, servers: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for host in servers {
            let server = UpstreamServer::custom(host.as_ref());
            if !self.custom.contains(&server) {
                self.custom.push(server);
            }
        }
    }

    /// Replace the system set with servers derived from the given
    /// nameserver addresses, in order.
    ///
    /// Loopback entries are dropped. When they were the only entries the
    /// set becomes [`FALLBACK_SERVER`] so the daemon never forwards to
    /// itself. Hosts already in the custom set are skipped.
    pub fn replace_system_servers<I, S>(&self, nameservers: I) -> Arc<Vec<UpstreamServer>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = FxHashSet::default();
        let mut saw_loopback = false;
        let mut hosts = Vec::new();

        for ns in nameservers {
            let host = UpstreamServer::system(ns.as_ref());
            if host.host() == LOOPBACK_RESOLVER {
                saw_loopback = true;
                continue;
            }
            if seen.insert(host.host.clone()) {
                hosts.push(host);
            }
        }

        if hosts.is_empty() && saw_loopback {
            info!(
                "using {} instead of system DNS {} to avoid loops",
                FALLBACK_SERVER,
                LOOPBACK_RESOLVER
            );
            hosts.push(UpstreamServer::system(FALLBACK_SERVER));
        }

        hosts.retain(|s| !self.is_custom_host(s.host()));

        let servers = Arc::new(hosts);
        self.system.store(servers.clone());
        servers
    }

    /// Ordered servers to try for `name`.
    ///
    /// Names under a custom domain get custom servers first, then system
    /// servers. Every other name only goes to system servers.
    pub fn candidates_for(&self, name: &str) -> Vec<UpstreamServer> {
        let system = self.system.load();
        if self.is_custom_name(name) {
            let mut out = Vec::with_capacity(self.custom.len() + system.len());
            out.extend(self.custom.iter().cloned());
            out.extend(system.iter().cloned());
            out
        } else {
            system.to_vec()
        }
    }

    pub fn is_custom_name(&self, name: &str) -> bool {
        self.domains.iter().any(|d| d.matches(name))
    }

    pub fn custom_servers(&self) -> &[UpstreamServer] {
        &self.custom
    }

    pub fn system_servers(&self) -> Arc<Vec<UpstreamServer>> {
        self.system.load_full()
    }

    pub fn domains(&self) -> &[CustomDomain] {
        &self.domains
    }

    fn is_custom_host(&self, host: &str) -> bool {
        self.custom.iter().any(|s| s.host() == host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(custom: &[&str], domains: &[&str]) -> UpstreamRegistry {
        let mut r = UpstreamRegistry::new(domains.iter().map(|d| CustomDomain::new(d)).collect());
        r.add_custom_servers(custom);
        r
    }

    fn hosts(servers: &[UpstreamServer]) -> Vec<&str> {
        servers.iter().map(|s| s.host()).collect()
    }

    #[test]
    fn custom_domain_gets_custom_then_system() {
        let r = registry(&["9.9.9.9"], &["example.com"]);
        r.replace_system_servers(["8.8.8.8"]);

        assert_eq!(
            hosts(&r.candidates_for("foo.example.com.")),
            ["9.9.9.9", "8.8.8.8"]
        );
        assert_eq!(hosts(&r.candidates_for("other.org.")), ["8.8.8.8"]);
    }

    #[test]
    fn custom_servers_keep_configured_order() {
        let r = registry(&["10.0.0.2", "10.0.0.1", "10.0.0.2"], &["corp"]);
        r.replace_system_servers(["8.8.8.8", "8.8.4.4"]);

        assert_eq!(
            hosts(&r.candidates_for("db.int.corp.")),
            ["10.0.0.2", "10.0.0.1", "8.8.8.8", "8.8.4.4"]
        );
    }

    #[test]
    fn suffix_match_respects_label_boundaries() {
        let d = CustomDomain::new("example.com");
        assert!(d.matches("example.com."));
        assert!(d.matches("a.b.EXAMPLE.com"));
        assert!(!d.matches("notexample.com."));
        assert!(!d.matches("com."));
    }

    #[test]
    fn trailing_dot_on_domain_is_ignored() {
        assert_eq!(CustomDomain::new("example.com.").as_str(), "example.com");
    }

    #[test]
    fn loopback_only_becomes_fallback() {
        let r = registry(&["9.9.9.9"], &["example.com"]);
        let system = r.replace_system_servers(["127.0.0.1"]);
        assert_eq!(hosts(&system), [FALLBACK_SERVER]);
    }

    #[test]
    fn loopback_dropped_when_other_servers_exist() {
        let r = registry(&["9.9.9.9"], &["example.com"]);
        let system = r.replace_system_servers(["127.0.0.1", "192.168.1.1"]);
        assert_eq!(hosts(&system), ["192.168.1.1"]);
    }

    #[test]
    fn system_set_excludes_custom_and_duplicates() {
        let r = registry(&["9.9.9.9"], &["example.com"]);
        let system = r.replace_system_servers(["9.9.9.9", "8.8.8.8", "8.8.8.8"]);
        assert_eq!(hosts(&system), ["8.8.8.8"]);
    }

    #[test]
    fn replace_discards_previous_set() {
        let r = registry(&["9.9.9.9"], &["example.com"]);
        r.replace_system_servers(["8.8.8.8"]);
        r.replace_system_servers(["1.0.0.1"]);
        assert_eq!(hosts(&r.system_servers()), ["1.0.0.1"]);
    }

    #[test]
    fn no_system_servers_means_no_candidates_for_general_names() {
        let r = registry(&["9.9.9.9"], &["example.com"]);
        assert!(r.candidates_for("other.org.").is_empty());
        assert_eq!(hosts(&r.candidates_for("x.example.com.")), ["9.9.9.9"]);
    }

    #[test]
    fn ipv6_targets_are_bracketed() {
        assert_eq!(UpstreamServer::system("fe80::1").target(53), "[fe80::1]:53");
        assert_eq!(UpstreamServer::system("[::1]").target(53), "[::1]:53");
        assert_eq!(UpstreamServer::custom("dns.corp").target(53), "dns.corp:53");
    }

    fn scope_of(host: &str) -> u32 {
        match UpstreamServer::system(host).socket_addr(53) {
            Some(Ok(SocketAddr::V6(addr))) => addr.scope_id(),
            other => panic!("unexpected address for {host}: {other:?}"),
        }
    }

    #[test]
    fn literal_hosts_skip_name_resolution() {
        let addr = UpstreamServer::system("192.168.1.1").socket_addr(53).unwrap().unwrap();
        assert_eq!(addr, "192.168.1.1:53".parse().unwrap());
        assert_eq!(scope_of("fe80::1"), 0);
        assert!(UpstreamServer::custom("dns.corp").socket_addr(53).is_none());
    }

    #[test]
    fn numeric_zone_is_scope_id() {
        assert_eq!(scope_of("fe80::1%3"), 3);
    }

    #[test]
    fn interface_zone_resolves_to_its_index() {
        let iface = if cfg!(target_os = "macos") { "lo0" } else { "lo" };
        let index = nix::net::if_::if_nametoindex(iface).unwrap();
        assert_ne!(index, 0);
        assert_eq!(scope_of(&format!("fe80::1%{iface}")), index);
    }

    #[test]
    fn unknown_interface_zone_is_an_error() {
        let res = UpstreamServer::system("fe80::1%nosuchif0").socket_addr(53);
        assert!(matches!(res, Some(Err(_))));
    }
}
