use crate::bootstrap::error::{BootstrapError, BootstrapResult};
use dashmap::DashSet;
use std::net::{IpAddr, ToSocketAddrs};

/// Process-wide table of host ports claimed either by the daemon's own
/// listeners or by container port mappings. Passed explicitly to the
/// components that need it; reservations live until process exit.
#[derive(Debug, Default)]
pub struct PortRegistry {
    claims: DashSet<(IpAddr, String, u16)>,
}

impl PortRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `port` on `ip` for `proto`. Rejects a port already held for the
    /// same (ip, proto) pair.
    pub fn request(&self, ip: IpAddr, proto: &str, port: u16) -> Result<(), PortRequestError> {
        let inserted = self.claims.insert((ip, proto.to_string(), port));
        if !inserted {
            return Err(PortRequestError::AlreadyAllocated { ip, port });
        }
        tracing::debug!("reserved {}/{} on {}", port, proto, ip);
        Ok(())
    }

    pub fn is_reserved(&self, ip: IpAddr, proto: &str, port: u16) -> bool {
        self.claims.contains(&(ip, proto.to_string(), port))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PortRequestError {
    #[error("port {port} already allocated on {ip}")]
    AlreadyAllocated { ip: IpAddr, port: u16 },
}

/// Reserves the daemon's own listening port so no container can later be
/// assigned the same host port.
///
/// The address is `host:port`; a hostname is resolved and the port claimed on
/// every resolved IP. Reservations made before a conflict is hit are kept:
/// they are harmless process-lifetime holds.
pub fn allocate_daemon_port(addr: &str, registry: &PortRegistry) -> BootstrapResult<()> {
    let (host, port_str) = split_host_port(addr).ok_or_else(|| BootstrapError::MalformedAddress {
        addr: addr.to_string(),
    })?;
    let port: u16 = port_str
        .parse()
        .map_err(|_| BootstrapError::MalformedAddress {
            addr: addr.to_string(),
        })?;

    let host_ips: Vec<IpAddr> = if let Ok(ip) = host.parse::<IpAddr>() {
        vec![ip]
    } else {
        let resolved = (host, port)
            .to_socket_addrs()
            .map_err(|_| BootstrapError::HostResolutionFailure {
                host: host.to_string(),
            })?
            .map(|sock| sock.ip())
            .collect::<Vec<_>>();
        if resolved.is_empty() {
            return Err(BootstrapError::HostResolutionFailure {
                host: host.to_string(),
            });
        }
        resolved
    };

    for ip in host_ips {
        registry
            .request(ip, "tcp", port)
            .map_err(|e| BootstrapError::PortConflict {
                port,
                ip,
                reason: e.to_string(),
            })?;
    }
    Ok(())
}

/// Splits `host:port`, accepting bracketed IPv6 literals like `[::1]:2375`.
fn split_host_port(addr: &str) -> Option<(&str, &str)> {
    let (host, port) = addr.rsplit_once(':')?;
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    if host.is_empty() || port.is_empty() {
        return None;
    }
    Some((host, port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_allocate_daemon_port() {
        let registry = PortRegistry::new();
        allocate_daemon_port("127.0.0.1:2375", &registry).unwrap();
        assert!(registry.is_reserved(IpAddr::V4(Ipv4Addr::LOCALHOST), "tcp", 2375));
    }

    #[test]
    fn test_conflict_when_port_already_claimed() {
        let registry = PortRegistry::new();
        registry
            .request(IpAddr::V4(Ipv4Addr::LOCALHOST), "tcp", 2375)
            .unwrap();

        let err = allocate_daemon_port("127.0.0.1:2375", &registry).unwrap_err();
        match err {
            BootstrapError::PortConflict { port, ip, .. } => {
                assert_eq!(port, 2375);
                assert_eq!(ip, IpAddr::V4(Ipv4Addr::LOCALHOST));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_malformed_address() {
        let registry = PortRegistry::new();
        assert!(matches!(
            allocate_daemon_port("not-an-address", &registry),
            Err(BootstrapError::MalformedAddress { .. })
        ));
        assert!(matches!(
            allocate_daemon_port("127.0.0.1:http", &registry),
            Err(BootstrapError::MalformedAddress { .. })
        ));
    }

    #[test]
    fn test_unresolvable_host() {
        let registry = PortRegistry::new();
        // .invalid is reserved and never resolves
        assert!(matches!(
            allocate_daemon_port("nonexistent.invalid:80", &registry),
            Err(BootstrapError::HostResolutionFailure { .. })
        ));
    }

    #[test]
    fn test_ipv6_literal() {
        let registry = PortRegistry::new();
        allocate_daemon_port("[::1]:2376", &registry).unwrap();
        assert!(registry.is_reserved("::1".parse().unwrap(), "tcp", 2376));
    }

    #[test]
    fn test_different_ips_do_not_conflict() {
        let registry = PortRegistry::new();
        allocate_daemon_port("127.0.0.1:2375", &registry).unwrap();
        allocate_daemon_port("[::1]:2375", &registry).unwrap();
    }
}
