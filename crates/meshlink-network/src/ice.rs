//! ICE URL parsing and candidate gathering
//!
//! Candidates are gathered through the shared mux sockets: host candidates
//! on the host socket's port, server-reflexive candidates by querying each
//! STUN/TURN server through the srflx socket. Static NAT mappings contribute
//! additional server-reflexive candidates without any query.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use str0m::Candidate;
use tokio::net::lookup_host;
use tracing::{debug, warn};

use crate::error::{NetworkError, NetworkResult};
use crate::mux::UdpMux;
use crate::nat::NatMapping;

/// How long a single server-reflexive binding query may take
const STUN_QUERY_TIMEOUT: Duration = Duration::from_secs(3);

/// Scheme of an ICE server URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceScheme {
    Stun,
    Stuns,
    Turn,
    Turns,
}

impl IceScheme {
    fn as_str(&self) -> &'static str {
        match self {
            IceScheme::Stun => "stun",
            IceScheme::Stuns => "stuns",
            IceScheme::Turn => "turn",
            IceScheme::Turns => "turns",
        }
    }

    fn default_port(&self) -> u16 {
        match self {
            IceScheme::Stun | IceScheme::Turn => 3478,
            IceScheme::Stuns | IceScheme::Turns => 5349,
        }
    }
}

/// A parsed STUN/TURN server URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceUrl {
    pub scheme: IceScheme,
    pub host: String,
    pub port: u16,
    /// TURN credentials, `None` for STUN
    pub username: Option<String>,
    pub password: Option<String>,
}

impl IceUrl {
    /// Parse `stun:host[:port]` / `turn:host[:port][?transport=udp]`
    pub fn parse(uri: &str) -> NetworkResult<Self> {
        let (scheme, rest) = uri
            .split_once(':')
            .ok_or_else(|| NetworkError::InvalidUrl(uri.to_string()))?;

        let scheme = match scheme {
            "stun" => IceScheme::Stun,
            "stuns" => IceScheme::Stuns,
            "turn" => IceScheme::Turn,
            "turns" => IceScheme::Turns,
            _ => return Err(NetworkError::InvalidUrl(uri.to_string())),
        };

        // tolerate a ?transport= suffix
        let rest = rest.split('?').next().unwrap_or(rest);

        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| NetworkError::InvalidUrl(uri.to_string()))?;
                (host, port)
            }
            None => (rest, scheme.default_port()),
        };

        if host.is_empty() {
            return Err(NetworkError::InvalidUrl(uri.to_string()));
        }

        Ok(Self {
            scheme,
            host: host.to_string(),
            port,
            username: None,
            password: None,
        })
    }

    /// Attach TURN credentials
    pub fn with_credentials(mut self, username: String, password: String) -> Self {
        self.username = Some(username);
        self.password = Some(password);
        self
    }

    /// Resolve the server address, preferring IPv4
    pub async fn resolve(&self) -> NetworkResult<SocketAddr> {
        let mut addrs: Vec<SocketAddr> = lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(|e| {
                NetworkError::ConfigError(format!("failed to resolve ICE server '{self}': {e}"))
            })?
            .collect();

        addrs.sort_by_key(|addr| !addr.is_ipv4());
        addrs.into_iter().next().ok_or_else(|| {
            NetworkError::ConfigError(format!("no addresses found for ICE server: {self}"))
        })
    }
}

impl fmt::Display for IceUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.scheme.as_str(), self.host, self.port)
    }
}

/// Inputs of one gathering pass
pub struct GatherParams<'a> {
    /// STUN/TURN servers, snapshot taken at attempt start
    pub stun_turn: &'a [IceUrl],
    /// Parsed static NAT mappings
    pub nat_mappings: &'a [NatMapping],
    /// Interfaces to skip, substring match
    pub iface_blacklist: &'a [String],
    pub disable_ipv6: bool,
}

/// Gather local candidates for one connection attempt.
///
/// Fails only when nothing at all could be gathered; individual interface or
/// server failures are logged and skipped.
pub async fn gather_candidates(
    mux: &UdpMux,
    params: &GatherParams<'_>,
) -> NetworkResult<Vec<Candidate>> {
    let mut candidates = Vec::new();
    let host_port = mux.host().port();
    let mut host_addrs: Vec<SocketAddr> = Vec::new();

    match get_if_addrs::get_if_addrs() {
        Ok(interfaces) => {
            for iface in interfaces {
                if iface.is_loopback() {
                    continue;
                }
                if params
                    .iface_blacklist
                    .iter()
                    .any(|b| iface.name.contains(b.as_str()))
                {
                    debug!("skipping blacklisted interface {}", iface.name);
                    continue;
                }
                let ip = iface.ip();
                if params.disable_ipv6 && ip.is_ipv6() {
                    continue;
                }
                host_addrs.push(SocketAddr::new(ip, host_port));
            }
        }
        Err(e) => warn!("interface discovery failed: {}", e),
    }

    for addr in &host_addrs {
        if let Ok(candidate) = Candidate::host(*addr, "udp") {
            candidates.push(candidate);
        }
    }

    // static NAT mappings: external address reachable at the matching host
    // candidate's port
    for mapping in params.nat_mappings {
        for base in &host_addrs {
            let applies = match mapping.internal {
                Some(internal) => base.ip() == internal,
                None => base.ip().is_ipv4(),
            };
            if !applies {
                continue;
            }
            let external = SocketAddr::new(mapping.external, base.port());
            if let Ok(candidate) = Candidate::server_reflexive(external, *base, "udp") {
                debug!("mapped candidate {} for base {}", external, base);
                candidates.push(candidate);
            }
        }
    }

    // server-reflexive discovery through the shared srflx socket
    let srflx_base = mux.srflx().local_addr();
    for url in params.stun_turn {
        let server = match url.resolve().await {
            Ok(server) => server,
            Err(e) => {
                warn!("skipping ICE server {}: {}", url, e);
                continue;
            }
        };
        match mux
            .srflx()
            .query_mapped_address(server, STUN_QUERY_TIMEOUT)
            .await
        {
            Ok(mapped) => {
                if let Ok(candidate) = Candidate::server_reflexive(mapped, srflx_base, "udp") {
                    candidates.push(candidate);
                }
            }
            Err(e) => {
                warn!("STUN query failed for {}: {}", url, e);
            }
        }
    }

    if candidates.is_empty() {
        return Err(NetworkError::GatherFailed(
            "no ICE candidates gathered".into(),
        ));
    }
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stun_url() {
        let url = IceUrl::parse("stun:stun.example.com:3478").unwrap();
        assert_eq!(url.scheme, IceScheme::Stun);
        assert_eq!(url.host, "stun.example.com");
        assert_eq!(url.port, 3478);
        assert!(url.username.is_none());
        assert_eq!(url.to_string(), "stun:stun.example.com:3478");
    }

    #[test]
    fn test_parse_default_port_and_transport_suffix() {
        let url = IceUrl::parse("turn:turn.example.com?transport=udp").unwrap();
        assert_eq!(url.scheme, IceScheme::Turn);
        assert_eq!(url.port, 3478);

        let url = IceUrl::parse("turns:turn.example.com").unwrap();
        assert_eq!(url.port, 5349);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(IceUrl::parse("http://example.com").is_err());
        assert!(IceUrl::parse("stun:").is_err());
        assert!(IceUrl::parse("stun:host:notaport").is_err());
        assert!(IceUrl::parse("nocolonatall").is_err());
    }

    #[test]
    fn test_turn_credentials() {
        let url = IceUrl::parse("turn:turn.example.com:3478")
            .unwrap()
            .with_credentials("user".into(), "secret".into());
        assert_eq!(url.username.as_deref(), Some("user"));
        assert_eq!(url.password.as_deref(), Some("secret"));
    }

    #[tokio::test]
    #[ignore] // requires network interfaces
    async fn test_gather_host_candidates() {
        let mux = UdpMux::bind(0, 0, true).await.unwrap();
        let params = GatherParams {
            stun_turn: &[],
            nat_mappings: &[],
            iface_blacklist: &[],
            disable_ipv6: true,
        };

        let candidates = gather_candidates(&mux, &params).await.unwrap();
        assert!(!candidates.is_empty());
        mux.close();
    }
}
