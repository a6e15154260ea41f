//! Static NAT external-IP mappings
//!
//! Deployments behind 1:1 NAT can announce their external address directly
//! instead of relying on STUN. A mapping is `EXTERNAL` or
//! `EXTERNAL/INTERNAL` where `INTERNAL` is an IP or a local interface name.
//! The list parses fail-closed: one bad entry discards all of them.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

use tracing::{info, warn};

use crate::error::{NetworkError, NetworkResult};

/// One parsed external-IP mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NatMapping {
    /// Address peers can reach us on
    pub external: IpAddr,
    /// Local address the mapping applies to, all host addresses when `None`
    pub internal: Option<IpAddr>,
}

impl fmt::Display for NatMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.internal {
            Some(internal) => write!(f, "{}/{}", self.external, internal),
            None => write!(f, "{}", self.external),
        }
    }
}

/// Parse the configured mapping list.
///
/// Any unparseable entry discards the whole list so a typo cannot silently
/// narrow connectivity to a subset of the configured mappings.
pub fn parse_nat_external_mappings(raw: &[String], iface_blacklist: &[String]) -> Vec<NatMapping> {
    let mut mapped = Vec::new();

    for mapping in raw {
        let split: Vec<&str> = mapping.split('/').collect();
        if split.len() > 2 {
            warn!(
                "ignoring invalid external mapping '{}', too many delimiters",
                mapping
            );
            break;
        }

        let mut internal = None;
        if split.len() > 1 {
            let raw_internal = split[1];
            match raw_internal.parse::<IpAddr>() {
                Ok(ip) => internal = Some(ip),
                Err(_) => {
                    // not an address, maybe an interface name
                    if iface_blacklist.iter().any(|b| raw_internal.contains(b.as_str())) {
                        warn!(
                            "internal interface '{}' in blacklist, ignoring external mapping '{}'",
                            raw_internal, mapping
                        );
                        break;
                    }
                    match find_ipv4_from_interface_name(raw_internal) {
                        Ok(ip) => internal = Some(IpAddr::V4(ip)),
                        Err(e) => {
                            warn!(
                                "error finding interface IP for interface '{}', ignoring external mapping '{}': {}",
                                raw_internal, mapping, e
                            );
                            break;
                        }
                    }
                }
            }
        }

        match split[0].parse::<IpAddr>() {
            Ok(external) => {
                let parsed = NatMapping { external, internal };
                info!("parsed external IP mapping of '{}' as '{}'", mapping, parsed);
                mapped.push(parsed);
            }
            Err(_) => {
                warn!(
                    "invalid external IP, {}, ignoring external IP mapping '{}'",
                    split[0], mapping
                );
                break;
            }
        }
    }

    if mapped.len() != raw.len() {
        warn!("one or more external IP mappings failed to parse, ignoring all mappings");
        return Vec::new();
    }
    mapped
}

/// First IPv4 address of the named local interface
pub fn find_ipv4_from_interface_name(name: &str) -> NetworkResult<Ipv4Addr> {
    let interfaces = get_if_addrs::get_if_addrs()
        .map_err(|e| NetworkError::ConfigError(format!("interface discovery failed: {e}")))?;

    interfaces
        .iter()
        .filter(|iface| iface.name == name)
        .find_map(|iface| match iface.ip() {
            IpAddr::V4(ip) => Some(ip),
            IpAddr::V6(_) => None,
        })
        .ok_or_else(|| {
            NetworkError::ConfigError(format!("interface {name} has no IPv4 address"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(entries: &[&str]) -> Vec<String> {
        entries.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_plain_external() {
        let parsed = parse_nat_external_mappings(&strings(&["203.0.113.1"]), &[]);
        assert_eq!(
            parsed,
            vec![NatMapping {
                external: "203.0.113.1".parse().unwrap(),
                internal: None,
            }]
        );
        assert_eq!(parsed[0].to_string(), "203.0.113.1");
    }

    #[test]
    fn test_parse_external_with_internal_ip() {
        let parsed = parse_nat_external_mappings(&strings(&["203.0.113.1/10.0.0.4"]), &[]);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].internal, Some("10.0.0.4".parse().unwrap()));
        assert_eq!(parsed[0].to_string(), "203.0.113.1/10.0.0.4");
    }

    #[test]
    fn test_one_bad_entry_discards_all() {
        let parsed = parse_nat_external_mappings(
            &strings(&["203.0.113.1", "not-an-ip/eth0"]),
            &[],
        );
        assert!(parsed.is_empty());
    }

    #[test]
    fn test_too_many_delimiters_discards_all() {
        let parsed =
            parse_nat_external_mappings(&strings(&["203.0.113.1/10.0.0.4/extra"]), &[]);
        assert!(parsed.is_empty());
    }

    #[test]
    fn test_blacklisted_internal_interface_discards_all() {
        let parsed = parse_nat_external_mappings(
            &strings(&["203.0.113.1/utun0"]),
            &strings(&["utun"]),
        );
        assert!(parsed.is_empty());
    }

    #[test]
    fn test_empty_input() {
        assert!(parse_nat_external_mappings(&[], &[]).is_empty());
    }
}
