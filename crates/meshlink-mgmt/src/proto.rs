//! Wire types delivered over the coordinator sync stream
//!
//! These mirror the messages the coordinator pushes to every client. The
//! engine consumes them verbatim; routes and DNS config are forwarded to the
//! route manager and DNS server keyed by the network serial.

use serde::{Deserialize, Serialize};

/// One message of the coordinator sync stream
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SyncResponse {
    /// STUN/TURN server update, `None` when unchanged
    pub peering_config: Option<PeeringConfig>,
    /// Network map snapshot, `None` when unchanged
    pub network_map: Option<NetworkMap>,
}

/// ICE server configuration pushed by the coordinator
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PeeringConfig {
    pub stuns: Vec<HostConfig>,
    pub turns: Vec<ProtectedHostConfig>,
}

/// A plain ICE server entry
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HostConfig {
    /// Full ICE URL, e.g. `stun:stun.example.com:3478`
    pub uri: String,
}

/// An ICE server entry with credentials (TURN)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProtectedHostConfig {
    pub host: HostConfig,
    pub user: String,
    pub password: String,
}

/// Authoritative snapshot of peers, routes and DNS for one client
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NetworkMap {
    /// Monotonic state counter; stale snapshots are dropped
    pub serial: u64,

    /// Local peer update. Applied even when the serial is stale because the
    /// coordinator may change the address without bumping the serial.
    pub peer_config: Option<PeerConfig>,

    /// Remote peers this client is allowed to connect to
    pub remote_peers: Vec<RemotePeerConfig>,

    /// Distinguishes "no peers now" from "no peer update in this message"
    pub remote_peers_is_empty: bool,

    /// Peers that exist in the account but are currently offline
    pub offline_peers: Vec<RemotePeerConfig>,

    /// Full replacement route table
    pub routes: Vec<Route>,

    /// Full replacement DNS configuration
    pub dns_config: Option<DnsConfig>,
}

/// Local peer settings assigned by the coordinator
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PeerConfig {
    /// Tunnel address in CIDR notation, e.g. `100.77.30.1/16`
    pub address: String,
    pub fqdn: String,
    pub shell_config: Option<ShellConfig>,
}

/// Remote-shell settings of the local peer
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ShellConfig {
    pub enabled: bool,
}

/// One remote peer in the network map
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RemotePeerConfig {
    /// Tunnel public key, unique per peer
    pub pub_key: String,
    /// CIDRs routed into the tunnel towards this peer
    pub allowed_ips: Vec<String>,
    pub fqdn: String,
    pub shell_config: Option<ShellPeerConfig>,
}

impl RemotePeerConfig {
    /// Allowed IPs in the canonical comma-joined form used for change
    /// detection and tunnel configuration.
    pub fn allowed_ips_string(&self) -> String {
        self.allowed_ips.join(",")
    }
}

/// Remote-shell settings advertised by a remote peer
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ShellPeerConfig {
    /// Public key authorized to open a shell on this client
    pub pub_key: Option<String>,
}

/// A network route distributed by the coordinator
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Route {
    pub id: String,
    pub net_id: String,
    /// Destination network in CIDR notation
    pub network: String,
    pub network_type: u8,
    /// Public key of the routing peer
    pub peer: String,
    pub metric: i32,
    pub masquerade: bool,
}

/// DNS configuration distributed by the coordinator
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DnsConfig {
    pub service_enable: bool,
    pub custom_zones: Vec<CustomZone>,
    pub name_server_groups: Vec<NameServerGroup>,
}

/// A DNS zone resolved locally
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CustomZone {
    pub domain: String,
    pub records: Vec<SimpleRecord>,
}

/// A single DNS record of a custom zone
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SimpleRecord {
    pub name: String,
    pub record_type: u16,
    pub class: String,
    pub ttl: u32,
    pub rdata: String,
}

/// Upstream name servers for a set of domains
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NameServerGroup {
    /// Resolves everything when set, `domains` otherwise
    pub primary: bool,
    pub domains: Vec<String>,
    pub name_servers: Vec<NameServer>,
}

/// A single upstream name server
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NameServer {
    pub ip: std::net::IpAddr,
    pub ns_type: u8,
    pub port: u16,
}
