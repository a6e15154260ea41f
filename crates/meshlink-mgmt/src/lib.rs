//! MeshLink management plane
//!
//! Data model shared with the coordinator:
//! - Wire types delivered over the coordinator sync stream
//! - Mesh network model and peer IP allocation

pub mod error;
pub mod network;
pub mod proto;

pub use error::{MgmtError, MgmtResult};
pub use network::{allocate_peer_ip, Network};
pub use proto::{
    DnsConfig, HostConfig, NetworkMap, PeerConfig, PeeringConfig, ProtectedHostConfig,
    RemotePeerConfig, Route, ShellConfig, ShellPeerConfig, SyncResponse,
};

/// Aggregate network all meshes are carved out of, `100.64.0.0/10`
pub const MESH_NET: &str = "100.64.0.0/10";

/// Prefix length of a single mesh subnet
pub const MESH_SUBNET_PREFIX: u8 = 16;
