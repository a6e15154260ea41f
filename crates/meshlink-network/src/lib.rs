//! MeshLink network layer
//!
//! Shared plumbing below the peer connection engine:
//! - Two long-lived UDP sockets demultiplexed across all ICE sessions
//! - STUN binding codec for server-reflexive candidate discovery
//! - ICE URL parsing and candidate gathering
//! - NAT external-IP mapping parser
//! - Tunnel driver interface

pub mod error;
pub mod ice;
pub mod mux;
pub mod nat;
pub mod stun;
pub mod tunnel;

pub use error::{NetworkError, NetworkResult};
pub use ice::{gather_candidates, GatherParams, IceUrl, IceScheme};
pub use mux::{Datagram, MuxSocket, UdpMux};
pub use nat::{parse_nat_external_mappings, NatMapping};
pub use tunnel::TunnelDevice;
