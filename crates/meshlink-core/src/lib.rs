//! MeshLink peer connection engine
//!
//! Maintains the live set of encrypted tunnel connections of one mesh
//! client:
//! - Reconciles declarative network maps from the coordinator against the
//!   running peer set
//! - Negotiates per-peer connections over ICE through two shared UDP sockets
//! - Retries failed peers with jittered reconnect workers
//! - Dispatches inbound signaling to the per-peer state machines

pub mod config;
pub mod engine;
pub mod error;
pub mod peer;
pub mod shell;
pub mod signal;
pub mod status;

pub use config::EngineConfig;
pub use engine::{Cancellation, DnsServer, Engine, ManagementClient, RouteManager};
pub use error::{CoreError, CoreResult};
pub use peer::{ConnConfig, ModeMessage, OfferAnswer, PeerConn, PeerConnState, ProxyConfig};
pub use shell::{ShellServer, ShellServerFactory};
pub use signal::{Body, MessageType, Mode, SignalClient, SignalMessage};
pub use status::{ConnStatus, LocalPeerState, PeerState, Status};
