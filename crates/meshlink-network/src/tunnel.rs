//! Tunnel driver interface
//!
//! The kernel (or userspace) tunnel interface is an external collaborator;
//! the engine drives it exclusively through this trait. The driver owns key
//! exchange and the data plane.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::NetworkResult;

/// Driver of the local tunnel interface.
///
/// The engine is the single writer: it creates and configures the interface
/// at start, reconfigures the address on coordinator updates and installs or
/// removes one tunnel peer per negotiated connection.
#[async_trait]
pub trait TunnelDevice: Send + Sync {
    /// Create the virtual interface
    async fn create(&self) -> NetworkResult<()>;

    /// Apply the local private key and listen port
    async fn configure(&self, private_key: &str, port: u16) -> NetworkResult<()>;

    /// Replace the interface address, CIDR notation
    async fn update_addr(&self, cidr: &str) -> NetworkResult<()>;

    /// Install or update a remote peer
    async fn update_peer(
        &self,
        pub_key: &str,
        allowed_ips: &str,
        keepalive: Duration,
        endpoint: Option<SocketAddr>,
        pre_shared_key: Option<&str>,
    ) -> NetworkResult<()>;

    /// Remove a remote peer
    async fn remove_peer(&self, pub_key: &str) -> NetworkResult<()>;

    /// Tear the interface down
    async fn close(&self) -> NetworkResult<()>;

    /// Interface name
    fn name(&self) -> &str;
}
