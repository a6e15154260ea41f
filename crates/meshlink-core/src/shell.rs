//! Embedded remote-shell server interface
//!
//! The server itself is an external collaborator. The engine starts and
//! stops it on coordinator request and keeps its authorized-key set in sync
//! with the network map.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::CoreResult;

/// Port the embedded shell server listens on
pub const DEFAULT_SHELL_PORT: u16 = 44338;

/// Embedded remote-shell server, reachable only over the tunnel address
#[async_trait]
pub trait ShellServer: Send + Sync {
    /// Bring the listener up
    async fn start(&self) -> CoreResult<()>;

    /// Shut the listener down
    async fn stop(&self) -> CoreResult<()>;

    /// Authorize `pub_key` for sessions initiated by `peer_key`
    async fn add_authorized_key(&self, peer_key: &str, pub_key: &str) -> CoreResult<()>;

    /// Drop a peer's authorization
    async fn remove_authorized_key(&self, peer_key: &str);
}

/// Constructs a shell server from the host key (PEM) and a listen address
pub type ShellServerFactory =
    Arc<dyn Fn(Option<String>, String) -> CoreResult<Arc<dyn ShellServer>> + Send + Sync>;
