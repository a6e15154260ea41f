//! Connection status recorder
//!
//! Shared snapshot of the engine's view of the world for the UI and admin
//! surfaces. Updated from the reconciliation path and from every peer
//! connection, so all access serializes on an internal lock.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Connection status of a peer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// Observed state of one remote peer
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PeerState {
    pub pub_key: String,
    /// Allowed IPs, comma-joined
    pub ip: String,
    pub fqdn: String,
    pub conn_status: ConnStatus,
    pub conn_status_update: DateTime<Utc>,
}

/// Observed state of the local peer
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LocalPeerState {
    pub ip: String,
    pub pub_key: String,
    pub fqdn: String,
}

#[derive(Default)]
struct StatusInner {
    peers: HashMap<String, PeerState>,
    offline_peers: Vec<PeerState>,
    local: LocalPeerState,
}

/// The status recorder
#[derive(Default)]
pub struct Status {
    inner: Mutex<StatusInner>,
}

impl Status {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new peer, initially disconnected
    pub fn add_peer(&self, pub_key: &str) -> CoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.peers.contains_key(pub_key) {
            return Err(CoreError::PeerExists(pub_key.to_string()));
        }
        inner.peers.insert(
            pub_key.to_string(),
            PeerState {
                pub_key: pub_key.to_string(),
                ip: String::new(),
                fqdn: String::new(),
                conn_status: ConnStatus::Disconnected,
                conn_status_update: Utc::now(),
            },
        );
        Ok(())
    }

    /// Stop tracking a peer
    pub fn remove_peer(&self, pub_key: &str) -> CoreResult<()> {
        self.inner
            .lock()
            .unwrap()
            .peers
            .remove(pub_key)
            .map(|_| ())
            .ok_or_else(|| CoreError::UnknownPeer(pub_key.to_string()))
    }

    pub fn update_peer_fqdn(&self, pub_key: &str, fqdn: &str) -> CoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let peer = inner
            .peers
            .get_mut(pub_key)
            .ok_or_else(|| CoreError::UnknownPeer(pub_key.to_string()))?;
        peer.fqdn = fqdn.to_string();
        Ok(())
    }

    pub fn update_conn_status(&self, pub_key: &str, status: ConnStatus) -> CoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let peer = inner
            .peers
            .get_mut(pub_key)
            .ok_or_else(|| CoreError::UnknownPeer(pub_key.to_string()))?;
        peer.conn_status = status;
        peer.conn_status_update = Utc::now();
        Ok(())
    }

    pub fn update_peer_ip(&self, pub_key: &str, ip: &str) -> CoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let peer = inner
            .peers
            .get_mut(pub_key)
            .ok_or_else(|| CoreError::UnknownPeer(pub_key.to_string()))?;
        peer.ip = ip.to_string();
        Ok(())
    }

    pub fn update_local_peer_state(&self, local: LocalPeerState) {
        self.inner.lock().unwrap().local = local;
    }

    /// Replace the offline peer list wholesale
    pub fn replace_offline_peers(&self, peers: Vec<PeerState>) {
        self.inner.lock().unwrap().offline_peers = peers;
    }

    pub fn peer(&self, pub_key: &str) -> Option<PeerState> {
        self.inner.lock().unwrap().peers.get(pub_key).cloned()
    }

    pub fn peers(&self) -> Vec<PeerState> {
        self.inner.lock().unwrap().peers.values().cloned().collect()
    }

    pub fn offline_peers(&self) -> Vec<PeerState> {
        self.inner.lock().unwrap().offline_peers.clone()
    }

    pub fn local_peer_state(&self) -> LocalPeerState {
        self.inner.lock().unwrap().local.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_lifecycle() {
        let status = Status::new();

        status.add_peer("peer1").unwrap();
        assert!(matches!(
            status.add_peer("peer1"),
            Err(CoreError::PeerExists(_))
        ));

        status.update_peer_fqdn("peer1", "peer1.mesh.local").unwrap();
        status
            .update_conn_status("peer1", ConnStatus::Connected)
            .unwrap();

        let state = status.peer("peer1").unwrap();
        assert_eq!(state.fqdn, "peer1.mesh.local");
        assert_eq!(state.conn_status, ConnStatus::Connected);

        status.remove_peer("peer1").unwrap();
        assert!(matches!(
            status.remove_peer("peer1"),
            Err(CoreError::UnknownPeer(_))
        ));
        assert!(status.peer("peer1").is_none());
    }

    #[test]
    fn test_offline_peers_replaced_wholesale() {
        let status = Status::new();
        status.replace_offline_peers(vec![PeerState {
            pub_key: "a".into(),
            ip: "10.0.0.2/32".into(),
            fqdn: "a.mesh.local".into(),
            conn_status: ConnStatus::Disconnected,
            conn_status_update: Utc::now(),
        }]);
        assert_eq!(status.offline_peers().len(), 1);

        status.replace_offline_peers(Vec::new());
        assert!(status.offline_peers().is_empty());
    }
}
