//! Shared UDP sockets for ICE
//!
//! The engine opens exactly two UDP sockets at start: one backing host
//! candidates, one backing server-reflexive discovery. Every peer's ICE
//! session shares them instead of binding its own ephemeral port, so high
//! peer counts do not exhaust the port range. The sockets outlive individual
//! peer connections and are closed last during shutdown.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::error::{NetworkError, NetworkResult};
use crate::stun;

/// A raw datagram handed to a subscribed ICE session
#[derive(Debug, Clone)]
pub struct Datagram {
    pub from: SocketAddr,
    pub data: Bytes,
}

type Subscribers = Arc<RwLock<HashMap<String, mpsc::UnboundedSender<Datagram>>>>;
type PendingQueries =
    Arc<Mutex<HashMap<[u8; stun::TRANSACTION_ID_LEN], oneshot::Sender<NetworkResult<SocketAddr>>>>>;

/// One shared UDP socket with a demultiplexing receive loop.
///
/// Inbound datagrams are either answers to an in-flight STUN binding query
/// (matched by transaction ID, used during candidate gathering) or traffic
/// for the subscribed ICE sessions, which each receive a copy.
pub struct MuxSocket {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    subscribers: Subscribers,
    pending: PendingQueries,
    recv_task: JoinHandle<()>,
}

impl MuxSocket {
    /// Bind on `port` (0 lets the OS pick) and start the receive loop.
    pub async fn bind(port: u16, disable_ipv6: bool) -> NetworkResult<Self> {
        let bind_addr = if disable_ipv6 {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port)
        } else {
            SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), port)
        };

        let socket = Arc::new(UdpSocket::bind(bind_addr).await?);
        let local_addr = socket.local_addr()?;
        debug!("mux socket bound on {}", local_addr);

        let subscribers: Subscribers = Arc::new(RwLock::new(HashMap::new()));
        let pending: PendingQueries = Arc::new(Mutex::new(HashMap::new()));

        let recv_task = Self::spawn_recv_loop(socket.clone(), subscribers.clone(), pending.clone());

        Ok(Self {
            socket,
            local_addr,
            subscribers,
            pending,
            recv_task,
        })
    }

    /// Local address the socket is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Local port the socket is bound to
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Subscribe an ICE session by peer key. The session receives a copy of
    /// every datagram that is not an answer to a pending binding query.
    pub async fn subscribe(&self, peer_key: &str) -> mpsc::UnboundedReceiver<Datagram> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .write()
            .await
            .insert(peer_key.to_string(), tx);
        rx
    }

    /// Drop a peer's subscription
    pub async fn unsubscribe(&self, peer_key: &str) {
        self.subscribers.write().await.remove(peer_key);
    }

    /// Send a datagram out of the shared socket
    pub async fn send_to(&self, data: &[u8], dest: SocketAddr) -> NetworkResult<()> {
        self.socket.send_to(data, dest).await?;
        Ok(())
    }

    /// Run one STUN binding query against `server` through this socket and
    /// return the mapped (server-reflexive) address.
    pub async fn query_mapped_address(
        &self,
        server: SocketAddr,
        wait: Duration,
    ) -> NetworkResult<SocketAddr> {
        let txn_id = stun::new_transaction_id()?;
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(txn_id, tx);

        let request = stun::build_binding_request(&txn_id);
        if let Err(e) = self.socket.send_to(&request, server).await {
            self.pending.lock().await.remove(&txn_id);
            return Err(e.into());
        }

        trace!("sent STUN binding request to {}", server);

        match timeout(wait, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => {
                self.pending.lock().await.remove(&txn_id);
                Err(NetworkError::Protocol("binding query dropped".into()))
            }
            Err(_) => {
                self.pending.lock().await.remove(&txn_id);
                Err(NetworkError::Timeout)
            }
        }
    }

    /// Stop the receive loop. Queued datagrams already handed to subscribers
    /// stay readable until their receivers are dropped.
    pub fn close(&self) {
        self.recv_task.abort();
        debug!("mux socket {} closed", self.local_addr);
    }

    fn spawn_recv_loop(
        socket: Arc<UdpSocket>,
        subscribers: Subscribers,
        pending: PendingQueries,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut buf = vec![0u8; 2000];

            loop {
                let (len, from) = match socket.recv_from(&mut buf).await {
                    Ok(r) => r,
                    Err(e) => {
                        warn!("mux receive error: {}", e);
                        continue;
                    }
                };
                let data = &buf[..len];

                // answers to in-flight binding queries never reach the
                // ICE sessions
                if let Some(txn_id) = stun::response_transaction_id(data) {
                    if let Some(tx) = pending.lock().await.remove(&txn_id) {
                        let _ = tx.send(stun::parse_binding_response(data, &txn_id));
                        continue;
                    }
                }

                let datagram = Datagram {
                    from,
                    data: Bytes::copy_from_slice(data),
                };

                let mut dead = Vec::new();
                {
                    let subs = subscribers.read().await;
                    for (key, tx) in subs.iter() {
                        if tx.send(datagram.clone()).is_err() {
                            dead.push(key.clone());
                        }
                    }
                }
                if !dead.is_empty() {
                    let mut subs = subscribers.write().await;
                    for key in dead {
                        subs.remove(&key);
                    }
                }
            }
        })
    }
}

impl Drop for MuxSocket {
    fn drop(&mut self) {
        self.recv_task.abort();
    }
}

/// The pair of shared sockets every ICE session runs on
pub struct UdpMux {
    host: MuxSocket,
    srflx: MuxSocket,
}

impl UdpMux {
    /// Bind both sockets. Dual-stack unless IPv6 discovery is disabled.
    pub async fn bind(host_port: u16, srflx_port: u16, disable_ipv6: bool) -> NetworkResult<Self> {
        let host = MuxSocket::bind(host_port, disable_ipv6).await?;
        let srflx = MuxSocket::bind(srflx_port, disable_ipv6).await?;
        Ok(Self { host, srflx })
    }

    /// Socket backing host candidates
    pub fn host(&self) -> &MuxSocket {
        &self.host
    }

    /// Socket backing server-reflexive discovery
    pub fn srflx(&self) -> &MuxSocket {
        &self.srflx
    }

    /// Socket to transmit from for a given local source address. ICE
    /// transmits carry the source of the candidate they belong to.
    pub fn socket_for(&self, source: SocketAddr) -> &MuxSocket {
        if source.port() == self.srflx.port() {
            &self.srflx
        } else {
            &self.host
        }
    }

    /// Drop a peer's subscriptions on both sockets
    pub async fn unsubscribe(&self, peer_key: &str) {
        self.host.unsubscribe(peer_key).await;
        self.srflx.unsubscribe(peer_key).await;
    }

    /// Stop both receive loops
    pub fn close(&self) {
        self.host.close();
        self.srflx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_fan_out() {
        let mux = UdpMux::bind(0, 0, true).await.unwrap();
        let mut rx_a = mux.host().subscribe("peer-a").await;
        let mut rx_b = mux.host().subscribe("peer-b").await;

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let dest = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), mux.host().port());
        sender.send_to(b"ice-probe", dest).await.unwrap();

        let got_a = timeout(Duration::from_secs(2), rx_a.recv())
            .await
            .unwrap()
            .unwrap();
        let got_b = timeout(Duration::from_secs(2), rx_b.recv())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(&got_a.data[..], b"ice-probe");
        assert_eq!(&got_b.data[..], b"ice-probe");
        assert_eq!(got_a.from.port(), sender.local_addr().unwrap().port());

        mux.unsubscribe("peer-a").await;
        assert!(mux.host().subscribers.read().await.len() == 1);

        mux.close();
    }

    #[tokio::test]
    async fn test_query_timeout_cleans_pending() {
        let mux = UdpMux::bind(0, 0, true).await.unwrap();
        // nobody answers on this address
        let server: SocketAddr = "127.0.0.1:9".parse().unwrap();

        let err = mux
            .srflx()
            .query_mapped_address(server, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, NetworkError::Timeout));
        assert!(mux.srflx().pending.lock().await.is_empty());

        mux.close();
    }
}
