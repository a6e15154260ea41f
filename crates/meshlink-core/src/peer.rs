//! Per-peer connection state machine
//!
//! One `PeerConn` per remote peer. A reconnect worker drives `open()` in a
//! loop; the engine's signaling dispatcher feeds remote offers, answers and
//! candidates in through the `on_remote_*` methods. A successful attempt
//! installs the peer into the tunnel interface and then holds the ICE
//! session alive until the connection is closed or connectivity is lost.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};

use rand::Rng;
use str0m::ice::{IceAgent, IceAgentEvent, IceCreds, StunMessage, StunPacket};
use str0m::net::Protocol;
use str0m::{Candidate, IceConnectionState};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::sleep_until;
use tracing::{debug, info, trace, warn};

use meshlink_network::ice::{gather_candidates, GatherParams, IceUrl};
use meshlink_network::mux::{Datagram, UdpMux};
use meshlink_network::nat::NatMapping;
use meshlink_network::TunnelDevice;

use crate::error::{CoreError, CoreResult};
use crate::signal::{
    credential_payload, Body, IceCredentials, MessageType, SignalClient, SignalMessage,
    FEATURE_DIRECT_CHECK,
};
use crate::status::{ConnStatus, Status};

/// Bounds of the per-attempt connection timeout. Each attempt samples its
/// own value so retries across peers don't synchronize.
const CONN_TIMEOUT_MIN_MS: u64 = 30_000;
const CONN_TIMEOUT_MAX_MS: u64 = 45_000;

/// Persistent keepalive installed on negotiated tunnel peers
const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(25);

/// Sample a fresh timeout budget for one connection attempt
pub fn sample_connection_timeout() -> Duration {
    Duration::from_millis(rand::thread_rng().gen_range(CONN_TIMEOUT_MIN_MS..CONN_TIMEOUT_MAX_MS))
}

/// Lifecycle of a peer connection
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeerConnState {
    Idle,
    Connecting,
    Connected,
    Disconnected,
    Closed,
}

/// Offer or answer received from the remote peer
#[derive(Clone, Debug)]
pub struct OfferAnswer {
    pub credentials: IceCredentials,
    /// Remote tunnel listener port, 0 when unknown
    pub tunnel_listen_port: u16,
    /// Remote client version
    pub version: String,
}

/// Mode switch received from the remote peer
#[derive(Clone, Copy, Debug)]
pub struct ModeMessage {
    pub direct: bool,
}

/// Settings of one peer connection. `stun_turn` and `timeout` are refreshed
/// by the reconnect worker before every attempt.
#[derive(Clone)]
pub struct ConnConfig {
    /// Remote peer public key
    pub key: String,
    /// Local public key
    pub local_key: String,
    /// STUN/TURN servers, snapshot at attempt start
    pub stun_turn: Vec<IceUrl>,
    pub iface_blacklist: Vec<String>,
    pub disable_ipv6_discovery: bool,
    /// Timeout budget of the next attempt
    pub timeout: Duration,
    pub nat_external_ips: Vec<NatMapping>,
    /// Local tunnel listener port, advertised in offers/answers
    pub local_tunnel_port: u16,
    pub proxy: ProxyConfig,
}

/// Tunnel-facing settings of one peer connection
#[derive(Clone)]
pub struct ProxyConfig {
    /// Allowed IPs routed to this peer, comma-joined CIDRs
    pub allowed_ips: String,
    pub pre_shared_key: Option<String>,
}

/// Outbound signaling on behalf of one peer connection
pub struct PeerSignaler {
    signal: Arc<dyn SignalClient>,
    local_key: String,
    remote_key: String,
    tunnel_listen_port: u16,
}

impl PeerSignaler {
    pub fn new(
        signal: Arc<dyn SignalClient>,
        local_key: String,
        remote_key: String,
        tunnel_listen_port: u16,
    ) -> Self {
        Self {
            signal,
            local_key,
            remote_key,
            tunnel_listen_port,
        }
    }

    async fn send_offer_answer(
        &self,
        credentials: &IceCredentials,
        message_type: MessageType,
    ) -> CoreResult<()> {
        self.signal
            .send(SignalMessage {
                key: self.local_key.clone(),
                remote_key: self.remote_key.clone(),
                body: Body {
                    message_type,
                    payload: credential_payload(credentials),
                    tunnel_listen_port: self.tunnel_listen_port,
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    features_supported: vec![FEATURE_DIRECT_CHECK],
                    mode: None,
                },
            })
            .await
    }

    pub async fn send_offer(&self, credentials: &IceCredentials) -> CoreResult<()> {
        self.send_offer_answer(credentials, MessageType::Offer).await
    }

    pub async fn send_answer(&self, credentials: &IceCredentials) -> CoreResult<()> {
        self.send_offer_answer(credentials, MessageType::Answer)
            .await
    }

    pub async fn send_candidate(&self, candidate_sdp: &str) -> CoreResult<()> {
        self.signal
            .send(SignalMessage {
                key: self.local_key.clone(),
                remote_key: self.remote_key.clone(),
                body: Body {
                    message_type: MessageType::Candidate,
                    payload: candidate_sdp.to_string(),
                    tunnel_listen_port: 0,
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    features_supported: Vec::new(),
                    mode: None,
                },
            })
            .await
    }
}

struct Inbox {
    offers: mpsc::UnboundedReceiver<OfferAnswer>,
    answers: mpsc::UnboundedReceiver<OfferAnswer>,
    candidates: mpsc::UnboundedReceiver<String>,
}

/// Connection to one remote peer
pub struct PeerConn {
    key: String,
    conf: Mutex<ConnConfig>,
    state: StdMutex<PeerConnState>,

    mux: Arc<UdpMux>,
    tunnel: Arc<dyn TunnelDevice>,
    status: Arc<Status>,
    signaler: PeerSignaler,

    offer_tx: mpsc::UnboundedSender<OfferAnswer>,
    answer_tx: mpsc::UnboundedSender<OfferAnswer>,
    candidate_tx: mpsc::UnboundedSender<String>,
    inbox: Mutex<Inbox>,

    remote_features: StdMutex<Vec<u32>>,
    remote_direct_mode: AtomicBool,

    closed_tx: watch::Sender<bool>,
}

/// Why the hold phase ended
enum HoldExit {
    Closed,
    Disconnected,
}

impl PeerConn {
    pub fn new(
        conf: ConnConfig,
        mux: Arc<UdpMux>,
        tunnel: Arc<dyn TunnelDevice>,
        status: Arc<Status>,
        signaler: PeerSignaler,
    ) -> Self {
        let (offer_tx, offers) = mpsc::unbounded_channel();
        let (answer_tx, answers) = mpsc::unbounded_channel();
        let (candidate_tx, candidates) = mpsc::unbounded_channel();
        let (closed_tx, _) = watch::channel(false);

        Self {
            key: conf.key.clone(),
            conf: Mutex::new(conf),
            state: StdMutex::new(PeerConnState::Idle),
            mux,
            tunnel,
            status,
            signaler,
            offer_tx,
            answer_tx,
            candidate_tx,
            inbox: Mutex::new(Inbox {
                offers,
                answers,
                candidates,
            }),
            remote_features: StdMutex::new(Vec::new()),
            remote_direct_mode: AtomicBool::new(false),
            closed_tx,
        }
    }

    /// Remote peer public key
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn state(&self) -> PeerConnState {
        *self.state.lock().unwrap()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed_tx.borrow()
    }

    /// Allowed IPs this connection routes, comma-joined
    pub async fn allowed_ips(&self) -> String {
        self.conf.lock().await.proxy.allowed_ips.clone()
    }

    /// Hot-swap the ICE server list and timeout budget for the next attempt
    pub async fn update_conf(&self, stun_turn: Vec<IceUrl>, timeout: Duration) {
        let mut conf = self.conf.lock().await;
        conf.stun_turn = stun_turn;
        conf.timeout = timeout;
    }

    /// Remote offer delivered by the signaling dispatcher
    pub fn on_remote_offer(&self, offer: OfferAnswer) {
        let _ = self.offer_tx.send(offer);
    }

    /// Remote answer delivered by the signaling dispatcher
    pub fn on_remote_answer(&self, answer: OfferAnswer) {
        let _ = self.answer_tx.send(answer);
    }

    /// Remote candidate (SDP form) delivered by the signaling dispatcher.
    /// Candidates arriving before credentials queue until the ICE loop runs.
    pub fn on_remote_candidate(&self, candidate_sdp: String) {
        let _ = self.candidate_tx.send(candidate_sdp);
    }

    /// Mode switch delivered by the signaling dispatcher
    pub fn on_mode_message(&self, msg: ModeMessage) -> CoreResult<()> {
        debug!("peer {} switched to direct={}", self.key, msg.direct);
        self.remote_direct_mode.store(msg.direct, Ordering::SeqCst);
        Ok(())
    }

    /// Feature bits advertised in the latest remote offer/answer
    pub fn register_remote_features(&self, features: &[u32]) {
        *self.remote_features.lock().unwrap() = features.to_vec();
    }

    pub fn remote_features(&self) -> Vec<u32> {
        self.remote_features.lock().unwrap().clone()
    }

    /// Force the connection to close. An in-flight `open()` returns
    /// `ConnectionClosed` and removes the tunnel peer; a second close
    /// returns `ConnectionAlreadyClosed`.
    pub async fn close(&self) -> CoreResult<()> {
        let mut already_closed = false;
        self.closed_tx.send_if_modified(|closed| {
            if *closed {
                already_closed = true;
                false
            } else {
                *closed = true;
                true
            }
        });

        if already_closed {
            return Err(CoreError::ConnectionAlreadyClosed);
        }
        debug!("closing connection to peer {}", self.key);
        Ok(())
    }

    /// One full connection attempt. Blocks until the connection is forced
    /// to close (terminal, `ConnectionClosed`) or the attempt fails
    /// (retryable, any other error).
    pub async fn open(&self) -> CoreResult<()> {
        if self.is_closed() {
            return Err(CoreError::ConnectionClosed);
        }

        let conf = self.conf.lock().await.clone();
        self.set_state(PeerConnState::Connecting);
        self.record_status(ConnStatus::Connecting);

        let host_rx = self.mux.host().subscribe(&self.key).await;
        let srflx_rx = self.mux.srflx().subscribe(&self.key).await;

        let result = self.run_attempt(&conf, host_rx, srflx_rx).await;
        self.mux.unsubscribe(&self.key).await;

        match &result {
            Err(CoreError::ConnectionClosed) => {
                self.set_state(PeerConnState::Closed);
                self.record_status(ConnStatus::Disconnected);
            }
            _ => {
                self.set_state(PeerConnState::Disconnected);
                self.record_status(ConnStatus::Disconnected);
            }
        }
        result
    }

    async fn run_attempt(
        &self,
        conf: &ConnConfig,
        mut host_rx: mpsc::UnboundedReceiver<Datagram>,
        mut srflx_rx: mpsc::UnboundedReceiver<Datagram>,
    ) -> CoreResult<()> {
        let mut inbox = self.inbox.lock().await;

        // leftovers from a previous attempt are stale
        while inbox.offers.try_recv().is_ok() {}
        while inbox.answers.try_recv().is_ok() {}
        while inbox.candidates.try_recv().is_ok() {}

        let deadline = tokio::time::Instant::now() + conf.timeout;
        let local_creds = IceCreds::new();
        let credentials = IceCredentials {
            ufrag: local_creds.ufrag.clone(),
            pwd: local_creds.pass.clone(),
        };

        // the smaller key controls and offers; the larger one answers
        let controlling = conf.local_key < conf.key;

        let gather_params = GatherParams {
            stun_turn: &conf.stun_turn,
            nat_mappings: &conf.nat_external_ips,
            iface_blacklist: &conf.iface_blacklist,
            disable_ipv6: conf.disable_ipv6_discovery,
        };

        let (remote, local_candidates) = if controlling {
            let local_candidates = gather_candidates(&self.mux, &gather_params).await?;
            self.signaler.send_offer(&credentials).await?;
            debug!("sent offer to peer {}", self.key);
            let answer = self.wait_offer_answer(&mut inbox.answers, deadline).await?;
            (answer, local_candidates)
        } else {
            let offer = self.wait_offer_answer(&mut inbox.offers, deadline).await?;
            let local_candidates = gather_candidates(&self.mux, &gather_params).await?;
            self.signaler.send_answer(&credentials).await?;
            debug!("sent answer to peer {}", self.key);
            (offer, local_candidates)
        };

        let mut agent = new_ice_agent(local_creds);
        agent.set_controlling(controlling);
        agent.set_remote_credentials(IceCreds {
            ufrag: remote.credentials.ufrag.clone(),
            pass: remote.credentials.pwd.clone(),
        });

        let mut to_signal = Vec::new();
        for candidate in local_candidates {
            if let Some(added) = agent.add_local_candidate(candidate) {
                to_signal.push(added.to_sdp_string());
            }
        }
        for sdp in &to_signal {
            self.signaler.send_candidate(sdp).await?;
        }

        let host_addr = self.mux.host().local_addr();
        let srflx_addr = self.mux.srflx().local_addr();

        agent.handle_timeout(Instant::now());
        let mut nominated: Option<SocketAddr> = None;

        // candidate exchange until a pair is selected
        let selected = loop {
            self.drain_transmits(&mut agent).await;
            while let Some(event) = agent.poll_event() {
                match event {
                    IceAgentEvent::IceConnectionStateChange(state) => {
                        trace!("peer {} ICE state: {:?}", self.key, state);
                    }
                    IceAgentEvent::NominatedSend { destination, .. } => {
                        nominated = Some(destination);
                    }
                    _ => {}
                }
            }

            if agent.state().is_connected() {
                if let Some(destination) = nominated {
                    break destination;
                }
            }

            let next_timeout = agent
                .poll_timeout()
                .unwrap_or_else(|| Instant::now() + Duration::from_millis(50));

            tokio::select! {
                _ = self.closed_wait() => return Err(CoreError::ConnectionClosed),
                _ = sleep_until(deadline) => return Err(CoreError::NegotiationTimeout),
                Some(datagram) = host_rx.recv() => {
                    handle_datagram(&mut agent, &datagram, host_addr);
                }
                Some(datagram) = srflx_rx.recv() => {
                    handle_datagram(&mut agent, &datagram, srflx_addr);
                }
                Some(sdp) = inbox.candidates.recv() => {
                    match Candidate::from_sdp_string(&sdp) {
                        Ok(candidate) => {
                            agent.add_remote_candidate(candidate);
                        }
                        Err(e) => warn!("ignoring bad remote candidate from {}: {}", self.key, e),
                    }
                }
                _ = sleep_until(tokio::time::Instant::from_std(next_timeout)) => {
                    agent.handle_timeout(Instant::now());
                }
            }
        };

        // a selected pair points at the remote mux; the tunnel listener sits
        // on the advertised port
        let endpoint = if remote.tunnel_listen_port > 0 {
            SocketAddr::new(selected.ip(), remote.tunnel_listen_port)
        } else {
            selected
        };

        self.tunnel
            .update_peer(
                &conf.key,
                &conf.proxy.allowed_ips,
                DEFAULT_KEEPALIVE,
                Some(endpoint),
                conf.proxy.pre_shared_key.as_deref(),
            )
            .await?;

        self.set_state(PeerConnState::Connected);
        self.record_status(ConnStatus::Connected);
        let _ = self.status.update_peer_ip(&self.key, &conf.proxy.allowed_ips);
        info!(
            "connected to peer {} (version {}) via {}",
            self.key, remote.version, endpoint
        );

        // hold the session: ICE keepalives keep flowing until the
        // connection is closed or connectivity is lost
        let exit = loop {
            self.drain_transmits(&mut agent).await;
            let mut disconnected = false;
            while let Some(event) = agent.poll_event() {
                if let IceAgentEvent::IceConnectionStateChange(state) = event {
                    trace!("peer {} ICE state: {:?}", self.key, state);
                    if state == IceConnectionState::Disconnected {
                        disconnected = true;
                    }
                }
            }
            if disconnected {
                break HoldExit::Disconnected;
            }

            let next_timeout = agent
                .poll_timeout()
                .unwrap_or_else(|| Instant::now() + Duration::from_millis(50));

            tokio::select! {
                _ = self.closed_wait() => break HoldExit::Closed,
                Some(datagram) = host_rx.recv() => {
                    handle_datagram(&mut agent, &datagram, host_addr);
                }
                Some(datagram) = srflx_rx.recv() => {
                    handle_datagram(&mut agent, &datagram, srflx_addr);
                }
                Some(sdp) = inbox.candidates.recv() => {
                    match Candidate::from_sdp_string(&sdp) {
                        Ok(candidate) => {
                            agent.add_remote_candidate(candidate);
                        }
                        Err(e) => warn!("ignoring bad remote candidate from {}: {}", self.key, e),
                    }
                }
                _ = sleep_until(tokio::time::Instant::from_std(next_timeout)) => {
                    agent.handle_timeout(Instant::now());
                }
            }
        };

        if let Err(e) = self.tunnel.remove_peer(&conf.key).await {
            warn!("failed removing tunnel peer {}: {}", conf.key, e);
        }

        match exit {
            HoldExit::Closed => Err(CoreError::ConnectionClosed),
            HoldExit::Disconnected => {
                debug!("connection to peer {} lost", self.key);
                Err(CoreError::Disconnected)
            }
        }
    }

    async fn wait_offer_answer(
        &self,
        rx: &mut mpsc::UnboundedReceiver<OfferAnswer>,
        deadline: tokio::time::Instant,
    ) -> CoreResult<OfferAnswer> {
        tokio::select! {
            _ = self.closed_wait() => Err(CoreError::ConnectionClosed),
            _ = sleep_until(deadline) => Err(CoreError::NegotiationTimeout),
            received = rx.recv() => received.ok_or(CoreError::ConnectionClosed),
        }
    }

    async fn drain_transmits(&self, agent: &mut IceAgent) {
        while let Some(transmit) = agent.poll_transmit() {
            let socket = self.mux.socket_for(transmit.source);
            if let Err(e) = socket.send_to(&transmit.contents, transmit.destination).await {
                warn!("failed to send ICE packet to {}: {}", transmit.destination, e);
            }
        }
    }

    async fn closed_wait(&self) {
        let mut rx = self.closed_tx.subscribe();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    fn set_state(&self, state: PeerConnState) {
        let mut current = self.state.lock().unwrap();
        trace!("peer {} state: {:?} -> {:?}", self.key, *current, state);
        *current = state;
    }

    fn record_status(&self, status: ConnStatus) {
        let _ = self.status.update_conn_status(&self.key, status);
    }
}

fn new_ice_agent(creds: IceCreds) -> IceAgent {
    let provider = str0m::config::CryptoProvider::from_feature_flags();
    provider.install_process_default();
    IceAgent::with_local_credentials(creds)
}

fn handle_datagram(agent: &mut IceAgent, datagram: &Datagram, destination: SocketAddr) {
    if let Ok(message) = StunMessage::parse(&datagram.data) {
        agent.handle_packet(
            Instant::now(),
            StunPacket {
                proto: Protocol::Udp,
                source: datagram.from,
                destination,
                message,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use async_trait::async_trait;
    use meshlink_network::error::NetworkResult;

    struct NullSignal {
        ready: AtomicBool,
    }

    #[async_trait]
    impl SignalClient for NullSignal {
        async fn send(&self, _msg: SignalMessage) -> CoreResult<()> {
            Ok(())
        }

        async fn next_message(&self) -> CoreResult<SignalMessage> {
            std::future::pending().await
        }

        fn is_ready(&self) -> bool {
            self.ready.load(Ordering::SeqCst)
        }

        async fn wait_stream_connected(&self) {}
    }

    struct NullTunnel;

    #[async_trait]
    impl TunnelDevice for NullTunnel {
        async fn create(&self) -> NetworkResult<()> {
            Ok(())
        }
        async fn configure(&self, _private_key: &str, _port: u16) -> NetworkResult<()> {
            Ok(())
        }
        async fn update_addr(&self, _cidr: &str) -> NetworkResult<()> {
            Ok(())
        }
        async fn update_peer(
            &self,
            _pub_key: &str,
            _allowed_ips: &str,
            _keepalive: Duration,
            _endpoint: Option<SocketAddr>,
            _pre_shared_key: Option<&str>,
        ) -> NetworkResult<()> {
            Ok(())
        }
        async fn remove_peer(&self, _pub_key: &str) -> NetworkResult<()> {
            Ok(())
        }
        async fn close(&self) -> NetworkResult<()> {
            Ok(())
        }
        fn name(&self) -> &str {
            "tun-test"
        }
    }

    // local key "b..." > remote key "a...": the connection answers and
    // waits for the remote offer first, so open() parks deterministically
    fn test_conn(timeout: Duration, mux: Arc<UdpMux>) -> PeerConn {
        let signal = Arc::new(NullSignal {
            ready: AtomicBool::new(true),
        });
        let conf = ConnConfig {
            key: "aaaa-remote".into(),
            local_key: "bbbb-local".into(),
            stun_turn: Vec::new(),
            iface_blacklist: Vec::new(),
            disable_ipv6_discovery: true,
            timeout,
            nat_external_ips: Vec::new(),
            local_tunnel_port: 51820,
            proxy: ProxyConfig {
                allowed_ips: "10.0.0.2/32".into(),
                pre_shared_key: None,
            },
        };
        let signaler = PeerSignaler::new(
            signal,
            conf.local_key.clone(),
            conf.key.clone(),
            conf.local_tunnel_port,
        );
        PeerConn::new(
            conf,
            mux,
            Arc::new(NullTunnel),
            Arc::new(Status::new()),
            signaler,
        )
    }

    #[test]
    fn test_timeout_sampling_bounds() {
        for _ in 0..1000 {
            let timeout = sample_connection_timeout();
            assert!(timeout >= Duration::from_millis(30_000));
            assert!(timeout <= Duration::from_millis(45_000));
        }
    }

    #[tokio::test]
    async fn test_double_close_distinguished() {
        let mux = Arc::new(UdpMux::bind(0, 0, true).await.unwrap());
        let conn = test_conn(Duration::from_secs(30), mux.clone());

        conn.close().await.unwrap();
        assert!(matches!(
            conn.close().await,
            Err(CoreError::ConnectionAlreadyClosed)
        ));
        mux.close();
    }

    #[tokio::test]
    async fn test_open_after_close() {
        let mux = Arc::new(UdpMux::bind(0, 0, true).await.unwrap());
        let conn = test_conn(Duration::from_secs(30), mux.clone());

        conn.close().await.unwrap();
        assert!(matches!(
            conn.open().await,
            Err(CoreError::ConnectionClosed)
        ));
        mux.close();
    }

    #[tokio::test]
    async fn test_close_interrupts_open() {
        let mux = Arc::new(UdpMux::bind(0, 0, true).await.unwrap());
        let conn = Arc::new(test_conn(Duration::from_secs(30), mux.clone()));

        let opened = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.open().await })
        };

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(conn.state(), PeerConnState::Connecting);
        conn.close().await.unwrap();

        let result = opened.await.unwrap();
        assert!(matches!(result, Err(CoreError::ConnectionClosed)));
        assert_eq!(conn.state(), PeerConnState::Closed);
        mux.close();
    }

    #[tokio::test]
    async fn test_attempt_times_out() {
        let mux = Arc::new(UdpMux::bind(0, 0, true).await.unwrap());
        let conn = test_conn(Duration::from_millis(200), mux.clone());

        let result = conn.open().await;
        assert!(matches!(result, Err(CoreError::NegotiationTimeout)));
        assert_eq!(conn.state(), PeerConnState::Disconnected);
        mux.close();
    }

    #[tokio::test]
    async fn test_update_conf_swaps_servers() {
        let mux = Arc::new(UdpMux::bind(0, 0, true).await.unwrap());
        let conn = test_conn(Duration::from_secs(30), mux.clone());

        let servers = vec![IceUrl::parse("stun:stun.example.com:3478").unwrap()];
        conn.update_conf(servers.clone(), Duration::from_secs(31))
            .await;

        let conf = conn.conf.lock().await;
        assert_eq!(conf.stun_turn, servers);
        assert_eq!(conf.timeout, Duration::from_secs(31));
        drop(conf);
        mux.close();
    }

    #[tokio::test]
    async fn test_mode_and_features_recorded() {
        let mux = Arc::new(UdpMux::bind(0, 0, true).await.unwrap());
        let conn = test_conn(Duration::from_secs(30), mux.clone());

        conn.register_remote_features(&[FEATURE_DIRECT_CHECK]);
        assert_eq!(conn.remote_features(), vec![FEATURE_DIRECT_CHECK]);

        conn.on_mode_message(ModeMessage { direct: true }).unwrap();
        assert!(conn.remote_direct_mode.load(Ordering::SeqCst));
        mux.close();
    }
}
