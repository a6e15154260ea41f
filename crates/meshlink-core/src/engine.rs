//! Peer connection engine
//!
//! Reacts to coordinator and signaling stream events and manages the
//! connections to all remote peers. Every mutation of shared state goes
//! through one mutex: reconciliation of a network map is an atomic unit of
//! work, and signaling dispatch waits its turn.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use str0m::Candidate;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

use meshlink_mgmt::proto::{
    DnsConfig, HostConfig, NetworkMap, PeerConfig, ProtectedHostConfig, RemotePeerConfig, Route,
    ShellConfig, SyncResponse,
};
use meshlink_network::ice::IceUrl;
use meshlink_network::mux::UdpMux;
use meshlink_network::nat::parse_nat_external_mappings;
use meshlink_network::TunnelDevice;

use crate::config::EngineConfig;
use crate::error::{CoreError, CoreResult};
use crate::peer::{
    sample_connection_timeout, ConnConfig, ModeMessage, OfferAnswer, PeerConn, PeerSignaler,
    ProxyConfig,
};
use crate::shell::{ShellServer, ShellServerFactory, DEFAULT_SHELL_PORT};
use crate::signal::{unmarshal_credentials, MessageType, SignalClient, SignalMessage};
use crate::status::{ConnStatus, LocalPeerState, PeerState, Status};

/// Client of the coordinator sync stream
#[async_trait]
pub trait ManagementClient: Send + Sync {
    /// Next update from the coordinator; Err when the stream broke
    async fn next_update(&self) -> CoreResult<SyncResponse>;
}

/// Route table collaborator. Updates are keyed by the network serial so the
/// manager can ignore duplicates.
#[async_trait]
pub trait RouteManager: Send + Sync {
    async fn update_routes(&self, serial: u64, routes: Vec<Route>) -> CoreResult<()>;
    async fn stop(&self);
}

/// DNS collaborator, same serial-keyed contract as the route manager
#[async_trait]
pub trait DnsServer: Send + Sync {
    async fn update_dns(&self, serial: u64, config: DnsConfig) -> CoreResult<()>;
    async fn stop(&self);
}

/// Cancellation handle of the engine. When a stream to the coordinator or
/// the signaling service breaks, the engine records `ResetConnection` here
/// and cancels itself; the supervising layer restarts it.
pub struct Cancellation {
    tx: watch::Sender<bool>,
    reason: StdMutex<Option<CoreError>>,
}

impl Cancellation {
    fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            tx,
            reason: StdMutex::new(None),
        }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the engine is cancelled
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Record why the engine cancelled itself
    pub fn wrap(&self, reason: CoreError) {
        *self.reason.lock().unwrap() = Some(reason);
    }

    /// Consume the recorded cancellation reason
    pub fn take_reason(&self) -> Option<CoreError> {
        self.reason.lock().unwrap().take()
    }
}

#[derive(Default)]
struct Shared {
    peer_conns: HashMap<String, Arc<PeerConn>>,
    stuns: Vec<IceUrl>,
    turns: Vec<IceUrl>,
    network_serial: u64,
    tunnel_addr: String,
    mux: Option<Arc<UdpMux>>,
    shell_server: Option<Arc<dyn ShellServer>>,
}

/// The peer connection engine
pub struct Engine {
    config: EngineConfig,
    /// Public key derived from the configured private key
    local_key: String,

    signal: Arc<dyn SignalClient>,
    mgmt: Arc<dyn ManagementClient>,
    tunnel: Arc<dyn TunnelDevice>,
    route_manager: Arc<dyn RouteManager>,
    dns_server: Arc<dyn DnsServer>,
    shell_factory: Option<ShellServerFactory>,
    status: Arc<Status>,

    cancel: Arc<Cancellation>,
    /// Live reconnect workers
    workers: AtomicUsize,
    shared: Mutex<Shared>,
}

impl Engine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: EngineConfig,
        signal: Arc<dyn SignalClient>,
        mgmt: Arc<dyn ManagementClient>,
        tunnel: Arc<dyn TunnelDevice>,
        route_manager: Arc<dyn RouteManager>,
        dns_server: Arc<dyn DnsServer>,
        shell_factory: Option<ShellServerFactory>,
        status: Arc<Status>,
    ) -> CoreResult<Arc<Self>> {
        let local_key = config.derive_public_key()?;
        let tunnel_addr = config.tunnel_addr.clone();

        Ok(Arc::new(Self {
            config,
            local_key,
            signal,
            mgmt,
            tunnel,
            route_manager,
            dns_server,
            shell_factory,
            status,
            cancel: Arc::new(Cancellation::new()),
            workers: AtomicUsize::new(0),
            shared: Mutex::new(Shared {
                tunnel_addr,
                ..Default::default()
            }),
        }))
    }

    pub fn cancellation(&self) -> Arc<Cancellation> {
        self.cancel.clone()
    }

    pub fn local_key(&self) -> &str {
        &self.local_key
    }

    /// Number of live reconnect workers
    pub fn worker_count(&self) -> usize {
        self.workers.load(Ordering::SeqCst)
    }

    pub async fn peer_count(&self) -> usize {
        self.shared.lock().await.peer_conns.len()
    }

    pub async fn peer_keys(&self) -> Vec<String> {
        self.shared.lock().await.peer_conns.keys().cloned().collect()
    }

    pub async fn network_serial(&self) -> u64 {
        self.shared.lock().await.network_serial
    }

    pub(crate) async fn peer_conn(&self, key: &str) -> Option<Arc<PeerConn>> {
        self.shared.lock().await.peer_conns.get(key).cloned()
    }

    /// Create the tunnel interface, bind the shared mux sockets and start
    /// consuming the coordinator and signaling streams. Connections to
    /// remote peers are established later, when a network map arrives.
    ///
    /// Any error during start tears everything down again before returning.
    pub async fn start(self: &Arc<Self>) -> CoreResult<()> {
        let mut shared = self.shared.lock().await;
        info!("starting engine on interface {}", self.config.iface_name);

        if let Err(e) = self.tunnel.create().await {
            error!(
                "failed creating tunnel interface {}: {}",
                self.config.iface_name, e
            );
            self.teardown(&mut shared).await;
            return Err(e.into());
        }

        let mux = match UdpMux::bind(
            self.config.mux_port,
            self.config.mux_srflx_port,
            self.config.disable_ipv6_discovery,
        )
        .await
        {
            Ok(mux) => Arc::new(mux),
            Err(e) => {
                error!("failed binding the shared UDP sockets: {}", e);
                self.teardown(&mut shared).await;
                return Err(e.into());
            }
        };
        shared.mux = Some(mux);

        if let Err(e) = self
            .tunnel
            .configure(&self.config.private_key, self.config.tunnel_port)
            .await
        {
            error!(
                "failed configuring tunnel interface {}: {}",
                self.config.iface_name, e
            );
            self.teardown(&mut shared).await;
            return Err(e.into());
        }

        drop(shared);

        self.receive_signal_events();
        self.receive_management_events();
        self.signal.wait_stream_connected().await;

        Ok(())
    }

    /// Remove every peer and release all resources. Returns an error only
    /// when peer removal fails.
    pub async fn stop(&self) -> CoreResult<()> {
        let mut shared = self.shared.lock().await;

        self.remove_all_peers(&mut shared).await?;

        // tunnel peer removal happens inside the in-flight open() calls;
        // give them a moment to drain before the interface goes away
        tokio::time::sleep(Duration::from_millis(500)).await;

        self.teardown(&mut shared).await;
        info!("stopped engine");
        Ok(())
    }

    async fn teardown(&self, shared: &mut Shared) {
        debug!("removing tunnel interface {}", self.config.iface_name);
        if let Err(e) = self.tunnel.close().await {
            error!(
                "failed closing tunnel interface {}: {}",
                self.config.iface_name, e
            );
        }

        if let Some(mux) = shared.mux.take() {
            mux.close();
        }

        if let Some(shell) = shared.shell_server.take() {
            if let Err(e) = shell.stop().await {
                warn!("failed stopping the shell server: {}", e);
            }
        }

        self.route_manager.stop().await;
        self.dns_server.stop().await;
    }

    /// Consume the coordinator update stream
    fn receive_management_events(self: &Arc<Self>) {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            debug!("connecting to the coordinator update stream");
            loop {
                let update = tokio::select! {
                    _ = engine.cancel.cancelled() => break,
                    received = engine.mgmt.next_update() => match received {
                        Ok(update) => update,
                        Err(e) => {
                            // coordinator unavailable for a long time, the
                            // whole client restarts
                            debug!("coordinator stream failed: {}", e);
                            engine.cancel.wrap(CoreError::ResetConnection);
                            engine.cancel.cancel();
                            break;
                        }
                    },
                };

                if let Err(e) = engine.handle_sync(update).await {
                    error!("failed handling coordinator update: {}", e);
                    engine.cancel.wrap(CoreError::ResetConnection);
                    engine.cancel.cancel();
                    break;
                }
            }
            debug!("stopped receiving updates from the coordinator");
        });
    }

    /// Consume the inbound signaling stream and dispatch per peer
    fn receive_signal_events(self: &Arc<Self>) {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let msg = tokio::select! {
                    _ = engine.cancel.cancelled() => break,
                    received = engine.signal.next_message() => match received {
                        Ok(msg) => msg,
                        Err(e) => {
                            debug!("signaling stream failed: {}", e);
                            engine.cancel.wrap(CoreError::ResetConnection);
                            engine.cancel.cancel();
                            break;
                        }
                    },
                };

                // a bad or misaddressed message never kills the stream
                if let Err(e) = engine.handle_signal_message(msg).await {
                    warn!("failed handling signaling message: {}", e);
                }
            }
            debug!("stopped receiving signaling messages");
        });
    }

    async fn handle_signal_message(&self, msg: SignalMessage) -> CoreResult<()> {
        // dispatch runs under the engine mutex so it serializes against
        // reconciliation
        let shared = self.shared.lock().await;
        let conn = shared
            .peer_conns
            .get(&msg.key)
            .cloned()
            .ok_or_else(|| CoreError::UnknownPeer(msg.key.clone()))?;

        match msg.body.message_type {
            MessageType::Offer | MessageType::Answer => {
                let credentials = unmarshal_credentials(&msg.body)?;
                conn.register_remote_features(&msg.body.features_supported);
                let offer_answer = OfferAnswer {
                    credentials,
                    tunnel_listen_port: msg.body.tunnel_listen_port,
                    version: msg.body.version.clone(),
                };
                if msg.body.message_type == MessageType::Offer {
                    conn.on_remote_offer(offer_answer);
                } else {
                    conn.on_remote_answer(offer_answer);
                }
            }
            MessageType::Candidate => {
                Candidate::from_sdp_string(&msg.body.payload).map_err(|e| {
                    CoreError::InvalidMessage(format!("bad candidate from {}: {}", msg.key, e))
                })?;
                conn.on_remote_candidate(msg.body.payload.clone());
            }
            MessageType::Mode => {
                let mode = msg
                    .body
                    .mode
                    .ok_or_else(|| CoreError::InvalidMessage("empty mode message".into()))?;
                conn.on_mode_message(ModeMessage {
                    direct: mode.direct,
                })?;
            }
        }

        Ok(())
    }

    /// Serialized reconciliation entrypoint for one coordinator update
    pub async fn handle_sync(self: &Arc<Self>, update: SyncResponse) -> CoreResult<()> {
        let mut shared = self.shared.lock().await;

        if let Some(peering) = &update.peering_config {
            self.update_turns(&mut shared, &peering.turns)?;
            self.update_stuns(&mut shared, &peering.stuns)?;
        }

        if let Some(network_map) = update.network_map {
            self.update_network_map(&mut shared, network_map).await?;
        }

        Ok(())
    }

    fn update_stuns(&self, shared: &mut Shared, stuns: &[HostConfig]) -> CoreResult<()> {
        if stuns.is_empty() {
            return Ok(());
        }
        debug!("got STUNs update from the coordinator, updating");
        let mut parsed = Vec::with_capacity(stuns.len());
        for stun in stuns {
            parsed.push(IceUrl::parse(&stun.uri)?);
        }
        shared.stuns = parsed;
        Ok(())
    }

    fn update_turns(&self, shared: &mut Shared, turns: &[ProtectedHostConfig]) -> CoreResult<()> {
        if turns.is_empty() {
            return Ok(());
        }
        debug!("got TURNs update from the coordinator, updating");
        let mut parsed = Vec::with_capacity(turns.len());
        for turn in turns {
            parsed.push(
                IceUrl::parse(&turn.host.uri)?
                    .with_credentials(turn.user.clone(), turn.password.clone()),
            );
        }
        shared.turns = parsed;
        Ok(())
    }

    async fn update_network_map(
        self: &Arc<Self>,
        shared: &mut Shared,
        network_map: NetworkMap,
    ) -> CoreResult<()> {
        // intentionally ahead of the serial check: the peer address can
        // change in a message whose serial has not incremented yet
        if let Some(peer_config) = &network_map.peer_config {
            self.update_peer_config(shared, peer_config).await?;
        }

        let serial = network_map.serial;
        if shared.network_serial > serial {
            debug!(
                "received outdated network map with serial {}, ignoring",
                serial
            );
            return Ok(());
        }

        debug!(
            "got peers update from the coordinator, total peers to connect to = {}",
            network_map.remote_peers.len()
        );

        self.update_offline_peers(&network_map.offline_peers);

        if network_map.remote_peers_is_empty {
            // cleanup request, most likely this peer has been deleted
            self.remove_all_peers(shared).await?;
        } else {
            self.remove_peers(shared, &network_map.remote_peers).await?;
            self.modify_peers(shared, &network_map.remote_peers).await?;
            self.add_new_peers(shared, &network_map.remote_peers).await?;

            // remote peers advertising a shell key become authorized
            if let Some(shell) = shared.shell_server.clone() {
                for peer in &network_map.remote_peers {
                    if let Some(pub_key) =
                        peer.shell_config.as_ref().and_then(|c| c.pub_key.as_ref())
                    {
                        if let Err(e) = shell.add_authorized_key(&peer.pub_key, pub_key).await {
                            warn!("failed adding authorized key to the shell server: {}", e);
                        }
                    }
                }
            }
        }

        if let Err(e) = self
            .route_manager
            .update_routes(serial, network_map.routes)
            .await
        {
            error!("failed to update routes: {}", e);
        }

        if let Err(e) = self
            .dns_server
            .update_dns(serial, network_map.dns_config.unwrap_or_default())
            .await
        {
            error!("failed to update dns server: {}", e);
        }

        shared.network_serial = serial;
        Ok(())
    }

    async fn update_peer_config(
        &self,
        shared: &mut Shared,
        peer_config: &PeerConfig,
    ) -> CoreResult<()> {
        if shared.tunnel_addr != peer_config.address {
            let old_addr = shared.tunnel_addr.clone();
            debug!(
                "updating local address from {} to {}",
                old_addr, peer_config.address
            );
            self.tunnel.update_addr(&peer_config.address).await?;
            shared.tunnel_addr = peer_config.address.clone();
            info!(
                "updated local address from {} to {}",
                old_addr, peer_config.address
            );
        }

        if let Some(shell_config) = &peer_config.shell_config {
            if let Err(e) = self.update_shell(shared, shell_config).await {
                warn!("failed handling shell server setup: {}", e);
            }
        }

        self.status.update_local_peer_state(LocalPeerState {
            ip: shared.tunnel_addr.clone(),
            pub_key: self.local_key.clone(),
            fqdn: peer_config.fqdn.clone(),
        });

        Ok(())
    }

    async fn update_shell(
        &self,
        shared: &mut Shared,
        shell_config: &ShellConfig,
    ) -> CoreResult<()> {
        if shell_config.enabled {
            if cfg!(windows) {
                warn!("running the shell server on Windows is not supported");
                return Ok(());
            }
            if shared.shell_server.is_some() {
                debug!("shell server is already running");
                return Ok(());
            }
            let factory = match &self.shell_factory {
                Some(factory) => factory,
                None => {
                    debug!("no shell server factory configured");
                    return Ok(());
                }
            };

            let ip = shared
                .tunnel_addr
                .split('/')
                .next()
                .unwrap_or_default()
                .to_string();
            let server = factory(
                self.config.shell_key.clone(),
                format!("{ip}:{DEFAULT_SHELL_PORT}"),
            )?;
            server.start().await?;
            shared.shell_server = Some(server);
            info!("started the shell server");
        } else if let Some(server) = shared.shell_server.take() {
            if let Err(e) = server.stop().await {
                warn!("failed to stop the shell server: {}", e);
            }
            info!("stopped the shell server");
        }
        Ok(())
    }

    fn update_offline_peers(&self, offline_peers: &[RemotePeerConfig]) {
        let replacement: Vec<PeerState> = offline_peers
            .iter()
            .map(|peer| {
                debug!("added offline peer {}", peer.fqdn);
                PeerState {
                    ip: peer.allowed_ips_string(),
                    pub_key: peer.pub_key.clone(),
                    fqdn: peer.fqdn.clone(),
                    conn_status: ConnStatus::Disconnected,
                    conn_status_update: Utc::now(),
                }
            })
            .collect();
        self.status.replace_offline_peers(replacement);
    }

    /// Remove peers that are gone from the network map
    async fn remove_peers(
        &self,
        shared: &mut Shared,
        peers_update: &[RemotePeerConfig],
    ) -> CoreResult<()> {
        let update_keys: HashSet<&str> = peers_update
            .iter()
            .map(|peer| peer.pub_key.as_str())
            .collect();
        let to_remove: Vec<String> = shared
            .peer_conns
            .keys()
            .filter(|key| !update_keys.contains(key.as_str()))
            .cloned()
            .collect();

        for key in to_remove {
            self.remove_peer(shared, &key).await?;
            info!("removed peer {}", key);
        }
        Ok(())
    }

    /// Close and recreate peers whose allowed IPs changed; refresh the FQDN
    /// of the unchanged ones
    async fn modify_peers(
        self: &Arc<Self>,
        shared: &mut Shared,
        peers_update: &[RemotePeerConfig],
    ) -> CoreResult<()> {
        let mut modified = Vec::new();
        for peer in peers_update {
            if let Some(conn) = shared.peer_conns.get(&peer.pub_key) {
                if conn.allowed_ips().await != peer.allowed_ips_string() {
                    modified.push(peer.clone());
                    continue;
                }
                if let Err(e) = self.status.update_peer_fqdn(&peer.pub_key, &peer.fqdn) {
                    warn!(
                        "error updating peer's {} fqdn in the status recorder: {}",
                        peer.pub_key, e
                    );
                }
            }
        }

        for peer in &modified {
            self.remove_peer(shared, &peer.pub_key).await?;
        }
        for peer in &modified {
            self.add_new_peer(shared, peer).await?;
        }
        Ok(())
    }

    async fn remove_all_peers(&self, shared: &mut Shared) -> CoreResult<()> {
        debug!("removing all peer connections");
        let keys: Vec<String> = shared.peer_conns.keys().cloned().collect();
        for key in keys {
            self.remove_peer(shared, &key).await?;
        }
        Ok(())
    }

    /// Close one peer connection, drop it from the map and clear its shell
    /// authorization
    async fn remove_peer(&self, shared: &mut Shared, peer_key: &str) -> CoreResult<()> {
        debug!("removing peer from engine {}", peer_key);

        if let Some(shell) = &shared.shell_server {
            shell.remove_authorized_key(peer_key).await;
        }

        let result = match shared.peer_conns.remove(peer_key) {
            Some(conn) => match conn.close().await {
                Err(CoreError::ConnectionAlreadyClosed) => Ok(()),
                other => other,
            },
            None => Ok(()),
        };

        if let Err(e) = self.status.remove_peer(peer_key) {
            warn!(
                "error removing peer {} from the status recorder: {}",
                peer_key, e
            );
        }
        result
    }

    async fn add_new_peers(
        self: &Arc<Self>,
        shared: &mut Shared,
        peers_update: &[RemotePeerConfig],
    ) -> CoreResult<()> {
        for peer in peers_update {
            self.add_new_peer(shared, peer).await?;
        }
        Ok(())
    }

    /// Track a peer that is not connected yet and start its reconnect worker
    async fn add_new_peer(
        self: &Arc<Self>,
        shared: &mut Shared,
        peer_config: &RemotePeerConfig,
    ) -> CoreResult<()> {
        let peer_key = &peer_config.pub_key;
        if !shared.peer_conns.contains_key(peer_key) {
            let conn = self.create_peer_conn(shared, peer_key, peer_config.allowed_ips_string())?;
            shared.peer_conns.insert(peer_key.clone(), conn.clone());

            if let Err(e) = self.status.add_peer(peer_key) {
                warn!("error adding peer {} to the status recorder: {}", peer_key, e);
            }

            self.spawn_conn_worker(conn, peer_key.clone());
        }

        if let Err(e) = self.status.update_peer_fqdn(peer_key, &peer_config.fqdn) {
            warn!(
                "error updating peer's {} fqdn in the status recorder: {}",
                peer_key, e
            );
        }
        Ok(())
    }

    fn create_peer_conn(
        &self,
        shared: &Shared,
        pub_key: &str,
        allowed_ips: String,
    ) -> CoreResult<Arc<PeerConn>> {
        debug!("creating peer connection {}", pub_key);

        let mux = shared.mux.clone().ok_or(CoreError::NotStarted)?;

        let mut stun_turn = shared.stuns.clone();
        stun_turn.extend(shared.turns.iter().cloned());

        let conf = ConnConfig {
            key: pub_key.to_string(),
            local_key: self.local_key.clone(),
            stun_turn,
            iface_blacklist: self.config.iface_blacklist.clone(),
            disable_ipv6_discovery: self.config.disable_ipv6_discovery,
            timeout: sample_connection_timeout(),
            nat_external_ips: parse_nat_external_mappings(
                &self.config.nat_external_ips,
                &self.config.iface_blacklist,
            ),
            local_tunnel_port: self.config.tunnel_port,
            proxy: ProxyConfig {
                allowed_ips,
                pre_shared_key: self.config.pre_shared_key.clone(),
            },
        };

        let signaler = PeerSignaler::new(
            self.signal.clone(),
            self.local_key.clone(),
            pub_key.to_string(),
            conf.local_tunnel_port,
        );

        Ok(Arc::new(PeerConn::new(
            conf,
            mux,
            self.tunnel.clone(),
            self.status.clone(),
            signaler,
        )))
    }

    fn spawn_conn_worker(self: &Arc<Self>, conn: Arc<PeerConn>, peer_key: String) {
        let engine = Arc::clone(self);
        self.workers.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            engine.conn_worker(conn, &peer_key).await;
            engine.workers.fetch_sub(1, Ordering::SeqCst);
        });
    }

    /// Retry loop of one peer. Exits when the peer leaves the engine map or
    /// its connection is forced closed.
    async fn conn_worker(&self, conn: Arc<PeerConn>, peer_key: &str) {
        loop {
            // spread attempts out a bit
            let jitter = rand::thread_rng().gen_range(500..2000);
            tokio::time::sleep(Duration::from_millis(jitter)).await;

            if !self.peer_exists(peer_key).await {
                debug!(
                    "peer {} doesn't exist anymore, won't retry connection",
                    peer_key
                );
                return;
            }

            // a modified peer keeps its key but gets a fresh connection;
            // the worker of the closed one has nothing left to retry
            if conn.is_closed() {
                debug!("connection to peer {} was closed, giving up", peer_key);
                return;
            }

            if !self.signal.is_ready() {
                info!(
                    "signal client isn't ready, skipping connection attempt {}",
                    peer_key
                );
                continue;
            }

            // new STUN and TURN servers might have arrived meanwhile
            {
                let shared = self.shared.lock().await;
                let mut stun_turn = shared.stuns.clone();
                stun_turn.extend(shared.turns.iter().cloned());
                conn.update_conf(stun_turn, sample_connection_timeout()).await;
            }

            match conn.open().await {
                Err(CoreError::ConnectionClosed) => {
                    // forced to close, exit the loop
                    return;
                }
                Err(e) => debug!("connection to peer {} failed: {}", peer_key, e),
                Ok(()) => {}
            }
        }
    }

    async fn peer_exists(&self, peer_key: &str) -> bool {
        self.shared.lock().await.peer_conns.contains_key(peer_key)
    }
}
