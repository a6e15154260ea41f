//! Mesh network model and peer IP allocation
//!
//! Every account owns a random /16 carved out of the 100.64.0.0/10
//! aggregate. Peer IPs are picked at random from the free addresses of that
//! subnet so that holes left by departed peers are reused.

use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU64, Ordering};

use ipnet::Ipv4Net;
use rand::Rng;
use tracing::debug;

use crate::error::{MgmtError, MgmtResult};
use crate::{MESH_NET, MESH_SUBNET_PREFIX};

/// One account's mesh network
#[derive(Debug)]
pub struct Network {
    pub id: String,
    /// The /16 this account allocates peer IPs from
    pub net: Ipv4Net,
    pub dns: String,
    /// Increments by one on any change to the network (new peer, route
    /// update, ...). Clients use it to drop stale snapshots.
    serial: AtomicU64,
}

impl Network {
    /// Creates a network with `serial = 0` on a random /16 inside the mesh
    /// aggregate.
    pub fn new() -> Self {
        let aggregate: Ipv4Net = MESH_NET.parse().expect("mesh aggregate is a valid CIDR");
        let subnets: Vec<Ipv4Net> = aggregate
            .subnets(MESH_SUBNET_PREFIX)
            .expect("subnet prefix is wider than the aggregate")
            .collect();

        let net = subnets[rand::thread_rng().gen_range(0..subnets.len())];
        debug!("created mesh network on {}", net);

        Self {
            id: format!("{:016x}", rand::random::<u64>()),
            net,
            dns: String::new(),
            serial: AtomicU64::new(0),
        }
    }

    /// Reflects a state change by incrementing the serial
    pub fn inc_serial(&self) {
        self.serial.fetch_add(1, Ordering::SeqCst);
    }

    /// Latest state id of the network
    pub fn current_serial(&self) -> u64 {
        self.serial.load(Ordering::SeqCst)
    }

    /// Detached copy of the current network state
    pub fn snapshot(&self) -> Self {
        Self {
            id: self.id.clone(),
            net: self.net,
            dns: self.dns.clone(),
            serial: AtomicU64::new(self.current_serial()),
        }
    }
}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}

/// Picks a free IP from `net` at random.
///
/// The network address, the broadcast address and any address ending in `.0`
/// are never handed out. Gaps left by removed peers are eligible again.
pub fn allocate_peer_ip(net: Ipv4Net, taken: &[Ipv4Addr]) -> MgmtResult<Ipv4Addr> {
    let taken: HashSet<Ipv4Addr> = taken.iter().copied().collect();

    let free: Vec<Ipv4Addr> = net
        .hosts()
        .filter(|ip| ip.octets()[3] != 0)
        .filter(|ip| *ip != net.network() && *ip != net.broadcast())
        .filter(|ip| !taken.contains(ip))
        .collect();

    if free.is_empty() {
        return Err(MgmtError::PreconditionFailed(format!(
            "failed allocating new IP for the network {net} - network is out of IPs"
        )));
    }

    Ok(free[rand::thread_rng().gen_range(0..free.len())])
}
