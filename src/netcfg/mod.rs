//! Best-effort network configuration applied once the device is up.
//!
//! Every sub-operation here is fire-and-forget: a route-table quirk must
//! never stop the tunnel from starting, so failures are logged at warn and
//! the remaining operations still run. The operator can remediate
//! externally.

use ip_network::IpNetwork;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::config::InterfaceAddress;
use crate::platform::traits::{DefaultRoute, NetworkManager};

/// Static address/route configuration from the six-operand CLI form.
#[derive(Debug, Clone)]
pub struct NetworkConfigSet {
    pub mtu: u32,
    pub addresses: Vec<InterfaceAddress>,
    /// Remote tunnel endpoint, pinned outside the tunnel before the default
    /// routes move
    pub endpoint: Ipv4Addr,
}

/// A /32 route pinning the tunnel endpoint to a pre-existing gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostRoute {
    pub dest: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub iface_index: u32,
}

/// For every default route currently installed, derive a host route sending
/// the remote endpoint through that route's gateway. Installed before the
/// tunnel's own default routes so handshake traffic never loops through the
/// tunnel.
pub fn endpoint_host_routes(defaults: &[DefaultRoute], endpoint: Ipv4Addr) -> Vec<HostRoute> {
    defaults
        .iter()
        .map(|route| HostRoute {
            dest: endpoint,
            gateway: route.gateway,
            iface_index: route.iface_index,
        })
        .collect()
}

/// Apply the set, one independent sub-operation at a time.
pub async fn apply(netmgr: &dyn NetworkManager, iface_index: u32, set: &NetworkConfigSet) {
    if let Err(e) = netmgr.set_mtu(iface_index, set.mtu).await {
        tracing::warn!("Failed to set MTU: {}", e);
    }

    for addr in &set.addresses {
        if let Err(e) = netmgr.add_address(iface_index, *addr).await {
            tracing::warn!("Failed to add address {}: {}", addr, e);
        }
    }

    // Pin the endpoint through the existing gateways before the new default
    // routes shadow them.
    match netmgr.default_routes().await {
        Ok(defaults) => {
            for host_route in endpoint_host_routes(&defaults, set.endpoint) {
                let dest = match IpNetwork::new(IpAddr::V4(host_route.dest), 32) {
                    Ok(dest) => dest,
                    Err(_) => continue,
                };
                if let Err(e) = netmgr
                    .add_route(
                        dest,
                        host_route.iface_index,
                        Some(IpAddr::V4(host_route.gateway)),
                    )
                    .await
                {
                    tracing::warn!(
                        "Failed to add host route {} via {}: {}",
                        host_route.dest,
                        host_route.gateway,
                        e
                    );
                }
            }
        }
        Err(e) => tracing::warn!("Failed to query default routes: {}", e),
    }

    for default in [
        IpNetwork::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        IpNetwork::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
    ]
    .into_iter()
    .flatten()
    {
        if let Err(e) = netmgr.add_route(default, iface_index, None).await {
            tracing::warn!("Failed to add default route {}: {}", default, e);
        }
    }
}
