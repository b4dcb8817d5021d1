use async_trait::async_trait;
use ip_network::IpNetwork;
use std::net::{IpAddr, Ipv4Addr};

use crate::config::InterfaceAddress;
use crate::error::Result;

/// An IPv4 default route currently installed in the main table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultRoute {
    /// Next hop of the route
    pub gateway: Ipv4Addr,
    /// Output interface of the route
    pub iface_index: u32,
}

/// Platform-agnostic network configuration operations
#[async_trait]
pub trait NetworkManager: Send + Sync {
    /// Add an IP address to the interface
    async fn add_address(&self, iface_index: u32, addr: InterfaceAddress) -> Result<()>;

    /// Add a route through the interface
    async fn add_route(
        &self,
        dest: IpNetwork,
        iface_index: u32,
        gateway: Option<IpAddr>,
    ) -> Result<()>;

    /// Bring interface up
    async fn set_link_up(&self, iface_index: u32) -> Result<()>;

    /// Set interface MTU
    async fn set_mtu(&self, iface_index: u32, mtu: u32) -> Result<()>;

    /// Enumerate the IPv4 default routes currently installed
    async fn default_routes(&self) -> Result<Vec<DefaultRoute>>;
}

/// The provisioned tunnel interface as the device controller sees it.
///
/// Packet I/O is owned by the data-plane engine and is not part of this
/// contract; the controller only needs identity for logging and network
/// configuration, plus ownership so the handle is released exactly once.
pub trait TunDevice: Send + Sync {
    /// OS-assigned name of the interface (may differ from the requested one)
    fn name(&self) -> &str;

    /// Stable interface index used for network configuration
    fn index(&self) -> u32;

    /// Get the MTU
    fn mtu(&self) -> u32;
}
