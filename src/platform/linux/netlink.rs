use async_trait::async_trait;
use futures::TryStreamExt;
use ip_network::IpNetwork;
use netlink_packet_route::route::Nla;
use rtnetlink::{Handle, IpVersion};
use std::net::{IpAddr, Ipv4Addr};

use crate::config::InterfaceAddress;
use crate::error::{NetworkError, Result};
use crate::platform::traits::{DefaultRoute, NetworkManager};

const RT_TABLE_MAIN: u8 = 254;

/// Linux implementation of NetworkManager using netlink
pub struct LinuxNetworkManager {
    handle: Handle,
}

impl LinuxNetworkManager {
    /// Create a new LinuxNetworkManager
    pub async fn new() -> Result<Self> {
        let (connection, handle, _) = rtnetlink::new_connection()
            .map_err(|e| NetworkError::Netlink(e.to_string()))?;

        // Spawn the connection handler
        tokio::spawn(connection);

        Ok(Self { handle })
    }
}

#[async_trait]
impl NetworkManager for LinuxNetworkManager {
    async fn add_address(&self, iface_index: u32, addr: InterfaceAddress) -> Result<()> {
        self.handle
            .address()
            .add(iface_index, addr.ip, addr.prefix)
            .execute()
            .await
            .map_err(|e| NetworkError::AddAddress(e.to_string()))?;

        Ok(())
    }

    async fn add_route(
        &self,
        dest: IpNetwork,
        iface_index: u32,
        gateway: Option<IpAddr>,
    ) -> Result<()> {
        match dest.network_address() {
            IpAddr::V4(ipv4) => {
                let mut route = self
                    .handle
                    .route()
                    .add()
                    .v4()
                    .destination_prefix(ipv4, dest.netmask())
                    .output_interface(iface_index);

                if let Some(IpAddr::V4(gw)) = gateway {
                    route = route.gateway(gw);
                }

                route
                    .execute()
                    .await
                    .map_err(|e| NetworkError::AddRoute(e.to_string()))?;
            }
            IpAddr::V6(ipv6) => {
                let mut route = self
                    .handle
                    .route()
                    .add()
                    .v6()
                    .destination_prefix(ipv6, dest.netmask())
                    .output_interface(iface_index);

                if let Some(IpAddr::V6(gw)) = gateway {
                    route = route.gateway(gw);
                }

                route
                    .execute()
                    .await
                    .map_err(|e| NetworkError::AddRoute(e.to_string()))?;
            }
        }

        Ok(())
    }

    async fn set_link_up(&self, iface_index: u32) -> Result<()> {
        self.handle
            .link()
            .set(iface_index)
            .up()
            .execute()
            .await
            .map_err(|e| NetworkError::SetLinkUp(e.to_string()))?;

        Ok(())
    }

    async fn set_mtu(&self, iface_index: u32, mtu: u32) -> Result<()> {
        self.handle
            .link()
            .set(iface_index)
            .mtu(mtu)
            .execute()
            .await
            .map_err(|e| NetworkError::SetMtu(e.to_string()))?;

        Ok(())
    }

    async fn default_routes(&self) -> Result<Vec<DefaultRoute>> {
        let mut routes = self.handle.route().get(IpVersion::V4).execute();
        let mut defaults = Vec::new();

        while let Some(route) = routes
            .try_next()
            .await
            .map_err(|e| NetworkError::RouteQuery(e.to_string()))?
        {
            if route.header.destination_prefix_length != 0 {
                continue;
            }
            if route.header.table != RT_TABLE_MAIN {
                continue;
            }

            let mut gateway = None;
            let mut oif = None;
            for nla in &route.nlas {
                match nla {
                    Nla::Gateway(bytes) if bytes.len() == 4 => {
                        gateway = Some(Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]));
                    }
                    Nla::Oif(index) => oif = Some(*index),
                    _ => {}
                }
            }

            if let (Some(gateway), Some(iface_index)) = (gateway, oif) {
                defaults.push(DefaultRoute {
                    gateway,
                    iface_index,
                });
            }
        }

        Ok(defaults)
    }
}
