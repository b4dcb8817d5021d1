use ip_network::IpNetwork;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::error::TunupError;

/// An interface address with prefix length, e.g. `10.0.0.2/24`.
///
/// Distinct from [`IpNetwork`]: an interface address keeps its host bits,
/// a network never has any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceAddress {
    pub ip: IpAddr,
    pub prefix: u8,
}

impl std::fmt::Display for InterfaceAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.ip, self.prefix)
    }
}

impl FromStr for InterfaceAddress {
    type Err = TunupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TunupError::InvalidArgument(format!("bad address {:?}", s));

        let (ip, prefix) = match s.split_once('/') {
            Some((ip, prefix)) => {
                let ip: IpAddr = ip.parse().map_err(|_| invalid())?;
                let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
                (ip, prefix)
            }
            None => {
                let ip: IpAddr = s.parse().map_err(|_| invalid())?;
                let prefix = if ip.is_ipv4() { 32 } else { 128 };
                (ip, prefix)
            }
        };

        let max = if ip.is_ipv4() { 32 } else { 128 };
        if prefix > max {
            return Err(invalid());
        }

        Ok(Self { ip, prefix })
    }
}

/// Interface-wide state built up, directive by directive, during ingestion.
///
/// There is no rollback: whatever a partially ingested document managed to
/// apply before its first failing directive stays applied.
#[derive(Default)]
pub struct DeviceConfig {
    /// Private key for this interface
    pub private_key: Option<StaticSecret>,
    /// UDP listen port (None = random port selection)
    pub listen_port: Option<u16>,
    /// Firewall mark for advanced routing
    pub fwmark: Option<u32>,
    /// Peers in document order; key-scoped directives address the last one
    pub peers: Vec<PeerInfo>,
}

impl std::fmt::Debug for DeviceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceConfig")
            .field("private_key", &self.private_key.as_ref().map(|_| "<set>"))
            .field("listen_port", &self.listen_port)
            .field("fwmark", &self.fwmark)
            .field("peers", &self.peers)
            .finish()
    }
}

/// Per-peer state opened by a `public_key` directive.
#[derive(Debug, Clone)]
pub struct PeerInfo {
    /// Public key of this peer
    pub public_key: PublicKey,
    /// Optional preshared key for additional symmetric encryption
    pub preshared_key: Option<[u8; 32]>,
    /// Remote endpoint (required for initiating connections)
    pub endpoint: Option<SocketAddr>,
    /// IP ranges allowed through this peer
    pub allowed_ips: Vec<IpNetwork>,
    /// Keepalive interval in seconds
    pub persistent_keepalive: Option<u16>,
}

impl PeerInfo {
    pub fn new(public_key: PublicKey) -> Self {
        Self {
            public_key,
            preshared_key: None,
            endpoint: None,
            allowed_ips: Vec::new(),
            persistent_keepalive: None,
        }
    }
}
