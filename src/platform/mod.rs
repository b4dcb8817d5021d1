pub mod traits;

#[cfg(target_os = "linux")]
pub mod linux;

pub use traits::{DefaultRoute, NetworkManager, TunDevice};

#[cfg(target_os = "linux")]
pub use linux::{create_tun, LinuxNetworkManager, TunInterface};
