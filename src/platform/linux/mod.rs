pub mod netlink;
pub mod tun;

pub use netlink::LinuxNetworkManager;
pub use tun::{create_tun, TunInterface};
