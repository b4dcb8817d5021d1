pub mod parser;
pub mod types;

pub use parser::{parse_directive, Directive};
pub use types::{DeviceConfig, InterfaceAddress, PeerInfo};
