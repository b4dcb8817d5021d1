//! tunup - control-plane orchestrator for a tunnel interface
//!
//! This library creates a TUN device, feeds it an ordered key/value
//! configuration document, optionally installs addresses and routes on the
//! host network stack, and supervises the device until a termination signal
//! or an internal fault shuts it down.
//!
//! What it deliberately does not contain: packet I/O on the interface and
//! the cryptographic transport engine. Those live behind the
//! [`platform::traits::TunDevice`] boundary and the configuration protocol.
//!
//! # Example
//!
//! ```no_run
//! use tunup::device::{Device, UdpBind};
//! use tunup::logger::{LogLevel, Logger};
//! use tunup::platform::linux::create_tun;
//!
//! let iface = create_tun(Some("wg0"), 1420).unwrap();
//! let logger = Logger::new(LogLevel::Verbose, "wg0");
//! let device = Device::new(Box::new(iface), UdpBind::new_default(), logger);
//! device.ingest_config("listen_port=51820").unwrap();
//! ```

pub mod cli;
pub mod config;
pub mod device;
pub mod error;
pub mod logger;
pub mod netcfg;
pub mod platform;

pub use error::{Result, TunupError};
