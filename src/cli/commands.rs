use std::io;
use std::net::Ipv4Addr;
use std::path::Path;
use tokio::signal::unix::{signal, Signal, SignalKind};

use crate::cli::args::{RunArgs, StaticNetArgs, DEFAULT_MTU};
use crate::config::InterfaceAddress;
use crate::device::{Device, TerminationEvent, UdpBind};
use crate::error::{ConfigError, Result, TunupError};
use crate::logger::{LogLevel, Logger};
use crate::netcfg::{self, NetworkConfigSet};
use crate::platform::linux::{create_tun, LinuxNetworkManager};
use crate::platform::traits::TunDevice;

/// Execute the lifecycle: create the interface, configure it, bring it up,
/// then block until a signal or the controller stops itself.
///
/// Every fatal path logs exactly one error line, prefixed with the best
/// interface name known at that point, before returning the error.
pub async fn cmd_up(args: RunArgs) -> Result<()> {
    let requested_name = args.name.clone().unwrap_or_default();

    // A bad MTU operand is fatal before any interface exists.
    let mtu = match parse_mtu(args.mtu.as_deref()) {
        Ok(mtu) => mtu,
        Err(e) => {
            let logger = Logger::new(LogLevel::Verbose, &requested_name);
            logger.error(format!("Invalid MTU: {}", e));
            return Err(e);
        }
    };

    let created = create_tun(args.name.as_deref(), mtu);

    // The prefix uses the kernel-assigned name when creation succeeded, and
    // falls back to the requested one so a failure line is still labeled.
    let effective_name = match &created {
        Ok(iface) => iface.name().to_string(),
        Err(_) => requested_name,
    };
    let logger = Logger::new(LogLevel::Verbose, &effective_name);
    logger.verbose(format!(
        "Starting tunup version {}",
        env!("CARGO_PKG_VERSION")
    ));

    let iface = match created {
        Ok(iface) => iface,
        Err(e) => {
            logger.error(format!("Failed to create TUN device: {}", e));
            return Err(e);
        }
    };
    let iface_index = iface.index();

    let device = Device::new(Box::new(iface), UdpBind::new_default(), logger.clone());

    if let Some(source) = args.config.as_deref() {
        let result = load_document(source).and_then(|doc| device.ingest_config(&doc));
        if let Err(e) = result {
            logger.error(format!("Failed to configure: {}", e));
            return Err(e.into());
        }
    }

    let netmgr = match LinuxNetworkManager::new().await {
        Ok(netmgr) => netmgr,
        Err(e) => {
            logger.error(format!("Failed to open netlink socket: {}", e));
            return Err(e);
        }
    };

    if let Err(e) = device.activate(&netmgr).await {
        logger.error(format!("Failed to bring up device: {}", e));
        return Err(e);
    }

    if let Some(net) = &args.net {
        let set = match parse_static_net(mtu, net) {
            Ok(set) => set,
            Err(e) => {
                logger.error(format!("Invalid address argument: {}", e));
                return Err(e);
            }
        };
        netcfg::apply(&netmgr, iface_index, &set).await;
    }

    logger.verbose("Device started");

    let (mut sigint, mut sigterm) = match install_signal_handlers() {
        Ok(handlers) => handlers,
        Err(e) => {
            logger.error(format!("Failed to install signal handlers: {}", e));
            return Err(e.into());
        }
    };

    // Rendezvous: first of {SIGINT, SIGTERM, controller-internal stop} wins.
    let event = tokio::select! {
        _ = sigint.recv() => TerminationEvent::Interrupt,
        _ = sigterm.recv() => TerminationEvent::Terminate,
        event = device.wait_for_termination() => event,
    };

    device.close();
    logger.verbose(format!("Shutting down ({})", event));

    Ok(())
}

fn install_signal_handlers() -> io::Result<(Signal, Signal)> {
    let sigint = signal(SignalKind::interrupt())?;
    let sigterm = signal(SignalKind::terminate())?;
    Ok((sigint, sigterm))
}

fn parse_mtu(operand: Option<&str>) -> Result<u32> {
    let Some(operand) = operand else {
        return Ok(DEFAULT_MTU);
    };

    let mtu: u32 = operand
        .parse()
        .map_err(|_| TunupError::InvalidArgument(format!("invalid MTU {:?}", operand)))?;

    if mtu == 0 {
        return Err(TunupError::InvalidArgument(
            "MTU must be positive".to_string(),
        ));
    }

    Ok(mtu)
}

/// The config operand names a file when one exists at that path; otherwise a
/// document can be passed inline.
fn load_document(source: &str) -> std::result::Result<String, ConfigError> {
    let path = Path::new(source);
    if path.exists() {
        return std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: source.to_string(),
            source: e,
        });
    }

    if source.contains('=') {
        return Ok(source.to_string());
    }

    Err(ConfigError::Read {
        path: source.to_string(),
        source: io::Error::new(io::ErrorKind::NotFound, "no such file"),
    })
}

fn parse_static_net(mtu: u32, net: &StaticNetArgs) -> Result<NetworkConfigSet> {
    let ipv4: InterfaceAddress = net.ipv4.parse()?;
    let ipv6: InterfaceAddress = net.ipv6.parse()?;
    let endpoint: Ipv4Addr = net
        .endpoint
        .parse()
        .map_err(|_| TunupError::InvalidArgument(format!("bad endpoint {:?}", net.endpoint)))?;

    Ok(NetworkConfigSet {
        mtu,
        addresses: vec![ipv4, ipv6],
        endpoint,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mtu_default() {
        assert_eq!(parse_mtu(None).unwrap(), DEFAULT_MTU);
    }

    #[test]
    fn test_parse_mtu_explicit() {
        assert_eq!(parse_mtu(Some("1280")).unwrap(), 1280);
    }

    #[test]
    fn test_parse_mtu_zero_rejected() {
        assert!(matches!(
            parse_mtu(Some("0")),
            Err(TunupError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_parse_mtu_garbage_rejected() {
        assert!(matches!(
            parse_mtu(Some("-1")),
            Err(TunupError::InvalidArgument(_))
        ));
        assert!(matches!(
            parse_mtu(Some("fast")),
            Err(TunupError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_load_inline_document() {
        let doc = load_document("listen_port=51820").unwrap();
        assert_eq!(doc, "listen_port=51820");
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            load_document("/nonexistent/wg0.conf"),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_parse_static_net() {
        let net = StaticNetArgs {
            ipv4: "10.0.0.2/24".to_string(),
            ipv6: "fd00::2/64".to_string(),
            endpoint: "203.0.113.5".to_string(),
        };
        let set = parse_static_net(1420, &net).unwrap();
        assert_eq!(set.addresses.len(), 2);
        assert_eq!(set.endpoint, Ipv4Addr::new(203, 0, 113, 5));
    }

    #[test]
    fn test_parse_static_net_bad_endpoint() {
        let net = StaticNetArgs {
            ipv4: "10.0.0.2/24".to_string(),
            ipv6: "fd00::2/64".to_string(),
            endpoint: "not-an-ip".to_string(),
        };
        assert!(matches!(
            parse_static_net(1420, &net),
            Err(TunupError::InvalidArgument(_))
        ));
    }
}
