//! Device controller: owns the tunnel interface handle, the transport
//! binding and the configuration state, and arbitrates shutdown.
//!
//! Exactly one controller exists per process. Construction never fails;
//! everything that can fail happens in the explicit lifecycle operations
//! (`ingest_config`, `activate`) or is deferred and reported operationally
//! (the transport bind). `close` is a one-shot guarded release that is safe
//! to race from the signal path and the internal termination path.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use crate::config::types::{DeviceConfig, PeerInfo};
use crate::config::{parse_directive, Directive};
use crate::error::{ConfigError, Result, TunupError};
use crate::logger::Logger;
use crate::platform::traits::{NetworkManager, TunDevice};

/// What ended the device's life. The orchestrator only uses this for the
/// shutdown log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationEvent {
    /// SIGINT
    Interrupt,
    /// SIGTERM
    Terminate,
    /// Controller-internal fault or operator-triggered stop
    Internal,
}

impl fmt::Display for TerminationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TerminationEvent::Interrupt => "interrupt",
            TerminationEvent::Terminate => "terminate",
            TerminationEvent::Internal => "internal",
        };
        f.write_str(label)
    }
}

/// Controller lifecycle. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DeviceState {
    Constructed = 0,
    Configuring = 1,
    Active = 2,
    Closing = 3,
    Closed = 4,
}

impl DeviceState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => DeviceState::Constructed,
            1 => DeviceState::Configuring,
            2 => DeviceState::Active,
            3 => DeviceState::Closing,
            _ => DeviceState::Closed,
        }
    }
}

/// Default transport binding.
///
/// The socket is not bound at construction; binding happens at activation,
/// and a bind failure surfaces as an operational warning rather than a
/// construction or activation error.
pub struct UdpBind {
    socket: Mutex<Option<UdpSocket>>,
}

impl UdpBind {
    pub fn new_default() -> Self {
        Self {
            socket: Mutex::new(None),
        }
    }

    /// Bind the socket, dual-stack first with an IPv4 fallback.
    pub async fn open(&self, port: u16) -> std::io::Result<SocketAddr> {
        let socket = match UdpSocket::bind((Ipv6Addr::UNSPECIFIED, port)).await {
            Ok(socket) => socket,
            Err(_) => UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port)).await?,
        };
        let addr = socket.local_addr()?;

        *self
            .socket
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(socket);

        Ok(addr)
    }

    fn close(&self) {
        self.socket
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

pub struct Device {
    iface: Mutex<Option<Box<dyn TunDevice>>>,
    bind: UdpBind,
    config: Mutex<DeviceConfig>,
    logger: Logger,
    state: AtomicU8,
    term: CancellationToken,
    closed: AtomicBool,
    iface_name: String,
    iface_index: u32,
}

impl Device {
    /// Construct the controller. Never fails; the interface handle is owned
    /// from here on and released exactly once by `close`.
    pub fn new(iface: Box<dyn TunDevice>, bind: UdpBind, logger: Logger) -> Self {
        let iface_name = iface.name().to_string();
        let iface_index = iface.index();

        Self {
            iface: Mutex::new(Some(iface)),
            bind,
            config: Mutex::new(DeviceConfig::default()),
            logger,
            state: AtomicU8::new(DeviceState::Constructed as u8),
            term: CancellationToken::new(),
            closed: AtomicBool::new(false),
            iface_name,
            iface_index,
        }
    }

    pub fn name(&self) -> &str {
        &self.iface_name
    }

    pub fn iface_index(&self) -> u32 {
        self.iface_index
    }

    pub fn state(&self) -> DeviceState {
        DeviceState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Apply an ordered configuration document.
    ///
    /// Directives are applied one at a time, in document order. The first
    /// directive that fails to parse or apply aborts ingestion; everything
    /// applied before it stays applied. Re-ingesting the same document fails
    /// at the same directive.
    pub fn ingest_config(&self, doc: &str) -> std::result::Result<(), ConfigError> {
        self.set_state(DeviceState::Configuring);

        let mut config = self
            .config
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        for (idx, raw) in doc.lines().enumerate() {
            let text = raw.trim();
            if text.is_empty() {
                continue;
            }
            let line = idx + 1;
            let directive = parse_directive(line, text)?;
            apply_directive(&mut config, line, directive)?;
        }

        Ok(())
    }

    /// Mark the interface administratively up and attempt the transport bind.
    ///
    /// The link operation is fatal on failure; the bind is not.
    pub async fn activate(&self, netmgr: &dyn NetworkManager) -> Result<()> {
        netmgr
            .set_link_up(self.iface_index)
            .await
            .map_err(|e| TunupError::Activation(e.to_string()))?;

        let port = self
            .config
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .listen_port
            .unwrap_or(0);

        match self.bind.open(port).await {
            Ok(addr) => self.logger.verbose(format!("Listening on UDP {}", addr)),
            Err(e) => tracing::warn!("Failed to bind UDP socket: {}", e),
        }

        self.set_state(DeviceState::Active);
        Ok(())
    }

    /// Block until the controller stops itself.
    ///
    /// Completes at most once per process lifetime; every call after the
    /// first completion returns immediately with the same event.
    pub async fn wait_for_termination(&self) -> TerminationEvent {
        self.term.cancelled().await;
        TerminationEvent::Internal
    }

    /// Internal-fault / operator-triggered stop. Only the first call fires.
    pub fn terminate(&self) {
        self.term.cancel();
    }

    /// Release the transport binding and the interface handle.
    ///
    /// Idempotent: the atomic swap latch means that when the signal path and
    /// the internal path race, exactly one caller performs the release and
    /// logs the terminal line; everyone else returns immediately.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.set_state(DeviceState::Closing);
        self.bind.close();
        self.iface
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        // Release anyone still parked in wait_for_termination
        self.term.cancel();
        self.set_state(DeviceState::Closed);
        self.logger.verbose("Interface closed");
    }

    fn set_state(&self, next: DeviceState) {
        let _ = self
            .state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (current != DeviceState::Closed as u8).then_some(next as u8)
            });
    }

    // Observable configuration state, used by the tests that pin down the
    // partial-apply contract.

    pub fn has_private_key(&self) -> bool {
        self.config
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .private_key
            .is_some()
    }

    pub fn listen_port(&self) -> Option<u16> {
        self.config
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .listen_port
    }

    pub fn fwmark(&self) -> Option<u32> {
        self.config
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .fwmark
    }

    pub fn peers(&self) -> Vec<PeerInfo> {
        self.config
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .peers
            .clone()
    }
}

fn apply_directive(
    config: &mut DeviceConfig,
    line: usize,
    directive: Directive,
) -> std::result::Result<(), ConfigError> {
    match directive {
        Directive::PrivateKey(key) => config.private_key = Some(key),
        Directive::ListenPort(port) => config.listen_port = Some(port),
        Directive::Fwmark(mark) => config.fwmark = Some(mark),
        Directive::ReplacePeers => config.peers.clear(),
        Directive::PublicKey(key) => config.peers.push(PeerInfo::new(key)),
        Directive::PresharedKey(psk) => {
            current_peer(config, line, "preshared_key")?.preshared_key = Some(psk);
        }
        Directive::Endpoint(addr) => {
            current_peer(config, line, "endpoint")?.endpoint = Some(addr);
        }
        Directive::AllowedIp(net) => {
            current_peer(config, line, "allowed_ip")?.allowed_ips.push(net);
        }
        Directive::PersistentKeepalive(secs) => {
            current_peer(config, line, "persistent_keepalive_interval")?
                .persistent_keepalive = Some(secs);
        }
        Directive::RemovePeer => {
            current_peer(config, line, "remove")?;
            config.peers.pop();
        }
    }
    Ok(())
}

fn current_peer<'a>(
    config: &'a mut DeviceConfig,
    line: usize,
    key: &'static str,
) -> std::result::Result<&'a mut PeerInfo, ConfigError> {
    config
        .peers
        .last_mut()
        .ok_or(ConfigError::NoCurrentPeer { line, key })
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::prelude::*;
    use std::sync::Arc;
    use std::time::Duration;
    use x25519_dalek::PublicKey;

    use crate::logger::LogLevel;

    struct FakeTun;

    impl TunDevice for FakeTun {
        fn name(&self) -> &str {
            "tun7"
        }

        fn index(&self) -> u32 {
            7
        }

        fn mtu(&self) -> u32 {
            1420
        }
    }

    fn device() -> Device {
        Device::new(
            Box::new(FakeTun),
            UdpBind::new_default(),
            Logger::new(LogLevel::Silent, "tun7"),
        )
    }

    fn key_b64(byte: u8) -> String {
        BASE64_STANDARD.encode([byte; 32])
    }

    #[test]
    fn test_ingest_full_document() {
        let device = device();
        let doc = format!(
            "private_key={}\n\
             listen_port=51820\n\
             fwmark=0x20\n\
             replace_peers=true\n\
             public_key={}\n\
             endpoint=203.0.113.5:51820\n\
             allowed_ip=10.0.0.0/24\n\
             allowed_ip=192.168.1.0/24\n\
             persistent_keepalive_interval=25\n\
             public_key={}\n\
             allowed_ip=10.0.1.1\n",
            key_b64(0x11),
            key_b64(0x22),
            key_b64(0x33),
        );

        device.ingest_config(&doc).unwrap();

        assert!(device.has_private_key());
        assert_eq!(device.listen_port(), Some(51820));
        assert_eq!(device.fwmark(), Some(0x20));

        let peers = device.peers();
        assert_eq!(peers.len(), 2);
        assert_eq!(peers[0].allowed_ips.len(), 2);
        assert_eq!(peers[0].persistent_keepalive, Some(25));
        assert_eq!(peers[1].allowed_ips.len(), 1);
        assert_eq!(peers[1].allowed_ips[0].netmask(), 32);
        assert!(peers[1].endpoint.is_none());
    }

    #[test]
    fn test_partial_apply_without_rollback() {
        let device = device();
        let doc = format!(
            "private_key={}\nlisten_port=not-a-port\nfwmark=5\n",
            key_b64(0x11)
        );

        let err = device.ingest_config(&doc).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { line: 2, key: "listen_port", .. }
        ));

        // d1 applied, d2 not applied, d3 never attempted
        assert!(device.has_private_key());
        assert_eq!(device.listen_port(), None);
        assert_eq!(device.fwmark(), None);
    }

    #[test]
    fn test_repeated_failing_document_fails_at_same_directive() {
        let device = device();
        let doc = format!(
            "listen_port=1234\npublic_key={}\nendpoint=bogus\nfwmark=1\n",
            key_b64(0x22)
        );

        for _ in 0..3 {
            let err = device.ingest_config(&doc).unwrap_err();
            assert!(matches!(
                err,
                ConfigError::InvalidValue { line: 3, key: "endpoint", .. }
            ));
        }

        assert_eq!(device.listen_port(), Some(1234));
        assert_eq!(device.peers().len(), 3);
        assert_eq!(device.fwmark(), None);
    }

    #[test]
    fn test_peer_scoped_directive_without_peer() {
        let device = device();
        let err = device
            .ingest_config("allowed_ip=10.0.0.0/24\n")
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::NoCurrentPeer { line: 1, key: "allowed_ip" }
        ));
    }

    #[test]
    fn test_replace_and_remove_peers() {
        let device = device();
        let doc = format!(
            "public_key={}\npublic_key={}\nremove=true\n",
            key_b64(0x22),
            key_b64(0x33)
        );
        device.ingest_config(&doc).unwrap();

        let peers = device.peers();
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].public_key, PublicKey::from([0x22u8; 32]));

        device.ingest_config("replace_peers=true\n").unwrap();
        assert!(device.peers().is_empty());
    }

    #[test]
    fn test_close_is_idempotent() {
        let device = device();
        device.close();
        assert_eq!(device.state(), DeviceState::Closed);
        device.close();
        device.close();
        assert_eq!(device.state(), DeviceState::Closed);
    }

    #[test]
    fn test_no_transition_leaves_closed() {
        let device = device();
        device.close();
        let _ = device.ingest_config("listen_port=1\n");
        assert_eq!(device.state(), DeviceState::Closed);
    }

    #[tokio::test]
    async fn test_concurrent_close() {
        let device = Arc::new(device());

        let a = {
            let device = device.clone();
            tokio::spawn(async move { device.close() })
        };
        let b = {
            let device = device.clone();
            tokio::spawn(async move { device.close() })
        };

        a.await.unwrap();
        b.await.unwrap();
        assert_eq!(device.state(), DeviceState::Closed);
    }

    #[tokio::test]
    async fn test_wait_returns_once_and_then_immediately() {
        let device = Arc::new(device());

        let waiter = {
            let device = device.clone();
            tokio::spawn(async move { device.wait_for_termination().await })
        };

        device.terminate();
        // A second fire must be harmless
        device.terminate();

        let event = waiter.await.unwrap();
        assert_eq!(event, TerminationEvent::Internal);

        // Subsequent calls return immediately instead of blocking
        let event = tokio::time::timeout(
            Duration::from_millis(100),
            device.wait_for_termination(),
        )
        .await
        .unwrap();
        assert_eq!(event, TerminationEvent::Internal);
    }

    #[tokio::test]
    async fn test_close_releases_waiters() {
        let device = Arc::new(device());

        let waiter = {
            let device = device.clone();
            tokio::spawn(async move { device.wait_for_termination().await })
        };

        device.close();

        let event = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, TerminationEvent::Internal);
    }
}
