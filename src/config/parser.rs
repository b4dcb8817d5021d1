use base64::prelude::*;
use ip_network::IpNetwork;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::error::ConfigError;

/// One parsed directive of the configuration protocol.
///
/// The grammar is a flat, ordered sequence of `key=value` lines. Peer-scoped
/// directives apply to the peer opened by the most recent `public_key`.
pub enum Directive {
    PrivateKey(StaticSecret),
    ListenPort(u16),
    Fwmark(u32),
    ReplacePeers,
    PublicKey(PublicKey),
    PresharedKey([u8; 32]),
    Endpoint(SocketAddr),
    AllowedIp(IpNetwork),
    PersistentKeepalive(u16),
    RemovePeer,
}

/// Parse a single non-empty directive line.
pub fn parse_directive(line: usize, text: &str) -> Result<Directive, ConfigError> {
    let (key, value) = text.split_once('=').ok_or_else(|| ConfigError::Malformed {
        line,
        text: text.to_string(),
    })?;
    let key = key.trim();
    let value = value.trim();

    match key {
        "private_key" => Ok(Directive::PrivateKey(StaticSecret::from(decode_key(
            line,
            "private_key",
            value,
        )?))),
        "listen_port" => Ok(Directive::ListenPort(parse_int(line, "listen_port", value)?)),
        "fwmark" => Ok(Directive::Fwmark(parse_fwmark(line, value)?)),
        "replace_peers" => {
            expect_true(line, "replace_peers", value)?;
            Ok(Directive::ReplacePeers)
        }
        "public_key" => Ok(Directive::PublicKey(PublicKey::from(decode_key(
            line,
            "public_key",
            value,
        )?))),
        "preshared_key" => Ok(Directive::PresharedKey(decode_key(
            line,
            "preshared_key",
            value,
        )?)),
        "endpoint" => Ok(Directive::Endpoint(parse_endpoint(line, value)?)),
        "allowed_ip" => Ok(Directive::AllowedIp(parse_allowed_ip(line, value)?)),
        "persistent_keepalive_interval" => Ok(Directive::PersistentKeepalive(parse_int(
            line,
            "persistent_keepalive_interval",
            value,
        )?)),
        "remove" => {
            expect_true(line, "remove", value)?;
            Ok(Directive::RemovePeer)
        }
        _ => Err(ConfigError::UnknownDirective {
            line,
            key: key.to_string(),
        }),
    }
}

/// Decode a base64-encoded 32-byte key
fn decode_key(line: usize, key: &'static str, value: &str) -> Result<[u8; 32], ConfigError> {
    let bytes = BASE64_STANDARD
        .decode(value)
        .map_err(|e| ConfigError::InvalidValue {
            line,
            key,
            reason: format!("invalid base64: {}", e),
        })?;

    bytes.try_into().map_err(|b: Vec<u8>| ConfigError::InvalidValue {
        line,
        key,
        reason: format!("key must be 32 bytes, got {}", b.len()),
    })
}

fn parse_int<T>(line: usize, key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse::<T>().map_err(|e| ConfigError::InvalidValue {
        line,
        key,
        reason: e.to_string(),
    })
}

fn expect_true(line: usize, key: &'static str, value: &str) -> Result<(), ConfigError> {
    if value == "true" {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            line,
            key,
            reason: format!("expected \"true\", got {:?}", value),
        })
    }
}

/// Parse an endpoint (host:port, with IPv6 hosts in brackets)
fn parse_endpoint(line: usize, value: &str) -> Result<SocketAddr, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidValue {
        line,
        key: "endpoint",
        reason,
    };

    if value.starts_with('[') {
        // IPv6 format: [host]:port
        let close_bracket = value
            .find(']')
            .ok_or_else(|| invalid(format!("missing ']' in {:?}", value)))?;
        let colon = value[close_bracket..]
            .find(':')
            .ok_or_else(|| invalid(format!("missing port in {:?}", value)))?;
        let host_str = &value[1..close_bracket];
        let port_str = &value[close_bracket + colon + 1..];

        let host: IpAddr = host_str
            .parse()
            .map_err(|_| invalid(format!("bad address {:?}", host_str)))?;
        let port: u16 = port_str
            .parse()
            .map_err(|_| invalid(format!("bad port {:?}", port_str)))?;

        Ok(SocketAddr::new(host, port))
    } else {
        value
            .parse::<SocketAddr>()
            .map_err(|_| invalid(format!("bad endpoint {:?}", value)))
    }
}

/// Parse an address with optional CIDR suffix (bare addresses get a host mask)
fn parse_allowed_ip(line: usize, value: &str) -> Result<IpNetwork, ConfigError> {
    let invalid = || ConfigError::InvalidValue {
        line,
        key: "allowed_ip",
        reason: format!("bad address {:?}", value),
    };

    if !value.contains('/') {
        let ip: IpAddr = value.parse().map_err(|_| invalid())?;
        let prefix = if ip.is_ipv4() { 32 } else { 128 };
        return IpNetwork::new(ip, prefix).map_err(|_| invalid());
    }

    value.parse::<IpNetwork>().map_err(|_| invalid())
}

/// Parse fwmark (supports decimal and hex with 0x prefix)
fn parse_fwmark(line: usize, value: &str) -> Result<u32, ConfigError> {
    let invalid = |_| ConfigError::InvalidValue {
        line,
        key: "fwmark",
        reason: format!("bad mark {:?}", value),
    };

    if value.starts_with("0x") || value.starts_with("0X") {
        u32::from_str_radix(&value[2..], 16).map_err(invalid)
    } else {
        value.parse::<u32>().map_err(invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_b64(byte: u8) -> String {
        BASE64_STANDARD.encode([byte; 32])
    }

    #[test]
    fn test_parse_private_key() {
        let line = format!("private_key={}", key_b64(0x11));
        assert!(matches!(
            parse_directive(1, &line),
            Ok(Directive::PrivateKey(_))
        ));
    }

    #[test]
    fn test_parse_short_key_rejected() {
        let short = BASE64_STANDARD.encode([0u8; 16]);
        let line = format!("public_key={}", short);
        assert!(matches!(
            parse_directive(3, &line),
            Err(ConfigError::InvalidValue { line: 3, key: "public_key", .. })
        ));
    }

    #[test]
    fn test_parse_endpoint_ipv4() {
        let directive = parse_directive(1, "endpoint=192.168.1.1:51820").unwrap();
        match directive {
            Directive::Endpoint(addr) => assert_eq!(addr.port(), 51820),
            _ => panic!("wrong directive"),
        }
    }

    #[test]
    fn test_parse_endpoint_ipv6() {
        let directive = parse_directive(1, "endpoint=[::1]:51820").unwrap();
        match directive {
            Directive::Endpoint(addr) => {
                assert!(addr.is_ipv6());
                assert_eq!(addr.port(), 51820);
            }
            _ => panic!("wrong directive"),
        }
    }

    #[test]
    fn test_parse_allowed_ip_without_cidr() {
        let directive = parse_directive(1, "allowed_ip=10.0.0.1").unwrap();
        match directive {
            Directive::AllowedIp(net) => assert_eq!(net.netmask(), 32),
            _ => panic!("wrong directive"),
        }
    }

    #[test]
    fn test_parse_fwmark_decimal_and_hex() {
        assert!(matches!(
            parse_directive(1, "fwmark=12345"),
            Ok(Directive::Fwmark(12345))
        ));
        assert!(matches!(
            parse_directive(1, "fwmark=0xCAFE"),
            Ok(Directive::Fwmark(0xCAFE))
        ));
    }

    #[test]
    fn test_unknown_directive() {
        assert!(matches!(
            parse_directive(7, "jumbo_frames=true"),
            Err(ConfigError::UnknownDirective { line: 7, .. })
        ));
    }

    #[test]
    fn test_malformed_line() {
        assert!(matches!(
            parse_directive(2, "no equals sign here"),
            Err(ConfigError::Malformed { line: 2, .. })
        ));
    }

    #[test]
    fn test_replace_peers_requires_true() {
        assert!(parse_directive(1, "replace_peers=true").is_ok());
        assert!(parse_directive(1, "replace_peers=yes").is_err());
    }
}
