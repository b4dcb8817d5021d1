use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TunupError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("failed to create TUN device: {0}")]
    InterfaceCreation(String),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to bring up device: {0}")]
    Activation(String),

    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// A directive that failed to parse or apply. Directives applied before the
/// failing one stay applied; ingestion stops at the first error.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read { path: String, source: io::Error },

    #[error("line {line}: malformed directive {text:?}")]
    Malformed { line: usize, text: String },

    #[error("line {line}: unknown directive {key:?}")]
    UnknownDirective { line: usize, key: String },

    #[error("line {line}: invalid value for {key}: {reason}")]
    InvalidValue {
        line: usize,
        key: &'static str,
        reason: String,
    },

    #[error("line {line}: {key} outside a peer section")]
    NoCurrentPeer { line: usize, key: &'static str },
}

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("failed to add address: {0}")]
    AddAddress(String),

    #[error("failed to add route: {0}")]
    AddRoute(String),

    #[error("failed to set interface up: {0}")]
    SetLinkUp(String),

    #[error("failed to set MTU: {0}")]
    SetMtu(String),

    #[error("route table query failed: {0}")]
    RouteQuery(String),

    #[error("netlink error: {0}")]
    Netlink(String),
}

pub type Result<T> = std::result::Result<T, TunupError>;
