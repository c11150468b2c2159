use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failures while loading the static route table or ARP cache at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("line {line}: expected {expected} fields, found {found}")]
    FieldCount {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("line {line}: invalid IPv4 address {value:?}")]
    InvalidIpv4 { line: usize, value: String },

    #[error("line {line}: invalid MAC address {value:?}: {reason}")]
    InvalidMac {
        line: usize,
        value: String,
        reason: &'static str,
    },

    #[error("line {line}: no interface named {name:?}")]
    UnknownInterface { line: usize, name: String },
}

#[derive(Debug, Error)]
pub enum TransmitError {
    #[error("output channel for interface {0} is closed")]
    ChannelClosed(String),
}

/// Failures while assembling a `Router`.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("no tokio runtime to run address resolution on: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}
