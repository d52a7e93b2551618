//! Endpoint errors

use rudp_io::SocketError;
use rudp_protocol::{ConnectionError, PacketError};
use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// Errors surfaced by client and server endpoints
#[derive(Error, Debug)]
pub enum RudpError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Protocol error: {0}")]
    Protocol(PacketError),

    #[error("Buffer too small: payload is {needed} bytes, buffer holds {available}")]
    Capacity { needed: usize, available: usize },

    #[error("No connection for peer {0}")]
    UnknownPeer(SocketAddr),

    #[error("Connection is closed")]
    Closed,
}

impl RudpError {
    /// Whether the caller can keep using the endpoint after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RudpError::Protocol(_) | RudpError::Capacity { .. } | RudpError::UnknownPeer(_)
        )
    }

    /// Whether a receive gave up because the read timeout elapsed
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            RudpError::Io(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
        )
    }
}

impl From<PacketError> for RudpError {
    fn from(e: PacketError) -> Self {
        match e {
            PacketError::BufferTooSmall { needed, available } => {
                RudpError::Capacity { needed, available }
            }
            other => RudpError::Protocol(other),
        }
    }
}

impl From<ConnectionError> for RudpError {
    fn from(e: ConnectionError) -> Self {
        match e {
            ConnectionError::Closed => RudpError::Closed,
            ConnectionError::Packet(e) => e.into(),
        }
    }
}

impl From<SocketError> for RudpError {
    fn from(e: SocketError) -> Self {
        match e {
            SocketError::Io(e) => RudpError::Io(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, RudpError>;
