//! RUDP - selective reliability over UDP
//!
//! Every datagram is sent either unreliably (fire and forget) or reliably, in
//! which case it is numbered and resent until the peer confirms it. Receive
//! state is piggybacked on every outgoing datagram, so there are no separate
//! acknowledgment packets.
//!
//! ```no_run
//! use rudp::{dial, Network};
//!
//! # fn main() -> rudp::Result<()> {
//! let client = dial(Network::Udp4, "127.0.0.1", 8000)?;
//! client.send(b"hello", true)?;
//!
//! let mut buf = [0u8; 1500];
//! let received = client.receive(&mut buf)?;
//! println!("{} bytes, confirmed {:?}", received.len, received.confirmed);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod server;

pub use rudp_io as io;
pub use rudp_protocol as protocol;

pub use client::Client;
pub use config::{EndpointConfig, DEFAULT_MAX_DATAGRAM_SIZE};
pub use endpoint::{
    dial, dial_with_config, listen, listen_with_config, resolve, Network, Received, Sent,
};
pub use error::{Result, RudpError};
pub use server::Server;

// Re-export commonly used types
pub use protocol::{ConnectionStats, SeqNumber};
