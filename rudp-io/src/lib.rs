//! RUDP I/O and Platform Abstraction
//!
//! This crate provides the blocking UDP socket used by RUDP endpoints and
//! small timing helpers for callers that drive retransmission themselves.

pub mod socket;
pub mod time;

pub use socket::{RudpSocket, SocketError, SocketOptions};
pub use time::{millis_since, Timer};
