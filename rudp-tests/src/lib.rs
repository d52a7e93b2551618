//! Shared fixtures for the RUDP integration tests

use bytes::Bytes;
use rudp::protocol::packet::{self, Delivery, PacketHeader};
use rudp::protocol::{AckBitfield, RemoteSeq};
use rudp::{Client, EndpointConfig, Network, Server};
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

/// Receive timeout for every test socket, so a lost datagram fails the test
/// instead of hanging it
pub const TEST_READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Short retransmission timeout so resend tests stay fast
pub const TEST_RETRANSMIT_TIMEOUT: Duration = Duration::from_millis(50);

pub fn test_config() -> EndpointConfig {
    EndpointConfig {
        retransmit_timeout: TEST_RETRANSMIT_TIMEOUT,
        read_timeout: Some(TEST_READ_TIMEOUT),
        ..EndpointConfig::default()
    }
}

/// Server on an ephemeral loopback port
pub fn server() -> Server {
    rudp::listen_with_config(Network::Udp4, "127.0.0.1", 0, test_config())
        .expect("failed to bind test server")
}

/// Client connected to `server`
pub fn client_for(server: &Server) -> Client {
    let port = server.local_addr().expect("server closed").port();
    rudp::dial_with_config(Network::Udp4, "127.0.0.1", port, test_config())
        .expect("failed to dial test server")
}

/// A plain UDP socket speaking the wire format by hand
pub struct FakePeer {
    pub socket: UdpSocket,
}

impl FakePeer {
    pub fn new() -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").expect("failed to bind fake peer");
        socket
            .set_read_timeout(Some(TEST_READ_TIMEOUT))
            .expect("failed to set timeout");
        FakePeer { socket }
    }

    pub fn addr(&self) -> SocketAddr {
        self.socket.local_addr().expect("fake peer has no address")
    }

    /// Send a frame built from its parts
    pub fn send_frame(
        &self,
        to: SocketAddr,
        delivery: Delivery,
        ack: RemoteSeq,
        ack_bits: u32,
        payload: &[u8],
    ) {
        let header = PacketHeader::new(delivery, ack, AckBitfield::from_bits(ack_bits));
        self.send_raw(to, &packet::encode(&header, payload));
    }

    pub fn send_raw(&self, to: SocketAddr, bytes: &[u8]) {
        self.socket.send_to(bytes, to).expect("fake peer send failed");
    }

    /// Next datagram, verbatim
    pub fn recv_raw(&self) -> Bytes {
        let mut buf = [0u8; 2048];
        let (n, _) = self.socket.recv_from(&mut buf).expect("fake peer recv failed");
        Bytes::copy_from_slice(&buf[..n])
    }

    /// True if nothing arrives within `wait`
    pub fn is_silent_for(&self, wait: Duration) -> bool {
        let mut buf = [0u8; 2048];
        self.socket
            .set_read_timeout(Some(wait))
            .expect("failed to set timeout");
        let silent = self.socket.recv_from(&mut buf).is_err();
        self.socket
            .set_read_timeout(Some(TEST_READ_TIMEOUT))
            .expect("failed to set timeout");
        silent
    }
}

impl Default for FakePeer {
    fn default() -> Self {
        Self::new()
    }
}
