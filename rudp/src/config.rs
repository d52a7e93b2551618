use rudp_io::SocketOptions;
use rudp_protocol::DEFAULT_RETRANSMIT_TIMEOUT;
use std::time::Duration;

/// Default datagram limit; larger frames are refused on send and dropped on receive
pub const DEFAULT_MAX_DATAGRAM_SIZE: usize = 2048;

/// Configuration options shared by clients and servers.
#[derive(Clone, Debug)]
pub struct EndpointConfig {
    /// Age after which an unconfirmed reliable packet is resent.
    pub retransmit_timeout: Duration,
    /// Largest datagram sent or accepted, header included.
    pub max_datagram_size: usize,
    /// How long `receive` blocks before failing with a timeout. None blocks forever.
    pub read_timeout: Option<Duration>,
    /// Kernel send buffer size for the socket. None keeps the OS default.
    pub send_buffer_size: Option<usize>,
    /// Kernel receive buffer size for the socket. None keeps the OS default.
    pub recv_buffer_size: Option<usize>,
}

impl EndpointConfig {
    pub(crate) fn socket_options(&self) -> SocketOptions {
        SocketOptions {
            send_buffer_size: self.send_buffer_size,
            recv_buffer_size: self.recv_buffer_size,
            read_timeout: self.read_timeout,
        }
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            retransmit_timeout: DEFAULT_RETRANSMIT_TIMEOUT,
            max_datagram_size: DEFAULT_MAX_DATAGRAM_SIZE,
            read_timeout: None,
            send_buffer_size: None,
            recv_buffer_size: None,
        }
    }
}
