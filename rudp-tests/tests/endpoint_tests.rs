//! Loopback tests for client and server endpoints
//!
//! Every test runs real sockets on 127.0.0.1. Tests that need to observe the
//! wire use a `FakePeer`, a plain UDP socket that builds frames by hand.

use rudp::protocol::packet::{Delivery, PacketError, RELIABLE_HEADER_SIZE};
use rudp::protocol::{RemoteSeq, SeqNumber};
use rudp::{RudpError, DEFAULT_MAX_DATAGRAM_SIZE};
use rudp_tests::{client_for, server, FakePeer, TEST_RETRANSMIT_TIMEOUT};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn past_timeout() -> Duration {
    TEST_RETRANSMIT_TIMEOUT + Duration::from_millis(30)
}

#[test]
fn test_reliable_round_trip() {
    let server = server();
    let client = client_for(&server);
    let mut buf = [0u8; 64];

    let sent = client.send(b"hello", true).unwrap();
    assert_eq!(sent.len, 5);
    assert_eq!(sent.seq, Some(SeqNumber::new(0)));

    let received = server.receive(&mut buf).unwrap();
    assert_eq!(&buf[..received.len], b"hello");
    assert_eq!(received.seq, Some(SeqNumber::new(0)));
    assert!(received.confirmed.is_empty());
    assert_eq!(received.peer.port(), client.local_addr().unwrap().port());

    // the reply carries the server's receive state back
    server.send_to(b"world", received.peer, false).unwrap();
    let reply = client.receive(&mut buf).unwrap();
    assert_eq!(&buf[..reply.len], b"world");
    assert_eq!(reply.seq, None);
    assert_eq!(reply.confirmed, vec![SeqNumber::new(0)]);
    assert_eq!(client.in_flight(), 0);
    assert_eq!(client.stats().packets_confirmed, 1);
}

#[test]
fn test_sequence_numbers_are_monotonic() {
    let server = server();
    let client = client_for(&server);
    let mut buf = [0u8; 64];

    for i in 0..5u8 {
        client.send(&[i], true).unwrap();
        client.send(&[i], false).unwrap();
    }

    let mut reliable = Vec::new();
    for _ in 0..10 {
        let received = server.receive(&mut buf).unwrap();
        if let Some(seq) = received.seq {
            reliable.push(seq.as_raw());
        }
    }
    assert_eq!(reliable, vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_each_peer_has_its_own_sequence() {
    let server = server();
    let first = client_for(&server);
    let second = client_for(&server);
    let mut buf = [0u8; 64];

    first.send(b"a", true).unwrap();
    second.send(b"b", true).unwrap();
    let a = server.receive(&mut buf).unwrap();
    let b = server.receive(&mut buf).unwrap();
    assert_ne!(a.peer, b.peer);
    assert_eq!(server.peer_count(), 2);

    let to_a = server.send_to(b"x", a.peer, true).unwrap();
    let to_b = server.send_to(b"y", b.peer, true).unwrap();
    assert_eq!(to_a.seq, Some(SeqNumber::new(0)));
    assert_eq!(to_b.seq, Some(SeqNumber::new(0)));
}

#[test]
fn test_send_to_unknown_peer_fails() {
    let server = server();
    let peer = FakePeer::new();

    let err = server.send_to(b"hello", peer.addr(), true).unwrap_err();
    assert!(matches!(err, RudpError::UnknownPeer(addr) if addr == peer.addr()));
    assert!(peer.is_silent_for(Duration::from_millis(50)));
}

#[test]
fn test_malformed_datagrams_are_protocol_errors() {
    let server = server();
    let peer = FakePeer::new();
    let to = server.local_addr().unwrap();
    let mut buf = [0xAAu8; 64];

    peer.send_raw(to, &[7, 0, 0, 0, 0, 0, 0, 0, 0]);
    let err = server.receive(&mut buf).unwrap_err();
    assert!(matches!(err, RudpError::Protocol(PacketError::InvalidFlag(7))));
    assert!(err.is_recoverable());
    assert!(buf.iter().all(|&b| b == 0xAA));

    peer.send_raw(to, &[1, 0, 0]);
    let err = server.receive(&mut buf).unwrap_err();
    assert!(matches!(err, RudpError::Protocol(PacketError::Truncated { .. })));

    // garbage from an unknown address leaves no connection behind
    assert!(server.peers().is_empty());

    // the endpoint keeps working afterwards
    peer.send_frame(to, Delivery::Reliable(SeqNumber::new(0)), RemoteSeq::Unset, 0, b"ok");
    let received = server.receive(&mut buf).unwrap();
    assert_eq!(&buf[..received.len], b"ok");
    assert_eq!(server.peers(), vec![peer.addr()]);

    // once known, the peer's malformed datagrams count against its connection
    peer.send_raw(to, &[9]);
    let err = server.receive(&mut buf).unwrap_err();
    assert!(matches!(err, RudpError::Protocol(PacketError::InvalidFlag(9))));
    let stats = server.connection_stats(peer.addr()).unwrap();
    assert_eq!(stats.protocol_errors, 1);
    assert_eq!(stats.packets_received, 1);
}

#[test]
fn test_oversized_send_is_rejected() {
    let server = server();
    let client = client_for(&server);
    let mut buf = [0u8; 64];

    let err = client.send(&[0x5A; 3000], true).unwrap_err();
    assert!(matches!(
        err,
        RudpError::Protocol(PacketError::Oversized {
            size: 3013,
            limit: DEFAULT_MAX_DATAGRAM_SIZE
        })
    ));
    assert!(err.is_recoverable());
    assert_eq!(client.in_flight(), 0);

    // nothing was written and no sequence number was used up
    let sent = client.send(b"small", true).unwrap();
    assert_eq!(sent.seq, Some(SeqNumber::new(0)));
    let received = server.receive(&mut buf).unwrap();
    assert_eq!(&buf[..received.len], b"small");
    assert_eq!(received.seq, Some(SeqNumber::new(0)));

    assert!(matches!(
        server.send_to(&[0; 3000], received.peer, false),
        Err(RudpError::Protocol(PacketError::Oversized { .. }))
    ));
}

#[test]
fn test_oversized_datagram_is_never_delivered() {
    let server = server();
    let peer = FakePeer::new();
    let to = server.local_addr().unwrap();
    let mut buf = [0u8; 4096];
    let big = vec![0x5Au8; 3000];

    peer.send_frame(to, Delivery::Reliable(SeqNumber::new(0)), RemoteSeq::Unset, 0, &big);
    let err = server.receive(&mut buf).unwrap_err();
    assert!(matches!(
        err,
        RudpError::Protocol(PacketError::Oversized {
            limit: DEFAULT_MAX_DATAGRAM_SIZE,
            ..
        })
    ));
    assert!(err.is_recoverable());
    assert!(server.peers().is_empty());

    peer.send_frame(to, Delivery::Reliable(SeqNumber::new(0)), RemoteSeq::Unset, 0, b"ok");
    server.receive(&mut buf).unwrap();

    // a known peer's oversized datagram is not acknowledged either
    peer.send_frame(to, Delivery::Reliable(SeqNumber::new(1)), RemoteSeq::Unset, 0, &big);
    assert!(matches!(
        server.receive(&mut buf),
        Err(RudpError::Protocol(PacketError::Oversized { .. }))
    ));
    assert_eq!(server.connection_stats(peer.addr()).unwrap().packets_received, 1);

    server.send_to(b"", peer.addr(), false).unwrap();
    let reply = peer.recv_raw();
    assert_eq!(&reply[1..5], &0u32.to_be_bytes());
    assert_eq!(&reply[5..9], &0u32.to_be_bytes());
}

#[test]
fn test_short_buffer_is_redelivered() {
    let server = server();
    let client = client_for(&server);
    let payload = vec![0x5Au8; 100];

    client.send(&payload, true).unwrap();

    let mut small = [0u8; 10];
    let err = server.receive(&mut small).unwrap_err();
    assert!(matches!(
        err,
        RudpError::Capacity {
            needed: 100,
            available: 10
        }
    ));

    let mut big = [0u8; 200];
    let received = server.receive(&mut big).unwrap();
    assert_eq!(received.len, 100);
    assert_eq!(&big[..100], payload.as_slice());
    assert_eq!(received.seq, Some(SeqNumber::new(0)));
    assert_eq!(server.connection_stats(received.peer).unwrap().packets_received, 1);
}

#[test]
fn test_unconfirmed_packet_is_resent_by_tick() {
    let server = server();
    let peer = FakePeer::new();
    let to = server.local_addr().unwrap();
    let mut buf = [0u8; 64];

    peer.send_frame(to, Delivery::Unreliable, RemoteSeq::Unset, 0, b"hi");
    server.receive(&mut buf).unwrap();

    server.send_to(b"data", peer.addr(), true).unwrap();
    let original = peer.recv_raw();
    assert_eq!(original.len(), RELIABLE_HEADER_SIZE + 4);

    assert_eq!(server.tick().unwrap(), 0);
    thread::sleep(past_timeout());
    assert_eq!(server.tick().unwrap(), 1);
    assert_eq!(peer.recv_raw(), original);
    assert_eq!(
        server.connection_stats(peer.addr()).unwrap().packets_retransmitted,
        1
    );
}

#[test]
fn test_unconfirmed_packet_is_resent_on_receive() {
    let server = server();
    let peer = FakePeer::new();
    let to = server.local_addr().unwrap();
    let mut buf = [0u8; 64];

    peer.send_frame(to, Delivery::Unreliable, RemoteSeq::Unset, 0, b"hi");
    server.receive(&mut buf).unwrap();
    server.send_to(b"data", peer.addr(), true).unwrap();
    let original = peer.recv_raw();

    thread::sleep(past_timeout());

    // no acknowledgment yet, so any inbound traffic triggers the resend
    peer.send_frame(to, Delivery::Unreliable, RemoteSeq::Unset, 0, b"again");
    let received = server.receive(&mut buf).unwrap();
    assert!(received.confirmed.is_empty());
    assert_eq!(peer.recv_raw(), original);
}

#[test]
fn test_confirmed_packet_is_not_resent() {
    let server = server();
    let peer = FakePeer::new();
    let to = server.local_addr().unwrap();
    let mut buf = [0u8; 64];

    peer.send_frame(to, Delivery::Unreliable, RemoteSeq::Unset, 0, b"hi");
    server.receive(&mut buf).unwrap();
    for payload in [b"zero", b"one_", b"two_"] {
        server.send_to(payload, peer.addr(), true).unwrap();
        peer.recv_raw();
    }

    // acknowledge 2 directly and 0 through bit 1
    peer.send_frame(to, Delivery::Unreliable, RemoteSeq::Seen(SeqNumber::new(2)), 0b10, b"ack");
    let mut confirmed = server.receive(&mut buf).unwrap().confirmed;
    confirmed.sort_by_key(|s| s.as_raw());
    assert_eq!(confirmed, vec![SeqNumber::new(0), SeqNumber::new(2)]);

    thread::sleep(past_timeout());
    assert_eq!(server.tick().unwrap(), 1);
    let resent = peer.recv_raw();
    assert_eq!(&resent[1..5], &1u32.to_be_bytes());
}

#[test]
fn test_echo_confirms_everything() {
    let server = Arc::new(server());
    let client = client_for(&server);

    let echo = {
        let server = Arc::clone(&server);
        thread::spawn(move || {
            let mut buf = [0u8; 64];
            for _ in 0..10 {
                let received = server.receive(&mut buf).unwrap();
                server
                    .send_to(&buf[..received.len], received.peer, true)
                    .unwrap();
            }
        })
    };

    for i in (1..=10u8).rev() {
        client.send(&[i], true).unwrap();
    }

    let mut buf = [0u8; 64];
    let mut confirmed = Vec::new();
    for _ in 0..10 {
        let received = client.receive(&mut buf).unwrap();
        assert_eq!(received.len, 1);
        confirmed.extend(received.confirmed);
    }
    echo.join().unwrap();

    confirmed.sort_by_key(|s| s.as_raw());
    let expected: Vec<SeqNumber> = (0..10).map(SeqNumber::new).collect();
    assert_eq!(confirmed, expected);
    assert_eq!(client.in_flight(), 0);
}

#[test]
fn test_idle_peers_are_evicted() {
    let server = server();
    let client = client_for(&server);
    let mut buf = [0u8; 64];

    client.send(b"hello", false).unwrap();
    let peer = server.receive(&mut buf).unwrap().peer;

    assert!(server.evict_idle(Duration::from_secs(60)).is_empty());
    thread::sleep(Duration::from_millis(30));
    assert_eq!(server.evict_idle(Duration::from_millis(10)), vec![peer]);
    assert!(server.peers().is_empty());
    assert!(matches!(
        server.send_to(b"x", peer, true),
        Err(RudpError::UnknownPeer(_))
    ));

    // a new datagram starts a fresh connection
    client.send(b"back", true).unwrap();
    server.receive(&mut buf).unwrap();
    assert_eq!(server.peers(), vec![peer]);
    assert_eq!(server.connection_stats(peer).unwrap().packets_received, 1);
}

#[test]
fn test_remove_peer() {
    let server = server();
    let client = client_for(&server);
    let mut buf = [0u8; 64];

    client.send(b"hello", true).unwrap();
    let peer = server.receive(&mut buf).unwrap().peer;

    assert!(server.remove_peer(peer));
    assert!(!server.remove_peer(peer));
    assert!(server.connection_stats(peer).is_none());
}

#[test]
fn test_operations_after_close() {
    let server = server();
    let client = client_for(&server);
    let mut buf = [0u8; 64];

    client.send(b"hello", true).unwrap();
    let peer = server.receive(&mut buf).unwrap().peer;

    client.close().unwrap();
    client.close().unwrap();
    assert!(!client.is_active());
    assert!(matches!(client.send(b"x", false), Err(RudpError::Closed)));
    assert!(matches!(client.receive(&mut buf), Err(RudpError::Closed)));

    server.close().unwrap();
    assert!(!server.is_active());
    assert!(matches!(server.send_to(b"x", peer, true), Err(RudpError::Closed)));
    assert!(matches!(server.receive(&mut buf), Err(RudpError::Closed)));
    assert!(matches!(server.tick(), Err(RudpError::Closed)));
}

#[test]
fn test_read_timeout_surfaces_as_timeout() {
    let server = server();
    server
        .set_read_timeout(Some(Duration::from_millis(20)))
        .unwrap();

    let mut buf = [0u8; 16];
    let err = server.receive(&mut buf).unwrap_err();
    assert!(err.is_timeout());
    assert!(server.is_active());
}
