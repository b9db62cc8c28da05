//! Tests for Endpoint
//!
//! These tests verify:
//! - Inbound framing (trim, empty-line discard, ordering)
//! - Outbound ordering and farewell placement
//! - One-shot close and abort
//! - Loop exit reasons (peer close, write failure, server gone)
//! - Idle queries and accessors
//!
//! A `UnixStream` pair serves as the in-memory duplex pipe.

#![cfg(unix)]

use std::io::{BufRead, BufReader, Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::Receiver;
use relayd::network::{inbound_queue, Endpoint, ReadExit, WriteExit};
use relayd::{Config, Message, RelayError};

const TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Helper Functions
// =============================================================================

type Inbound = Receiver<Message<UnixStream>>;

fn setup_endpoint_with(config: Config) -> (Arc<Endpoint<UnixStream>>, UnixStream, Inbound) {
    let (local, peer) = UnixStream::pair().unwrap();
    peer.set_read_timeout(Some(TIMEOUT)).unwrap();

    let (tx, rx) = inbound_queue(Some(16));
    let endpoint = Endpoint::new("alice", local, tx, &config).unwrap();
    (endpoint, peer, rx)
}

fn setup_endpoint() -> (Arc<Endpoint<UnixStream>>, UnixStream, Inbound) {
    setup_endpoint_with(Config::default())
}

fn read_to_end(peer: &mut UnixStream) -> String {
    let mut out = String::new();
    peer.read_to_string(&mut out).unwrap();
    out
}

fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + TIMEOUT;
    while !condition() {
        assert!(Instant::now() < deadline, "Condition not met within {:?}", TIMEOUT);
        thread::sleep(Duration::from_millis(5));
    }
}

// =============================================================================
// Inbound Tests
// =============================================================================

#[test]
fn test_end_to_end_hello_world() {
    let (endpoint, mut peer, inbound) = setup_endpoint();

    peer.write_all(b"hello\n").unwrap();

    let message = inbound.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(message.text(), "hello");
    assert!(Arc::ptr_eq(message.endpoint(), &endpoint));

    endpoint.receive("world\n").unwrap();

    let mut reader = BufReader::new(peer.try_clone().unwrap());
    let mut line = String::new();
    reader.read_line(&mut line).unwrap();
    assert_eq!(line, "world\n");

    endpoint.close("").unwrap();
    endpoint.wait().unwrap();
}

#[test]
fn test_crlf_is_trimmed() {
    let (endpoint, mut peer, inbound) = setup_endpoint();

    peer.write_all(b"NICK bob\r\n").unwrap();

    let message = inbound.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(message.text(), "NICK bob");

    endpoint.abort();
    endpoint.wait().unwrap();
}

#[test]
fn test_empty_lines_are_discarded() {
    let (endpoint, mut peer, inbound) = setup_endpoint();

    peer.write_all(b"\r\n\n\r\nfirst\n\n").unwrap();

    // Order is preserved, so the first message proves the empties were skipped
    let message = inbound.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(message.text(), "first");

    peer.shutdown(Shutdown::Write).unwrap();
    wait_until(|| endpoint.read_finished());
    assert!(inbound.try_recv().is_err());

    endpoint.abort();
    let termination = endpoint.wait().unwrap();
    assert!(matches!(termination.read, ReadExit::PeerClosed));
}

#[test]
fn test_only_empty_lines_produce_nothing() {
    let (endpoint, mut peer, inbound) = setup_endpoint();

    peer.write_all(b"\r\n\n").unwrap();
    peer.shutdown(Shutdown::Write).unwrap();

    wait_until(|| endpoint.read_finished());
    assert!(inbound.try_recv().is_err());

    endpoint.abort();
    endpoint.wait().unwrap();
}

#[test]
fn test_inbound_preserves_line_order() {
    let (endpoint, mut peer, inbound) = setup_endpoint();

    for i in 0..50 {
        peer.write_all(format!("line {}\r\n", i).as_bytes()).unwrap();
    }

    for i in 0..50 {
        let message = inbound.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(message.text(), format!("line {}", i));
    }

    endpoint.abort();
    endpoint.wait().unwrap();
}

#[test]
fn test_partial_line_delivered_on_disconnect() {
    let (endpoint, mut peer, inbound) = setup_endpoint();

    peer.write_all(b"QUIT :bye").unwrap();
    peer.shutdown(Shutdown::Write).unwrap();

    let message = inbound.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(message.text(), "QUIT :bye");

    wait_until(|| endpoint.read_finished());
    endpoint.abort();
    let termination = endpoint.wait().unwrap();
    assert!(matches!(termination.read, ReadExit::PeerClosed));
}

#[test]
fn test_line_too_long_stops_read_loop() {
    let config = Config::builder().max_line_length(16).build().unwrap();
    let (endpoint, mut peer, inbound) = setup_endpoint_with(config);

    peer.write_all(b"short\n").unwrap();
    peer.write_all(&[b'x'; 64]).unwrap();
    peer.write_all(b"\n").unwrap();

    assert_eq!(inbound.recv_timeout(TIMEOUT).unwrap().text(), "short");

    wait_until(|| endpoint.read_finished());
    endpoint.abort();
    let termination = endpoint.wait().unwrap();
    match termination.read {
        ReadExit::Failed(RelayError::LineTooLong { limit }) => assert_eq!(limit, 16),
        other => panic!("Expected LineTooLong, got {:?}", other),
    }
}

#[test]
fn test_backpressure_blocks_read_loop() {
    let (local, mut peer) = UnixStream::pair().unwrap();
    let (tx, inbound) = inbound_queue(Some(1));
    let endpoint = Endpoint::new("alice", local, tx, &Config::default()).unwrap();

    peer.write_all(b"a\nb\nc\n").unwrap();

    // Only one slot: the read loop holds "b" until "a" is consumed
    wait_until(|| inbound.len() == 1);
    thread::sleep(Duration::from_millis(50));
    assert_eq!(inbound.len(), 1);

    let texts: Vec<String> = (0..3)
        .map(|_| inbound.recv_timeout(TIMEOUT).unwrap().text().to_string())
        .collect();
    assert_eq!(texts, vec!["a", "b", "c"]);

    endpoint.abort();
    endpoint.wait().unwrap();
}

#[test]
fn test_server_gone_stops_read_loop() {
    let (endpoint, mut peer, inbound) = setup_endpoint();
    drop(inbound);

    peer.write_all(b"anyone there?\n").unwrap();

    wait_until(|| endpoint.read_finished());
    endpoint.abort();
    let termination = endpoint.wait().unwrap();
    assert!(matches!(termination.read, ReadExit::ServerGone));
}

// =============================================================================
// Outbound Tests
// =============================================================================

#[test]
fn test_receive_preserves_order() {
    let (endpoint, mut peer, _inbound) = setup_endpoint();

    endpoint.receive("A").unwrap();
    endpoint.receive("B").unwrap();
    endpoint.receive("C").unwrap();
    endpoint.close("").unwrap();

    assert_eq!(read_to_end(&mut peer), "ABC");
    endpoint.wait().unwrap();
}

#[test]
fn test_outbound_handle_shares_queue() {
    let (endpoint, mut peer, _inbound) = setup_endpoint();
    let outbound = endpoint.outbound();

    endpoint.receive("1\n").unwrap();
    outbound.send("2\n").unwrap();
    endpoint.receive("3\n").unwrap();
    endpoint.close("").unwrap();

    assert_eq!(read_to_end(&mut peer), "1\n2\n3\n");
    assert!(outbound.is_closed());
    assert!(matches!(outbound.send("late\n"), Err(RelayError::EndpointClosed)));
    endpoint.wait().unwrap();
}

#[test]
fn test_rendezvous_outbound_queue() {
    let config = Config::builder().outbound_capacity(0).build().unwrap();
    let (endpoint, mut peer, _inbound) = setup_endpoint_with(config);

    for i in 0..5 {
        endpoint.receive(format!("{}\n", i)).unwrap();
    }
    endpoint.close("bye\n").unwrap();

    assert_eq!(read_to_end(&mut peer), "0\n1\n2\n3\n4\nbye\n");
    endpoint.wait().unwrap();
}

#[test]
fn test_concurrent_senders_all_delivered() {
    let (endpoint, mut peer, _inbound) = setup_endpoint();

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let endpoint = Arc::clone(&endpoint);
            thread::spawn(move || {
                for i in 0..25 {
                    endpoint.receive(format!("{}-{}\n", t, i)).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    endpoint.close("bye\n").unwrap();

    let output = read_to_end(&mut peer);
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines.len(), 101);
    assert_eq!(lines.last(), Some(&"bye"));

    // Per-sender order survives interleaving
    for t in 0..4 {
        let prefix = format!("{}-", t);
        let seq: Vec<&str> = lines.iter().copied().filter(|l| l.starts_with(&prefix)).collect();
        let expected: Vec<String> = (0..25).map(|i| format!("{}-{}", t, i)).collect();
        assert_eq!(seq, expected);
    }
    endpoint.wait().unwrap();
}

// =============================================================================
// Close Tests
// =============================================================================

#[test]
fn test_farewell_is_last() {
    let (endpoint, mut peer, _inbound) = setup_endpoint();

    endpoint.receive("one\r\n").unwrap();
    endpoint.receive("two\r\n").unwrap();
    endpoint.close("bye").unwrap();

    assert_eq!(read_to_end(&mut peer), "one\r\ntwo\r\nbye");

    let termination = endpoint.wait().unwrap();
    assert!(matches!(termination.write, WriteExit::Drained));
}

#[test]
fn test_single_close() {
    let (endpoint, mut peer, _inbound) = setup_endpoint();

    endpoint.close("bye\n").unwrap();

    assert!(endpoint.is_closed());
    assert!(endpoint.outbound().is_closed());

    // Transport closed: peer sees the farewell, then EOF
    assert_eq!(read_to_end(&mut peer), "bye\n");

    let termination = endpoint.wait().unwrap();
    assert!(matches!(termination.read, ReadExit::Closed));
    assert!(matches!(termination.write, WriteExit::Drained));
    assert!(!endpoint.is_live());
}

#[test]
fn test_second_close_fails() {
    let (endpoint, mut peer, _inbound) = setup_endpoint();

    endpoint.close("bye\n").unwrap();
    let second = endpoint.close("again\n");
    assert!(matches!(second, Err(RelayError::AlreadyClosed)));

    // Nothing from the second close reaches the peer
    assert_eq!(read_to_end(&mut peer), "bye\n");
    endpoint.wait().unwrap();
}

#[test]
fn test_receive_after_close_fails() {
    let (endpoint, _peer, _inbound) = setup_endpoint();

    endpoint.close("bye\n").unwrap();
    let result = endpoint.receive("too late\n");
    assert!(matches!(result, Err(RelayError::EndpointClosed)));
    endpoint.wait().unwrap();
}

#[test]
fn test_close_unblocks_pending_read() {
    let (endpoint, _peer, _inbound) = setup_endpoint();

    // Read loop is parked on the socket with nothing to read
    thread::sleep(Duration::from_millis(20));
    assert!(!endpoint.read_finished());

    endpoint.close("").unwrap();
    wait_until(|| endpoint.read_finished());

    let termination = endpoint.wait().unwrap();
    assert!(matches!(termination.read, ReadExit::Closed));
}

// =============================================================================
// Abort Tests
// =============================================================================

#[test]
fn test_abort_stops_both_loops() {
    let (endpoint, mut peer, _inbound) = setup_endpoint();

    endpoint.abort();
    assert!(endpoint.is_closed());
    assert_eq!(read_to_end(&mut peer), "");

    let termination = endpoint.wait().unwrap();
    assert!(matches!(termination.read, ReadExit::Closed));
    assert!(matches!(termination.write, WriteExit::Drained));
}

#[test]
fn test_abort_is_idempotent_and_blocks_close() {
    let (endpoint, _peer, _inbound) = setup_endpoint();

    endpoint.abort();
    endpoint.abort();
    assert!(matches!(endpoint.close("bye"), Err(RelayError::AlreadyClosed)));
    endpoint.wait().unwrap();
}

#[test]
fn test_wait_twice_fails() {
    let (endpoint, _peer, _inbound) = setup_endpoint();

    endpoint.abort();
    endpoint.wait().unwrap();
    assert!(endpoint.wait().is_err());
}

// =============================================================================
// Write Failure Tests
// =============================================================================

#[test]
fn test_write_failure_tears_down_endpoint() {
    let (endpoint, peer, _inbound) = setup_endpoint();
    drop(peer);

    // The read loop sees EOF; the first write hits a broken pipe
    wait_until(|| endpoint.read_finished());
    let _ = endpoint.receive("into the void\n");

    wait_until(|| !endpoint.is_live());
    assert!(matches!(
        endpoint.receive("again\n"),
        Err(RelayError::EndpointClosed)
    ));

    let termination = endpoint.wait().unwrap();
    assert!(matches!(termination.read, ReadExit::PeerClosed));
    assert!(matches!(termination.write, WriteExit::Failed(_)));
}

// =============================================================================
// Idle & Accessor Tests
// =============================================================================

#[test]
fn test_fresh_endpoint_is_active() {
    let (endpoint, _peer, _inbound) = setup_endpoint();

    assert!(!endpoint.is_idle());
    assert_eq!(endpoint.idle_status(), "active");

    endpoint.abort();
    endpoint.wait().unwrap();
}

#[test]
fn test_zero_threshold_reports_timestamp() {
    let config = Config::builder()
        .idle_threshold(Duration::ZERO)
        .build()
        .unwrap();
    let (endpoint, _peer, _inbound) = setup_endpoint_with(config);

    assert!(endpoint.is_idle());
    let status = endpoint.idle_status();
    assert_ne!(status, "active");
    assert!(chrono::DateTime::parse_from_rfc3339(&status).is_ok());

    endpoint.abort();
    endpoint.wait().unwrap();
}

#[test]
fn test_input_updates_last_activity() {
    let (endpoint, mut peer, inbound) = setup_endpoint();
    let before = endpoint.last_activity();

    thread::sleep(Duration::from_millis(20));
    peer.write_all(b"ping\n").unwrap();
    inbound.recv_timeout(TIMEOUT).unwrap();

    assert!(endpoint.last_activity() > before);

    endpoint.abort();
    endpoint.wait().unwrap();
}

#[test]
fn test_names_are_mutable() {
    let (endpoint, _peer, _inbound) = setup_endpoint();

    assert_eq!(endpoint.nickname(), "alice");
    assert_eq!(endpoint.realname(), "");

    endpoint.set_nickname("alice_");
    endpoint.set_realname("Alice Liddell");
    assert_eq!(endpoint.nickname(), "alice_");
    assert_eq!(endpoint.realname(), "Alice Liddell");

    endpoint.abort();
    endpoint.wait().unwrap();
}

#[test]
fn test_endpoint_ids_are_unique() {
    let (a, _pa, _ia) = setup_endpoint();
    let (b, _pb, _ib) = setup_endpoint();

    assert_ne!(a.id(), b.id());

    a.abort();
    b.abort();
    a.wait().unwrap();
    b.wait().unwrap();
}
