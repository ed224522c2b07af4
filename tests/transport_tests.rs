//! Integration tests for the initiator transport
//!
//! Each test spawns an in-process target thread on a loopback listener
//! and drives the public API against real sockets:
//! - connect classification (success, refused, window override)
//! - receive framing (header-only, payload, padding, bounds, AHS)
//! - send framing (round trip through an echo target)
//! - deadline behaviour and disconnect idempotence

use iscsi_transport::pdu::{opcode, BasicHeader, BHS_SIZE};
use iscsi_transport::{DigestType, Session, TransportError};
use once_cell::sync::Lazy;
use std::io::{Read, Write};
use std::net::{IpAddr, SocketAddr, TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

static LOGGER: Lazy<()> = Lazy::new(|| {
    let _ = env_logger::builder().is_test(true).try_init();
});

fn init_logging() {
    Lazy::force(&LOGGER);
}

// ============================================================================
// Loopback target harness
// ============================================================================

/// Bind a loopback listener and run `serve` on the first accepted
/// connection in a target thread.
fn spawn_target<F>(serve: F) -> (SocketAddr, thread::JoinHandle<()>)
where
    F: FnOnce(TcpStream) + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback listener");
    let addr = listener.local_addr().expect("listener local addr");
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept initiator connection");
        serve(stream);
    });
    (addr, handle)
}

fn connect_to(addr: SocketAddr) -> Session {
    let ip = match addr.ip() {
        IpAddr::V4(ip) => ip.octets(),
        IpAddr::V6(_) => unreachable!("harness binds IPv4 only"),
    };
    let mut session = Session::new(&ip, addr.port());
    session.set_login_timeout(5);
    session.connect().expect("connect to loopback target");
    session
}

/// Wire bytes for a header-only response PDU
fn header_bytes(op: u8, dlength: u32) -> [u8; BHS_SIZE] {
    let mut header = BasicHeader::new();
    header.set_opcode(op);
    header.set_data_length(dlength);
    *header.as_bytes()
}

// ============================================================================
// Connect / disconnect
// ============================================================================

#[test]
fn test_connect_and_disconnect_idempotent() {
    init_logging();
    let (addr, target) = spawn_target(|mut stream| {
        // Hold the connection until the initiator hangs up
        let mut buf = [0u8; 16];
        while stream.read(&mut buf).map(|n| n > 0).unwrap_or(false) {}
    });

    let mut session = connect_to(addr);
    assert!(session.is_connected());

    session.disconnect();
    assert!(!session.is_connected());
    // Second disconnect must be a no-op, not an error
    session.disconnect();
    assert!(!session.is_connected());

    let header = BasicHeader::new();
    let result = session.send_pdu(&header, DigestType::None, &[], DigestType::None, 1);
    assert!(matches!(result, Err(TransportError::NotConnected)));

    target.join().unwrap();
}

#[test]
fn test_connect_refused_is_not_timeout() {
    init_logging();
    // Grab a port that nothing is listening on
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };

    let mut session = Session::new(&[127, 0, 0, 1], addr.port());
    session.set_login_timeout(5);
    match session.connect() {
        Err(TransportError::Socket(_)) => {}
        other => panic!("expected Socket error for refused connect, got {:?}", other.err()),
    }
    assert!(!session.is_connected());
}

#[test]
fn test_connect_with_window_override() {
    init_logging();
    let (addr, target) = spawn_target(|mut stream| {
        let mut buf = [0u8; 16];
        while stream.read(&mut buf).map(|n| n > 0).unwrap_or(false) {}
    });

    let ip = match addr.ip() {
        IpAddr::V4(ip) => ip.octets(),
        IpAddr::V6(_) => unreachable!(),
    };
    let mut session = Session::new(&ip, addr.port());
    session.set_login_timeout(5);
    // Best effort: an odd window request must never fail the connect
    session.set_tcp_window_size(256 * 1024);
    session.connect().expect("connect with window override");
    assert!(session.is_connected());

    session.disconnect();
    target.join().unwrap();
}

// ============================================================================
// Receive framing
// ============================================================================

#[test]
fn test_recv_header_only_leaves_buffer_zeroed() {
    init_logging();
    let (addr, target) = spawn_target(|mut stream| {
        stream
            .write_all(&header_bytes(opcode::NOP_IN, 0))
            .unwrap();
    });

    let mut session = connect_to(addr);
    let mut header = BasicHeader::new();
    let mut buf = [0xAAu8; 128];
    let n = session
        .recv_pdu(&mut header, DigestType::None, &mut buf, DigestType::None, 5)
        .unwrap();

    assert_eq!(n, BHS_SIZE);
    assert_eq!(header.opcode(), opcode::NOP_IN);
    assert!(buf.iter().all(|&b| b == 0), "payload buffer must be zero-filled");

    session.disconnect();
    target.join().unwrap();
}

#[test]
fn test_recv_with_payload_preserves_raw_opcode_byte() {
    // Concrete vector: raw byte 0 = 0x43 (login request 0x03 with the
    // immediate bit), dlength 16, no padding.
    init_logging();
    let payload: Vec<u8> = (0u8..16).collect();
    let wire_payload = payload.clone();
    let (addr, target) = spawn_target(move |mut stream| {
        let mut wire = header_bytes(opcode::LOGIN_REQUEST, 16).to_vec();
        wire[0] = 0x43;
        wire.extend_from_slice(&wire_payload);
        stream.write_all(&wire).unwrap();
    });

    let mut session = connect_to(addr);
    let mut header = BasicHeader::new();
    let mut buf = [0u8; 8192];
    let n = session
        .recv_pdu(&mut header, DigestType::None, &mut buf, DigestType::None, 5)
        .unwrap();

    assert_eq!(n, BHS_SIZE + 16);
    assert_eq!(header.as_bytes()[0], 0x43, "raw opcode byte preserved bit-exact");
    assert_eq!(header.opcode(), opcode::LOGIN_REQUEST);
    assert!(header.immediate());
    assert_eq!(header.data_length(), 16);
    assert_eq!(&buf[..16], &payload[..]);
    assert!(buf[16..].iter().all(|&b| b == 0));

    session.disconnect();
    target.join().unwrap();
}

#[test]
fn test_recv_consumes_exactly_payload_plus_padding() {
    // A 5-byte data segment carries 3 pad bytes; the next PDU must start
    // right after them.
    init_logging();
    let (addr, target) = spawn_target(|mut stream| {
        let mut wire = header_bytes(opcode::TEXT_RESPONSE, 5).to_vec();
        wire.extend_from_slice(b"hello");
        wire.extend_from_slice(&[0, 0, 0]);
        wire.extend_from_slice(&header_bytes(opcode::NOP_IN, 0));
        stream.write_all(&wire).unwrap();
    });

    let mut session = connect_to(addr);
    let mut header = BasicHeader::new();
    let mut buf = [0u8; 64];

    let n = session
        .recv_pdu(&mut header, DigestType::None, &mut buf, DigestType::None, 5)
        .unwrap();
    assert_eq!(n, BHS_SIZE + 5);
    assert_eq!(&buf[..5], b"hello");

    let n = session
        .recv_pdu(&mut header, DigestType::None, &mut buf, DigestType::None, 5)
        .unwrap();
    assert_eq!(n, BHS_SIZE, "pad bytes must not bleed into the next PDU");
    assert_eq!(header.opcode(), opcode::NOP_IN);

    session.disconnect();
    target.join().unwrap();
}

#[test]
fn test_recv_buffer_too_small() {
    init_logging();
    let (addr, target) = spawn_target(|mut stream| {
        // Header only; the initiator must fail before reading payload
        let _ = stream.write_all(&header_bytes(opcode::SCSI_DATA_IN, 64));
    });

    let mut session = connect_to(addr);
    let mut header = BasicHeader::new();
    let mut buf = [0u8; 64];
    let result = session.recv_pdu(&mut header, DigestType::None, &mut buf, DigestType::None, 5);

    // dlength equal to the capacity already fails: the payload end must
    // stay strictly below the buffer capacity
    assert!(matches!(
        result,
        Err(TransportError::BufferTooSmall {
            capacity: 64,
            dlength: 64
        })
    ));

    session.disconnect();
    target.join().unwrap();
}

#[test]
fn test_recv_largest_payload_that_fits() {
    // dlength one below the buffer capacity is the largest data segment
    // that must still succeed.
    init_logging();
    let payload: Vec<u8> = (0u8..63).collect();
    let wire_payload = payload.clone();
    let (addr, target) = spawn_target(move |mut stream| {
        let mut wire = header_bytes(opcode::SCSI_DATA_IN, 63).to_vec();
        wire.extend_from_slice(&wire_payload);
        wire.push(0); // pad to 64
        stream.write_all(&wire).unwrap();
    });

    let mut session = connect_to(addr);
    let mut header = BasicHeader::new();
    let mut buf = [0u8; 64];
    let n = session
        .recv_pdu(&mut header, DigestType::None, &mut buf, DigestType::None, 5)
        .unwrap();

    assert_eq!(n, BHS_SIZE + 63);
    assert_eq!(&buf[..63], &payload[..]);
    assert_eq!(buf[63], 0, "pad byte must never land in the data buffer");

    session.disconnect();
    target.join().unwrap();
}

#[test]
fn test_recv_rejects_additional_header_segment() {
    init_logging();
    let (addr, target) = spawn_target(|mut stream| {
        let mut header = BasicHeader::new();
        header.set_opcode(opcode::LOGIN_RESPONSE);
        header.set_ahs_length(1);
        header.set_data_length(16);
        let _ = stream.write_all(header.as_bytes());
        // No payload follows; a correct initiator fails immediately
        // instead of blocking for the declared 16 data bytes.
    });

    let mut session = connect_to(addr);
    let mut header = BasicHeader::new();
    let mut buf = [0u8; 128];
    let result = session.recv_pdu(&mut header, DigestType::None, &mut buf, DigestType::None, 2);

    assert!(matches!(
        result,
        Err(TransportError::AhsNotSupported { words: 1 })
    ));

    session.disconnect();
    target.join().unwrap();
}

#[test]
fn test_recv_peer_close_mid_header() {
    init_logging();
    let (addr, target) = spawn_target(|mut stream| {
        stream.write_all(&[0u8; 20]).unwrap();
        // Drop closes the connection with 28 header bytes outstanding
    });

    let mut session = connect_to(addr);
    let mut header = BasicHeader::new();
    let mut buf = [0u8; 64];
    let result = session.recv_pdu(&mut header, DigestType::None, &mut buf, DigestType::None, 5);

    assert!(matches!(result, Err(TransportError::PeerClosed)));

    session.disconnect();
    target.join().unwrap();
}

#[test]
fn test_recv_times_out_on_short_header() {
    init_logging();
    let (addr, target) = spawn_target(|mut stream| {
        stream.write_all(&[0u8; 10]).unwrap();
        // Keep the connection open past the initiator's deadline
        thread::sleep(Duration::from_millis(2500));
    });

    let mut session = connect_to(addr);
    let mut header = BasicHeader::new();
    let mut buf = [0u8; 64];
    let started = Instant::now();
    let result = session.recv_pdu(&mut header, DigestType::None, &mut buf, DigestType::None, 1);
    let elapsed = started.elapsed();

    assert!(matches!(result, Err(TransportError::Timeout)));
    assert!(elapsed >= Duration::from_millis(900), "returned before the deadline");
    assert!(elapsed < Duration::from_secs(5), "blocked well past the deadline");

    session.disconnect();
    target.join().unwrap();

    // Deadlines are per-operation: a fresh one is unaffected by the
    // expired one above.
    let (addr, target) = spawn_target(|mut stream| {
        stream.write_all(&header_bytes(opcode::NOP_IN, 0)).unwrap();
    });
    let mut session = connect_to(addr);
    let n = session
        .recv_pdu(&mut header, DigestType::None, &mut buf, DigestType::None, 5)
        .unwrap();
    assert_eq!(n, BHS_SIZE);

    session.disconnect();
    target.join().unwrap();
}

// ============================================================================
// Send framing
// ============================================================================

#[test]
fn test_send_recv_round_trip_through_echo_target() {
    init_logging();
    let payload = b"InitiatorName=iqn.test\0"; // 23 bytes, 1 pad byte
    let wire_len = BHS_SIZE + payload.len() + 1;

    let (addr, target) = spawn_target(move |mut stream| {
        let mut wire = vec![0u8; wire_len];
        // read_exact proves the initiator sent the pad byte
        stream.read_exact(&mut wire).unwrap();
        stream.write_all(&wire).unwrap();
    });

    let mut session = connect_to(addr);

    let mut request = BasicHeader::new();
    request.set_opcode(opcode::LOGIN_REQUEST);
    request.set_immediate(true);
    request.set_flags(0x87); // transit, CSG 1, NSG 3
    request.set_itt(0xBEEF);
    request.set_data_length(payload.len() as u32);
    request.as_bytes_mut()[24..28].copy_from_slice(&42u32.to_be_bytes()); // CmdSN

    session
        .send_pdu(&request, DigestType::None, payload, DigestType::None, 5)
        .unwrap();

    let mut response = BasicHeader::new();
    let mut buf = [0u8; 256];
    let n = session
        .recv_pdu(&mut response, DigestType::None, &mut buf, DigestType::None, 5)
        .unwrap();

    assert_eq!(n, BHS_SIZE + payload.len());
    assert_eq!(response.as_bytes(), request.as_bytes(), "header must survive bit-identical");
    assert_eq!(&buf[..payload.len()], payload);

    session.disconnect();
    target.join().unwrap();
}

#[test]
fn test_send_header_only_pdu() {
    init_logging();
    let (addr, target) = spawn_target(|mut stream| {
        let mut wire = [0u8; BHS_SIZE];
        stream.read_exact(&mut wire).unwrap();
        assert_eq!(wire[0] & 0x3F, opcode::LOGOUT_REQUEST);
        // Nothing may follow a zero-dlength PDU
        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).unwrap();
        assert!(rest.is_empty());
    });

    let mut session = connect_to(addr);
    let mut header = BasicHeader::new();
    header.set_opcode(opcode::LOGOUT_REQUEST);
    session
        .send_pdu(&header, DigestType::None, &[], DigestType::None, 5)
        .unwrap();

    session.disconnect();
    target.join().unwrap();
}

#[test]
fn test_send_pads_payload_to_word_boundary() {
    init_logging();
    let payload = b"key=value"; // 9 bytes, 3 pad bytes
    let (addr, target) = spawn_target(|mut stream| {
        let mut wire = vec![0u8; BHS_SIZE + 12];
        stream.read_exact(&mut wire).unwrap();
        assert_eq!(&wire[BHS_SIZE..BHS_SIZE + 9], b"key=value");
        assert_eq!(&wire[BHS_SIZE + 9..], &[0, 0, 0]);
    });

    let mut session = connect_to(addr);
    let mut header = BasicHeader::new();
    header.set_opcode(opcode::TEXT_REQUEST);
    header.set_data_length(payload.len() as u32);
    session
        .send_pdu(&header, DigestType::None, payload, DigestType::None, 5)
        .unwrap();

    session.disconnect();
    target.join().unwrap();
}
