//! A pure Rust iSCSI initiator transport layer
//!
//! This library provides the PDU-exchange core of an iSCSI initiator:
//! bounded-time TCP connection establishment and sending/receiving of
//! Protocol Data Units with per-call deadlines, partial-I/O recovery,
//! and byte-exact wire framing per RFC 3720. The login state machine and
//! SCSI command mapping sit above this crate; they supply headers and
//! consume the returned byte counts.
//!
//! Every operation either completes, times out, or fails with a
//! distinguishable error kind ([`TransportError`]) so callers can decide
//! between retry and abandon. After any send/receive failure the
//! connection must be treated as unusable and reconnected.
//!
//! # Example
//!
//! ```no_run
//! use iscsi_transport::pdu::opcode;
//! use iscsi_transport::{BasicHeader, DigestType, Session};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut session = Session::new(&[192, 168, 1, 100], 3260);
//! session.set_login_timeout(15);
//! session.connect()?;
//!
//! // Ping the target with a NOP-Out and read the NOP-In back
//! let mut ping = BasicHeader::new();
//! ping.set_opcode(opcode::NOP_OUT);
//! ping.set_immediate(true);
//! session.send_pdu(&ping, DigestType::None, &[], DigestType::None, 10)?;
//!
//! let mut reply = BasicHeader::new();
//! let mut buf = vec![0u8; 8192];
//! let n = session.recv_pdu(&mut reply, DigestType::None, &mut buf, DigestType::None, 10)?;
//! println!("received {} ({} bytes)", reply.opcode_name(), n);
//!
//! session.disconnect();
//! # Ok(())
//! # }
//! ```

pub mod deadline;
pub mod error;
pub mod pdu;
pub mod session;

mod trace;
mod transport;

pub use deadline::Deadline;
pub use error::{TransportError, TransportResult};
pub use pdu::{BasicHeader, BHS_SIZE};
pub use session::{DigestType, Session};

/// Version of this library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
