//! Error types for transport operations
//!
//! Each connect/send/receive failure is surfaced as a distinct variant so
//! that the calling layer can implement differentiated retry policy
//! (e.g. retry on timeout, abandon on peer-close).

use thiserror::Error;

/// Transport-layer failures
///
/// After any error from `send_pdu` or `recv_pdu` the state of the wire is
/// undefined and the session must be abandoned and reconnected; there is
/// no partial-PDU resend.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The per-call deadline elapsed before the operation completed
    #[error("I/O deadline elapsed")]
    Timeout,

    /// The peer closed the connection before the expected bytes arrived
    #[error("connection closed by peer")]
    PeerClosed,

    /// A non-recoverable socket error (anything other than a transient
    /// would-block condition)
    #[error("socket error: {0}")]
    Socket(#[source] std::io::Error),

    /// The header advertised an additional header segment, which this
    /// transport does not support
    #[error("additional header segment length {words} not supported")]
    AhsNotSupported { words: u8 },

    /// The declared data segment would not fit in the supplied buffer
    #[error("buffer size {capacity} too small for data length {dlength}")]
    BufferTooSmall { capacity: usize, dlength: usize },

    /// Socket creation or mandatory option setup failed during connect
    #[error("socket setup failed: {0}")]
    Resource(#[source] std::io::Error),

    /// The session has no open connection
    #[error("session is not connected")]
    NotConnected,
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;
