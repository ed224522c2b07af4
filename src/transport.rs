//! PDU send and receive primitives
//!
//! Both directions run under a per-call deadline and tolerate partial
//! I/O: every attempt gets the remaining budget as its socket timeout,
//! and a short read or write simply resumes where it left off. The
//! internal step functions classify each syscall outcome directly as
//! progress, timeout, peer-close, or socket error; there is no shared
//! timeout flag to check afterwards.

use crate::deadline::Deadline;
use crate::error::{TransportError, TransportResult};
use crate::pdu::{pad_len, BasicHeader, BHS_SIZE, PAD_WORD_LEN};
use crate::session::{DigestType, Session};
use crate::trace;
use std::io::{self, IoSlice, Read, Write};
use std::net::{SocketAddrV4, TcpStream};

impl Session {
    /// Send one PDU: 48-byte header, then payload plus zero padding to a
    /// 4-byte boundary.
    ///
    /// The header's DataSegmentLength must already reflect the payload;
    /// the first `data_length()` bytes of `data` are transmitted. A
    /// header advertising an additional header segment is refused. The
    /// digest parameters are accepted for negotiation parity but no
    /// digest bytes are computed or inserted here.
    ///
    /// On any error the partially-written PDU leaves the wire in an
    /// undefined state and the connection must be abandoned.
    pub fn send_pdu(
        &mut self,
        header: &BasicHeader,
        _header_digest: DigestType,
        data: &[u8],
        _data_digest: DigestType,
        timeout_seconds: u64,
    ) -> TransportResult<()> {
        let deadline = Deadline::after_secs(timeout_seconds);
        let peer = self.peer_addr();

        // A header advertising an AHS would lie about bytes this
        // transport never writes; refuse before touching the wire.
        let ahs_words = header.ahs_length();
        if ahs_words != 0 {
            log::warn!(
                "additional header segment length {} not supported",
                ahs_words
            );
            return Err(TransportError::AhsNotSupported { words: ahs_words });
        }

        let dlength = header.data_length() as usize;
        if data.len() < dlength {
            return Err(TransportError::BufferTooSmall {
                capacity: data.len(),
                dlength,
            });
        }
        let data = &data[..dlength];

        trace::sending(header, data);
        let stream = self.stream_mut()?;

        // Header phase. TotalAHSLength is always zero on this path, so
        // the header is exactly the 48-byte BHS.
        let hdr = header.as_bytes();
        let mut sent = 0;
        while sent < BHS_SIZE {
            let n = write_step(stream, &deadline, peer, &[IoSlice::new(&hdr[sent..])])?;
            log::debug!("wrote {} bytes of PDU header", n);
            sent += n;
        }

        // Data phase: payload and padding go out as one vectored write
        // per attempt while both remain.
        let pad = pad_len(dlength);
        let padding = [0u8; PAD_WORD_LEN];
        let total = dlength + pad;
        let mut sent = 0;
        while sent < total {
            let n = if sent < dlength {
                write_step(
                    stream,
                    &deadline,
                    peer,
                    &[IoSlice::new(&data[sent..]), IoSlice::new(&padding[..pad])],
                )?
            } else {
                write_step(
                    stream,
                    &deadline,
                    peer,
                    &[IoSlice::new(&padding[sent - dlength..pad])],
                )?
            };
            log::debug!("wrote {} bytes of PDU data", n);
            sent += n;
        }

        Ok(())
    }

    /// Receive one PDU into `header` and `data`.
    ///
    /// `data` is zero-filled before use. Returns the number of header
    /// plus payload bytes stored (padding is read off the wire but never
    /// counted). A header advertising an additional header segment fails
    /// immediately; a data segment that would not fit in `data` fails
    /// before any payload byte is read.
    pub fn recv_pdu(
        &mut self,
        header: &mut BasicHeader,
        _header_digest: DigestType,
        data: &mut [u8],
        _data_digest: DigestType,
        timeout_seconds: u64,
    ) -> TransportResult<usize> {
        let deadline = Deadline::after_secs(timeout_seconds);
        let peer = self.peer_addr();
        let capacity = data.len();
        data.fill(0);

        let stream = self.stream_mut()?;

        // Header phase
        let hdr = header.as_bytes_mut();
        let mut h_bytes = 0;
        while h_bytes < BHS_SIZE {
            let n = read_step(stream, &deadline, peer, &mut hdr[h_bytes..])?;
            log::debug!("read {} bytes of PDU header", n);
            h_bytes += n;
        }
        log::debug!(
            "read {} PDU header bytes, opcode 0x{:02x}, dlength {}, buffer capacity {}",
            h_bytes,
            header.opcode(),
            header.data_length(),
            capacity
        );

        // Additional header segments are not supported; stop before
        // consuming any of the unsupported segment.
        let ahs_words = header.ahs_length();
        if ahs_words != 0 {
            log::warn!(
                "additional header segment length {} not supported",
                ahs_words
            );
            return Err(TransportError::AhsNotSupported { words: ahs_words });
        }

        let dlength = header.data_length() as usize;
        if dlength == 0 {
            trace::received(header, &[]);
            return Ok(BHS_SIZE);
        }

        // The payload end must stay strictly below the buffer capacity
        if dlength >= capacity {
            log::warn!(
                "buffer size {} too small for data length {}",
                capacity,
                dlength
            );
            return Err(TransportError::BufferTooSmall { capacity, dlength });
        }

        // Data phase
        let mut d_bytes = 0;
        while d_bytes < dlength {
            let n = read_step(stream, &deadline, peer, &mut data[d_bytes..dlength])?;
            log::debug!("read {} bytes of PDU data", n);
            d_bytes += n;
        }

        // Discard padding into a scratch buffer, never into `data`
        let pad = pad_len(dlength);
        if pad > 0 {
            let mut scratch = [0u8; PAD_WORD_LEN];
            let mut p_bytes = 0;
            while p_bytes < pad {
                let n = read_step(stream, &deadline, peer, &mut scratch[p_bytes..pad])?;
                log::debug!("read {} pad bytes", n);
                p_bytes += n;
            }
        }

        trace::received(header, &data[..dlength]);
        Ok(BHS_SIZE + dlength)
    }
}

/// One read attempt under the deadline: progress, or a classified
/// failure. Transient would-block results are retried with the budget
/// that remains.
fn read_step(
    stream: &mut TcpStream,
    deadline: &Deadline,
    peer: SocketAddrV4,
    buf: &mut [u8],
) -> TransportResult<usize> {
    loop {
        let budget = deadline.budget().map_err(|e| {
            log::error!("socket read from {} timed out", peer);
            e
        })?;
        stream.set_read_timeout(budget).map_err(TransportError::Socket)?;
        match stream.read(buf) {
            Ok(0) => {
                log::error!("connection to {} closed", peer);
                return Err(TransportError::PeerClosed);
            }
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::TimedOut =>
            {
                if deadline.expired() {
                    log::error!("socket read from {} timed out", peer);
                    return Err(TransportError::Timeout);
                }
            }
            Err(e) => {
                log::error!("connection to {} failed: {}", peer, e);
                return Err(TransportError::Socket(e));
            }
        }
    }
}

/// One vectored write attempt under the deadline, with the same outcome
/// classification as [`read_step`].
fn write_step(
    stream: &mut TcpStream,
    deadline: &Deadline,
    peer: SocketAddrV4,
    bufs: &[IoSlice<'_>],
) -> TransportResult<usize> {
    loop {
        let budget = deadline.budget().map_err(|e| {
            log::error!("socket write to {} timed out", peer);
            e
        })?;
        stream.set_write_timeout(budget).map_err(TransportError::Socket)?;
        match stream.write_vectored(bufs) {
            Ok(0) => {
                log::error!("connection to {} closed", peer);
                return Err(TransportError::PeerClosed);
            }
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::TimedOut =>
            {
                if deadline.expired() {
                    log::error!("socket write to {} timed out", peer);
                    return Err(TransportError::Timeout);
                }
            }
            Err(e) => {
                log::error!("connection to {} failed: {}", peer, e);
                return Err(TransportError::Socket(e));
            }
        }
    }
}
