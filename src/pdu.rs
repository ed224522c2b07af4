//! iSCSI PDU wire format
//!
//! This module defines the Basic Header Segment layout and padding rules
//! for iSCSI PDUs based on RFC 3720: https://datatracker.ietf.org/doc/html/rfc3720

use byteorder::{BigEndian, ByteOrder};

/// BHS (Basic Header Segment) size in bytes
pub const BHS_SIZE: usize = 48;

/// PDUs are padded to this word size on the wire
pub const PAD_WORD_LEN: usize = 4;

/// iSCSI PDU Opcodes (RFC 3720 Section 10)
pub mod opcode {
    // Initiator opcodes (initiator → target)
    pub const NOP_OUT: u8 = 0x00;
    pub const SCSI_COMMAND: u8 = 0x01;
    pub const TASK_MANAGEMENT_REQUEST: u8 = 0x02;
    pub const LOGIN_REQUEST: u8 = 0x03;
    pub const TEXT_REQUEST: u8 = 0x04;
    pub const SCSI_DATA_OUT: u8 = 0x05;
    pub const LOGOUT_REQUEST: u8 = 0x06;
    pub const SNACK_REQUEST: u8 = 0x10;

    // Target opcodes (target → initiator)
    pub const NOP_IN: u8 = 0x20;
    pub const SCSI_RESPONSE: u8 = 0x21;
    pub const TASK_MANAGEMENT_RESPONSE: u8 = 0x22;
    pub const LOGIN_RESPONSE: u8 = 0x23;
    pub const TEXT_RESPONSE: u8 = 0x24;
    pub const SCSI_DATA_IN: u8 = 0x25;
    pub const LOGOUT_RESPONSE: u8 = 0x26;
    pub const R2T: u8 = 0x31;
    pub const ASYNC_MESSAGE: u8 = 0x32;
    pub const REJECT: u8 = 0x3F;
}

/// Login PDU flag bits (byte 1 of the BHS)
pub mod flags {
    /// Transit to the next login stage
    pub const TRANSIT: u8 = 0x80;
    /// More login text follows in another PDU
    pub const CONTINUE_LOGIN: u8 = 0x40;
    /// Current stage (CSG) mask, bits 2-3
    pub const CSG_MASK: u8 = 0x0C;
    /// Next stage (NSG) mask, bits 0-1
    pub const NSG_MASK: u8 = 0x03;
}

/// Number of zero bytes needed to round `dlength` up to a 4-byte boundary
pub const fn pad_len(dlength: usize) -> usize {
    (PAD_WORD_LEN - dlength % PAD_WORD_LEN) % PAD_WORD_LEN
}

/// Basic Header Segment (BHS) - 48 bytes
///
/// ```text
/// Byte/     0       |       1       |       2       |       3       |
///     /              |               |               |               |
///    |0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|
///    +---------------+---------------+---------------+---------------+
///   0|.|I| Opcode    |F|  Opcode-specific fields                     |
///    +---------------+---------------+---------------+---------------+
///   4|TotalAHSLength | DataSegmentLength                             |
///    +---------------+---------------+---------------+---------------+
///   8| LUN or Opcode-specific fields                                 |
///    +                                                               +
///  12|                                                               |
///    +---------------+---------------+---------------+---------------+
///  16| Initiator Task Tag                                            |
///    +---------------+---------------+---------------+---------------+
///  20| Opcode-specific fields (28 bytes)                             |
///    +                                                               +
///  ...
///  44|                                                               |
///    +---------------+---------------+---------------+---------------+
/// ```
///
/// The header is kept as raw wire bytes. Opcode-specific fields beyond
/// the ones the transport must interpret (opcode, TotalAHSLength,
/// DataSegmentLength) stay opaque, so a header received off the wire is
/// bit-identical to what the peer sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicHeader {
    bytes: [u8; BHS_SIZE],
}

impl Default for BasicHeader {
    fn default() -> Self {
        Self::new()
    }
}

impl BasicHeader {
    /// Create a zeroed header
    pub fn new() -> Self {
        BasicHeader {
            bytes: [0u8; BHS_SIZE],
        }
    }

    /// Wrap raw wire bytes
    pub fn from_bytes(bytes: [u8; BHS_SIZE]) -> Self {
        BasicHeader { bytes }
    }

    /// The header as wire bytes
    pub fn as_bytes(&self) -> &[u8; BHS_SIZE] {
        &self.bytes
    }

    /// Mutable wire bytes; `recv_pdu` fills these directly
    pub fn as_bytes_mut(&mut self) -> &mut [u8; BHS_SIZE] {
        &mut self.bytes
    }

    /// Opcode (lower 6 bits of byte 0)
    pub fn opcode(&self) -> u8 {
        self.bytes[0] & 0x3F
    }

    /// Set the opcode, preserving the immediate bit
    pub fn set_opcode(&mut self, opcode: u8) {
        self.bytes[0] = (self.bytes[0] & 0xC0) | (opcode & 0x3F);
    }

    /// Immediate delivery bit (bit 6 of byte 0)
    pub fn immediate(&self) -> bool {
        (self.bytes[0] & 0x40) != 0
    }

    pub fn set_immediate(&mut self, immediate: bool) {
        if immediate {
            self.bytes[0] |= 0x40;
        } else {
            self.bytes[0] &= !0x40;
        }
    }

    /// Opcode-specific flags (byte 1)
    pub fn flags(&self) -> u8 {
        self.bytes[1]
    }

    pub fn set_flags(&mut self, flags: u8) {
        self.bytes[1] = flags;
    }

    /// TotalAHSLength (byte 4), in 4-byte words including AHS padding.
    /// Must be zero; this transport rejects additional header segments.
    pub fn ahs_length(&self) -> u8 {
        self.bytes[4]
    }

    pub fn set_ahs_length(&mut self, words: u8) {
        self.bytes[4] = words;
    }

    /// DataSegmentLength: 24-bit big-endian byte count (bytes 5-7)
    pub fn data_length(&self) -> u32 {
        ((self.bytes[5] as u32) << 16) | ((self.bytes[6] as u32) << 8) | (self.bytes[7] as u32)
    }

    /// Set DataSegmentLength; only the low 24 bits are representable
    pub fn set_data_length(&mut self, dlength: u32) {
        self.bytes[5] = ((dlength >> 16) & 0xFF) as u8;
        self.bytes[6] = ((dlength >> 8) & 0xFF) as u8;
        self.bytes[7] = (dlength & 0xFF) as u8;
    }

    /// Initiator Task Tag (bytes 16-19)
    pub fn itt(&self) -> u32 {
        BigEndian::read_u32(&self.bytes[16..20])
    }

    pub fn set_itt(&mut self, itt: u32) {
        BigEndian::write_u32(&mut self.bytes[16..20], itt);
    }

    /// ISID (bytes 8-13, login PDUs)
    pub fn isid(&self) -> [u8; 6] {
        let mut isid = [0u8; 6];
        isid.copy_from_slice(&self.bytes[8..14]);
        isid
    }

    /// Target Transfer Tag (bytes 20-23, NOP and text PDUs)
    pub fn ttt(&self) -> u32 {
        BigEndian::read_u32(&self.bytes[20..24])
    }

    /// CmdSN (bytes 24-27)
    pub fn cmd_sn(&self) -> u32 {
        BigEndian::read_u32(&self.bytes[24..28])
    }

    /// Total size of this PDU on the wire: header, data, padding
    pub fn wire_length(&self) -> usize {
        let dlength = self.data_length() as usize;
        BHS_SIZE + dlength + pad_len(dlength)
    }

    /// Get the opcode name for debugging
    pub fn opcode_name(&self) -> &'static str {
        match self.opcode() {
            opcode::NOP_OUT => "NOP-Out",
            opcode::SCSI_COMMAND => "SCSI Command",
            opcode::TASK_MANAGEMENT_REQUEST => "Task Management Request",
            opcode::LOGIN_REQUEST => "Login Request",
            opcode::TEXT_REQUEST => "Text Request",
            opcode::SCSI_DATA_OUT => "SCSI Data-Out",
            opcode::LOGOUT_REQUEST => "Logout Request",
            opcode::SNACK_REQUEST => "SNACK Request",
            opcode::NOP_IN => "NOP-In",
            opcode::SCSI_RESPONSE => "SCSI Response",
            opcode::TASK_MANAGEMENT_RESPONSE => "Task Management Response",
            opcode::LOGIN_RESPONSE => "Login Response",
            opcode::TEXT_RESPONSE => "Text Response",
            opcode::SCSI_DATA_IN => "SCSI Data-In",
            opcode::LOGOUT_RESPONSE => "Logout Response",
            opcode::R2T => "Ready To Transfer",
            opcode::ASYNC_MESSAGE => "Async Message",
            opcode::REJECT => "Reject",
            _ => "Unknown",
        }
    }
}
