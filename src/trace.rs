//! Opcode-keyed diagnostic decoding of PDUs
//!
//! The transport invokes these hooks as an optional observer around each
//! send and receive. Everything here is presentation only; nothing in
//! this module touches the wire or affects correctness. All output is
//! gated on the debug log level.

use crate::pdu::{flags, opcode, BasicHeader};

/// Decode a PDU about to be sent
pub(crate) fn sending(header: &BasicHeader, data: &[u8]) {
    if !log::log_enabled!(log::Level::Debug) {
        return;
    }
    match header.opcode() {
        opcode::LOGIN_REQUEST => {
            let isid = header.isid();
            log::debug!(
                "sending login PDU with current stage {}, next stage {}, transit {:#x}, \
                 isid 0x{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
                (header.flags() & flags::CSG_MASK) >> 2,
                header.flags() & flags::NSG_MASK,
                header.flags() & flags::TRANSIT,
                isid[0],
                isid[1],
                isid[2],
                isid[3],
                isid[4],
                isid[5]
            );
            log_text(data);
        }
        opcode::TEXT_REQUEST => {
            log::debug!(
                "sending text PDU with itt {}, CmdSN {}:",
                header.itt(),
                header.cmd_sn()
            );
            log_text(data);
        }
        opcode::NOP_OUT => {
            log::debug!(
                "sending Nop-out PDU with itt {}, ttt {}, CmdSN {}:",
                header.itt(),
                header.ttt(),
                header.cmd_sn()
            );
            log_text(data);
        }
        op => log::debug!("sending PDU opcode 0x{:02x}", op),
    }
}

/// Decode a fully received PDU
pub(crate) fn received(header: &BasicHeader, data: &[u8]) {
    if !log::log_enabled!(log::Level::Debug) {
        return;
    }
    match header.opcode() {
        opcode::TEXT_RESPONSE => {
            log::debug!(
                "finished reading text response PDU, {} data bytes",
                data.len()
            );
            log_text(data);
        }
        opcode::LOGIN_RESPONSE => {
            log::debug!(
                "finished reading login response PDU, {} data bytes; \
                 current stage {}, next stage {}, transit {:#x}",
                data.len(),
                (header.flags() & flags::CSG_MASK) >> 2,
                header.flags() & flags::NSG_MASK,
                header.flags() & flags::TRANSIT
            );
            log_text(data);
        }
        opcode::ASYNC_MESSAGE => {
            log::debug!("read async event PDU, itt {}", header.itt());
        }
        _ => {}
    }
}

/// Dump the null-separated text lines (key=value pairs) of a data
/// segment
fn log_text(data: &[u8]) {
    for line in data.split(|&b| b == 0).filter(|line| !line.is_empty()) {
        log::debug!(">    {}", String::from_utf8_lossy(line));
    }
}
