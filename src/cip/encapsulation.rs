//! EtherNet/IP encapsulation: the 24-byte header wrapping every command on
//! TCP/44818 (spec 4.4, 6), plus session registration.

use crate::error::Error;
use byteorder::{ByteOrder, LittleEndian};

pub const HEADER_LEN: usize = 24;

pub const CMD_REGISTER_SESSION: u16 = 0x0065;
pub const CMD_UNREGISTER_SESSION: u16 = 0x0066;
pub const CMD_SEND_RR_DATA: u16 = 0x006F;
pub const CMD_SEND_UNIT_DATA: u16 = 0x0070;

pub struct EncapHeader {
    pub command: u16,
    pub session_handle: u32,
    pub status: u32,
}

/// wraps `data` in the 24-byte encapsulation header.
pub fn build(command: u16, session_handle: u32, data: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; HEADER_LEN];
    LittleEndian::write_u16(&mut out[0..2], command);
    LittleEndian::write_u16(&mut out[2..4], data.len() as u16);
    LittleEndian::write_u32(&mut out[4..8], session_handle);
    // bytes 8..12 (status) and 12..20 (sender context) stay zero on a request.
    out.extend_from_slice(data);
    out
}

/// splits a received encapsulation frame into `(header, data)`.
pub fn parse(frame: &[u8]) -> Result<(EncapHeader, &[u8]), Error> {
    if frame.len() < HEADER_LEN {
        return Err(Error::ProtocolFraming("encapsulation header too short".to_string()));
    }
    let command = LittleEndian::read_u16(&frame[0..2]);
    let length = LittleEndian::read_u16(&frame[2..4]) as usize;
    let session_handle = LittleEndian::read_u32(&frame[4..8]);
    let status = LittleEndian::read_u32(&frame[8..12]);
    if frame.len() < HEADER_LEN + length {
        return Err(Error::ProtocolFraming("encapsulation frame shorter than declared length".to_string()));
    }
    if status != 0 {
        return Err(Error::HandshakeFailed(format!("encapsulation status {:#010x}", status)));
    }
    Ok((EncapHeader { command, session_handle, status }, &frame[HEADER_LEN..HEADER_LEN + length]))
}

/// RegisterSession request body: protocol version 1, no options.
pub fn register_session_body() -> [u8; 4] {
    [1, 0, 0, 0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let frame = build(CMD_SEND_RR_DATA, 42, &[0xAA, 0xBB]);
        let (header, data) = parse(&frame).unwrap();
        assert_eq!(header.command, CMD_SEND_RR_DATA);
        assert_eq!(header.session_handle, 42);
        assert_eq!(data, &[0xAA, 0xBB]);
    }

    #[test]
    fn nonzero_status_is_handshake_error() {
        let mut frame = build(CMD_REGISTER_SESSION, 0, &register_session_body());
        LittleEndian::write_u32(&mut frame[8..12], 1);
        assert!(parse(&frame).is_err());
    }
}
