//! FINS header framing, end-code taxonomy, and the memory
//! read/write/multi-read/status command bodies (spec 4.3).

use crate::error::Error;
use byteorder::{BigEndian, ByteOrder};

pub const ICF_COMMAND: u8 = 0x80;
pub const ICF_RESPONSE_BIT: u8 = 0x40;
pub const GCT_DEFAULT: u8 = 0x02;

pub const CMD_MEMORY_READ: u16 = 0x0101;
pub const CMD_MEMORY_WRITE: u16 = 0x0102;
pub const CMD_MULTI_MEMORY_READ: u16 = 0x0104;
pub const CMD_CPU_STATUS: u16 = 0x0601;
pub const CMD_CYCLE_TIME: u16 = 0x0620;

pub const HEADER_LEN: usize = 10;

/// the 10-byte FINS header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub icf: u8,
    pub dna: u8,
    pub da1: u8,
    pub da2: u8,
    pub sna: u8,
    pub sa1: u8,
    pub sa2: u8,
    pub sid: u8,
}

impl Header {
    pub fn command(dst_node: u8, src_node: u8, sid: u8) -> Header {
        Header { icf: ICF_COMMAND, dna: 0, da1: dst_node, da2: 0, sna: 0, sa1: src_node, sa2: 0, sid }
    }

    pub fn to_bytes(self) -> [u8; HEADER_LEN] {
        [self.icf, 0, GCT_DEFAULT, self.dna, self.da1, self.da2, self.sna, self.sa1, self.sa2, self.sid]
    }

    pub fn from_bytes(b: &[u8]) -> Result<Header, Error> {
        if b.len() < HEADER_LEN {
            return Err(Error::ProtocolFraming("FINS header too short".to_string()));
        }
        Ok(Header { icf: b[0], dna: b[3], da1: b[4], da2: b[5], sna: b[6], sa1: b[7], sa2: b[8], sid: b[9] })
    }

    pub fn is_response(self) -> bool {
        self.icf & ICF_RESPONSE_BIT != 0
    }
}

/// builds one FINS frame: header ∥ command(u16 BE) ∥ body.
pub fn build_frame(header: Header, command: u16, body: &[u8]) -> Vec<u8> {
    let mut out = header.to_bytes().to_vec();
    let mut cmd = [0u8; 2];
    BigEndian::write_u16(&mut cmd, command);
    out.extend_from_slice(&cmd);
    out.extend_from_slice(body);
    out
}

/// splits a received FINS frame into `(header, command, body)`.
pub fn parse_frame(frame: &[u8]) -> Result<(Header, u16, &[u8]), Error> {
    if frame.len() < HEADER_LEN + 2 {
        return Err(Error::ProtocolFraming("FINS frame too short".to_string()));
    }
    let header = Header::from_bytes(&frame[..HEADER_LEN])?;
    let command = BigEndian::read_u16(&frame[HEADER_LEN..HEADER_LEN + 2]);
    Ok((header, command, &frame[HEADER_LEN + 2..]))
}

/// classifies bytes `0..2` of a command's response body as a FINS end
/// code; `Ok(rest)` strips the end code on success.
pub fn check_end_code(body: &[u8]) -> Result<&[u8], Error> {
    if body.len() < 2 {
        return Err(Error::ProtocolFraming("missing FINS end code".to_string()));
    }
    let (main, sub) = (body[0], body[1]);
    if main == 0x00 {
        return Ok(&body[2..]);
    }
    Err(Error::FinsEndCode(main, sub, end_code_text(main, sub)))
}

fn main_code_text(main: u8) -> &'static str {
    match main {
        0x00 => "normal completion",
        0x01 => "local node error",
        0x02 => "destination node error",
        0x03 => "communications controller error",
        0x04 => "not executable",
        0x05 => "routing error",
        0x10 => "command format error",
        0x11 => "parameter error",
        0x20 => "read not possible",
        0x21 => "write not possible",
        0x22 => "cannot be executed in current mode",
        0x23 => "no such device",
        0x25 => "unit error",
        0x26 => "command error",
        0x30 => "access right error",
        0x40 => "abort",
        _ => "unknown error",
    }
}

fn end_code_text(main: u8, sub: u8) -> String {
    format!("{} (sub {:#04x})", main_code_text(main), sub)
}

/// Request body for `0x0101`/`0x0102`: one area/address/bit/count item.
pub fn build_memory_item(memory_area: u8, word_address: u16, bit_offset: u8, count: u16) -> Vec<u8> {
    let mut addr_bytes = [0u8; 2];
    BigEndian::write_u16(&mut addr_bytes, word_address);
    let mut count_bytes = [0u8; 2];
    BigEndian::write_u16(&mut count_bytes, count);
    vec![memory_area, addr_bytes[0], addr_bytes[1], bit_offset, count_bytes[0], count_bytes[1]]
}

/// one listed address in a `0x0104` multi-memory-read request: the
/// documented 4-byte form (spec 9: one word per listed address).
pub fn build_multi_read_entry(memory_area: u8, word_address: u16, bit_offset: u8) -> [u8; 4] {
    let mut addr_bytes = [0u8; 2];
    BigEndian::write_u16(&mut addr_bytes, word_address);
    [memory_area, addr_bytes[0], addr_bytes[1], bit_offset]
}

/// builds a `0x0104` request body from 4-byte entries.
pub fn build_multi_read_body(entries: &[[u8; 4]]) -> Vec<u8> {
    entries.iter().flatten().copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let h = Header::command(1, 2, 5);
        let bytes = h.to_bytes();
        let back = Header::from_bytes(&bytes).unwrap();
        assert_eq!(h, back);
    }

    #[test]
    fn end_code_zero_strips_to_body() {
        let body = [0x00, 0x00, 0xAB, 0xCD];
        assert_eq!(check_end_code(&body).unwrap(), &[0xAB, 0xCD]);
    }

    #[test]
    fn nonzero_end_code_is_an_error() {
        let err = check_end_code(&[0x20, 0x03]).unwrap_err();
        assert!(matches!(err, Error::FinsEndCode(0x20, 0x03, _)));
    }

    #[test]
    fn frame_round_trips() {
        let header = Header::command(10, 20, 1);
        let frame = build_frame(header, CMD_MEMORY_READ, &[0xAA, 0xBB]);
        let (parsed_header, command, body) = parse_frame(&frame).unwrap();
        assert_eq!(parsed_header, header);
        assert_eq!(command, CMD_MEMORY_READ);
        assert_eq!(body, &[0xAA, 0xBB]);
    }
}
