//! COTP (ISO 8073) connection setup and the 3-byte Data TPDU header that
//! wraps every S7comm payload (spec 4.5 layer 2).

use crate::error::Error;
use byteorder::{BigEndian, ByteOrder};

const CR: u8 = 0xE0;
const CC: u8 = 0xD0;
const DT: u8 = 0xF0;

/// builds a COTP Connection Request TPDU proposing `tpdu_size_exp` (the PDU
/// size parameter is `2^tpdu_size_exp`; S7 commonly proposes `10` -> 1024).
pub fn build_cr(src_tsap: u16, dst_tsap: u16, tpdu_size_exp: u8) -> Vec<u8> {
    let mut out = vec![
        17, // length indicator: bytes following, excluding this byte
        CR, 0x00, 0x00, // destination reference
        0x00, 0x01, // source reference
        0x00, // class + options
        0xC0, 0x01, tpdu_size_exp, // PDU size parameter
        0xC1, 0x02, 0, 0, // source TSAP parameter (filled below)
        0xC2, 0x02, 0, 0, // destination TSAP parameter (filled below)
    ];
    BigEndian::write_u16(&mut out[12..14], src_tsap);
    BigEndian::write_u16(&mut out[16..18], dst_tsap);
    out
}

/// validates a COTP response is a Connection Confirm.
pub fn parse_cc(payload: &[u8]) -> Result<(), Error> {
    if payload.len() < 2 {
        return Err(Error::ProtocolFraming("COTP response too short".to_string()));
    }
    if payload[1] != CC {
        return Err(Error::HandshakeFailed(format!("expected COTP CC, got PDU type {:#04x}", payload[1])));
    }
    Ok(())
}

/// the fixed 3-byte Data TPDU header prefixed to every S7comm message on an
/// already-connected COTP channel: length indicator(2), DT id, TPDU
/// number|EOT bit.
pub fn dt_header() -> [u8; 3] {
    [2, DT, 0x80]
}

/// strips the Data TPDU header from a received payload, returning the
/// S7comm bytes.
pub fn strip_dt(payload: &[u8]) -> Result<&[u8], Error> {
    if payload.len() < 3 || payload[1] != DT {
        return Err(Error::ProtocolFraming("expected COTP DT".to_string()));
    }
    Ok(&payload[3..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_cr_with_tsaps() {
        let cr = build_cr(0x0100, 0x0102, 10);
        assert_eq!(cr[1], CR);
        assert_eq!(&cr[12..14], &[0x01, 0x00]);
        assert_eq!(&cr[16..18], &[0x01, 0x02]);
    }

    #[test]
    fn parses_cc_and_rejects_other_types() {
        parse_cc(&[6, CC, 0, 0, 0, 1, 0]).unwrap();
        assert!(parse_cc(&[2, DT, 0x80]).is_err());
    }

    #[test]
    fn dt_round_trips() {
        let mut frame = dt_header().to_vec();
        frame.extend_from_slice(&[1, 2, 3]);
        assert_eq!(strip_dt(&frame).unwrap(), &[1, 2, 3]);
    }
}
