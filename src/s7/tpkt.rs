//! TPKT framing (RFC 1006): `0x03, 0x00, length_hi, length_lo` then payload;
//! `length` includes the 4-byte header (spec 4.5 layer 1).

use crate::error::Error;
use byteorder::{BigEndian, ByteOrder};
use std::io::{Read, Write};

const VERSION: u8 = 3;
pub const HEADER_LEN: usize = 4;

/// wraps `payload` in a TPKT header and writes it to `stream`.
pub fn write_frame<W: Write>(stream: &mut W, payload: &[u8]) -> Result<(), Error> {
    let total_len = HEADER_LEN + payload.len();
    if total_len > u16::MAX as usize {
        return Err(Error::ProtocolFraming("TPKT frame too large".to_string()));
    }
    let mut frame = Vec::with_capacity(total_len);
    frame.push(VERSION);
    frame.push(0);
    let mut len_bytes = [0u8; 2];
    BigEndian::write_u16(&mut len_bytes, total_len as u16);
    frame.extend_from_slice(&len_bytes);
    frame.extend_from_slice(payload);
    stream.write_all(&frame)?;
    Ok(())
}

/// reads one TPKT frame from `stream`, returning the payload (header
/// stripped).
pub fn read_frame<R: Read>(stream: &mut R) -> Result<Vec<u8>, Error> {
    let mut header = [0u8; HEADER_LEN];
    stream.read_exact(&mut header)?;
    if header[0] != VERSION {
        return Err(Error::ProtocolFraming(format!("bad TPKT version {:#04x}", header[0])));
    }
    let total_len = BigEndian::read_u16(&header[2..4]) as usize;
    if total_len < HEADER_LEN {
        return Err(Error::ProtocolFraming("TPKT length shorter than header".to_string()));
    }
    let mut payload = vec![0u8; total_len - HEADER_LEN];
    stream.read_exact(&mut payload)?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trips_a_frame() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &[1, 2, 3]).unwrap();
        assert_eq!(buf, vec![3, 0, 0, 7, 1, 2, 3]);
        let mut cursor = Cursor::new(buf);
        let payload = read_frame(&mut cursor).unwrap();
        assert_eq!(payload, vec![1, 2, 3]);
    }

    #[test]
    fn rejects_bad_version() {
        let mut cursor = Cursor::new(vec![9, 0, 0, 4]);
        let err = read_frame(&mut cursor).unwrap_err();
        assert!(matches!(err, Error::ProtocolFraming(_)));
    }
}
