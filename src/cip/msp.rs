//! CIP Multiple Service Packet (service `0x0A`): bundles several CIP
//! sub-requests into one transaction (spec 4.4, 4.6).

use super::request::{self, Response};
use crate::error::Error;
use byteorder::{ByteOrder, LittleEndian};

/// `count(u16 LE) | offset_1 ... offset_n (u16 LE) | request_1 ... request_n`,
/// offsets measured from the start of this payload.
pub fn build(requests: &[Vec<u8>]) -> Vec<u8> {
    let n = requests.len();
    let header_len = 2 + 2 * n;
    let mut cursor = header_len;
    let mut offsets = Vec::with_capacity(n);
    for r in requests {
        offsets.push(cursor as u16);
        cursor += r.len();
    }
    let mut out = Vec::with_capacity(cursor);
    out.resize(2, 0);
    LittleEndian::write_u16(&mut out[0..2], n as u16);
    for o in &offsets {
        let mut word = [0u8; 2];
        LittleEndian::write_u16(&mut word, *o);
        out.extend_from_slice(&word);
    }
    for r in requests {
        out.extend_from_slice(r);
    }
    out
}

/// inverts [`build`]: splits the MSP payload back into its sub-responses,
/// in request order.
pub fn parse(payload: &[u8]) -> Result<Vec<Response>, Error> {
    if payload.len() < 2 {
        return Err(Error::ProtocolFraming("MSP payload too short".to_string()));
    }
    let n = LittleEndian::read_u16(&payload[0..2]) as usize;
    let offsets_end = 2 + 2 * n;
    if payload.len() < offsets_end {
        return Err(Error::ProtocolFraming("MSP payload truncated in offset table".to_string()));
    }
    let offsets: Vec<usize> = (0..n).map(|i| LittleEndian::read_u16(&payload[2 + i * 2..4 + i * 2]) as usize).collect();

    let mut responses = Vec::with_capacity(n);
    for i in 0..n {
        let start = offsets[i];
        let end = offsets.get(i + 1).copied().unwrap_or(payload.len());
        if start > payload.len() || end > payload.len() || start > end {
            return Err(Error::ProtocolFraming("MSP sub-response offset out of range".to_string()));
        }
        responses.push(request::parse(&payload[start..end])?);
    }
    Ok(responses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cip::request::SVC_GET_ATTRIBUTE_SINGLE;

    #[test]
    fn round_trip_preserves_order() {
        let requests = vec![
            request::build(SVC_GET_ATTRIBUTE_SINGLE, &[0x20, 0x01, 0x24, 0x01], &[]),
            request::build(SVC_GET_ATTRIBUTE_SINGLE, &[0x20, 0x01, 0x24, 0x02], &[]),
            request::build(SVC_GET_ATTRIBUTE_SINGLE, &[0x20, 0x01, 0x24, 0x03], &[]),
        ];
        let msp = build(&requests);

        // fabricate a matching response payload: each request mirrored back
        // as a trivial success response.
        let responses: Vec<Vec<u8>> = (0..3).map(|i| vec![0x80 | SVC_GET_ATTRIBUTE_SINGLE, 0x00, 0x00, 0x00, i as u8]).collect();
        let resp_payload = build(&responses);

        let parsed = parse(&resp_payload).unwrap();
        assert_eq!(parsed.len(), 3);
        for (i, r) in parsed.iter().enumerate() {
            assert_eq!(r.data, vec![i as u8]);
        }
    }

    #[test]
    fn rejects_truncated_offset_table() {
        assert!(parse(&[0x03, 0x00]).is_err());
    }
}
