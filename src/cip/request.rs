//! CIP request/response framing (spec 4.4): `service | path_word_len |
//! path | data`, and the mirrored response shape.

use crate::error::Error;
use byteorder::{ByteOrder, LittleEndian};

pub const SVC_GET_ATTRIBUTES_ALL: u8 = 0x01;
pub const SVC_MULTIPLE_SERVICE_PACKET: u8 = 0x0A;
pub const SVC_GET_ATTRIBUTE_SINGLE: u8 = 0x0E;
pub const SVC_READ_TAG: u8 = 0x4C;
pub const SVC_WRITE_TAG: u8 = 0x4D;
pub const SVC_FORWARD_OPEN_SMALL: u8 = 0x54;
pub const SVC_GET_INSTANCE_ATTRIBUTE_LIST: u8 = 0x55;
pub const SVC_FORWARD_OPEN_LARGE: u8 = 0x5B;
pub const SVC_OMRON_GET_ALL_INSTANCES: u8 = 0x5F;

pub const REPLY_FLAG: u8 = 0x80;

/// CIP general status: success, plus "partial transfer" which the spec
/// treats as success on read.
pub const STATUS_SUCCESS: u8 = 0x00;
pub const STATUS_PARTIAL_TRANSFER: u8 = 0x06;
/// appears inside an MSP sub-response; the MSP itself still succeeded.
pub const STATUS_EMBEDDED_SERVICE_ERROR: u8 = 0x1E;

/// builds one CIP request: `service | path_word_len | path | data`. `epath`
/// must already be even-length (symbol/logical segments pad themselves).
pub fn build(service: u8, epath: &[u8], data: &[u8]) -> Vec<u8> {
    debug_assert_eq!(epath.len() % 2, 0, "EPath must be word-aligned");
    let mut out = Vec::with_capacity(2 + epath.len() + data.len());
    out.push(service);
    out.push((epath.len() / 2) as u8);
    out.extend_from_slice(epath);
    out.extend_from_slice(data);
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub service: u8,
    pub status: u8,
    pub extended_status: Vec<u16>,
    pub data: Vec<u8>,
}

/// parses a CIP response: `service | reserved | status | addl_status_size
/// | addl_status(size*2) | data`.
pub fn parse(bytes: &[u8]) -> Result<Response, Error> {
    if bytes.len() < 4 {
        return Err(Error::ProtocolFraming("CIP response too short".to_string()));
    }
    let service = bytes[0];
    let status = bytes[2];
    let addl_len = bytes[3] as usize;
    let ext_start = 4;
    let ext_end = ext_start + addl_len * 2;
    if bytes.len() < ext_end {
        return Err(Error::ProtocolFraming("CIP response truncated in extended status".to_string()));
    }
    let extended_status = (0..addl_len).map(|i| LittleEndian::read_u16(&bytes[ext_start + i * 2..ext_start + i * 2 + 2])).collect();
    let data = bytes[ext_end..].to_vec();
    Ok(Response { service, status, extended_status, data })
}

/// turns a non-success status into a typed error; `0x00` and `0x06`
/// (partial transfer) both pass.
pub fn check_status(response: &Response) -> Result<(), Error> {
    match response.status {
        STATUS_SUCCESS | STATUS_PARTIAL_TRANSFER => Ok(()),
        status => Err(Error::CipStatus(status, crate::error::cip_status_text(status).to_string(), response.extended_status.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_then_parse_round_trips() {
        let epath = vec![0x20, 0x6B, 0x24, 0x01];
        let req = build(SVC_GET_ATTRIBUTES_ALL, &epath, &[0xAA]);
        assert_eq!(req, vec![0x01, 0x02, 0x20, 0x6B, 0x24, 0x01, 0xAA]);

        let resp_bytes = vec![0x81, 0x00, 0x00, 0x00, 0xDE, 0xAD];
        let resp = parse(&resp_bytes).unwrap();
        assert_eq!(resp.service, 0x81);
        assert_eq!(resp.status, 0x00);
        assert!(resp.extended_status.is_empty());
        assert_eq!(resp.data, vec![0xDE, 0xAD]);
        assert!(check_status(&resp).is_ok());
    }

    #[test]
    fn partial_transfer_status_is_ok() {
        let resp = Response { service: 0x81, status: STATUS_PARTIAL_TRANSFER, extended_status: vec![], data: vec![] };
        assert!(check_status(&resp).is_ok());
    }

    #[test]
    fn failure_status_becomes_cip_status_error() {
        let resp = Response { service: 0x81, status: 0x05, extended_status: vec![0x0001], data: vec![] };
        let err = check_status(&resp).unwrap_err();
        assert!(matches!(err, Error::CipStatus(0x05, _, _)));
    }
}
