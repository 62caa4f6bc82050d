//! S7comm message layer: header framing, Setup Communication, and
//! Read/Write Variable with S7ANY addressing (spec 4.5 layer 3).

use crate::addr::s7::{S7Address, S7Area};
use crate::codec::{BOOL, DWORD, LINT, LWORD, REAL, WORD};
use crate::error::{self, Error};
use byteorder::{BigEndian, ByteOrder};

const PROTOCOL_ID: u8 = 0x32;
const PDU_TYPE_JOB: u8 = 1;
const PDU_TYPE_ACK_DATA: u8 = 3;

const FN_SETUP_COMM: u8 = 0xF0;
const FN_READ_VAR: u8 = 0x04;
const FN_WRITE_VAR: u8 = 0x05;

const TS_BIT: u8 = 0x01;
const TS_BYTE: u8 = 0x02;
const TS_WORD: u8 = 0x04;
const TS_DWORD: u8 = 0x06;
const TS_REAL: u8 = 0x08;

fn area_code(area: S7Area) -> u8 {
    match area {
        S7Area::I => 0x81,
        S7Area::Q => 0x82,
        S7Area::M => 0x83,
        S7Area::Db => 0x84,
        S7Area::T => 0x1D,
        S7Area::C => 0x1C,
    }
}

/// `(transport_size, item_count)` for the S7ANY descriptor of one address.
fn transport_for(addr: &S7Address) -> (u8, u16) {
    if addr.bit_num >= 0 {
        return (TS_BIT, 1);
    }
    match addr.type_code {
        c if c == REAL => (TS_REAL, addr.count as u16),
        c if c == WORD || c == crate::codec::INT => (TS_WORD, addr.count as u16),
        c if c == DWORD || c == crate::codec::DINT => (TS_DWORD, addr.count as u16),
        c if c == LINT || c == LWORD || c == crate::codec::LREAL => (TS_BYTE, (addr.count * 8) as u16),
        _ => (TS_BYTE, addr.count.max(1) as u16),
    }
}

/// encodes one S7ANY item descriptor (spec 4.5, 12 bytes).
pub fn encode_s7any(addr: &S7Address) -> [u8; 12] {
    let (transport_size, count) = transport_for(addr);
    let mut item = [0u8; 12];
    item[0] = 0x12;
    item[1] = 0x0A;
    item[2] = 0x10;
    item[3] = transport_size;
    BigEndian::write_u16(&mut item[4..6], count);
    BigEndian::write_u16(&mut item[6..8], addr.db_number.unwrap_or(0));
    item[8] = area_code(addr.area);
    let bit = if addr.bit_num >= 0 { addr.bit_num as u32 } else { 0 };
    let address = ((addr.byte_offset as u32) << 3) | bit;
    item[9] = ((address >> 16) & 0xFF) as u8;
    item[10] = ((address >> 8) & 0xFF) as u8;
    item[11] = (address & 0xFF) as u8;
    item
}

fn job_header(pdu_ref: u16, param_len: u16, data_len: u16) -> [u8; 10] {
    let mut h = [0u8; 10];
    h[0] = PROTOCOL_ID;
    h[1] = PDU_TYPE_JOB;
    BigEndian::write_u16(&mut h[4..6], pdu_ref);
    BigEndian::write_u16(&mut h[6..8], param_len);
    BigEndian::write_u16(&mut h[8..10], data_len);
    h
}

/// parsed Ack-Data header: `(param_len, data_len, param_bytes_offset)`.
struct AckHeader {
    param_len: usize,
    data_len: usize,
}

fn parse_ack_header(payload: &[u8]) -> Result<AckHeader, Error> {
    if payload.len() < 12 {
        return Err(Error::ProtocolFraming("S7 ack header too short".to_string()));
    }
    if payload[0] != PROTOCOL_ID {
        return Err(Error::ProtocolFraming(format!("bad S7 protocol id {:#04x}", payload[0])));
    }
    if payload[1] != PDU_TYPE_ACK_DATA {
        return Err(Error::ProtocolFraming(format!("expected ack-data pdu, got {:#04x}", payload[1])));
    }
    let param_len = BigEndian::read_u16(&payload[6..8]) as usize;
    let data_len = BigEndian::read_u16(&payload[8..10]) as usize;
    let class = payload[10];
    let code = payload[11];
    if class != 0 {
        return Err(Error::S7Error(class, code, error::s7_class_text(class).to_string()));
    }
    Ok(AckHeader { param_len, data_len })
}

const ACK_HEADER_LEN: usize = 12;

/// builds the Setup Communication request, proposing `pdu_size`.
pub fn build_setup_communication(pdu_ref: u16, pdu_size: u16) -> Vec<u8> {
    let mut param = vec![FN_SETUP_COMM, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
    BigEndian::write_u16(&mut param[5..7], pdu_size);
    let mut out = job_header(pdu_ref, param.len() as u16, 0).to_vec();
    out.extend(param);
    out
}

/// parses the Setup Communication response, returning the negotiated PDU
/// size.
pub fn parse_setup_communication(payload: &[u8]) -> Result<u16, Error> {
    let ack = parse_ack_header(payload)?;
    if ack.param_len < 7 || payload.len() < ACK_HEADER_LEN + ack.param_len {
        return Err(Error::PduNegotiationMismatch);
    }
    let param = &payload[ACK_HEADER_LEN..ACK_HEADER_LEN + ack.param_len];
    let negotiated = BigEndian::read_u16(&param[5..7]);
    if negotiated == 0 {
        return Err(Error::PduNegotiationMismatch);
    }
    Ok(negotiated)
}

/// builds a Read Variable request for the given items.
pub fn build_read_var(pdu_ref: u16, items: &[S7Address]) -> Vec<u8> {
    let mut param = vec![FN_READ_VAR, items.len() as u8];
    for item in items {
        param.extend_from_slice(&encode_s7any(item));
    }
    let mut out = job_header(pdu_ref, param.len() as u16, 0).to_vec();
    out.extend(param);
    out
}

pub struct ReadItem {
    pub return_code: u8,
    pub data: Vec<u8>,
}

/// parses a Read Variable response into one result per requested item, in
/// the same order as the request.
pub fn parse_read_var(payload: &[u8]) -> Result<Vec<ReadItem>, Error> {
    let ack = parse_ack_header(payload)?;
    let data_start = ACK_HEADER_LEN + ack.param_len;
    if payload.len() < data_start + ack.data_len {
        return Err(Error::ResponseTooLarge);
    }
    let mut data = &payload[data_start..data_start + ack.data_len];
    let mut items = Vec::new();
    while data.len() >= 4 {
        let return_code = data[0];
        let transport_size = data[1];
        let length_field = BigEndian::read_u16(&data[2..4]) as usize;
        let byte_len = match transport_size {
            TS_BIT => 1,
            TS_WORD | TS_DWORD => length_field / 8,
            TS_BYTE | TS_REAL => length_field,
            _ => length_field / 8,
        };
        if data.len() < 4 + byte_len {
            return Err(Error::ProtocolFraming("truncated read-var item".to_string()));
        }
        let item_data = data[4..4 + byte_len].to_vec();
        let consumed = if byte_len % 2 != 0 { byte_len + 1 } else { byte_len };
        let consumed = consumed.min(data.len() - 4);
        items.push(ReadItem { return_code, data: item_data });
        data = &data[4 + consumed..];
    }
    Ok(items)
}

/// encodes one Write Variable data item: `reserved(1)=0, transport_size(1),
/// length(u16 BE, in bits)` followed by `bytes`, padded to even length.
fn write_data_item(addr: &S7Address, bytes: &[u8]) -> Vec<u8> {
    let (transport_size, _) = transport_for(addr);
    let length_bits: u16 = match transport_size {
        TS_BIT => 1,
        TS_WORD | TS_DWORD => (bytes.len() * 8) as u16,
        _ => bytes.len() as u16,
    };
    let mut item = vec![0u8, transport_size, 0, 0];
    BigEndian::write_u16(&mut item[2..4], length_bits);
    item.extend_from_slice(bytes);
    if item.len() % 2 != 0 {
        item.push(0);
    }
    item
}

/// builds a Write Variable request for `items`, each paired with its raw
/// bytes to write.
pub fn build_write_var(pdu_ref: u16, items: &[(S7Address, Vec<u8>)]) -> Vec<u8> {
    let mut param = vec![FN_WRITE_VAR, items.len() as u8];
    for (addr, _) in items {
        param.extend_from_slice(&encode_s7any(addr));
    }
    let mut data = Vec::new();
    for (addr, bytes) in items {
        data.extend(write_data_item(addr, bytes));
    }
    let mut out = job_header(pdu_ref, param.len() as u16, data.len() as u16).to_vec();
    out.extend(param);
    out.extend(data);
    out
}

/// parses a Write Variable response into one return code per item.
pub fn parse_write_var(payload: &[u8], item_count: usize) -> Result<Vec<u8>, Error> {
    let ack = parse_ack_header(payload)?;
    let data_start = ACK_HEADER_LEN + ack.param_len;
    if payload.len() < data_start + ack.data_len || ack.data_len < item_count {
        return Err(Error::ResponseTooLarge);
    }
    Ok(payload[data_start..data_start + item_count].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addr::s7;

    #[test]
    fn s7any_encodes_db_dword() {
        let addr = s7::parse("DB1.DBD4", None).unwrap();
        let item = encode_s7any(&addr);
        assert_eq!(item[3], TS_DWORD);
        assert_eq!(&item[4..6], &[0, 1]); // count
        assert_eq!(&item[6..8], &[0, 1]); // db number
        assert_eq!(item[8], 0x84);
        assert_eq!((item[9] as u32) << 16 | (item[10] as u32) << 8 | item[11] as u32, 4 << 3);
    }

    #[test]
    fn s7any_encodes_bit_address() {
        let addr = s7::parse("M0.3", None).unwrap();
        let item = encode_s7any(&addr);
        assert_eq!(item[3], TS_BIT);
        assert_eq!(item[8], 0x83);
        assert_eq!(item[11], 0b0000_0011);
    }

    #[test]
    fn setup_communication_round_trip() {
        let req = build_setup_communication(1, 480);
        assert_eq!(req[1], PDU_TYPE_JOB);

        let mut resp = vec![0x32, 0x03, 0, 0, 0, 1, 0, 7, 0, 0, 0, 0];
        resp.extend_from_slice(&[FN_SETUP_COMM, 0, 0, 0, 1, 0, 0]);
        BigEndian::write_u16(&mut resp[19..21], 240);
        let pdu_size = parse_setup_communication(&resp).unwrap();
        assert_eq!(pdu_size, 240);
    }

    #[test]
    fn read_var_response_splits_items() {
        let mut resp = vec![0x32, 0x03, 0, 0, 0, 1, 0, 2, 0, 6, 0, 0];
        resp.extend_from_slice(&[FN_READ_VAR, 1]);
        resp.extend_from_slice(&[0xFF, TS_BYTE, 0, 2, 0xAB, 0xCD]);
        let items = parse_read_var(&resp).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].return_code, 0xFF);
        assert_eq!(items[0].data, vec![0xAB, 0xCD]);
    }
}
