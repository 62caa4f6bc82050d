//! Common Packet Format (spec 4.4): the item list SendRRData/SendUnitData
//! use to address unconnected and connected CIP requests.

use crate::error::Error;
use byteorder::{ByteOrder, LittleEndian};

pub const ITEM_NULL_ADDRESS: u16 = 0x0000;
pub const ITEM_UNCONNECTED_DATA: u16 = 0x00B2;
pub const ITEM_CONNECTED_ADDRESS: u16 = 0x00A1;
pub const ITEM_CONNECTED_DATA: u16 = 0x00B1;

fn build(interface_handle: u32, timeout: u16, items: &[(u16, &[u8])]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut word4 = [0u8; 4];
    LittleEndian::write_u32(&mut word4, interface_handle);
    out.extend_from_slice(&word4);
    let mut word2 = [0u8; 2];
    LittleEndian::write_u16(&mut word2, timeout);
    out.extend_from_slice(&word2);
    LittleEndian::write_u16(&mut word2, items.len() as u16);
    out.extend_from_slice(&word2);
    for (item_type, data) in items {
        LittleEndian::write_u16(&mut word2, *item_type);
        out.extend_from_slice(&word2);
        LittleEndian::write_u16(&mut word2, data.len() as u16);
        out.extend_from_slice(&word2);
        out.extend_from_slice(data);
    }
    out
}

/// wraps an unconnected CIP request: Null Address + Unconnected Data.
pub fn build_unconnected(cip_request: &[u8]) -> Vec<u8> {
    build(0, 0, &[(ITEM_NULL_ADDRESS, &[]), (ITEM_UNCONNECTED_DATA, cip_request)])
}

/// wraps a connected CIP request: Connected Address (the O->T connection
/// id) + Connected Transport Packet (sequence count + request).
pub fn build_connected(connection_id: u32, sequence_count: u16, cip_request: &[u8]) -> Vec<u8> {
    let mut addr_data = [0u8; 4];
    LittleEndian::write_u32(&mut addr_data, connection_id);
    let mut data_item = Vec::with_capacity(2 + cip_request.len());
    let mut seq = [0u8; 2];
    LittleEndian::write_u16(&mut seq, sequence_count);
    data_item.extend_from_slice(&seq);
    data_item.extend_from_slice(cip_request);
    build(0, 0, &[(ITEM_CONNECTED_ADDRESS, &addr_data), (ITEM_CONNECTED_DATA, &data_item)])
}

/// parses the item list into `(type, data)` pairs.
pub fn parse(payload: &[u8]) -> Result<Vec<(u16, Vec<u8>)>, Error> {
    if payload.len() < 8 {
        return Err(Error::ProtocolFraming("CPF payload too short".to_string()));
    }
    let item_count = LittleEndian::read_u16(&payload[6..8]) as usize;
    let mut cursor = 8;
    let mut items = Vec::with_capacity(item_count);
    for _ in 0..item_count {
        if cursor + 4 > payload.len() {
            return Err(Error::ProtocolFraming("CPF item header truncated".to_string()));
        }
        let item_type = LittleEndian::read_u16(&payload[cursor..cursor + 2]);
        let len = LittleEndian::read_u16(&payload[cursor + 2..cursor + 4]) as usize;
        cursor += 4;
        if cursor + len > payload.len() {
            return Err(Error::ProtocolFraming("CPF item data truncated".to_string()));
        }
        items.push((item_type, payload[cursor..cursor + len].to_vec()));
        cursor += len;
    }
    Ok(items)
}

/// extracts the Unconnected Data item's payload (the raw CIP response).
pub fn unconnected_data(payload: &[u8]) -> Result<Vec<u8>, Error> {
    let items = parse(payload)?;
    items
        .into_iter()
        .find(|(t, _)| *t == ITEM_UNCONNECTED_DATA)
        .map(|(_, d)| d)
        .ok_or_else(|| Error::ProtocolFraming("CPF response missing Unconnected Data item".to_string()))
}

/// extracts the Connected Transport Packet item's payload, with the
/// 2-byte sequence count stripped.
pub fn connected_data(payload: &[u8]) -> Result<Vec<u8>, Error> {
    let items = parse(payload)?;
    let data = items
        .into_iter()
        .find(|(t, _)| *t == ITEM_CONNECTED_DATA)
        .map(|(_, d)| d)
        .ok_or_else(|| Error::ProtocolFraming("CPF response missing Connected Data item".to_string()))?;
    if data.len() < 2 {
        return Err(Error::ProtocolFraming("Connected Data item missing sequence count".to_string()));
    }
    Ok(data[2..].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconnected_round_trips() {
        let wrapped = build_unconnected(&[0xDE, 0xAD, 0xBE, 0xEF]);
        let data = unconnected_data(&wrapped).unwrap();
        assert_eq!(data, vec![0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn connected_round_trips() {
        let wrapped = build_connected(0x1234_5678, 7, &[0x01, 0x02]);
        let data = connected_data(&wrapped).unwrap();
        assert_eq!(data, vec![0x01, 0x02]);
    }
}
