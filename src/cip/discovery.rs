//! EIP tag discovery (spec 4.8): three strategies attempted in order,
//! the first to yield non-empty results wins. Each strategy is written
//! against small closures so it can be driven by the client's connection
//! without this module touching a socket directly.

use super::request;
use crate::error::Error;
use crate::types::TagInfo;
use byteorder::{ByteOrder, LittleEndian};

pub const CLASS_SYMBOL: u16 = 0x6B;
pub const CLASS_TEMPLATE: u16 = 0x6A;

const ATTR_NAME: u16 = 0x01;
const ATTR_TYPE: u16 = 0x02;

/// drops system tags (`_`/`$`-prefixed) and any name with non-printable
/// characters (spec 4.8, final filter applied regardless of which
/// strategy produced the tag).
pub fn filter_tags(tags: Vec<TagInfo>) -> Vec<TagInfo> {
    tags.into_iter().filter(|t| is_plausible_name(&t.name) && !t.name.starts_with('_') && !t.name.starts_with('$')).collect()
}

pub(crate) fn is_plausible_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_graphic() || c == ' ')
}

/// AB/Logix packed layout: `instance:u16 | 0:u16 | name_len:u16 | name |
/// type:u16 | array_size:u16 | metadata(8)`.
fn try_logix_layout(data: &[u8]) -> Option<Vec<TagInfo>> {
    let mut entries = Vec::new();
    let mut cursor = 0usize;
    while cursor < data.len() {
        if cursor + 2 > data.len() {
            return None;
        }
        let instance = LittleEndian::read_u16(&data[cursor..cursor + 2]);
        cursor += 2;
        if cursor + 2 > data.len() {
            return None;
        }
        cursor += 2; // reserved zero word
        if cursor + 2 > data.len() {
            return None;
        }
        let name_len = LittleEndian::read_u16(&data[cursor..cursor + 2]) as usize;
        cursor += 2;
        if cursor + name_len > data.len() {
            return None;
        }
        let name = std::str::from_utf8(&data[cursor..cursor + name_len]).ok()?.to_string();
        cursor += name_len;
        if cursor + 2 > data.len() {
            return None;
        }
        let type_code = LittleEndian::read_u16(&data[cursor..cursor + 2]);
        cursor += 2;
        if cursor + 2 > data.len() {
            return None;
        }
        let array_size = LittleEndian::read_u16(&data[cursor..cursor + 2]) as u32;
        cursor += 2;
        if cursor + 8 > data.len() {
            return None;
        }
        cursor += 8; // metadata
        if instance == 0 || !is_plausible_name(&name) {
            return None;
        }
        let dimensions = if array_size > 0 { vec![array_size] } else { Vec::new() };
        entries.push(TagInfo { name, type_code, instance: instance as u32, dimensions });
    }
    Some(entries)
}

/// generic CIP layout: `instance:u16 | name_len:u16 | name | type:u16`.
fn try_generic_layout(data: &[u8]) -> Option<Vec<TagInfo>> {
    let mut entries = Vec::new();
    let mut cursor = 0usize;
    while cursor < data.len() {
        if cursor + 2 > data.len() {
            return None;
        }
        let instance = LittleEndian::read_u16(&data[cursor..cursor + 2]);
        cursor += 2;
        if cursor + 2 > data.len() {
            return None;
        }
        let name_len = LittleEndian::read_u16(&data[cursor..cursor + 2]) as usize;
        cursor += 2;
        if cursor + name_len > data.len() {
            return None;
        }
        let name = std::str::from_utf8(&data[cursor..cursor + name_len]).ok()?.to_string();
        cursor += name_len;
        if cursor + 2 > data.len() {
            return None;
        }
        let type_code = LittleEndian::read_u16(&data[cursor..cursor + 2]);
        cursor += 2;
        if instance == 0 || !is_plausible_name(&name) {
            return None;
        }
        entries.push(TagInfo { name, type_code, instance: instance as u32, dimensions: Vec::new() });
    }
    Some(entries)
}

fn decode_instance_attribute_list(data: &[u8]) -> Result<Vec<TagInfo>, Error> {
    try_logix_layout(data)
        .or_else(|| try_generic_layout(data))
        .ok_or_else(|| Error::ProtocolFraming("no plausible Get Instance Attribute List layout".to_string()))
}

/// builds one Get Instance Attribute List request body: `count(u16 LE) |
/// attribute_1(u16 LE) | attribute_2(u16 LE)`.
pub fn build_request_data() -> Vec<u8> {
    let mut out = Vec::with_capacity(6);
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&ATTR_NAME.to_le_bytes());
    out.extend_from_slice(&ATTR_TYPE.to_le_bytes());
    out
}

/// strategy 1: pages through class `0x6B` via service `0x55`, continuing
/// while the reply status is partial-transfer.
pub fn get_instance_attribute_list(mut send: impl FnMut(u16) -> Result<(u8, Vec<u8>), Error>) -> Result<Vec<TagInfo>, Error> {
    let mut start = 0u16;
    let mut out = Vec::new();
    loop {
        let (status, data) = send(start)?;
        if data.is_empty() {
            break;
        }
        let entries = decode_instance_attribute_list(&data)?;
        if entries.is_empty() {
            break;
        }
        let last_instance = entries.last().unwrap().instance;
        out.extend(entries);
        if status == request::STATUS_PARTIAL_TRANSFER {
            start = (last_instance + 1) as u16;
        } else {
            break;
        }
    }
    Ok(out)
}

/// one page of Omron `0x5F` entries: `(instance, name)` pairs.
fn decode_omron_page(data: &[u8]) -> Result<Vec<(u32, String)>, Error> {
    if data.len() < 4 {
        return Err(Error::ProtocolFraming("Omron instance page too short".to_string()));
    }
    let num_entries = LittleEndian::read_u16(&data[0..2]) as usize;
    let mut cursor = 4usize;
    let mut out = Vec::with_capacity(num_entries);
    for _ in 0..num_entries {
        if cursor + 6 > data.len() {
            return Err(Error::ProtocolFraming("Omron instance entry header truncated".to_string()));
        }
        let instance = LittleEndian::read_u32(&data[cursor..cursor + 4]);
        cursor += 4;
        let data_len = LittleEndian::read_u16(&data[cursor..cursor + 2]) as usize;
        cursor += 2;
        if cursor + data_len > data.len() {
            return Err(Error::ProtocolFraming("Omron instance entry data truncated".to_string()));
        }
        let entry = &data[cursor..cursor + data_len];
        cursor += data_len;
        if entry.len() < 7 {
            return Err(Error::ProtocolFraming("Omron instance entry too short".to_string()));
        }
        let name_len = entry[6] as usize;
        if 7 + name_len > entry.len() {
            return Err(Error::ProtocolFraming("Omron instance entry name truncated".to_string()));
        }
        let name = String::from_utf8_lossy(&entry[7..7 + name_len]).into_owned();
        out.push((instance, name));
    }
    Ok(out)
}

/// builds one `0x5F` request body: `next_instance:u32 LE | 0x20 00 00 00 |
/// tag_type:u16 LE`.
pub fn build_omron_request_data(next_instance: u32, tag_type: u16) -> Vec<u8> {
    let mut out = Vec::with_capacity(10);
    out.extend_from_slice(&next_instance.to_le_bytes());
    out.extend_from_slice(&[0x20, 0x00, 0x00, 0x00]);
    out.extend_from_slice(&tag_type.to_le_bytes());
    out
}

/// strategy 2: loops `tag_type` in `{1 System, 2 User}` paging through
/// class `0x6A`, then resolves each entry's type code in a second phase
/// via symbolic Get Attributes All batched `<= 40` at a time.
pub fn omron_get_all_instances(
    mut send_page: impl FnMut(u32, u16) -> Result<Vec<u8>, Error>,
    mut resolve_types: impl FnMut(&[String]) -> Result<Vec<Option<u16>>, Error>,
) -> Result<Vec<TagInfo>, Error> {
    let mut raw_entries: Vec<(u32, String)> = Vec::new();
    for tag_type in [1u16, 2u16] {
        let mut next_instance = 0u32;
        loop {
            let data = send_page(next_instance, tag_type)?;
            let entries = decode_omron_page(&data)?;
            if entries.is_empty() {
                break;
            }
            next_instance = entries.last().unwrap().0 + 1;
            raw_entries.extend(entries);
        }
    }

    let names: Vec<String> = raw_entries.iter().map(|(_, n)| n.clone()).collect();
    let mut type_codes = Vec::with_capacity(names.len());
    for chunk in names.chunks(40) {
        type_codes.extend(resolve_types(chunk)?);
    }

    Ok(raw_entries
        .into_iter()
        .zip(type_codes)
        .filter_map(|((instance, name), type_code)| {
            type_code.filter(|_| is_plausible_name(&name)).map(|tc| TagInfo { name, type_code: tc, instance, dimensions: Vec::new() })
        })
        .collect())
}

/// strategy 3: per-instance Get Attributes All, falling back to two
/// Get Attribute Single calls (name, type) on an invalid-name reply.
/// Aborts after 10 consecutive hard errors; disables the GAS fallback
/// after 3 consecutive GAS failures.
pub fn per_instance_fallback(
    mut instance_count: impl FnMut() -> Result<u32, Error>,
    mut gaa: impl FnMut(u32) -> Result<(String, u16), Error>,
    mut gas_name: impl FnMut(u32) -> Result<Vec<u8>, Error>,
    mut gas_type: impl FnMut(u32) -> Result<Vec<u8>, Error>,
) -> Result<Vec<TagInfo>, Error> {
    let count = instance_count()?;
    let mut out = Vec::new();
    let mut consecutive_hard_errors = 0u32;
    let mut consecutive_gas_failures = 0u32;
    let mut gas_enabled = true;

    for instance in 1..=count {
        if consecutive_hard_errors >= 10 {
            log::warn!("cip discovery: aborting per-instance fallback after 10 consecutive errors");
            break;
        }
        match gaa(instance) {
            Ok((name, type_code)) => {
                consecutive_hard_errors = 0;
                if is_plausible_name(&name) {
                    out.push(TagInfo { name, type_code, instance, dimensions: Vec::new() });
                }
            }
            Err(_) if gas_enabled => match (gas_name(instance), gas_type(instance)) {
                (Ok(name_bytes), Ok(type_bytes)) if type_bytes.len() >= 2 => {
                    consecutive_hard_errors = 0;
                    consecutive_gas_failures = 0;
                    let name = String::from_utf8_lossy(&name_bytes).into_owned();
                    let type_code = LittleEndian::read_u16(&type_bytes[0..2]);
                    if is_plausible_name(&name) {
                        out.push(TagInfo { name, type_code, instance, dimensions: Vec::new() });
                    }
                }
                _ => {
                    consecutive_hard_errors += 1;
                    consecutive_gas_failures += 1;
                    if consecutive_gas_failures >= 3 {
                        gas_enabled = false;
                    }
                }
            },
            Err(_) => {
                consecutive_hard_errors += 1;
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_generic_layout() {
        let mut data = Vec::new();
        data.extend_from_slice(&7u16.to_le_bytes());
        data.extend_from_slice(&5u16.to_le_bytes());
        data.extend_from_slice(b"Speed");
        data.extend_from_slice(&0xC4u16.to_le_bytes());
        let entries = decode_instance_attribute_list(&data).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "Speed");
        assert_eq!(entries[0].instance, 7);
        assert_eq!(entries[0].type_code, 0xC4);
    }

    #[test]
    fn decodes_logix_layout() {
        let mut data = Vec::new();
        data.extend_from_slice(&3u16.to_le_bytes());
        data.extend_from_slice(&0u16.to_le_bytes());
        data.extend_from_slice(&4u16.to_le_bytes());
        data.extend_from_slice(b"Temp");
        data.extend_from_slice(&0xCAu16.to_le_bytes());
        data.extend_from_slice(&10u16.to_le_bytes());
        data.extend_from_slice(&[0u8; 8]);
        let entries = decode_instance_attribute_list(&data).unwrap();
        assert_eq!(entries[0].name, "Temp");
        assert_eq!(entries[0].dimensions, vec![10]);
    }

    #[test]
    fn paging_stops_without_partial_transfer() {
        let mut call = 0;
        let result = get_instance_attribute_list(|_start| {
            call += 1;
            let mut data = Vec::new();
            data.extend_from_slice(&1u16.to_le_bytes());
            data.extend_from_slice(&1u16.to_le_bytes());
            data.extend_from_slice(b"A");
            data.extend_from_slice(&0xC1u16.to_le_bytes());
            Ok((request::STATUS_SUCCESS, data))
        })
        .unwrap();
        assert_eq!(call, 1);
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn filter_drops_system_and_non_printable_names() {
        let tags = vec![
            TagInfo { name: "Valid".to_string(), type_code: 0xC1, instance: 1, dimensions: vec![] },
            TagInfo { name: "_System".to_string(), type_code: 0xC1, instance: 2, dimensions: vec![] },
            TagInfo { name: "$Hidden".to_string(), type_code: 0xC1, instance: 3, dimensions: vec![] },
        ];
        let kept = filter_tags(tags);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].name, "Valid");
    }

    #[test]
    fn per_instance_fallback_retries_with_gas_then_aborts() {
        let result = per_instance_fallback(
            || Ok(3),
            |_instance| Err(Error::ProtocolFraming("invalid name".to_string())),
            |_instance| Ok(b"Tag".to_vec()),
            |_instance| Ok(0xC4u16.to_le_bytes().to_vec()),
        )
        .unwrap();
        assert_eq!(result.len(), 3);
        assert!(result.iter().all(|t| t.type_code == 0xC4));
    }
}
