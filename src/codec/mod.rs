//! Type-code registry and byte codec shared by all three protocols.
//!
//! The teacher's `field` module decoded one PLC-native byte shape
//! (`Float`, `Double`, `Bool`, `Word`) each hand-rolled against
//! `BigEndian`. This module generalizes that into a closed table of type
//! codes plus endian-aware `encode`/`decode`, since FINS is big-endian,
//! CIP is little-endian and S7 is big-endian but all three need to agree
//! on one in-memory representation.

mod value;

pub use value::Value;

use crate::error::Error;
use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// high bit of a type code marks "this tag is an array of the base type".
pub const ARRAY_FLAG: u16 = 0x8000;
/// type codes with this high byte (after masking the array bit) are CIP
/// UDT/struct instances; the codec does not decode their payload.
const STRUCT_HIGH_BYTE_MASK: u16 = 0x7F00;
const STRUCT_HIGH_BYTE: u16 = 0x0200;

pub const BOOL: u16 = 0xC1;
pub const SINT: u16 = 0xC2;
pub const INT: u16 = 0xC3;
pub const DINT: u16 = 0xC4;
pub const LINT: u16 = 0xC5;
pub const BYTE: u16 = 0xD1;
pub const WORD: u16 = 0xD2;
pub const DWORD: u16 = 0xD3;
pub const LWORD: u16 = 0xD4;
pub const REAL: u16 = 0xCA;
pub const LREAL: u16 = 0xCB;
pub const STRING: u16 = 0xD0;
pub const WSTRING: u16 = 0xDB;

/// default S7 STRING `max_len` when encoding without a prior header read
/// (spec 4.1).
pub const DEFAULT_STRING_MAX_LEN: u8 = 254;

/// strips the array flag, returning `(base_code, is_array)`.
pub fn split_array_flag(code: u16) -> (u16, bool) {
    (code & !ARRAY_FLAG, code & ARRAY_FLAG != 0)
}

/// true if `code` (array flag ignored) names a CIP UDT/struct instance.
pub fn is_struct(code: u16) -> bool {
    let (base, _) = split_array_flag(code);
    base & STRUCT_HIGH_BYTE_MASK == STRUCT_HIGH_BYTE
}

/// size in bytes of one element of `code`; 0 for STRING/WSTRING/structs
/// (variable length).
pub fn type_size(code: u16) -> usize {
    let (base, _) = split_array_flag(code);
    if is_struct(base) {
        return 0;
    }
    match base {
        BOOL | SINT | BYTE => 1,
        INT | WORD => 2,
        DINT | DWORD | REAL => 4,
        LINT | LWORD | LREAL => 8,
        STRING | WSTRING => 0,
        _ => 0,
    }
}

/// stable human-readable name, preserving the `[]` array suffix.
pub fn type_name(code: u16) -> String {
    let (base, is_array) = split_array_flag(code);
    let name = match base {
        BOOL => "BOOL",
        SINT => "SINT",
        INT => "INT",
        DINT => "DINT",
        LINT => "LINT",
        BYTE => "BYTE",
        WORD => "WORD",
        DWORD => "DWORD",
        LWORD => "LWORD",
        REAL => "REAL",
        LREAL => "LREAL",
        STRING => "STRING",
        WSTRING => "WSTRING",
        _ => {
            if is_struct(base) {
                "STRUCT"
            } else {
                "UNKNOWN"
            }
        }
    };
    if is_array {
        format!("{}[]", name)
    } else {
        name.to_string()
    }
}

/// resolves a canonical name or documented alias (case-insensitive) to a
/// type code. A trailing `[]` sets the array flag.
pub fn type_code_from_name(name: &str) -> Option<u16> {
    let trimmed = name.trim();
    let (base_name, is_array) = if let Some(stripped) = trimmed.strip_suffix("[]") {
        (stripped.trim(), true)
    } else {
        (trimmed, false)
    };
    let base = match base_name.to_ascii_uppercase().as_str() {
        "BOOL" | "BIT" => BOOL,
        "SINT" | "INT8" => SINT,
        "INT" | "INT16" => INT,
        "DINT" | "INT32" => DINT,
        "LINT" | "INT64" => LINT,
        "BYTE" | "USINT" | "UINT8" => BYTE,
        "WORD" | "UINT" | "UINT16" => WORD,
        "DWORD" | "UDINT" | "UINT32" => DWORD,
        "LWORD" | "ULINT" | "UINT64" => LWORD,
        "REAL" | "FLOAT" | "FLOAT32" => REAL,
        "LREAL" | "DOUBLE" | "FLOAT64" => LREAL,
        "STRING" => STRING,
        "WSTRING" => WSTRING,
        _ => return None,
    };
    Some(if is_array { base | ARRAY_FLAG } else { base })
}

fn type_mismatch(expected: &str, value: &Value) -> Error {
    Error::TypeMismatch(expected.to_string(), value.kind_name().to_string())
}

/// encodes a logical value to its wire byte representation under the
/// requested byte order. Fails with `TypeMismatch` when `value`'s kind is
/// incompatible with `code` (e.g. a string for a numeric code).
pub fn encode(value: &Value, code: u16, big_endian: bool) -> Result<Vec<u8>, Error> {
    let (base, _) = split_array_flag(code);

    macro_rules! write_int {
        ($ty:ty, $be:ident, $le:ident, $expect:expr) => {{
            let n: $ty = value.as_int().ok_or_else(|| type_mismatch($expect, value))? as $ty;
            let mut buf = vec![0u8; std::mem::size_of::<$ty>()];
            if big_endian {
                BigEndian::$be(&mut buf, n);
            } else {
                LittleEndian::$le(&mut buf, n);
            }
            buf
        }};
    }

    let bytes = match base {
        BOOL => {
            let b = value.as_bool().ok_or_else(|| type_mismatch("BOOL", value))?;
            vec![if b { 1u8 } else { 0u8 }]
        }
        SINT => {
            let n = value.as_int().ok_or_else(|| type_mismatch("SINT", value))?;
            vec![n as i8 as u8]
        }
        BYTE => {
            let n = value.as_int().ok_or_else(|| type_mismatch("BYTE", value))?;
            vec![n as u8]
        }
        INT => write_int!(i16, write_i16, write_i16, "INT"),
        WORD => write_int!(u16, write_u16, write_u16, "WORD"),
        DINT => write_int!(i32, write_i32, write_i32, "DINT"),
        DWORD => write_int!(u32, write_u32, write_u32, "DWORD"),
        LINT => write_int!(i64, write_i64, write_i64, "LINT"),
        LWORD => write_int!(u64, write_u64, write_u64, "LWORD"),
        REAL => {
            let f = value.as_float().ok_or_else(|| type_mismatch("REAL", value))? as f32;
            let mut buf = vec![0u8; 4];
            if big_endian {
                BigEndian::write_f32(&mut buf, f);
            } else {
                LittleEndian::write_f32(&mut buf, f);
            }
            buf
        }
        LREAL => {
            let f = value.as_float().ok_or_else(|| type_mismatch("LREAL", value))?;
            let mut buf = vec![0u8; 8];
            if big_endian {
                BigEndian::write_f64(&mut buf, f);
            } else {
                LittleEndian::write_f64(&mut buf, f);
            }
            buf
        }
        STRING => {
            let s = value.as_str().ok_or_else(|| type_mismatch("STRING", value))?;
            encode_s7_string(s, DEFAULT_STRING_MAX_LEN)
        }
        WSTRING => {
            let s = value.as_str().ok_or_else(|| type_mismatch("WSTRING", value))?;
            encode_wstring(s)
        }
        _ => {
            if is_struct(base) {
                return Err(Error::Unsupported("encoding struct/UDT values".to_string()));
            }
            return Err(Error::TypeMismatch(
                "known type code".to_string(),
                format!("{:#06X}", base),
            ));
        }
    };
    Ok(bytes)
}

/// decodes raw bytes to a logical value. Length-tolerant: short input
/// yields the type's zero value rather than panicking.
pub fn decode(code: u16, bytes: &[u8], big_endian: bool) -> Value {
    let (base, is_array) = split_array_flag(code);
    if is_array {
        return decode_array(base, bytes, big_endian);
    }
    decode_scalar(base, bytes, big_endian)
}

fn decode_scalar(base: u16, bytes: &[u8], big_endian: bool) -> Value {
    let read = |n: usize| -> Vec<u8> {
        let mut buf = vec![0u8; n];
        let copy_len = bytes.len().min(n);
        buf[..copy_len].copy_from_slice(&bytes[..copy_len]);
        buf
    };
    match base {
        BOOL => Value::Bool(bytes.first().map(|b| *b != 0).unwrap_or(false)),
        SINT => Value::I8(*bytes.first().unwrap_or(&0) as i8),
        BYTE => Value::U8(*bytes.first().unwrap_or(&0)),
        INT => {
            let b = read(2);
            Value::I16(if big_endian { BigEndian::read_i16(&b) } else { LittleEndian::read_i16(&b) })
        }
        WORD => {
            let b = read(2);
            Value::U16(if big_endian { BigEndian::read_u16(&b) } else { LittleEndian::read_u16(&b) })
        }
        DINT => {
            let b = read(4);
            Value::I32(if big_endian { BigEndian::read_i32(&b) } else { LittleEndian::read_i32(&b) })
        }
        DWORD => {
            let b = read(4);
            Value::U32(if big_endian { BigEndian::read_u32(&b) } else { LittleEndian::read_u32(&b) })
        }
        LINT => {
            let b = read(8);
            Value::I64(if big_endian { BigEndian::read_i64(&b) } else { LittleEndian::read_i64(&b) })
        }
        LWORD => {
            let b = read(8);
            Value::U64(if big_endian { BigEndian::read_u64(&b) } else { LittleEndian::read_u64(&b) })
        }
        REAL => {
            let b = read(4);
            Value::F32(if big_endian { BigEndian::read_f32(&b) } else { LittleEndian::read_f32(&b) })
        }
        LREAL => {
            let b = read(8);
            Value::F64(if big_endian { BigEndian::read_f64(&b) } else { LittleEndian::read_f64(&b) })
        }
        STRING => Value::String(decode_s7_string(bytes)),
        WSTRING => Value::String(decode_wstring(bytes, big_endian)),
        _ => {
            if is_struct(base) {
                Value::Bytes(bytes.to_vec())
            } else {
                Value::Bytes(bytes.to_vec())
            }
        }
    }
}

fn decode_array(base: u16, bytes: &[u8], big_endian: bool) -> Value {
    let elem_size = type_size(base).max(1);
    let chunks: Vec<&[u8]> = bytes.chunks(elem_size).collect();
    macro_rules! collect {
        ($variant:ident, $accessor:ident) => {
            Value::$variant(
                chunks
                    .iter()
                    .map(|c| match decode_scalar(base, c, big_endian) {
                        Value::$accessor(v) => v,
                        _ => unreachable!(),
                    })
                    .collect(),
            )
        };
    }
    match base {
        BOOL => collect!(BoolArray, Bool),
        SINT => collect!(I8Array, I8),
        BYTE => collect!(U8Array, U8),
        INT => collect!(I16Array, I16),
        WORD => collect!(U16Array, U16),
        DINT => collect!(I32Array, I32),
        DWORD => collect!(U32Array, U32),
        LINT => collect!(I64Array, I64),
        LWORD => collect!(U64Array, U64),
        REAL => collect!(F32Array, F32),
        LREAL => collect!(F64Array, F64),
        _ => Value::Bytes(bytes.to_vec()),
    }
}

/// S7 STRING: `[max_len:u8][cur_len:u8][chars...]`, padded to `max_len+2`.
fn encode_s7_string(s: &str, max_len: u8) -> Vec<u8> {
    let chars = s.as_bytes();
    let cur_len = chars.len().min(max_len as usize) as u8;
    let mut buf = vec![0u8; max_len as usize + 2];
    buf[0] = max_len;
    buf[1] = cur_len;
    let copy_len = cur_len as usize;
    buf[2..2 + copy_len].copy_from_slice(&chars[..copy_len]);
    buf
}

fn decode_s7_string(bytes: &[u8]) -> String {
    if bytes.len() < 2 {
        return String::new();
    }
    let cur_len = bytes[1] as usize;
    let available = bytes.len() - 2;
    let n = cur_len.min(available);
    String::from_utf8_lossy(&bytes[2..2 + n]).into_owned()
}

/// S7 WSTRING: UTF-16BE analogue of STRING, 2-byte lengths.
fn encode_wstring(s: &str) -> Vec<u8> {
    let units: Vec<u16> = s.encode_utf16().collect();
    let max_len = units.len() as u16;
    let mut buf = vec![0u8; 4 + units.len() * 2];
    BigEndian::write_u16(&mut buf[0..2], max_len);
    BigEndian::write_u16(&mut buf[2..4], units.len() as u16);
    for (i, u) in units.iter().enumerate() {
        BigEndian::write_u16(&mut buf[4 + i * 2..6 + i * 2], *u);
    }
    buf
}

fn decode_wstring(bytes: &[u8], _big_endian: bool) -> String {
    if bytes.len() < 4 {
        return String::new();
    }
    let cur_len = BigEndian::read_u16(&bytes[2..4]) as usize;
    let available = (bytes.len() - 4) / 2;
    let n = cur_len.min(available);
    let units: Vec<u16> = (0..n)
        .map(|i| BigEndian::read_u16(&bytes[4 + i * 2..6 + i * 2]))
        .collect();
    String::from_utf16_lossy(&units)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn real_round_trip_big_endian() {
        let bytes = encode(&Value::F32(std::f32::consts::PI), REAL, true).unwrap();
        assert_eq!(bytes, vec![0x40, 0x49, 0x0F, 0xDB]);
        let back = decode(REAL, &bytes, true);
        match back {
            Value::F32(f) => assert!((f - std::f32::consts::PI).abs() < 1e-6),
            _ => panic!("expected F32"),
        }
    }

    #[test]
    fn real_round_trip_little_endian() {
        let bytes = encode(&Value::F32(std::f32::consts::PI), REAL, false).unwrap();
        assert_eq!(bytes, vec![0xDB, 0x0F, 0x49, 0x40]);
    }

    #[test]
    fn decode_is_length_tolerant() {
        // a truncated WORD decodes to its zero value rather than panicking.
        let v = decode(WORD, &[0x01], true);
        assert_eq!(v, Value::U16(0x0100));
        let v = decode(WORD, &[], true);
        assert_eq!(v, Value::U16(0));
    }

    #[test]
    fn type_mismatch_on_incompatible_kind() {
        let err = encode(&Value::String("x".into()), REAL, true).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch(_, _)));
    }

    #[test]
    fn name_aliases_resolve_to_same_code() {
        assert_eq!(type_code_from_name("BYTE"), type_code_from_name("USINT"));
        assert_eq!(type_code_from_name("WORD"), type_code_from_name("UINT"));
        assert_eq!(type_code_from_name("DWORD"), type_code_from_name("UDINT"));
    }

    #[test]
    fn array_suffix_round_trips_through_name() {
        let code = type_code_from_name("INT[]").unwrap();
        assert_eq!(type_name(code), "INT[]");
    }

    #[test]
    fn s7_string_round_trip() {
        let encoded = encode_s7_string("hi", 10);
        assert_eq!(encoded.len(), 12);
        assert_eq!(decode_s7_string(&encoded), "hi");
    }
}
