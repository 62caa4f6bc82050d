//! FINS address grammar (spec 4.2):
//! ```text
//! word = area (':'? digits) ('[' digits ']')?
//! bit  = area (':'? digits) '.' digits ('[' digits ']')?
//! area = "EM" [0-9A-C] | LETTERS
//! ```
//! A hand-written recursive-descent parser, matching the teacher corpus's
//! preference for regex-free parsers in dependency-light crates (spec 9).

use crate::codec::{self, BOOL, WORD};
use crate::error::Error;

/// a parsed FINS memory reference (spec 3, "ParsedAddress / FINS").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinsAddress {
    /// canonical area token, e.g. "DM", "CIO", "EM2", "EMA".
    pub area_token: String,
    /// the FINS memory-area byte for this specific access kind (word vs bit
    /// reads use different area codes for the same logical memory area).
    pub memory_area: u8,
    pub word_address: u16,
    pub bit_offset: u8,
    pub is_bit: bool,
    pub type_code: u16,
    pub count: u32,
}

struct AreaCodes {
    word: u8,
    bit: u8,
}

fn area_codes(token: &str) -> Option<AreaCodes> {
    match token {
        "CIO" => Some(AreaCodes { word: 0xB0, bit: 0x30 }),
        "WR" => Some(AreaCodes { word: 0xB1, bit: 0x31 }),
        "HR" => Some(AreaCodes { word: 0xB2, bit: 0x32 }),
        "AR" => Some(AreaCodes { word: 0xB3, bit: 0x33 }),
        "DM" => Some(AreaCodes { word: 0x82, bit: 0x02 }),
        "TK" => Some(AreaCodes { word: 0x86, bit: 0x06 }),
        "TC" => Some(AreaCodes { word: 0x89, bit: 0x09 }),
        _ => {
            if let Some(bank) = token.strip_prefix("EM") {
                let n = em_bank_value(bank)?;
                Some(AreaCodes { word: 0xA0 + n, bit: 0x20 + n })
            } else {
                None
            }
        }
    }
}

fn em_bank_value(bank: &str) -> Option<u8> {
    let mut chars = bank.chars();
    let c = chars.next()?;
    if chars.next().is_some() {
        return None; // exactly one bank character
    }
    match c {
        '0'..='9' => Some(c as u8 - b'0'),
        'A' => Some(10),
        'B' => Some(11),
        'C' => Some(12),
        _ => None,
    }
}

/// longest-match area-token recognition at the start of `s` (already
/// uppercased). Returns `(token, rest)`.
fn split_area(s: &str) -> Option<(String, &str)> {
    if let Some(rest) = s.strip_prefix("EM") {
        let mut chars = rest.char_indices();
        if let Some((_, c)) = chars.next() {
            if c.is_ascii_alphanumeric() {
                let bank_len = c.len_utf8();
                let token = format!("EM{}", c);
                if em_bank_value(&token[2..]).is_some() {
                    return Some((token, &rest[bank_len..]));
                }
            }
        }
        return None;
    }
    for token in ["CIO", "WR", "HR", "AR", "DM", "TK", "TC"] {
        if let Some(rest) = s.strip_prefix(token) {
            return Some((token.to_string(), rest));
        }
    }
    None
}

fn take_digits(s: &str) -> (&str, &str) {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    (&s[..end], &s[end..])
}

/// parses a FINS address string; `type_hint` overrides the default type
/// code for word addresses (bit addresses are always BOOL, per invariant).
pub fn parse(input: &str, type_hint: Option<&str>) -> Result<FinsAddress, Error> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidAddress(input.to_string()));
    }
    let upper = trimmed.to_ascii_uppercase();

    let (area_token, rest) = split_area(&upper).ok_or_else(|| Error::InvalidAddress(input.to_string()))?;
    let codes = area_codes(&area_token).ok_or_else(|| Error::UnknownMnemonic(area_token.clone()))?;

    let rest = rest.strip_prefix(':').unwrap_or(rest);
    let (digits, rest) = take_digits(rest);
    if digits.is_empty() {
        return Err(Error::InvalidAddress(input.to_string()));
    }
    let word_address: u16 = digits.parse().map_err(|_| Error::InvalidAddress(input.to_string()))?;

    let (is_bit, bit_offset, rest) = if let Some(rest) = rest.strip_prefix('.') {
        let (bit_digits, rest) = take_digits(rest);
        if bit_digits.is_empty() {
            return Err(Error::InvalidAddress(input.to_string()));
        }
        let bit: u32 = bit_digits.parse().map_err(|_| Error::InvalidAddress(input.to_string()))?;
        if bit > 15 {
            return Err(Error::BitOutOfRange(bit as u8));
        }
        (true, bit as u8, rest)
    } else {
        (false, 0u8, rest)
    };

    let (count, rest) = if let Some(rest) = rest.strip_prefix('[') {
        let (count_digits, rest) = take_digits(rest);
        let rest = rest.strip_prefix(']').ok_or_else(|| Error::InvalidAddress(input.to_string()))?;
        let count: u32 = count_digits.parse().map_err(|_| Error::InvalidAddress(input.to_string()))?;
        (count.max(1), rest)
    } else {
        (1u32, rest)
    };

    if !rest.is_empty() {
        return Err(Error::InvalidAddress(input.to_string()));
    }

    let type_code = if is_bit {
        BOOL
    } else if let Some(hint) = type_hint {
        codec::type_code_from_name(hint).ok_or_else(|| Error::UnknownMnemonic(hint.to_string()))?
    } else {
        WORD
    };

    let memory_area = if is_bit { codes.bit } else { codes.word };

    Ok(FinsAddress {
        area_token,
        memory_area,
        word_address,
        bit_offset,
        is_bit,
        type_code,
        count,
    })
}

/// number of 16-bit words a single element of this address occupies (e.g. 2
/// for a DINT/REAL-typed word address, 1 for the WORD default).
pub fn word_span(addr: &FinsAddress) -> u32 {
    if addr.is_bit {
        return 1;
    }
    let elem_words = ((codec::type_size(addr.type_code).max(1) + 1) / 2) as u32;
    addr.count * elem_words
}

/// reconstructs the canonical string form of a parsed address.
pub fn format(addr: &FinsAddress) -> String {
    let mut s = format!("{}{}", addr.area_token, addr.word_address);
    if addr.is_bit {
        s.push('.');
        s.push_str(&addr.bit_offset.to_string());
    }
    if addr.count > 1 {
        s.push('[');
        s.push_str(&addr.count.to_string());
        s.push(']');
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dm_word_with_count() {
        let a = parse("DM100[3]", None).unwrap();
        assert_eq!(a.memory_area, 0x82);
        assert_eq!(a.word_address, 100);
        assert_eq!(a.bit_offset, 0);
        assert_eq!(a.type_code, WORD);
        assert_eq!(a.count, 3);
        assert!(!a.is_bit);
    }

    #[test]
    fn parses_cio_bit() {
        let a = parse("CIO50.7", None).unwrap();
        assert_eq!(a.memory_area, 0x30);
        assert_eq!(a.word_address, 50);
        assert_eq!(a.bit_offset, 7);
        assert_eq!(a.type_code, BOOL);
        assert!(a.is_bit);
    }

    #[test]
    fn parses_em_bank_with_colon() {
        let a = parse("EM2:500", None).unwrap();
        assert_eq!(a.area_token, "EM2");
        assert_eq!(a.memory_area, 0xA2);
        assert_eq!(a.word_address, 500);
    }

    #[test]
    fn rejects_bit_out_of_range() {
        let err = parse("DM100.16", None).unwrap_err();
        assert_eq!(err, Error::BitOutOfRange(16));
    }

    #[test]
    fn case_insensitive_and_trims_whitespace() {
        let a = parse("  dm100  ", None).unwrap();
        assert_eq!(a.area_token, "DM");
        assert_eq!(a.word_address, 100);
    }

    #[test]
    fn format_round_trips_canonical_form() {
        for input in ["DM100[3]", "CIO50.7", "EM2500", "EMA10"] {
            let parsed = parse(input, None).unwrap();
            let canonical = format(&parsed);
            let reparsed = parse(&canonical, None).unwrap();
            assert_eq!(parsed, reparsed);
        }
    }

    #[test]
    fn unrecognized_area_token_is_invalid_address() {
        let err = parse("ZZ100", None).unwrap_err();
        assert!(matches!(err, Error::InvalidAddress(_)));
    }
}
