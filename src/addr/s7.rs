//! S7 address grammar (spec 4.2):
//! ```text
//! db_typed  = "DB" n "." "DB" [XBWDL] n ("." bit)?
//! db_simple = "DB" n "." n ("[" n "]")?          ; requires type hint
//! iqm       = [IQM] [XBWDL]? n ("." bit)?
//! tc        = [TC] n
//! ```

use crate::codec::{self, BOOL, BYTE, DWORD, LINT, WORD};
use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum S7Area {
    Db,
    I,
    Q,
    M,
    T,
    C,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S7Address {
    pub area: S7Area,
    /// only `Some` when `area == Db`.
    pub db_number: Option<u16>,
    pub byte_offset: i32,
    /// `-1` means "no bit" (the invariant: `bit_num in 0..=7` iff `type_code == BOOL`).
    pub bit_num: i8,
    pub type_code: u16,
    pub byte_size: u32,
    pub count: u32,
}

fn take_digits(s: &str) -> (&str, &str) {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    (&s[..end], &s[end..])
}

fn type_letter_code(c: char) -> Option<u16> {
    match c {
        'X' => Some(BOOL),
        'B' => Some(BYTE),
        'W' => Some(WORD),
        'D' => Some(DWORD),
        'L' => Some(LINT),
        _ => None,
    }
}

fn parse_bit_suffix(rest: &str, input: &str) -> Result<(i8, &str), Error> {
    if let Some(after_dot) = rest.strip_prefix('.') {
        let (digits, after) = take_digits(after_dot);
        if digits.is_empty() {
            return Err(Error::InvalidAddress(input.to_string()));
        }
        let bit: u32 = digits.parse().map_err(|_| Error::InvalidAddress(input.to_string()))?;
        if bit > 7 {
            return Err(Error::BitOutOfRange(bit as u8));
        }
        Ok((bit as i8, after))
    } else {
        Ok((-1, rest))
    }
}

fn parse_array_suffix<'a>(rest: &'a str, input: &str) -> Result<(u32, &'a str), Error> {
    if let Some(after_bracket) = rest.strip_prefix('[') {
        let (digits, after) = take_digits(after_bracket);
        let after = after.strip_prefix(']').ok_or_else(|| Error::InvalidAddress(input.to_string()))?;
        let count: u32 = digits.parse().map_err(|_| Error::InvalidAddress(input.to_string()))?;
        Ok((count.max(1), after))
    } else {
        Ok((1, rest))
    }
}

fn resolve_hint(hint: Option<&str>, input: &str) -> Result<u16, Error> {
    let hint = hint.ok_or_else(|| {
        Error::InvalidAddress(format!("{} (requires a type hint)", input))
    })?;
    codec::type_code_from_name(hint).ok_or_else(|| Error::UnknownMnemonic(hint.to_string()))
}

/// parses an S7 address string; `type_hint` is required by `db_simple` and
/// bare `iqm` forms that carry no type letter and no bit suffix.
pub fn parse(input: &str, type_hint: Option<&str>) -> Result<S7Address, Error> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidAddress(input.to_string()));
    }
    let upper = trimmed.to_ascii_uppercase();

    if let Some(rest) = upper.strip_prefix("DB") {
        return parse_db(rest, input, type_hint);
    }

    let mut chars = upper.chars();
    let area_letter = chars.next().ok_or_else(|| Error::InvalidAddress(input.to_string()))?;
    let rest = chars.as_str();

    match area_letter {
        'I' | 'Q' | 'M' => parse_iqm(area_letter, rest, input, type_hint),
        'T' | 'C' => parse_tc(area_letter, rest, input),
        _ => Err(Error::InvalidAddress(input.to_string())),
    }
}

fn parse_db(rest: &str, input: &str, type_hint: Option<&str>) -> Result<S7Address, Error> {
    let (db_digits, rest) = take_digits(rest);
    if db_digits.is_empty() {
        return Err(Error::InvalidAddress(input.to_string()));
    }
    let db_number: u16 = db_digits.parse().map_err(|_| Error::InvalidAddress(input.to_string()))?;
    let rest = rest.strip_prefix('.').ok_or_else(|| Error::InvalidAddress(input.to_string()))?;

    if let Some(rest) = rest.strip_prefix("DB") {
        // db_typed: "DB" n "." "DB" [XBWDL] n ("." bit)?
        let mut chars = rest.chars();
        let type_letter = chars.next().ok_or_else(|| Error::InvalidAddress(input.to_string()))?;
        let type_code = type_letter_code(type_letter).ok_or_else(|| Error::UnknownMnemonic(type_letter.to_string()))?;
        let rest = chars.as_str();
        let (digits, rest) = take_digits(rest);
        if digits.is_empty() {
            return Err(Error::InvalidAddress(input.to_string()));
        }
        let byte_offset: i32 = digits.parse().map_err(|_| Error::InvalidAddress(input.to_string()))?;

        if type_letter == 'X' {
            let (bit, rest) = parse_bit_suffix(rest, input)?;
            if bit < 0 {
                return Err(Error::InvalidAddress(format!("{} (DBX requires a bit)", input)));
            }
            if !rest.is_empty() {
                return Err(Error::InvalidAddress(input.to_string()));
            }
            return Ok(S7Address {
                area: S7Area::Db,
                db_number: Some(db_number),
                byte_offset,
                bit_num: bit,
                type_code,
                byte_size: 1,
                count: 1,
            });
        }

        if rest.starts_with('.') {
            return Err(Error::InvalidAddress(format!("{} (no bit allowed on DB{})", input, type_letter)));
        }
        if !rest.is_empty() {
            return Err(Error::InvalidAddress(input.to_string()));
        }
        Ok(S7Address {
            area: S7Area::Db,
            db_number: Some(db_number),
            byte_offset,
            bit_num: -1,
            type_code,
            byte_size: codec::type_size(type_code) as u32,
            count: 1,
        })
    } else {
        // db_simple: "DB" n "." n ("[" n "]")?  — requires type hint
        let (digits, rest) = take_digits(rest);
        if digits.is_empty() {
            return Err(Error::InvalidAddress(input.to_string()));
        }
        let byte_offset: i32 = digits.parse().map_err(|_| Error::InvalidAddress(input.to_string()))?;
        let (count, rest) = parse_array_suffix(rest, input)?;
        if !rest.is_empty() {
            return Err(Error::InvalidAddress(input.to_string()));
        }
        let type_code = resolve_hint(type_hint, input)?;
        Ok(S7Address {
            area: S7Area::Db,
            db_number: Some(db_number),
            byte_offset,
            bit_num: -1,
            type_code,
            byte_size: codec::type_size(type_code) as u32,
            count,
        })
    }
}

fn parse_iqm(area_letter: char, rest: &str, input: &str, type_hint: Option<&str>) -> Result<S7Address, Error> {
    let area = match area_letter {
        'I' => S7Area::I,
        'Q' => S7Area::Q,
        'M' => S7Area::M,
        _ => unreachable!(),
    };

    let mut chars = rest.chars();
    let (type_letter, after_letter) = match chars.next() {
        Some(c) if type_letter_code(c).is_some() => (Some(c), chars.as_str()),
        _ => (None, rest),
    };

    let (digits, after_digits) = take_digits(after_letter);
    if digits.is_empty() {
        return Err(Error::InvalidAddress(input.to_string()));
    }
    let byte_offset: i32 = digits.parse().map_err(|_| Error::InvalidAddress(input.to_string()))?;

    match type_letter {
        Some('X') => {
            let (bit, rest) = parse_bit_suffix(after_digits, input)?;
            if bit < 0 {
                return Err(Error::InvalidAddress(format!("{} ({}X requires a bit)", input, area_letter)));
            }
            if !rest.is_empty() {
                return Err(Error::InvalidAddress(input.to_string()));
            }
            Ok(S7Address { area, db_number: None, byte_offset, bit_num: bit, type_code: BOOL, byte_size: 1, count: 1 })
        }
        Some(c) => {
            let type_code = type_letter_code(c).unwrap();
            if after_digits.starts_with('.') {
                return Err(Error::InvalidAddress(format!("{} (no bit allowed on {}{})", input, area_letter, c)));
            }
            if !after_digits.is_empty() {
                return Err(Error::InvalidAddress(input.to_string()));
            }
            Ok(S7Address {
                area,
                db_number: None,
                byte_offset,
                bit_num: -1,
                type_code,
                byte_size: codec::type_size(type_code) as u32,
                count: 1,
            })
        }
        None => {
            let (bit, rest) = parse_bit_suffix(after_digits, input)?;
            if !rest.is_empty() {
                return Err(Error::InvalidAddress(input.to_string()));
            }
            if bit >= 0 {
                Ok(S7Address { area, db_number: None, byte_offset, bit_num: bit, type_code: BOOL, byte_size: 1, count: 1 })
            } else {
                let type_code = resolve_hint(type_hint, input)?;
                Ok(S7Address {
                    area,
                    db_number: None,
                    byte_offset,
                    bit_num: -1,
                    type_code,
                    byte_size: codec::type_size(type_code) as u32,
                    count: 1,
                })
            }
        }
    }
}

fn parse_tc(area_letter: char, rest: &str, input: &str) -> Result<S7Address, Error> {
    let area = if area_letter == 'T' { S7Area::T } else { S7Area::C };
    let (digits, rest) = take_digits(rest);
    if digits.is_empty() || !rest.is_empty() {
        return Err(Error::InvalidAddress(input.to_string()));
    }
    let byte_offset: i32 = digits.parse().map_err(|_| Error::InvalidAddress(input.to_string()))?;
    Ok(S7Address {
        area,
        db_number: None,
        byte_offset,
        bit_num: -1,
        type_code: WORD,
        byte_size: 2,
        count: 1,
    })
}

/// reconstructs the canonical string form of a parsed address.
pub fn format(addr: &S7Address) -> String {
    match addr.area {
        S7Area::Db => {
            let db = addr.db_number.unwrap_or(0);
            let letter = match addr.type_code {
                BOOL => 'X',
                BYTE => 'B',
                WORD => 'W',
                DWORD => 'D',
                LINT => 'L',
                _ => 'B',
            };
            let mut s = format!("DB{}.DB{}{}", db, letter, addr.byte_offset);
            if addr.bit_num >= 0 {
                s.push('.');
                s.push_str(&addr.bit_num.to_string());
            }
            s
        }
        S7Area::T | S7Area::C => {
            let letter = if addr.area == S7Area::T { 'T' } else { 'C' };
            format!("{}{}", letter, addr.byte_offset)
        }
        _ => {
            let area_letter = match addr.area {
                S7Area::I => 'I',
                S7Area::Q => 'Q',
                S7Area::M => 'M',
                _ => unreachable!(),
            };
            if addr.bit_num >= 0 {
                format!("{}{}.{}", area_letter, addr.byte_offset, addr.bit_num)
            } else {
                let letter = match addr.type_code {
                    BYTE => "B",
                    WORD => "W",
                    DWORD => "D",
                    LINT => "L",
                    _ => "B",
                };
                format!("{}{}{}", area_letter, letter, addr.byte_offset)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_db_typed_dword() {
        let a = parse("DB1.DBD4", None).unwrap();
        assert_eq!(a.area, S7Area::Db);
        assert_eq!(a.db_number, Some(1));
        assert_eq!(a.byte_offset, 4);
        assert_eq!(a.bit_num, -1);
        assert_eq!(a.type_code, DWORD);
        assert_eq!(a.byte_size, 4);
    }

    #[test]
    fn parses_m_bit() {
        let a = parse("M0.3", None).unwrap();
        assert_eq!(a.area, S7Area::M);
        assert_eq!(a.byte_offset, 0);
        assert_eq!(a.bit_num, 3);
        assert_eq!(a.type_code, BOOL);
    }

    #[test]
    fn dbx_without_bit_is_parse_error() {
        let err = parse("DB1.DBX0", None).unwrap_err();
        assert!(matches!(err, Error::InvalidAddress(_)));
    }

    #[test]
    fn db_simple_with_type_hint() {
        let a = parse("DB10.0", Some("DINT")).unwrap();
        assert_eq!(a.area, S7Area::Db);
        assert_eq!(a.db_number, Some(10));
        assert_eq!(a.byte_offset, 0);
        assert_eq!(a.type_code, codec::type_code_from_name("DINT").unwrap());
        assert_eq!(a.byte_size, 4);
    }

    #[test]
    fn db_simple_without_hint_errors() {
        let err = parse("DB10.0", None).unwrap_err();
        assert!(matches!(err, Error::InvalidAddress(_)));
    }

    #[test]
    fn timer_and_counter_are_16_bit_words() {
        let t = parse("T5", None).unwrap();
        assert_eq!(t.area, S7Area::T);
        assert_eq!(t.byte_size, 2);
        let c = parse("C10", None).unwrap();
        assert_eq!(c.area, S7Area::C);
        assert_eq!(c.byte_size, 2);
    }

    #[test]
    fn format_round_trips_canonical_form() {
        for input in ["DB1.DBD4", "DB1.DBX0.3", "M0.3", "MW10", "T5", "C10"] {
            let parsed = parse(input, None).unwrap();
            let canonical = format(&parsed);
            let reparsed = parse(&canonical, None).unwrap();
            assert_eq!(parsed, reparsed);
        }
    }
}
