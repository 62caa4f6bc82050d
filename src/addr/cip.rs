//! CIP symbolic tag addressing and EPath encoding (spec 4.2/4.4).
//!
//! Grammar:
//! ```text
//! path    = ("Program:" name ".")? name ("." name | "[" n "]")*
//! name    = letter (letter | digit | '_')*
//! ```
//! EPath segments follow ODVA CIP spec vol 1: ANSI extended symbol segment
//! (`0x91 len name...` padded to an even length) for each name component,
//! element logical segments (`0x28`/`0x29`/`0x2A`, smallest width that fits)
//! for each array index.

use crate::error::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CipSegment {
    Name(String),
    Index(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipPath {
    pub program: Option<String>,
    pub segments: Vec<CipSegment>,
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn take_ident(s: &str) -> (&str, &str) {
    let mut chars = s.char_indices();
    match chars.next() {
        Some((_, c)) if is_ident_start(c) => {}
        _ => return ("", s),
    }
    let end = chars
        .find(|(_, c)| !is_ident_continue(*c))
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    (&s[..end], &s[end..])
}

/// parses a CIP symbolic tag address.
pub fn parse(input: &str) -> Result<CipPath, Error> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidAddress(input.to_string()));
    }

    let (program, rest) = if let Some(after) = trimmed.strip_prefix("Program:") {
        let (name, after) = take_ident(after);
        if name.is_empty() {
            return Err(Error::InvalidAddress(input.to_string()));
        }
        let after = after.strip_prefix('.').ok_or_else(|| Error::InvalidAddress(input.to_string()))?;
        (Some(name.to_string()), after)
    } else {
        (None, trimmed)
    };

    let (first, mut rest) = take_ident(rest);
    if first.is_empty() {
        return Err(Error::InvalidAddress(input.to_string()));
    }
    let mut segments = vec![CipSegment::Name(first.to_string())];

    loop {
        if let Some(after) = rest.strip_prefix('.') {
            let (name, after) = take_ident(after);
            if name.is_empty() {
                return Err(Error::InvalidAddress(input.to_string()));
            }
            segments.push(CipSegment::Name(name.to_string()));
            rest = after;
        } else if let Some(after) = rest.strip_prefix('[') {
            let end = after.find(']').ok_or_else(|| Error::InvalidAddress(input.to_string()))?;
            let digits = &after[..end];
            let index: u32 = digits.parse().map_err(|_| Error::InvalidAddress(input.to_string()))?;
            segments.push(CipSegment::Index(index));
            rest = &after[end + 1..];
        } else {
            break;
        }
    }

    if !rest.is_empty() {
        return Err(Error::InvalidAddress(input.to_string()));
    }

    Ok(CipPath { program, segments })
}

/// reconstructs the canonical string form of a parsed path.
pub fn format(path: &CipPath) -> String {
    let mut s = String::new();
    if let Some(program) = &path.program {
        s.push_str("Program:");
        s.push_str(program);
        s.push('.');
    }
    for (i, seg) in path.segments.iter().enumerate() {
        match seg {
            CipSegment::Name(name) => {
                if i > 0 {
                    s.push('.');
                }
                s.push_str(name);
            }
            CipSegment::Index(n) => {
                s.push('[');
                s.push_str(&n.to_string());
                s.push(']');
            }
        }
    }
    s
}

fn symbol_segment(name: &str) -> Vec<u8> {
    let bytes = name.as_bytes();
    let mut out = vec![0x91, bytes.len() as u8];
    out.extend_from_slice(bytes);
    if bytes.len() % 2 != 0 {
        out.push(0);
    }
    out
}

fn element_segment(index: u32) -> Vec<u8> {
    if index <= 0xFF {
        vec![0x28, index as u8]
    } else if index <= 0xFFFF {
        let mut out = vec![0x29, 0x00];
        out.extend_from_slice(&(index as u16).to_le_bytes());
        out
    } else {
        let mut out = vec![0x2A, 0x00];
        out.extend_from_slice(&index.to_le_bytes());
        out
    }
}

/// encodes the full path (including an optional leading `Program:` symbol
/// segment) into request-path EPath bytes.
pub fn epath_bytes(path: &CipPath) -> Vec<u8> {
    let mut out = Vec::new();
    if let Some(program) = &path.program {
        out.extend(symbol_segment(&format!("Program:{}", program)));
    }
    for seg in &path.segments {
        match seg {
            CipSegment::Name(name) => out.extend(symbol_segment(name)),
            CipSegment::Index(index) => out.extend(element_segment(*index)),
        }
    }
    out
}

/// encodes a `Class(c).Instance(i)` logical path, using the smallest
/// logical-segment width that fits each value (8-bit `0x20`/`0x24`, else
/// 16-bit `0x21`/`0x25`).
pub fn class_instance_epath(class: u16, instance: u32) -> Vec<u8> {
    let mut out = Vec::new();
    if class <= 0xFF {
        out.push(0x20);
        out.push(class as u8);
    } else {
        out.push(0x21);
        out.push(0x00);
        out.extend_from_slice(&class.to_le_bytes());
    }
    if instance <= 0xFF {
        out.push(0x24);
        out.push(instance as u8);
    } else {
        out.push(0x25);
        out.push(0x00);
        out.extend_from_slice(&(instance as u16).to_le_bytes());
    }
    out
}

/// encodes a `Class(c).Instance(i).Attribute(a)` logical path, for
/// Get/Set Attribute Single requests.
pub fn class_instance_attribute_epath(class: u16, instance: u32, attribute: u16) -> Vec<u8> {
    let mut out = class_instance_epath(class, instance);
    if attribute <= 0xFF {
        out.push(0x30);
        out.push(attribute as u8);
    } else {
        out.push(0x31);
        out.push(0x00);
        out.extend_from_slice(&attribute.to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_tag() {
        let p = parse("Counter").unwrap();
        assert_eq!(p.program, None);
        assert_eq!(p.segments, vec![CipSegment::Name("Counter".to_string())]);
    }

    #[test]
    fn parses_program_scoped_member_with_index() {
        let p = parse("Program:Main.Recipe[3].Counter").unwrap();
        assert_eq!(p.program, Some("Main".to_string()));
        assert_eq!(
            p.segments,
            vec![
                CipSegment::Name("Recipe".to_string()),
                CipSegment::Index(3),
                CipSegment::Name("Counter".to_string()),
            ]
        );
    }

    #[test]
    fn format_round_trips() {
        for input in ["Counter", "Program:Main.Counter", "Recipe[3].Step"] {
            let parsed = parse(input).unwrap();
            let canonical = format(&parsed);
            let reparsed = parse(&canonical).unwrap();
            assert_eq!(parsed, reparsed);
        }
    }

    #[test]
    fn invalid_path_rejected() {
        assert!(parse("").is_err());
        assert!(parse("1Tag").is_err());
        assert!(parse("Tag[").is_err());
    }

    #[test]
    fn symbol_segment_pads_odd_length_names() {
        let bytes = symbol_segment("abc");
        assert_eq!(bytes, vec![0x91, 3, b'a', b'b', b'c', 0x00]);
    }

    #[test]
    fn class_instance_uses_8_bit_when_it_fits() {
        let bytes = class_instance_epath(0x6B, 1);
        assert_eq!(bytes, vec![0x20, 0x6B, 0x24, 0x01]);
    }

    #[test]
    fn class_instance_widens_past_255() {
        let bytes = class_instance_epath(0x6B, 300);
        assert_eq!(bytes, vec![0x20, 0x6B, 0x25, 0x00, 0x2C, 0x01]);
    }
}
