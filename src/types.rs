//! Shared data model: tag requests/values and parsed addresses (spec 3).

use crate::codec::{self, Value};
use crate::error::Error;

/// caller input: an address string plus an optional type hint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRequest {
    pub address: String,
    pub type_hint: Option<String>,
}

impl TagRequest {
    pub fn new(address: impl Into<String>) -> Self {
        TagRequest { address: address.into(), type_hint: None }
    }

    pub fn with_type(address: impl Into<String>, type_hint: impl Into<String>) -> Self {
        TagRequest { address: address.into(), type_hint: Some(type_hint.into()) }
    }
}

impl From<&str> for TagRequest {
    fn from(s: &str) -> Self {
        TagRequest::new(s)
    }
}

impl From<String> for TagRequest {
    fn from(s: String) -> Self {
        TagRequest::new(s)
    }
}

/// one read result: created by a read operation, immutable thereafter,
/// consumed by the accessors below. `error` and `raw_bytes` are mutually
/// exclusive: an error implies the bytes are meaningless.
#[derive(Debug, Clone, PartialEq)]
pub struct TagValue {
    pub name: String,
    pub type_code: u16,
    pub raw_bytes: Vec<u8>,
    pub bit_num: Option<u8>,
    pub count: usize,
    pub big_endian: bool,
    pub error: Option<Error>,
}

impl TagValue {
    pub fn ok(name: impl Into<String>, type_code: u16, raw_bytes: Vec<u8>, big_endian: bool) -> Self {
        TagValue {
            name: name.into(),
            type_code,
            raw_bytes,
            bit_num: None,
            count: 1,
            big_endian,
            error: None,
        }
    }

    pub fn err(name: impl Into<String>, error: Error) -> Self {
        TagValue {
            name: name.into(),
            type_code: 0,
            raw_bytes: Vec::new(),
            bit_num: None,
            count: 0,
            big_endian: true,
            error: Some(error),
        }
    }

    pub fn is_err(&self) -> bool {
        self.error.is_some()
    }

    /// decodes `raw_bytes` on demand using the shared codec.
    pub fn go_value(&self) -> Result<Value, Error> {
        if let Some(e) = &self.error {
            return Err(e.clone());
        }
        if let Some(bit) = self.bit_num {
            let byte = *self.raw_bytes.first().unwrap_or(&0);
            return Ok(Value::Bool(byte & (1 << bit) != 0));
        }
        Ok(codec::decode(self.type_code, &self.raw_bytes, self.big_endian))
    }

    pub fn as_bool(&self) -> Result<bool, Error> {
        self.go_value()?
            .as_bool()
            .ok_or_else(|| Error::TypeMismatch("Bool".to_string(), self.type_name()))
    }

    pub fn as_i64(&self) -> Result<i64, Error> {
        self.go_value()?
            .as_i64()
            .ok_or_else(|| Error::TypeMismatch("integer".to_string(), self.type_name()))
    }

    pub fn as_u64(&self) -> Result<u64, Error> {
        self.go_value()?
            .as_u64()
            .ok_or_else(|| Error::TypeMismatch("unsigned integer".to_string(), self.type_name()))
    }

    pub fn as_f64(&self) -> Result<f64, Error> {
        self.go_value()?
            .as_f64()
            .ok_or_else(|| Error::TypeMismatch("float".to_string(), self.type_name()))
    }

    pub fn as_string(&self) -> Result<String, Error> {
        self.go_value()?
            .as_string()
            .ok_or_else(|| Error::TypeMismatch("String".to_string(), self.type_name()))
    }

    pub fn type_name(&self) -> String {
        codec::type_name(self.type_code)
    }
}

/// protocol-specific parsed address, produced by the address parsers in
/// `crate::addr` and consumed by each protocol's batching planner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedAddress {
    Fins(crate::addr::fins::FinsAddress),
    S7(crate::addr::s7::S7Address),
    CipSymbolic(crate::addr::cip::CipPath),
}

/// EIP discovery result entry (spec 6, "Exposed interfaces").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagInfo {
    pub name: String,
    pub type_code: u16,
    pub instance: u32,
    pub dimensions: Vec<u32>,
}
