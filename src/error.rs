//! Closed error set shared by all three protocol clients.
//!
//! Per-tag failures are materialized on the offending [`crate::types::TagValue`]
//! and never reach here; only transport- and protocol-level failures that
//! short-circuit a whole call surface as `Error`.

use std::error;
use std::fmt;
use std::io;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// the transport has no live connection; call `reconnect()` first.
    NotConnected,
    /// a socket operation exceeded its configured deadline.
    Timeout,
    /// the peer closed the connection (EOF, reset, broken pipe).
    IoClosed,
    /// the connect-time handshake (FINS node address exchange, CIP
    /// RegisterSession, S7 ISO connect + setup communication) failed.
    HandshakeFailed(String),
    /// an address string did not match any recognized grammar.
    InvalidAddress(String),
    /// an address matched the grammar but named an unknown area/type letter.
    UnknownMnemonic(String),
    /// a bit offset fell outside the protocol's valid range.
    BitOutOfRange(u8),
    /// a received frame had a bad magic, wrong reply service, or was
    /// truncated relative to its declared length.
    ProtocolFraming(String),
    /// FINS end code: `(main, sub, human-readable text)`.
    FinsEndCode(u8, u8, String),
    /// CIP general status: `(status, human-readable text, extended status words)`.
    CipStatus(u8, String, Vec<u16>),
    /// S7 error-class header: `(class, code, human-readable text)`.
    S7Error(u8, u8, String),
    /// S7 per-item return code from a Read/Write Variable response.
    S7DataItem(u8, String),
    /// codec type mismatch: `(expected, got)`.
    TypeMismatch(String, String),
    /// a named feature is not implemented by this client/protocol combination.
    Unsupported(String),
    /// a response (or a planned request) would not fit the negotiated PDU.
    ResponseTooLarge,
    /// PDU size negotiation produced an implausible or zero value.
    PduNegotiationMismatch,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::NotConnected => write!(f, "not connected"),
            Error::Timeout => write!(f, "operation timed out"),
            Error::IoClosed => write!(f, "connection closed"),
            Error::HandshakeFailed(detail) => write!(f, "handshake failed: {}", detail),
            Error::InvalidAddress(input) => write!(f, "invalid address: {}", input),
            Error::UnknownMnemonic(token) => write!(f, "unknown mnemonic: {}", token),
            Error::BitOutOfRange(value) => write!(f, "bit offset out of range: {}", value),
            Error::ProtocolFraming(reason) => write!(f, "protocol framing error: {}", reason),
            Error::FinsEndCode(main, sub, text) => {
                write!(f, "FINS end code {:02X}/{:02X}: {}", main, sub, text)
            }
            Error::CipStatus(code, text, ext) => {
                if ext.is_empty() {
                    write!(f, "CIP status {:#04X}: {}", code, text)
                } else {
                    write!(f, "CIP status {:#04X}: {} (extended: {:?})", code, text, ext)
                }
            }
            Error::S7Error(class, code, text) => {
                write!(f, "S7 error class {:#04X} code {:#04X}: {}", class, code, text)
            }
            Error::S7DataItem(return_code, text) => {
                write!(f, "S7 item return code {:#04X}: {}", return_code, text)
            }
            Error::TypeMismatch(expected, got) => {
                write!(f, "type mismatch: expected {}, got {}", expected, got)
            }
            Error::Unsupported(feature) => write!(f, "unsupported: {}", feature),
            Error::ResponseTooLarge => write!(f, "response too large for negotiated PDU"),
            Error::PduNegotiationMismatch => write!(f, "PDU negotiation produced an invalid size"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        None
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        match e.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Error::Timeout,
            io::ErrorKind::ConnectionRefused => Error::NotConnected,
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::NotConnected => Error::IoClosed,
            _ => Error::ProtocolFraming(e.to_string()),
        }
    }
}

/// CIP general status codes (CIP spec vol 1, appendix B), the "closed
/// enumeration of >= 40 CIP status codes" spec section 4.4 requires.
pub(crate) fn cip_status_text(code: u8) -> &'static str {
    match code {
        0x00 => "Success",
        0x01 => "Connection failure",
        0x02 => "Resource unavailable",
        0x03 => "Invalid parameter value",
        0x04 => "Path segment error",
        0x05 => "Path destination unknown",
        0x06 => "Partial transfer",
        0x07 => "Connection lost",
        0x08 => "Service not supported",
        0x09 => "Invalid attribute value",
        0x0A => "Attribute list error",
        0x0B => "Already in requested mode/state",
        0x0C => "Object state conflict",
        0x0D => "Object already exists",
        0x0E => "Attribute not settable",
        0x0F => "Privilege violation",
        0x10 => "Device state conflict",
        0x11 => "Reply data too large",
        0x12 => "Fragmentation of a primitive value",
        0x13 => "Not enough data",
        0x14 => "Attribute not supported",
        0x15 => "Too much data",
        0x16 => "Object does not exist",
        0x17 => "Service fragmentation sequence not in progress",
        0x18 => "No stored attribute data",
        0x19 => "Store operation failure",
        0x1A => "Routing failure, request packet too large",
        0x1B => "Routing failure, response packet too large",
        0x1C => "Missing attribute list entry data",
        0x1D => "Invalid attribute value list",
        0x1E => "Embedded service error",
        0x1F => "Vendor specific error",
        0x20 => "Invalid parameter",
        0x21 => "Write-once value or medium already written",
        0x22 => "Invalid reply received",
        0x23 => "Buffer overflow",
        0x24 => "Invalid message format",
        0x25 => "Key failure in path",
        0x26 => "Path size invalid",
        0x27 => "Unexpected attribute in list",
        0x28 => "Invalid member ID",
        0x29 => "Member not settable",
        0x2A => "Group 2 only server general failure",
        0x2B => "Unknown Modbus error",
        0x2C => "Attribute not gettable",
        0xFF => "General error (vendor/application specific)",
        _ => "Unknown CIP status",
    }
}

/// S7 error-class header texts (class, not the per-item return code).
pub(crate) fn s7_class_text(class: u8) -> &'static str {
    match class {
        0x00 => "no error",
        0x81 => "application relationship error",
        0x82 => "object definition error",
        0x83 => "no resources available",
        0x84 => "error on service processing",
        0x85 => "error on supplies (no resource, often PDU size exceeded)",
        0x87 => "access error",
        _ => "unknown error class",
    }
}

/// S7 per-item return codes from a Read/Write Variable response.
pub(crate) fn s7_item_text(code: u8) -> &'static str {
    match code {
        0xFF => "success",
        0x01 => "hardware fault",
        0x03 => "accessing the object not allowed",
        0x05 => "invalid address",
        0x06 => "data type not supported",
        0x07 => "data type inconsistent (size mismatch)",
        0x0A => "object does not exist",
        _ => "unknown item return code",
    }
}
