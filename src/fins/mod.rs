//! Omron FINS over UDP and TCP (spec 4.3): header framing, end-code
//! taxonomy, and the memory read/write/multi-read commands.

pub mod batch;
pub mod client;
pub mod frame;
pub mod tcp;
pub mod udp;

pub use client::Client;

use crate::error::Error;

/// abstracts UDP vs TCP FINS transports behind one interface (spec 9,
/// "trait-object transport"): both send one framed command and return the
/// framed response.
pub trait Transport {
    fn exchange(&mut self, header: frame::Header, command: u16, body: &[u8]) -> Result<(frame::Header, u16, Vec<u8>), Error>;
    fn local_node(&self) -> u8;
    fn dest_node(&self) -> u8;
}

/// the three transport selections the client facade offers for FINS
/// (spec 4.7): `Auto` tries TCP then falls back to UDP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Auto,
    Udp,
    Tcp,
}
