//! Unified client facade (spec 4.7): one `connect()` entry point picking
//! among the FINS, CIP/EIP, and S7 protocol clients, after which `read`,
//! `write`, and the protocol-specific operations dispatch to whichever
//! one is live. Operations that only make sense for one protocol
//! (`all_tags`, `get_cpu_status`, `open_connection`, ...) return
//! `Error::Unsupported` on the others.

use crate::cip;
use crate::codec::Value;
use crate::error::Error;
use crate::fins;
use crate::s7;
use crate::types::{TagInfo, TagRequest, TagValue};
use std::net::IpAddr;
use std::time::Duration;

/// which protocol/transport `connect` should establish (spec 4.7: "`FINS`
/// auto / `FINS/UDP` / `FINS/TCP` / `EIP` / `S7`").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportSelector {
    FinsAuto,
    FinsUdp,
    FinsTcp,
    Eip,
    S7,
}

/// connection parameters accepted by every transport selection; fields
/// irrelevant to the chosen transport are ignored (e.g. `rack`/`slot` on
/// a FINS connection).
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub transport: TransportSelector,
    pub port: Option<u16>,
    pub timeout: Duration,
    /// S7 only; spec 9 leaves no safe default, both must be supplied.
    pub rack: Option<u16>,
    pub slot: Option<u16>,
    /// FINS only.
    pub local_node: Option<u8>,
    pub dest_node: Option<u8>,
    /// when set, the facade logs connect parameters and batching
    /// decisions at `debug` level even if the embedding application's
    /// logger would otherwise filter them out at a coarser default.
    pub debug: bool,
}

impl ConnectOptions {
    pub fn new(transport: TransportSelector) -> ConnectOptions {
        ConnectOptions {
            transport,
            port: None,
            timeout: Duration::from_secs(5),
            rack: None,
            slot: None,
            local_node: None,
            dest_node: None,
            debug: false,
        }
    }
}

enum Inner {
    Fins(fins::Client),
    Cip(cip::Client),
    S7(s7::Client),
}

pub struct Client {
    inner: Inner,
    debug: bool,
}

impl Client {
    pub fn connect(address: IpAddr, options: ConnectOptions) -> Result<Client, Error> {
        if options.debug {
            log::debug!("client: connecting to {} via {:?}", address, options.transport);
        }
        let inner = match options.transport {
            TransportSelector::FinsAuto | TransportSelector::FinsUdp | TransportSelector::FinsTcp => {
                let mut fins_options = fins::client::Options::new(address);
                fins_options.transport = match options.transport {
                    TransportSelector::FinsUdp => fins::TransportKind::Udp,
                    TransportSelector::FinsTcp => fins::TransportKind::Tcp,
                    _ => fins::TransportKind::Auto,
                };
                if let Some(port) = options.port {
                    fins_options.port = port;
                }
                fins_options.timeout = options.timeout;
                fins_options.local_node = options.local_node;
                fins_options.dest_node = options.dest_node;
                Inner::Fins(fins::Client::connect(fins_options)?)
            }
            TransportSelector::Eip => {
                let mut cip_options = cip::client::Options::new(address);
                if let Some(port) = options.port {
                    cip_options.port = port;
                }
                cip_options.connection_timeout = Some(options.timeout);
                cip_options.read_timeout = options.timeout;
                cip_options.write_timeout = options.timeout;
                Inner::Cip(cip::Client::connect(cip_options)?)
            }
            TransportSelector::S7 => {
                let rack = options.rack.ok_or_else(|| Error::Unsupported("S7 connect requires an explicit rack".to_string()))?;
                let slot = options.slot.ok_or_else(|| Error::Unsupported("S7 connect requires an explicit slot".to_string()))?;
                let mut s7_options = s7::Options::new(address, rack, slot);
                if let Some(port) = options.port {
                    s7_options.port = port;
                }
                s7_options.connection_timeout = Some(options.timeout);
                s7_options.read_timeout = options.timeout;
                s7_options.write_timeout = options.timeout;
                Inner::S7(s7::Client::connect(s7_options)?)
            }
        };
        Ok(Client { inner, debug: options.debug })
    }

    /// tears down (if connected) and reruns the connected transport's
    /// full handshake.
    pub fn reconnect(&self) -> Result<(), Error> {
        match &self.inner {
            Inner::Fins(c) => c.reconnect(),
            Inner::Cip(c) => c.reconnect(),
            Inner::S7(c) => c.reconnect(),
        }
    }

    /// reads tags addressed by bare strings, with no per-tag type hint.
    pub fn read(&self, addresses: &[&str]) -> Result<Vec<TagValue>, Error> {
        let requests: Vec<TagRequest> = addresses.iter().map(|a| TagRequest::new(*a)).collect();
        self.read_with_types(&requests)
    }

    /// reads a batch of tags, each optionally carrying a type hint; never
    /// fails the whole call for a per-tag error (spec 4.7).
    pub fn read_with_types(&self, requests: &[TagRequest]) -> Result<Vec<TagValue>, Error> {
        if self.debug {
            log::debug!("client: reading {} tags", requests.len());
        }
        match &self.inner {
            Inner::Fins(c) => c.read(requests),
            Inner::Cip(c) => c.read(requests),
            Inner::S7(c) => c.read(requests),
        }
    }

    pub fn write(&self, request: &TagRequest, value: &Value) -> Result<(), Error> {
        match &self.inner {
            Inner::Fins(c) => c.write(request, value),
            Inner::Cip(c) => c.write(request, value),
            Inner::S7(c) => c.write(request, value),
        }
    }

    /// EIP only: enumerates controller tags via the discovery strategies.
    pub fn all_tags(&self) -> Result<Vec<TagInfo>, Error> {
        match &self.inner {
            Inner::Cip(c) => c.all_tags(),
            _ => Err(Error::Unsupported("all_tags is only available over EIP".to_string())),
        }
    }

    /// FINS only: `0x0601` CPU status.
    pub fn get_cpu_status(&self) -> Result<fins::client::CpuStatus, Error> {
        match &self.inner {
            Inner::Fins(c) => c.get_cpu_status(),
            _ => Err(Error::Unsupported("get_cpu_status is only available over FINS".to_string())),
        }
    }

    /// FINS only: `0x0620` cycle time.
    pub fn get_cycle_time(&self) -> Result<fins::client::CycleTime, Error> {
        match &self.inner {
            Inner::Fins(c) => c.get_cycle_time(),
            _ => Err(Error::Unsupported("get_cycle_time is only available over FINS".to_string())),
        }
    }

    /// EIP only: establishes the Forward Open connection used by
    /// connected messaging.
    pub fn open_connection(&self) -> Result<(), Error> {
        match &self.inner {
            Inner::Cip(c) => c.open_connection(),
            _ => Err(Error::Unsupported("open_connection is only available over EIP".to_string())),
        }
    }

    /// EIP only: clears the locally held Forward Open connection state.
    pub fn close_connection(&self) -> Result<(), Error> {
        match &self.inner {
            Inner::Cip(c) => c.close_connection(),
            _ => Err(Error::Unsupported("close_connection is only available over EIP".to_string())),
        }
    }

    /// EIP only: liveness probe on an open Forward Open connection.
    pub fn keepalive(&self) -> Result<(), Error> {
        match &self.inner {
            Inner::Cip(c) => c.keepalive(),
            _ => Err(Error::Unsupported("keepalive is only available over EIP".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s7_connect_without_rack_slot_is_unsupported() {
        let options = ConnectOptions::new(TransportSelector::S7);
        let err = Client::connect("127.0.0.1".parse().unwrap(), options).unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }
}
