//! FINS/UDP transport: a bare FINS frame on UDP/9600, no handshake
//! (spec 4.3, 6).

use super::frame::{self, Header};
use super::Transport as FinsTransport;
use crate::error::Error;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Options {
    pub address: IpAddr,
    pub port: u16,
    /// auto-derived from the local IPv4 source address's last octet when
    /// unset (spec 4.3).
    pub local_node: Option<u8>,
    pub dest_node: Option<u8>,
    pub timeout: Duration,
}

impl Options {
    pub fn new(address: IpAddr) -> Options {
        Options { address, port: 9600, local_node: None, dest_node: None, timeout: Duration::from_secs(2) }
    }
}

pub struct Transport {
    socket: UdpSocket,
    local_node: u8,
    dest_node: u8,
    sid: u8,
}

impl Transport {
    pub fn connect(options: Options) -> Result<Transport, Error> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect((options.address, options.port))?;
        socket.set_read_timeout(Some(options.timeout))?;
        socket.set_write_timeout(Some(options.timeout))?;

        let local_node = match options.local_node {
            Some(n) => n,
            None => match socket.local_addr()?.ip() {
                IpAddr::V4(v4) => last_octet(v4),
                IpAddr::V6(_) => return Err(Error::HandshakeFailed("IPv6 local address has no FINS node byte".to_string())),
            },
        };
        let dest_node = match options.dest_node {
            Some(n) => n,
            None => match options.address {
                IpAddr::V4(v4) => last_octet(v4),
                IpAddr::V6(_) => return Err(Error::HandshakeFailed("IPv6 destination has no FINS node byte".to_string())),
            },
        };

        Ok(Transport { socket, local_node, dest_node, sid: 0 })
    }
}

fn last_octet(addr: Ipv4Addr) -> u8 {
    addr.octets()[3]
}

impl FinsTransport for Transport {
    fn exchange(&mut self, mut header: Header, command: u16, body: &[u8]) -> Result<(Header, u16, Vec<u8>), Error> {
        self.sid = self.sid.wrapping_add(1);
        header.sid = self.sid;
        let frame = frame::build_frame(header, command, body);
        log::trace!("fins/udp: send {} bytes", frame.len());
        self.socket.send(&frame)?;

        let mut buf = vec![0u8; 2048];
        let n = self.socket.recv(&mut buf)?;
        buf.truncate(n);
        log::trace!("fins/udp: recv {} bytes", n);
        let (resp_header, resp_command, resp_body) = frame::parse_frame(&buf)?;
        Ok((resp_header, resp_command, resp_body.to_vec()))
    }

    fn local_node(&self) -> u8 {
        self.local_node
    }

    fn dest_node(&self) -> u8 {
        self.dest_node
    }
}
