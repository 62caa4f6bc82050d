//! FINS/TCP transport: the proprietary envelope wrapping FINS frames on
//! TCP/9600, plus the node-address handshake (spec 4.3, 6).

use super::frame::{self, Header};
use super::Transport as FinsTransport;
use crate::error::Error;
use byteorder::{BigEndian, ByteOrder};
use std::io::{Read, Write};
use std::net::{IpAddr, TcpStream};
use std::time::Duration;

const MAGIC: &[u8; 4] = b"FINS";
const ENVELOPE_CMD_NODE_ADDR_REQUEST: u32 = 0x00;
const ENVELOPE_CMD_NODE_ADDR_RESPONSE: u32 = 0x01;
const ENVELOPE_CMD_FRAME_SEND: u32 = 0x02;
const ENVELOPE_CMD_ERROR: u32 = 0x03;

#[derive(Debug, Clone)]
pub struct Options {
    pub address: IpAddr,
    pub port: u16,
    pub connection_timeout: Option<Duration>,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
}

impl Options {
    pub fn new(address: IpAddr) -> Options {
        Options {
            address,
            port: 9600,
            connection_timeout: None,
            read_timeout: Duration::from_secs(2),
            write_timeout: Duration::from_secs(2),
        }
    }
}

pub struct Transport {
    stream: TcpStream,
    local_node: u8,
    dest_node: u8,
    sid: u8,
}

fn write_envelope<W: Write>(stream: &mut W, command: u32, error: u32, body: &[u8]) -> Result<(), Error> {
    let mut out = Vec::with_capacity(12 + body.len());
    out.extend_from_slice(MAGIC);
    let mut word = [0u8; 4];
    BigEndian::write_u32(&mut word, (8 + body.len()) as u32);
    out.extend_from_slice(&word);
    BigEndian::write_u32(&mut word, command);
    out.extend_from_slice(&word);
    BigEndian::write_u32(&mut word, error);
    out.extend_from_slice(&word);
    out.extend_from_slice(body);
    stream.write_all(&out)?;
    Ok(())
}

fn read_envelope<R: Read>(stream: &mut R) -> Result<(u32, u32, Vec<u8>), Error> {
    let mut magic = [0u8; 4];
    stream.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(Error::ProtocolFraming("bad FINS/TCP magic".to_string()));
    }
    let mut word = [0u8; 4];
    stream.read_exact(&mut word)?;
    let length = BigEndian::read_u32(&word) as usize;
    if length < 8 {
        return Err(Error::ProtocolFraming("FINS/TCP envelope shorter than header".to_string()));
    }
    stream.read_exact(&mut word)?;
    let command = BigEndian::read_u32(&word);
    stream.read_exact(&mut word)?;
    let error = BigEndian::read_u32(&word);
    let mut body = vec![0u8; length - 8];
    stream.read_exact(&mut body)?;
    Ok((command, error, body))
}

impl Transport {
    pub fn connect(options: Options) -> Result<Transport, Error> {
        log::debug!("fins/tcp: connecting to {}:{}", options.address, options.port);
        let socket_addr = std::net::SocketAddr::new(options.address, options.port);
        let mut stream = match options.connection_timeout {
            Some(timeout) => TcpStream::connect_timeout(&socket_addr, timeout)?,
            None => TcpStream::connect(socket_addr)?,
        };
        stream.set_read_timeout(Some(options.read_timeout))?;
        stream.set_write_timeout(Some(options.write_timeout))?;

        let mut client_node_req = [0u8; 4];
        BigEndian::write_u32(&mut client_node_req, 0); // 0 = auto-assign
        write_envelope(&mut stream, ENVELOPE_CMD_NODE_ADDR_REQUEST, 0, &client_node_req)?;

        let (command, error, body) = read_envelope(&mut stream)?;
        if command == ENVELOPE_CMD_ERROR || error != 0 {
            return Err(Error::HandshakeFailed(format!("FINS/TCP node-address request failed: error {:#010x}", error)));
        }
        if command != ENVELOPE_CMD_NODE_ADDR_RESPONSE || body.len() < 8 {
            return Err(Error::HandshakeFailed("unexpected FINS/TCP node-address response".to_string()));
        }
        let client_node = BigEndian::read_u32(&body[0..4]) as u8;
        let server_node = BigEndian::read_u32(&body[4..8]) as u8;
        log::debug!("fins/tcp: assigned client_node={} server_node={}", client_node, server_node);

        Ok(Transport { stream, local_node: client_node, dest_node: server_node, sid: 0 })
    }
}

impl FinsTransport for Transport {
    fn exchange(&mut self, mut header: Header, command: u16, body: &[u8]) -> Result<(Header, u16, Vec<u8>), Error> {
        self.sid = self.sid.wrapping_add(1);
        header.sid = self.sid;
        let fins_frame = frame::build_frame(header, command, body);
        log::trace!("fins/tcp: send {} bytes", fins_frame.len());
        write_envelope(&mut self.stream, ENVELOPE_CMD_FRAME_SEND, 0, &fins_frame)?;

        let (envelope_command, error, envelope_body) = read_envelope(&mut self.stream)?;
        if envelope_command == ENVELOPE_CMD_ERROR || error != 0 {
            return Err(Error::ProtocolFraming(format!("FINS/TCP envelope error {:#010x}", error)));
        }
        log::trace!("fins/tcp: recv {} bytes", envelope_body.len());
        let (resp_header, resp_command, resp_body) = frame::parse_frame(&envelope_body)?;
        Ok((resp_header, resp_command, resp_body.to_vec()))
    }

    fn local_node(&self) -> u8 {
        self.local_node
    }

    fn dest_node(&self) -> u8 {
        self.dest_node
    }
}
