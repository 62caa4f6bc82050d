//! S7 client facade: connect (TPKT/COTP/Setup Communication handshake),
//! PDU-bounded batched reads, chunked oversized reads, and bit-level
//! read-modify-write on write (spec 4.5, 4.6, 4.7).

use super::{batch, cotp, s7comm, tpkt};
use crate::addr::s7::{self, S7Address};
use crate::codec::{self, Value};
use crate::error::Error;
use crate::types::{TagRequest, TagValue};
use std::net::{IpAddr, TcpStream};
use std::sync::Mutex;
use std::time::Duration;

const ISO_TCP_PORT: u16 = 102;
const LOCAL_TSAP: u16 = 0x0100;
/// connection type byte in the high half of the remote TSAP; `1` is PG
/// (Programmiergeräte), the connection kind the teacher's `tcp::Options`
/// defaults new connections to.
const REMOTE_TSAP_CONNECTION_TYPE: u16 = 0x01;

/// connection parameters; rack/slot have no safe default (spec 9: "default
/// S7 slot differs across source revisions ... expose as a required
/// option").
#[derive(Debug, Clone)]
pub struct Options {
    pub address: IpAddr,
    pub port: u16,
    pub rack: u16,
    pub slot: u16,
    pub connection_timeout: Option<Duration>,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub pdu_size_requested: u16,
}

impl Options {
    pub fn new(address: IpAddr, rack: u16, slot: u16) -> Options {
        Options {
            address,
            port: ISO_TCP_PORT,
            rack,
            slot,
            connection_timeout: None,
            read_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
            pdu_size_requested: 480,
        }
    }
}

struct State {
    stream: TcpStream,
    pdu_size: u16,
    pdu_ref: u16,
}

impl State {
    fn next_pdu_ref(&mut self) -> u16 {
        self.pdu_ref = self.pdu_ref.wrapping_add(1).max(1);
        self.pdu_ref
    }

    fn send_recv(&mut self, payload: &[u8]) -> Result<Vec<u8>, Error> {
        let mut frame = cotp::dt_header().to_vec();
        frame.extend_from_slice(payload);
        log::trace!("s7: send {} byte(s): {:02x?}", frame.len(), frame);
        tpkt::write_frame(&mut self.stream, &frame)?;
        let reply = tpkt::read_frame(&mut self.stream)?;
        log::trace!("s7: recv {} byte(s): {:02x?}", reply.len(), reply);
        Ok(cotp::strip_dt(&reply)?.to_vec())
    }
}

pub struct Client {
    options: Options,
    state: Mutex<Option<State>>,
}

impl Client {
    /// opens the TCP connection and runs the COTP + Setup Communication
    /// handshake.
    pub fn connect(options: Options) -> Result<Client, Error> {
        let client = Client { options, state: Mutex::new(None) };
        client.reconnect()?;
        Ok(client)
    }

    /// tears down (if connected) and reruns the full handshake.
    pub fn reconnect(&self) -> Result<(), Error> {
        log::debug!("s7: connecting to {}:{}", self.options.address, self.options.port);
        let socket_addr = std::net::SocketAddr::new(self.options.address, self.options.port);
        let stream = match self.options.connection_timeout {
            Some(timeout) => TcpStream::connect_timeout(&socket_addr, timeout)?,
            None => TcpStream::connect(socket_addr)?,
        };
        stream.set_read_timeout(Some(self.options.read_timeout))?;
        stream.set_write_timeout(Some(self.options.write_timeout))?;

        let mut state = State { stream, pdu_size: 0, pdu_ref: 0 };

        let remote_tsap = (REMOTE_TSAP_CONNECTION_TYPE << 8) | (self.options.rack << 5) | self.options.slot;
        let cr = cotp::build_cr(LOCAL_TSAP, remote_tsap, 10);
        log::trace!("s7: send {} byte(s): {:02x?}", cr.len(), cr);
        tpkt::write_frame(&mut state.stream, &cr)?;
        let cc = tpkt::read_frame(&mut state.stream)?;
        log::trace!("s7: recv {} byte(s): {:02x?}", cc.len(), cc);
        cotp::parse_cc(&cc).map_err(|e| Error::HandshakeFailed(e.to_string()))?;

        let pdu_ref = state.next_pdu_ref();
        let setup = s7comm::build_setup_communication(pdu_ref, self.options.pdu_size_requested);
        let response = state.send_recv(&setup)?;
        state.pdu_size = s7comm::parse_setup_communication(&response)?;
        log::debug!("s7: negotiated PDU size {}", state.pdu_size);

        *self.state.lock().unwrap() = Some(state);
        Ok(())
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> Result<T, Error>) -> Result<T, Error> {
        let mut guard = self.state.lock().unwrap();
        let state = guard.as_mut().ok_or(Error::NotConnected)?;
        f(state).map_err(|e| {
            if matches!(e, Error::IoClosed | Error::Timeout) {
                log::error!("s7: transport failure, dropping connection: {}", e);
                *guard = None;
            }
            e
        })
    }

    /// reads a batch of addresses; per-address parse/status errors are
    /// materialized on the corresponding `TagValue`, transport failures
    /// short-circuit the whole call.
    pub fn read(&self, requests: &[TagRequest]) -> Result<Vec<TagValue>, Error> {
        let parsed: Vec<Result<S7Address, Error>> = requests
            .iter()
            .map(|r| s7::parse(&r.address, r.type_hint.as_deref()))
            .collect();

        let mut results: Vec<Option<TagValue>> = (0..requests.len()).map(|_| None).collect();
        let ok_indices: Vec<usize> = parsed.iter().enumerate().filter(|(_, p)| p.is_ok()).map(|(i, _)| i).collect();
        for (i, p) in parsed.iter().enumerate() {
            if let Err(e) = p {
                results[i] = Some(TagValue::err(requests[i].address.clone(), e.clone()));
            }
        }
        let ok_addrs: Vec<S7Address> = ok_indices.iter().map(|&i| parsed[i].clone().unwrap()).collect();

        self.with_state(|state| {
            let plans = batch::plan_reads(&ok_addrs, state.pdu_size)?;
            log::debug!("s7: read plan has {} steps for {} addresses", plans.len(), ok_addrs.len());

            for plan in plans {
                match plan {
                    batch::Plan::Batch(local_indices) => {
                        let addrs: Vec<S7Address> = local_indices.iter().map(|&li| ok_addrs[li].clone()).collect();
                        let pdu_ref = state.next_pdu_ref();
                        let request = s7comm::build_read_var(pdu_ref, &addrs);
                        let response = state.send_recv(&request)?;
                        let items = s7comm::parse_read_var(&response)?;
                        for (local_index, item) in local_indices.iter().zip(items.into_iter()) {
                            let orig_index = ok_indices[*local_index];
                            let name = requests[orig_index].address.clone();
                            let addr = &ok_addrs[*local_index];
                            results[orig_index] = Some(materialize(name, addr, item.return_code, item.data));
                        }
                    }
                    batch::Plan::Chunked(local_index, chunks) => {
                        let orig_index = ok_indices[local_index];
                        let name = requests[orig_index].address.clone();
                        let addr = ok_addrs[local_index].clone();
                        let mut assembled = Vec::with_capacity(addr.byte_size as usize);
                        let mut failure: Option<TagValue> = None;
                        for chunk in &chunks {
                            let pdu_ref = state.next_pdu_ref();
                            let request = s7comm::build_read_var(pdu_ref, std::slice::from_ref(chunk));
                            let response = state.send_recv(&request)?;
                            let mut items = s7comm::parse_read_var(&response)?;
                            let item = items.remove(0);
                            if item.return_code != 0xFF {
                                failure = Some(materialize(name.clone(), chunk, item.return_code, Vec::new()));
                                break;
                            }
                            assembled.extend(item.data);
                        }
                        results[orig_index] = Some(failure.unwrap_or_else(|| {
                            TagValue::ok(name, addr.type_code, assembled, true)
                        }));
                    }
                }
            }
            Ok(())
        })?;

        Ok(results.into_iter().map(|r| r.expect("every index populated")).collect())
    }

    /// writes one tag. Bit writes read-modify-write the containing byte
    /// under the same lock acquisition as the write (spec 4.7).
    pub fn write(&self, request: &TagRequest, value: &Value) -> Result<(), Error> {
        let addr = s7::parse(&request.address, request.type_hint.as_deref())?;

        self.with_state(|state| {
            if addr.bit_num >= 0 {
                let byte_addr = S7Address { bit_num: -1, type_code: codec::BYTE, byte_size: 1, count: 1, ..addr.clone() };
                let pdu_ref = state.next_pdu_ref();
                let read_req = s7comm::build_read_var(pdu_ref, std::slice::from_ref(&byte_addr));
                let response = state.send_recv(&read_req)?;
                let mut items = s7comm::parse_read_var(&response)?;
                let item = items.remove(0);
                if item.return_code != 0xFF {
                    return Err(Error::S7DataItem(item.return_code, crate::error::s7_item_text(item.return_code).to_string()));
                }
                let mut byte = *item.data.first().unwrap_or(&0);
                let bit = addr.bit_num as u8;
                let set = value.as_bool().ok_or_else(|| Error::TypeMismatch("Bool".to_string(), value.kind_name().to_string()))?;
                if set {
                    byte |= 1 << bit;
                } else {
                    byte &= !(1 << bit);
                }
                let pdu_ref = state.next_pdu_ref();
                let write_req = s7comm::build_write_var(pdu_ref, &[(byte_addr, vec![byte])]);
                let response = state.send_recv(&write_req)?;
                let codes = s7comm::parse_write_var(&response, 1)?;
                check_write_code(codes[0])
            } else {
                let bytes = codec::encode(value, addr.type_code, true)?;
                let pdu_ref = state.next_pdu_ref();
                let request = s7comm::build_write_var(pdu_ref, &[(addr, bytes)]);
                let response = state.send_recv(&request)?;
                let codes = s7comm::parse_write_var(&response, 1)?;
                check_write_code(codes[0])
            }
        })
    }
}

fn check_write_code(code: u8) -> Result<(), Error> {
    if code == 0xFF {
        Ok(())
    } else {
        Err(Error::S7DataItem(code, crate::error::s7_item_text(code).to_string()))
    }
}

fn materialize(name: String, addr: &S7Address, return_code: u8, data: Vec<u8>) -> TagValue {
    if return_code != 0xFF {
        log::warn!("s7: read of {} failed (return code {:#04x}), marking failed", name, return_code);
        return TagValue::err(name, Error::S7DataItem(return_code, crate::error::s7_item_text(return_code).to_string()));
    }
    if addr.bit_num >= 0 {
        let byte = *data.first().unwrap_or(&0);
        let bit_set = byte & (1 << addr.bit_num) != 0;
        let mut tv = TagValue::ok(name, codec::BOOL, vec![bit_set as u8], true);
        tv.bit_num = None;
        tv
    } else {
        TagValue::ok(name, addr.type_code, data, true)
    }
}
