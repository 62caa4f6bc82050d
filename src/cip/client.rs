//! CIP/EIP client facade: EtherNet/IP encapsulation session, unconnected
//! and Forward-Open connected messaging, MSP-batched reads, and tag
//! discovery (spec 4.4, 4.6, 4.7, 4.8).

use super::{batch, cpf, discovery, encapsulation, forward_open, msp, request};
use crate::addr::cip::{self as cip_addr, CipPath};
use crate::codec::{self, Value};
use crate::error::Error;
use crate::types::{TagInfo, TagRequest, TagValue};
use byteorder::{ByteOrder, LittleEndian};
use request::Response;
use std::io::{Read, Write};
use std::net::{IpAddr, TcpStream};
use std::sync::Mutex;
use std::time::Duration;

const EIP_PORT: u16 = 44818;
const MESSAGE_ROUTER_CLASS: u16 = 0x02;
const MESSAGE_ROUTER_INSTANCE: u32 = 1;
const CONNECTION_MANAGER_CLASS: u16 = 0x06;
const CONNECTION_MANAGER_INSTANCE: u32 = 1;
const READ_TAG_ELEMENT_COUNT: u16 = 1;

/// connection parameters; `connection_path` is the EPath Forward Open
/// routes through to reach the target (e.g. a backplane/slot route).
#[derive(Debug, Clone)]
pub struct Options {
    pub address: IpAddr,
    pub port: u16,
    pub connection_timeout: Option<Duration>,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub connection_path: Vec<u8>,
    pub vendor_id: u16,
    pub originator_serial: u32,
    pub o_t_connection_size: u16,
    pub t_o_connection_size: u16,
}

impl Options {
    pub fn new(address: IpAddr) -> Options {
        Options {
            address,
            port: EIP_PORT,
            connection_timeout: None,
            read_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(5),
            connection_path: Vec::new(),
            vendor_id: 0x1337,
            originator_serial: 0x0000_0001,
            o_t_connection_size: 500,
            t_o_connection_size: 500,
        }
    }
}

struct ConnectionState {
    ids: forward_open::ConnectionIds,
    sequence_count: u16,
}

struct State {
    stream: TcpStream,
    session_handle: u32,
    connection: Option<ConnectionState>,
}

fn read_encap_frame<R: Read>(stream: &mut R) -> Result<Vec<u8>, Error> {
    let mut header = [0u8; encapsulation::HEADER_LEN];
    stream.read_exact(&mut header)?;
    let length = LittleEndian::read_u16(&header[2..4]) as usize;
    let mut body = vec![0u8; length];
    stream.read_exact(&mut body)?;
    let mut frame = header.to_vec();
    frame.extend_from_slice(&body);
    Ok(frame)
}

fn open_session(options: &Options) -> Result<State, Error> {
    log::debug!("cip: connecting to {}:{}", options.address, options.port);
    let socket_addr = std::net::SocketAddr::new(options.address, options.port);
    let mut stream = match options.connection_timeout {
        Some(timeout) => TcpStream::connect_timeout(&socket_addr, timeout)?,
        None => TcpStream::connect(socket_addr)?,
    };
    stream.set_read_timeout(Some(options.read_timeout))?;
    stream.set_write_timeout(Some(options.write_timeout))?;

    let frame = encapsulation::build(encapsulation::CMD_REGISTER_SESSION, 0, &encapsulation::register_session_body());
    stream.write_all(&frame)?;
    let reply = read_encap_frame(&mut stream)?;
    let (header, _) = encapsulation::parse(&reply)?;
    log::debug!("cip: registered session {:#010x}", header.session_handle);
    Ok(State { stream, session_handle: header.session_handle, connection: None })
}

pub struct Client {
    options: Options,
    state: Mutex<Option<State>>,
}

impl Client {
    pub fn connect(options: Options) -> Result<Client, Error> {
        let state = open_session(&options)?;
        Ok(Client { options, state: Mutex::new(Some(state)) })
    }

    pub fn reconnect(&self) -> Result<(), Error> {
        let state = open_session(&self.options)?;
        *self.state.lock().unwrap() = Some(state);
        Ok(())
    }

    /// performs one stateful operation under the connection lock, purging
    /// the held state on a transport-level failure so the next call
    /// reconnects.
    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> Result<T, Error>) -> Result<T, Error> {
        let mut guard = self.state.lock().unwrap();
        let state = guard.as_mut().ok_or(Error::NotConnected)?;
        let result = f(state);
        if let Err(e) = &result {
            if matches!(e, Error::IoClosed | Error::Timeout) {
                log::error!("cip: transport failure, dropping connection: {}", e);
                *guard = None;
            }
        }
        result
    }

    fn send_unconnected(&self, service: u8, epath: &[u8], data: &[u8]) -> Result<Response, Error> {
        self.with_state(|state| {
            let cip_request = request::build(service, epath, data);
            let cpf_body = cpf::build_unconnected(&cip_request);
            let frame = encapsulation::build(encapsulation::CMD_SEND_RR_DATA, state.session_handle, &cpf_body);
            log::trace!("cip: send {} byte(s): {:02x?}", frame.len(), frame);
            state.stream.write_all(&frame)?;
            let reply = read_encap_frame(&mut state.stream)?;
            log::trace!("cip: recv {} byte(s): {:02x?}", reply.len(), reply);
            let (_, body) = encapsulation::parse(&reply)?;
            let cip_response = cpf::unconnected_data(body)?;
            request::parse(&cip_response)
        })
    }

    fn send_connected(&self, service: u8, epath: &[u8], data: &[u8]) -> Result<Response, Error> {
        self.with_state(|state| {
            let cip_request = request::build(service, epath, data);
            let (connection_id, sequence_count) = {
                let conn = state.connection.as_mut().ok_or(Error::NotConnected)?;
                conn.sequence_count = conn.sequence_count.wrapping_add(1);
                (conn.ids.o_t_connection_id, conn.sequence_count)
            };
            let cpf_body = cpf::build_connected(connection_id, sequence_count, &cip_request);
            let frame = encapsulation::build(encapsulation::CMD_SEND_UNIT_DATA, state.session_handle, &cpf_body);
            log::trace!("cip: send {} byte(s): {:02x?}", frame.len(), frame);
            state.stream.write_all(&frame)?;
            let reply = read_encap_frame(&mut state.stream)?;
            log::trace!("cip: recv {} byte(s): {:02x?}", reply.len(), reply);
            let (_, body) = encapsulation::parse(&reply)?;
            let cip_response = cpf::connected_data(body)?;
            request::parse(&cip_response)
        })
    }

    /// dispatches over connected messaging when a Forward Open connection
    /// is established, unconnected otherwise.
    fn send(&self, service: u8, epath: &[u8], data: &[u8]) -> Result<Response, Error> {
        let connected = self.with_state(|state| Ok(state.connection.is_some()))?;
        if connected {
            self.send_connected(service, epath, data)
        } else {
            self.send_unconnected(service, epath, data)
        }
    }

    /// establishes a Forward Open connection; retries once with the
    /// fallback connection-serial on failure (spec 4.4: "4002 then 504").
    pub fn open_connection(&self) -> Result<(), Error> {
        let config = forward_open::Config {
            connection_path: self.options.connection_path.clone(),
            o_t_connection_size: self.options.o_t_connection_size,
            t_o_connection_size: self.options.t_o_connection_size,
            vendor_id: self.options.vendor_id,
            originator_serial: self.options.originator_serial,
        };
        let service = forward_open::service_for(&config);
        let epath = cip_addr::class_instance_epath(CONNECTION_MANAGER_CLASS, CONNECTION_MANAGER_INSTANCE);

        let attempt = |serial: u16| -> Result<Response, Error> {
            let data = forward_open::build_data(&config, serial);
            self.send_unconnected(service, &epath, &data)
        };

        let response = match attempt(forward_open::CONNECTION_SERIAL_PRIMARY) {
            Ok(r) if request::check_status(&r).is_ok() => r,
            _ => attempt(forward_open::CONNECTION_SERIAL_FALLBACK)?,
        };
        let ids = forward_open::parse_response(&response)?;
        self.with_state(|state| {
            state.connection = Some(ConnectionState { ids, sequence_count: 0 });
            Ok(())
        })
    }

    /// clears the locally held connection state; no Forward Close service
    /// is in this client's palette, so the target times the connection
    /// out on its own RPI-derived watchdog.
    pub fn close_connection(&self) -> Result<(), Error> {
        self.with_state(|state| {
            state.connection = None;
            Ok(())
        })
    }

    /// periodic liveness check on an open connection: a Get Attribute
    /// Single on the connection-manager instance.
    pub fn keepalive(&self) -> Result<(), Error> {
        let connected = self.with_state(|state| Ok(state.connection.is_some()))?;
        if !connected {
            return Err(Error::NotConnected);
        }
        let epath = cip_addr::class_instance_attribute_epath(CONNECTION_MANAGER_CLASS, CONNECTION_MANAGER_INSTANCE, 1);
        let response = self.send(request::SVC_GET_ATTRIBUTE_SINGLE, &epath, &[])?;
        request::check_status(&response)
    }

    /// reads a batch of tags via the MSP planner; per-tag parse/status
    /// errors are materialized on the `TagValue`, transport failures
    /// short-circuit the whole call.
    pub fn read(&self, requests: &[TagRequest]) -> Result<Vec<TagValue>, Error> {
        let parsed: Vec<Result<CipPath, Error>> = requests.iter().map(|r| cip_addr::parse(&r.address)).collect();
        let mut results: Vec<Option<TagValue>> = (0..requests.len()).map(|_| None).collect();
        for (i, p) in parsed.iter().enumerate() {
            if let Err(e) = p {
                results[i] = Some(TagValue::err(requests[i].address.clone(), e.clone()));
            }
        }
        let ok_indices: Vec<usize> = parsed.iter().enumerate().filter(|(_, p)| p.is_ok()).map(|(i, _)| i).collect();
        let ok_paths: Vec<CipPath> = ok_indices.iter().map(|&i| parsed[i].clone().unwrap()).collect();

        let connected = self.with_state(|state| Ok(state.connection.is_some()))?;
        let plans = batch::plan(ok_paths.len(), connected);
        for plan in plans {
            match plan {
                batch::Plan::Single(local_index) => {
                    let orig = ok_indices[local_index];
                    let name = requests[orig].address.clone();
                    let epath = cip_addr::epath_bytes(&ok_paths[local_index]);
                    let data = READ_TAG_ELEMENT_COUNT.to_le_bytes();
                    let outcome = self.send(request::SVC_READ_TAG, &epath, &data);
                    results[orig] = Some(materialize_tag(name, outcome));
                }
                batch::Plan::Msp(local_indices) => {
                    let sub_requests: Vec<Vec<u8>> = local_indices
                        .iter()
                        .map(|&li| {
                            let epath = cip_addr::epath_bytes(&ok_paths[li]);
                            request::build(request::SVC_READ_TAG, &epath, &READ_TAG_ELEMENT_COUNT.to_le_bytes())
                        })
                        .collect();
                    let msp_body = msp::build(&sub_requests);
                    let router_epath = cip_addr::class_instance_epath(MESSAGE_ROUTER_CLASS, MESSAGE_ROUTER_INSTANCE);
                    match self.send(request::SVC_MULTIPLE_SERVICE_PACKET, &router_epath, &msp_body) {
                        // 0x1E (embedded service error) is an MSP-level success:
                        // individual sub-responses carry their own status.
                        Ok(msp_response) if msp_status_is_ok(msp_response.status) => {
                            let sub_responses = msp::parse(&msp_response.data)?;
                            for (li, sub) in local_indices.iter().zip(sub_responses.into_iter()) {
                                let orig = ok_indices[*li];
                                let name = requests[orig].address.clone();
                                results[orig] = Some(materialize_tag(name, Ok(sub)));
                            }
                        }
                        _ => {
                            // MSP-level failure: fall back to per-tag single reads.
                            log::warn!("cip: MSP read failed, falling back to per-tag reads");
                            for &li in &local_indices {
                                let orig = ok_indices[li];
                                let name = requests[orig].address.clone();
                                let epath = cip_addr::epath_bytes(&ok_paths[li]);
                                let data = READ_TAG_ELEMENT_COUNT.to_le_bytes();
                                let outcome = self.send(request::SVC_READ_TAG, &epath, &data);
                                results[orig] = Some(materialize_tag(name, outcome));
                            }
                        }
                    }
                }
            }
        }

        Ok(results.into_iter().map(|r| r.expect("every index populated")).collect())
    }

    /// writes one tag: `Write Tag` with `type_code(u16 LE) ∥ element_count(u16
    /// LE)=1 ∥ value_bytes`.
    pub fn write(&self, request: &TagRequest, value: &Value) -> Result<(), Error> {
        let path = cip_addr::parse(&request.address)?;
        let type_code = request
            .type_hint
            .as_deref()
            .and_then(codec::type_code_from_name)
            .ok_or_else(|| Error::Unsupported("CIP write requires an explicit type hint".to_string()))?;
        let value_bytes = codec::encode(value, type_code, false)?;

        let epath = cip_addr::epath_bytes(&path);
        let mut data = Vec::with_capacity(4 + value_bytes.len());
        data.extend_from_slice(&type_code.to_le_bytes());
        data.extend_from_slice(&READ_TAG_ELEMENT_COUNT.to_le_bytes());
        data.extend_from_slice(&value_bytes);
        let response = self.send(request::SVC_WRITE_TAG, &epath, &data)?;
        request::check_status(&response)
    }

    /// enumerates tags via the three discovery strategies in order,
    /// returning the first non-empty, filtered result.
    pub fn all_tags(&self) -> Result<Vec<TagInfo>, Error> {
        let strategy1 = discovery::get_instance_attribute_list(|start| {
            let epath = cip_addr::class_instance_epath(discovery::CLASS_SYMBOL, start as u32);
            let data = discovery::build_request_data();
            let response = self.send(request::SVC_GET_INSTANCE_ATTRIBUTE_LIST, &epath, &data)?;
            request::check_status(&response)?;
            Ok((response.status, response.data))
        })
        .unwrap_or_default();
        if !strategy1.is_empty() {
            return Ok(discovery::filter_tags(strategy1));
        }
        log::warn!("cip discovery: Logix instance-attribute-list strategy yielded nothing, advancing to Omron strategy");

        let strategy2 = discovery::omron_get_all_instances(
            |next_instance, tag_type| {
                let epath = cip_addr::class_instance_epath(discovery::CLASS_TEMPLATE, 0);
                let data = discovery::build_omron_request_data(next_instance, tag_type);
                let response = self.send(request::SVC_OMRON_GET_ALL_INSTANCES, &epath, &data)?;
                request::check_status(&response)?;
                Ok(response.data)
            },
            |names| self.resolve_symbol_types(names),
        )
        .unwrap_or_default();
        if !strategy2.is_empty() {
            return Ok(discovery::filter_tags(strategy2));
        }
        log::warn!("cip discovery: Omron get-all-instances strategy yielded nothing, advancing to per-instance fallback");

        let strategy3 = discovery::per_instance_fallback(
            || {
                let epath = cip_addr::class_instance_attribute_epath(discovery::CLASS_TEMPLATE, 0, 1);
                let response = self.send(request::SVC_GET_ATTRIBUTE_SINGLE, &epath, &[])?;
                request::check_status(&response)?;
                if response.data.len() < 2 {
                    return Err(Error::ProtocolFraming("instance count attribute too short".to_string()));
                }
                Ok(LittleEndian::read_u16(&response.data[0..2]) as u32)
            },
            |instance| {
                let epath = cip_addr::class_instance_epath(discovery::CLASS_TEMPLATE, instance);
                let response = self.send(request::SVC_GET_ATTRIBUTES_ALL, &epath, &[])?;
                request::check_status(&response)?;
                parse_gaa_name_type(&response.data)
            },
            |instance| {
                let epath = cip_addr::class_instance_attribute_epath(discovery::CLASS_TEMPLATE, instance, 1);
                let response = self.send(request::SVC_GET_ATTRIBUTE_SINGLE, &epath, &[])?;
                request::check_status(&response)?;
                Ok(response.data)
            },
            |instance| {
                let epath = cip_addr::class_instance_attribute_epath(discovery::CLASS_TEMPLATE, instance, 2);
                let response = self.send(request::SVC_GET_ATTRIBUTE_SINGLE, &epath, &[])?;
                request::check_status(&response)?;
                Ok(response.data)
            },
        )?;
        Ok(discovery::filter_tags(strategy3))
    }

    fn resolve_symbol_types(&self, names: &[String]) -> Result<Vec<Option<u16>>, Error> {
        let fallback_epath = vec![0x20, 0x00, 0x24, 0x00];
        let sub_requests: Vec<Vec<u8>> = names
            .iter()
            .map(|name| {
                let epath = cip_addr::parse(name).map(|p| cip_addr::epath_bytes(&p)).unwrap_or_else(|_| fallback_epath.clone());
                request::build(request::SVC_GET_ATTRIBUTES_ALL, &epath, &[])
            })
            .collect();
        let msp_body = msp::build(&sub_requests);
        let router_epath = cip_addr::class_instance_epath(MESSAGE_ROUTER_CLASS, MESSAGE_ROUTER_INSTANCE);
        let response = self.send(request::SVC_MULTIPLE_SERVICE_PACKET, &router_epath, &msp_body)?;
        if !msp_status_is_ok(response.status) {
            return Err(Error::CipStatus(response.status, crate::error::cip_status_text(response.status).to_string(), response.extended_status.clone()));
        }
        let sub_responses = msp::parse(&response.data)?;
        Ok(sub_responses
            .into_iter()
            .map(|r| {
                if request::check_status(&r).is_ok() && r.data.len() >= 2 {
                    Some(LittleEndian::read_u16(&r.data[0..2]))
                } else {
                    None
                }
            })
            .collect())
    }
}

/// an MSP-level reply is a batch success at `0x00`/`0x06`, and also at
/// `0x1E` (embedded service error) — the spec treats that status as
/// "some sub-response carries an error," not an MSP failure.
fn msp_status_is_ok(status: u8) -> bool {
    matches!(status, request::STATUS_SUCCESS | request::STATUS_PARTIAL_TRANSFER | request::STATUS_EMBEDDED_SERVICE_ERROR)
}

fn parse_gaa_name_type(data: &[u8]) -> Result<(String, u16), Error> {
    if data.len() < 2 {
        return Err(Error::ProtocolFraming("GAA response too short".to_string()));
    }
    let name_len = LittleEndian::read_u16(&data[0..2]) as usize;
    if data.len() < 2 + name_len + 2 {
        return Err(Error::ProtocolFraming("GAA response truncated".to_string()));
    }
    let name = std::str::from_utf8(&data[2..2 + name_len])
        .map_err(|_| Error::ProtocolFraming("GAA name not UTF-8".to_string()))?
        .to_string();
    if !discovery::is_plausible_name(&name) {
        return Err(Error::ProtocolFraming(format!("implausible GAA name: {:?}", name)));
    }
    let type_code = LittleEndian::read_u16(&data[2 + name_len..4 + name_len]);
    Ok((name, type_code))
}

/// `Read Tag` response data is `type_code(u16 LE) ∥ value_bytes`; struct
/// types (high byte `0x02`) are exposed as raw bytes.
fn materialize_tag(name: String, outcome: Result<Response, Error>) -> TagValue {
    let response = match outcome {
        Ok(r) => r,
        Err(e) => {
            log::warn!("cip: read of {} failed ({}), marking failed", name, e);
            return TagValue::err(name, e);
        }
    };
    if let Err(e) = request::check_status(&response) {
        log::warn!("cip: read of {} failed ({}), marking failed", name, e);
        return TagValue::err(name, e);
    }
    if response.data.len() < 2 {
        return TagValue::err(name, Error::ProtocolFraming("Read Tag response too short".to_string()));
    }
    let type_code = LittleEndian::read_u16(&response.data[0..2]);
    let value_bytes = response.data[2..].to_vec();
    TagValue::ok(name, type_code, value_bytes, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn materialize_tag_decodes_type_code_and_value() {
        let mut data = vec![0u8; 2];
        LittleEndian::write_u16(&mut data, codec::DINT);
        data.extend_from_slice(&42i32.to_le_bytes());
        let response = Response { service: 0xCC, status: 0, extended_status: vec![], data };
        let tv = materialize_tag("Counter".to_string(), Ok(response));
        assert!(!tv.is_err());
        assert_eq!(tv.as_i64().unwrap(), 42);
    }

    #[test]
    fn materialize_tag_surfaces_cip_status_error() {
        let response = Response { service: 0xCC, status: 0x05, extended_status: vec![], data: vec![] };
        let tv = materialize_tag("Missing".to_string(), Ok(response));
        assert!(matches!(tv.error, Some(Error::CipStatus(0x05, _, _))));
    }

    #[test]
    fn parse_gaa_name_type_rejects_non_printable_name() {
        let mut data = Vec::new();
        data.extend_from_slice(&1u16.to_le_bytes());
        data.push(0x00);
        data.extend_from_slice(&0xC1u16.to_le_bytes());
        assert!(parse_gaa_name_type(&data).is_err());
    }
}
