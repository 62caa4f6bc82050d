//! FINS client facade: transport selection (UDP/TCP/auto), batched reads
//! via the word/bit planner, and the CPU-status/cycle-time telegrams
//! (spec 4.3, 4.6, 4.7).

use super::{batch, frame, tcp, udp, Transport, TransportKind};
use crate::addr::fins::{self, FinsAddress};
use crate::codec::{self, Value};
use crate::error::Error;
use crate::types::{TagRequest, TagValue};
use frame::Header;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::Duration;

/// connection parameters; `transport` selects UDP, TCP, or `Auto` (try TCP,
/// fall back to UDP) per spec 4.7.
#[derive(Debug, Clone)]
pub struct Options {
    pub address: IpAddr,
    pub port: u16,
    pub transport: TransportKind,
    pub local_node: Option<u8>,
    pub dest_node: Option<u8>,
    pub timeout: Duration,
}

impl Options {
    pub fn new(address: IpAddr) -> Options {
        Options {
            address,
            port: 9600,
            transport: TransportKind::Auto,
            local_node: None,
            dest_node: None,
            timeout: Duration::from_secs(2),
        }
    }
}

fn connect_tcp(options: &Options) -> Result<Box<dyn Transport + Send>, Error> {
    let mut tcp_options = tcp::Options::new(options.address);
    tcp_options.port = options.port;
    tcp_options.read_timeout = options.timeout;
    tcp_options.write_timeout = options.timeout;
    Ok(Box::new(tcp::Transport::connect(tcp_options)?))
}

fn connect_udp(options: &Options) -> Result<Box<dyn Transport + Send>, Error> {
    let mut udp_options = udp::Options::new(options.address);
    udp_options.port = options.port;
    udp_options.local_node = options.local_node;
    udp_options.dest_node = options.dest_node;
    udp_options.timeout = options.timeout;
    Ok(Box::new(udp::Transport::connect(udp_options)?))
}

fn connect(options: &Options) -> Result<Box<dyn Transport + Send>, Error> {
    match options.transport {
        TransportKind::Tcp => connect_tcp(options),
        TransportKind::Udp => connect_udp(options),
        TransportKind::Auto => match connect_tcp(options) {
            Ok(t) => Ok(t),
            Err(e) => {
                log::debug!("fins: TCP connect failed ({}), falling back to UDP", e);
                connect_udp(options)
            }
        },
    }
}

pub struct Client {
    options: Options,
    state: Mutex<Option<Box<dyn Transport + Send>>>,
}

impl Client {
    pub fn connect(options: Options) -> Result<Client, Error> {
        let transport = connect(&options)?;
        Ok(Client { options, state: Mutex::new(Some(transport)) })
    }

    pub fn reconnect(&self) -> Result<(), Error> {
        let transport = connect(&self.options)?;
        *self.state.lock().unwrap() = Some(transport);
        Ok(())
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut (dyn Transport + Send)) -> Result<T, Error>) -> Result<T, Error> {
        let mut guard = self.state.lock().unwrap();
        let transport = guard.as_deref_mut().ok_or(Error::NotConnected)?;
        f(transport).map_err(|e| {
            if matches!(e, Error::IoClosed | Error::Timeout) {
                log::error!("fins: transport failure, dropping connection: {}", e);
                *guard = None;
            }
            e
        })
    }

    /// reads a batch of addresses via the word/bit planner; per-address
    /// parse or end-code errors are materialized on the `TagValue`,
    /// transport failures short-circuit the whole call.
    pub fn read(&self, requests: &[TagRequest]) -> Result<Vec<TagValue>, Error> {
        let parsed: Vec<Result<FinsAddress, Error>> = requests
            .iter()
            .map(|r| fins::parse(&r.address, r.type_hint.as_deref()))
            .collect();

        let mut results: Vec<Option<TagValue>> = (0..requests.len()).map(|_| None).collect();
        let ok_indices: Vec<usize> = parsed.iter().enumerate().filter(|(_, p)| p.is_ok()).map(|(i, _)| i).collect();
        for (i, p) in parsed.iter().enumerate() {
            if let Err(e) = p {
                results[i] = Some(TagValue::err(requests[i].address.clone(), e.clone()));
            }
        }
        let ok_addrs: Vec<FinsAddress> = ok_indices.iter().map(|&i| parsed[i].clone().unwrap()).collect();
        let p = batch::plan(&ok_addrs);

        self.with_state(|transport| {
            for &bi in &p.bit_indices {
                let orig = ok_indices[bi];
                let addr = &ok_addrs[bi];
                let name = requests[orig].address.clone();
                let body = frame::build_memory_item(addr.memory_area, addr.word_address, addr.bit_offset, 1);
                let header = Header::command(transport.dest_node(), transport.local_node(), 0);
                let outcome = transport
                    .exchange(header, frame::CMD_MEMORY_READ, &body)
                    .and_then(|(_, _, resp)| frame::check_end_code(&resp).map(|d| d.to_vec()));
                results[orig] = Some(match outcome {
                    Ok(data) => TagValue::ok(name, codec::BOOL, data, true),
                    Err(e) => {
                        log::warn!("fins: bit read for {} failed ({}), marking failed", name, e);
                        TagValue::err(name, e)
                    }
                });
            }

            match &p.word_plan {
                batch::WordPlan::Groups(groups) => {
                    for group in groups {
                        read_group(transport, group, &ok_addrs, &ok_indices, requests, &mut results)?;
                    }
                }
                batch::WordPlan::MultiRead(chunks) => {
                    for chunk in chunks {
                        read_multi(transport, chunk, &ok_addrs, &ok_indices, requests, &mut results)?;
                    }
                }
            }
            Ok(())
        })?;

        Ok(results.into_iter().map(|r| r.expect("every index populated")).collect())
    }

    /// writes one tag; bit addresses write a single bit via `0x0102` with
    /// `count = 1`.
    pub fn write(&self, request: &TagRequest, value: &Value) -> Result<(), Error> {
        let addr = fins::parse(&request.address, request.type_hint.as_deref())?;
        self.with_state(|transport| {
            let header = Header::command(transport.dest_node(), transport.local_node(), 0);
            let body = if addr.is_bit {
                let set = value.as_bool().ok_or_else(|| Error::TypeMismatch("Bool".to_string(), value.kind_name().to_string()))?;
                let mut item = frame::build_memory_item(addr.memory_area, addr.word_address, addr.bit_offset, 1);
                item.push(if set { 1 } else { 0 });
                item
            } else {
                let data = codec::encode(value, addr.type_code, true)?;
                let words = fins::word_span(&addr);
                let mut item = frame::build_memory_item(addr.memory_area, addr.word_address, 0, words as u16);
                item.extend_from_slice(&data);
                item
            };
            let (_, _, resp) = transport.exchange(header, frame::CMD_MEMORY_WRITE, &body)?;
            frame::check_end_code(&resp)?;
            Ok(())
        })
    }

    /// `0x0601` CPU status: run/program/monitor mode plus error flags.
    pub fn get_cpu_status(&self) -> Result<CpuStatus, Error> {
        self.with_state(|transport| {
            let header = Header::command(transport.dest_node(), transport.local_node(), 0);
            let (_, _, resp) = transport.exchange(header, frame::CMD_CPU_STATUS, &[])?;
            let data = frame::check_end_code(&resp)?;
            parse_cpu_status(data)
        })
    }

    /// `0x0620` cycle time, read mode (param `0x00`).
    pub fn get_cycle_time(&self) -> Result<CycleTime, Error> {
        self.with_state(|transport| {
            let header = Header::command(transport.dest_node(), transport.local_node(), 0);
            let (_, _, resp) = transport.exchange(header, frame::CMD_CYCLE_TIME, &[0x00])?;
            let data = frame::check_end_code(&resp)?;
            parse_cycle_time(data)
        })
    }
}

fn read_group(
    transport: &mut (dyn Transport + Send),
    group: &[usize],
    ok_addrs: &[FinsAddress],
    ok_indices: &[usize],
    requests: &[TagRequest],
    results: &mut [Option<TagValue>],
) -> Result<(), Error> {
    let first = &ok_addrs[group[0]];
    let total_words: u32 = group.iter().map(|&li| fins::word_span(&ok_addrs[li])).sum();
    let body = frame::build_memory_item(first.memory_area, first.word_address, 0, total_words as u16);
    let header = Header::command(transport.dest_node(), transport.local_node(), 0);
    let (_, _, resp) = transport.exchange(header, frame::CMD_MEMORY_READ, &body)?;
    let outcome = frame::check_end_code(&resp).map(|d| d.to_vec());

    let data = match outcome {
        Ok(data) => data,
        Err(e) => {
            // an end-code error is a protocol-level, not transport-level,
            // failure: only this group's tags fail, the call continues.
            log::warn!("fins: group read failed ({}), marking {} tag(s) failed", e, group.len());
            for &li in group {
                let orig = ok_indices[li];
                let name = requests[orig].address.clone();
                results[orig] = Some(TagValue::err(name, e.clone()));
            }
            return Ok(());
        }
    };

    let mut cursor = 0usize;
    for &li in group {
        let addr = &ok_addrs[li];
        let byte_len = (fins::word_span(addr) as usize) * 2;
        let orig = ok_indices[li];
        let name = requests[orig].address.clone();
        let slice = data.get(cursor..cursor + byte_len).unwrap_or(&[]).to_vec();
        results[orig] = Some(TagValue::ok(name, addr.type_code, slice, true));
        cursor += byte_len;
    }
    Ok(())
}

fn read_multi(
    transport: &mut (dyn Transport + Send),
    chunk: &[usize],
    ok_addrs: &[FinsAddress],
    ok_indices: &[usize],
    requests: &[TagRequest],
    results: &mut [Option<TagValue>],
) -> Result<(), Error> {
    let entries: Vec<[u8; 4]> = chunk
        .iter()
        .map(|&li| {
            let a = &ok_addrs[li];
            frame::build_multi_read_entry(a.memory_area, a.word_address, 0)
        })
        .collect();
    let body = frame::build_multi_read_body(&entries);
    let header = Header::command(transport.dest_node(), transport.local_node(), 0);
    let outcome = transport
        .exchange(header, frame::CMD_MULTI_MEMORY_READ, &body)
        .and_then(|(_, _, resp)| {
            if resp.len() < 2 {
                return Err(Error::ProtocolFraming("multi-read response too short".to_string()));
            }
            Ok(resp)
        });

    let resp = match outcome {
        Ok(resp) => resp,
        Err(e) => {
            // spec 9: on a bulk-read error every entry in the request is
            // marked failed, no partial-success inference.
            log::warn!("fins: multi-read failed ({}), marking {} tag(s) failed", e, chunk.len());
            for &li in chunk {
                let orig = ok_indices[li];
                let name = requests[orig].address.clone();
                results[orig] = Some(TagValue::err(name, e.clone()));
            }
            return Ok(());
        }
    };

    // each entry's reply is `end_code(2) | data(2 for a word entry)`,
    // concatenated in request order; an entry-level end code does not
    // abort the remaining entries.
    let mut cursor = 0usize;
    for &li in chunk {
        let addr = &ok_addrs[li];
        let orig = ok_indices[li];
        let name = requests[orig].address.clone();
        if cursor + 2 > resp.len() {
            log::warn!("fins: multi-read entry for {} truncated, marking failed", name);
            results[orig] = Some(TagValue::err(name, Error::ProtocolFraming("truncated multi-read entry".to_string())));
            break;
        }
        let (main, sub) = (resp[cursor], resp[cursor + 1]);
        cursor += 2;
        if main != 0x00 {
            log::warn!("fins: entry {} failed, end code {:#04x}/{:#04x}", name, main, sub);
            results[orig] = Some(TagValue::err(name, Error::FinsEndCode(main, sub, format!("sub {:#04x}", sub))));
            continue;
        }
        let data = resp.get(cursor..cursor + 2).unwrap_or(&[]).to_vec();
        cursor += 2;
        results[orig] = Some(TagValue::ok(name, addr.type_code, data, true));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuMode {
    Program,
    Run,
    Monitor,
    Unknown(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuStatus {
    pub running: bool,
    pub mode: CpuMode,
    pub fatal_error: bool,
    pub non_fatal_error: bool,
}

fn parse_cpu_status(data: &[u8]) -> Result<CpuStatus, Error> {
    if data.len() < 4 {
        return Err(Error::ProtocolFraming("CPU status response too short".to_string()));
    }
    let status = data[0];
    let mode = match data[1] {
        0x00 => CpuMode::Program,
        0x02 => CpuMode::Run,
        0x03 => CpuMode::Monitor,
        other => CpuMode::Unknown(other),
    };
    let fatal = u16::from_be_bytes([data[2], data[3]]);
    let non_fatal = data.get(4..6).map(|b| u16::from_be_bytes([b[0], b[1]])).unwrap_or(0);
    Ok(CpuStatus { running: status & 0x01 != 0, mode, fatal_error: fatal != 0, non_fatal_error: non_fatal != 0 })
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleTime {
    pub average_ms: f64,
    pub max_ms: f64,
    pub min_ms: f64,
}

fn parse_cycle_time(data: &[u8]) -> Result<CycleTime, Error> {
    if data.len() < 12 {
        return Err(Error::ProtocolFraming("cycle time response too short".to_string()));
    }
    let avg = bcd_u32(&data[0..4])? as f64 * 0.1;
    let max = bcd_u32(&data[4..8])? as f64 * 0.1;
    let min = bcd_u32(&data[8..12])? as f64 * 0.1;
    Ok(CycleTime { average_ms: avg, max_ms: max, min_ms: min })
}

fn bcd_u32(bytes: &[u8]) -> Result<u32, Error> {
    let mut value = 0u32;
    for &b in bytes {
        let hi = b >> 4;
        let lo = b & 0x0F;
        if hi > 9 || lo > 9 {
            return Err(Error::ProtocolFraming(format!("invalid BCD byte {:#04x}", b)));
        }
        value = value * 100 + hi as u32 * 10 + lo as u32;
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_status_decodes_run_mode() {
        let data = [0x01, 0x02, 0x00, 0x00, 0x00, 0x00];
        let status = parse_cpu_status(&data).unwrap();
        assert!(status.running);
        assert_eq!(status.mode, CpuMode::Run);
        assert!(!status.fatal_error);
    }

    #[test]
    fn cycle_time_decodes_bcd_fields() {
        let data = [0x00, 0x00, 0x01, 0x23, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0x00, 0x50];
        let ct = parse_cycle_time(&data).unwrap();
        assert!((ct.average_ms - 12.3).abs() < 1e-9);
        assert!((ct.max_ms - 20.0).abs() < 1e-9);
        assert!((ct.min_ms - 5.0).abs() < 1e-9);
    }

    #[test]
    fn bcd_rejects_non_decimal_nibble() {
        assert!(bcd_u32(&[0xFA, 0x00, 0x00, 0x00]).is_err());
    }
}
