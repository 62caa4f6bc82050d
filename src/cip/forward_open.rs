//! CIP Forward Open (spec 4.4): establishes a connected-messaging session,
//! producing an `(O->T, T->O)` connection-id pair.

use super::request::{self, Response};
use crate::error::Error;
use byteorder::{ByteOrder, LittleEndian};

const CONNECTION_MANAGER_CLASS: u16 = 0x06;
const CONNECTION_MANAGER_INSTANCE: u32 = 1;

/// connection-size threshold separating small (`0x54`) from large (`0x5B`)
/// Forward Open.
const LARGE_CONNECTION_THRESHOLD: u16 = 511;

/// the two connection-serial numbers the retry policy tries in order
/// (spec 9 is silent on *why* these values; they're the documented retry
/// pair, not independently meaningful).
pub const CONNECTION_SERIAL_PRIMARY: u16 = 4002;
pub const CONNECTION_SERIAL_FALLBACK: u16 = 504;

#[derive(Debug, Clone)]
pub struct Config {
    /// EPath to the target application object (e.g. the controller's
    /// backplane/slot route), appended after the fixed Forward Open
    /// parameters.
    pub connection_path: Vec<u8>,
    pub o_t_connection_size: u16,
    pub t_o_connection_size: u16,
    pub vendor_id: u16,
    pub originator_serial: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionIds {
    pub o_t_connection_id: u32,
    pub t_o_connection_id: u32,
}

fn is_large(config: &Config) -> bool {
    config.o_t_connection_size.max(config.t_o_connection_size) > LARGE_CONNECTION_THRESHOLD
}

fn connection_parameters(size: u16, large: bool) -> Vec<u8> {
    // high bits select fixed/variable size and data (not redundant) transport class 3;
    // `0x4200` / `0x4200_0000` mark "point to point, variable size" per ODVA vol 1.
    if large {
        let word = 0x4200_0000u32 | size as u32;
        word.to_le_bytes().to_vec()
    } else {
        let word = 0x4200u16 | size;
        word.to_le_bytes().to_vec()
    }
}

/// service code this config requires (`0x54` small, `0x5B` large).
pub fn service_for(config: &Config) -> u8 {
    if is_large(config) { request::SVC_FORWARD_OPEN_LARGE } else { request::SVC_FORWARD_OPEN_SMALL }
}

/// builds just the Forward Open service data (no service/EPath framing),
/// using `connection_serial` for this attempt (the caller retries with
/// [`CONNECTION_SERIAL_FALLBACK`] on failure).
pub fn build_data(config: &Config, connection_serial: u16) -> Vec<u8> {
    let large = is_large(config);
    let mut data = Vec::new();
    data.push(0x0A); // priority/time-tick
    data.push(0x0E); // timeout ticks
    data.extend_from_slice(&0u32.to_le_bytes()); // O->T connection id, assigned by target
    data.extend_from_slice(&0u32.to_le_bytes()); // T->O connection id, assigned by target
    data.extend_from_slice(&connection_serial.to_le_bytes());
    data.extend_from_slice(&config.vendor_id.to_le_bytes());
    data.extend_from_slice(&config.originator_serial.to_le_bytes());
    data.push(0x03); // connection timeout multiplier
    data.extend_from_slice(&[0u8; 3]);
    data.extend_from_slice(&2_000_000u32.to_le_bytes()); // O->T RPI, microseconds
    data.extend_from_slice(&connection_parameters(config.o_t_connection_size, large));
    data.extend_from_slice(&2_000_000u32.to_le_bytes()); // T->O RPI
    data.extend_from_slice(&connection_parameters(config.t_o_connection_size, large));
    data.push(0xA3); // transport type/trigger: class 3, application-triggered
    data.push((config.connection_path.len() / 2) as u8);
    data.extend_from_slice(&config.connection_path);
    data
}

/// builds a full Forward Open CIP request (service + EPath + data) aimed
/// at the connection manager object.
pub fn build(config: &Config, connection_serial: u16) -> Vec<u8> {
    let data = build_data(config, connection_serial);
    let epath = crate::addr::cip::class_instance_epath(CONNECTION_MANAGER_CLASS, CONNECTION_MANAGER_INSTANCE);
    request::build(service_for(config), &epath, &data)
}

/// extracts the connection-id pair from a successful Forward Open reply.
pub fn parse_response(response: &Response) -> Result<ConnectionIds, Error> {
    request::check_status(response)?;
    if response.data.len() < 8 {
        return Err(Error::ProtocolFraming("Forward Open reply too short".to_string()));
    }
    Ok(ConnectionIds {
        o_t_connection_id: LittleEndian::read_u32(&response.data[0..4]),
        t_o_connection_id: LittleEndian::read_u32(&response.data[4..8]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_connection_selects_0x54() {
        let config = Config { connection_path: vec![0x20, 0x02, 0x24, 0x01], o_t_connection_size: 500, t_o_connection_size: 500, vendor_id: 1, originator_serial: 1 };
        let req = build(&config, CONNECTION_SERIAL_PRIMARY);
        assert_eq!(req[0], request::SVC_FORWARD_OPEN_SMALL);
    }

    #[test]
    fn large_connection_selects_0x5b() {
        let config = Config { connection_path: vec![0x20, 0x02, 0x24, 0x01], o_t_connection_size: 1000, t_o_connection_size: 500, vendor_id: 1, originator_serial: 1 };
        let req = build(&config, CONNECTION_SERIAL_PRIMARY);
        assert_eq!(req[0], request::SVC_FORWARD_OPEN_LARGE);
    }

    #[test]
    fn parses_connection_ids_from_response() {
        let mut data = vec![0u8; 8];
        LittleEndian::write_u32(&mut data[0..4], 0x1111_2222);
        LittleEndian::write_u32(&mut data[4..8], 0x3333_4444);
        let response = Response { service: 0xD4, status: 0, extended_status: vec![], data };
        let ids = parse_response(&response).unwrap();
        assert_eq!(ids.o_t_connection_id, 0x1111_2222);
        assert_eq!(ids.t_o_connection_id, 0x3333_4444);
    }
}
