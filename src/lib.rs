//! A client library for Omron FINS, EtherNet/IP (CIP), and Siemens S7comm
//! industrial PLCs: one address grammar and `TagValue`/`TagInfo` model per
//! protocol, behind a single [`client::Client`] facade.
//!
//! # Examples
//! ```no_run
//! use plc_link::client::{Client, ConnectOptions, TransportSelector};
//! use std::net::IpAddr;
//!
//! # fn main() -> Result<(), plc_link::error::Error> {
//! let address: IpAddr = "192.168.0.10".parse().unwrap();
//! let mut options = ConnectOptions::new(TransportSelector::S7);
//! options.rack = Some(0);
//! options.slot = Some(2);
//! let client = Client::connect(address, options)?;
//!
//! let values = client.read(&["DB1.DBD4"])?;
//! for v in &values {
//!     println!("{}: {:?}", v.name, v.go_value());
//! }
//! # Ok(())
//! # }
//! ```
pub mod addr;
pub mod cip;
pub mod client;
pub mod codec;
pub mod error;
pub mod fins;
pub mod s7;
pub mod types;

pub use client::Client;
pub use error::Error;
pub use types::{TagInfo, TagRequest, TagValue};
