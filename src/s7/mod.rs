//! Siemens S7comm over ISO-on-TCP (spec 4.5): TPKT framing, COTP connection
//! setup, S7 Setup Communication, and Read/Write Variable with S7ANY
//! addressing.

pub mod batch;
pub mod client;
pub mod cotp;
pub mod s7comm;
pub mod tpkt;

pub use client::{Client, Options};
