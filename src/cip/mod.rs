//! EtherNet/IP + CIP (spec 4.4): encapsulation session, CPF addressing,
//! unconnected/connected messaging, Multiple Service Packet batching, and
//! symbol-table discovery.

pub mod batch;
pub mod client;
pub mod cpf;
pub mod discovery;
pub mod encapsulation;
pub mod forward_open;
pub mod msp;
pub mod request;

pub use client::{Client, Options};
