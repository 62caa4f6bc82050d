//! S7 batching planner (spec 4.6, "S7 plan"): packs items into Read
//! Variable requests bounded by the negotiated PDU size, and splits
//! oversized items into consecutive chunked byte reads.

use crate::addr::s7::{S7Address, S7Area};
use crate::error::Error;

/// one scheduled unit of work against the transport.
pub enum Plan {
    /// a single Read Variable request covering these request indices.
    Batch(Vec<usize>),
    /// one oversized request, served as consecutive byte-range reads.
    Chunked(usize, Vec<S7Address>),
}

fn max_request_items(pdu_size: u16) -> usize {
    (((pdu_size as i64 - 12) / 12).max(1) as usize).min(19)
}

fn max_response_payload(pdu_size: u16) -> usize {
    (pdu_size as i64 - 18).max(0) as usize
}

/// the chunk size for oversized byte reads (spec 4.6).
fn chunk_size(pdu_size: u16) -> usize {
    (pdu_size as i64 - 20).max(1) as usize
}

/// splits one address into consecutive BYTE-typed chunk reads covering its
/// full `byte_size`, each at most `chunk_size(pdu_size)` bytes.
pub fn chunk_address(addr: &S7Address, pdu_size: u16) -> Result<Vec<S7Address>, Error> {
    let total = addr.byte_size as i64;
    let step = chunk_size(pdu_size) as i64;
    let ceiling = ((total + step - 1) / step) as usize + 10;

    let mut chunks = Vec::new();
    let mut offset = addr.byte_offset;
    let mut remaining = total;
    let mut iterations = 0usize;

    while remaining > 0 {
        iterations += 1;
        if iterations > ceiling {
            return Err(Error::ProtocolFraming("S7 chunk plan exceeded safety ceiling".to_string()));
        }
        let this_len = remaining.min(step);
        chunks.push(S7Address {
            area: addr.area,
            db_number: addr.db_number,
            byte_offset: offset,
            bit_num: -1,
            type_code: crate::codec::BYTE,
            byte_size: this_len as u32,
            count: this_len as u32,
        });
        offset += this_len as i32;
        remaining -= this_len;
    }
    Ok(chunks)
}

/// groups `addrs` into read plans under the negotiated `pdu_size`.
pub fn plan_reads(addrs: &[S7Address], pdu_size: u16) -> Result<Vec<Plan>, Error> {
    let max_items = max_request_items(pdu_size);
    let max_response = max_response_payload(pdu_size);

    let mut plans = Vec::new();
    let mut current: Vec<usize> = Vec::new();
    let mut current_response = 0usize;

    for (index, addr) in addrs.iter().enumerate() {
        let item_size = addr.byte_size as usize;
        if item_size > max_response {
            if !current.is_empty() {
                plans.push(Plan::Batch(std::mem::take(&mut current)));
                current_response = 0;
            }
            let chunks = chunk_address(addr, pdu_size)?;
            plans.push(Plan::Chunked(index, chunks));
            continue;
        }

        let item_response = 4 + item_size;
        if current.len() + 1 > max_items || current_response + item_response > max_response {
            if !current.is_empty() {
                plans.push(Plan::Batch(std::mem::take(&mut current)));
            }
            current_response = 0;
        }
        current.push(index);
        current_response += item_response;
    }

    if !current.is_empty() {
        plans.push(Plan::Batch(current));
    }

    Ok(plans)
}

fn addr(area: S7Area, byte_offset: i32, byte_size: u32) -> S7Address {
    S7Address { area, db_number: None, byte_offset, bit_num: -1, type_code: crate::codec::BYTE, byte_size, count: 1 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caps_items_per_request_at_19_with_pdu_240() {
        // (240 - 12) / 12 = 19
        let addrs: Vec<_> = (0..25).map(|i| addr(S7Area::M, i * 2, 2)).collect();
        let plans = plan_reads(&addrs, 240).unwrap();
        match &plans[0] {
            Plan::Batch(indices) => assert_eq!(indices.len(), 19),
            _ => panic!("expected a batch"),
        }
    }

    #[test]
    fn chunks_a_1000_byte_read_into_220_byte_steps() {
        let a = addr(S7Area::Db, 0, 1000);
        let chunks = chunk_address(&a, 240).unwrap();
        assert_eq!(chunks.len(), 5);
        assert_eq!(chunks[0].byte_offset, 0);
        assert_eq!(chunks[1].byte_offset, 220);
        assert_eq!(chunks[4].byte_offset, 880);
        assert_eq!(chunks[4].byte_size, 120);
    }

    #[test]
    fn oversized_item_becomes_its_own_chunked_plan() {
        let addrs = vec![addr(S7Area::M, 0, 2), addr(S7Area::Db, 0, 1000)];
        let plans = plan_reads(&addrs, 240).unwrap();
        assert_eq!(plans.len(), 2);
        assert!(matches!(plans[0], Plan::Batch(_)));
        assert!(matches!(plans[1], Plan::Chunked(1, _)));
    }
}
