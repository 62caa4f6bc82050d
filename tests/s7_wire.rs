//! Cross-module S7 tests: address grammar -> PDU-bounded batching planner
//! -> S7comm request/response framing -> TPKT/COTP wrapping, exercised
//! together the way `s7::client::Client` drives them, without opening a
//! socket.

use plc_link::addr::s7::{self, S7Address};
use plc_link::s7::batch::{self, Plan};
use plc_link::s7::{cotp, s7comm, tpkt};

fn parse_all(inputs: &[&str]) -> Vec<S7Address> {
    inputs.iter().map(|s| s7::parse(s, None).unwrap()).collect()
}

#[test]
fn small_batch_builds_one_read_var_wrapped_in_tpkt_and_cotp() {
    let addrs = parse_all(&["DB1.DBD0", "DB1.DBD4", "M0.3"]);
    let plans = batch::plan_reads(&addrs, 240).unwrap();
    assert_eq!(plans.len(), 1);
    let indices = match &plans[0] {
        Plan::Batch(i) => i.clone(),
        Plan::Chunked(..) => panic!("expected a single batch"),
    };
    let items: Vec<S7Address> = indices.iter().map(|&i| addrs[i].clone()).collect();

    let request = s7comm::build_read_var(1, &items);
    let mut frame = cotp::dt_header().to_vec();
    frame.extend_from_slice(&request);
    let mut wire = Vec::new();
    tpkt::write_frame(&mut wire, &frame).unwrap();

    // unwrap the wire bytes the way the client's read path does.
    let mut cursor = std::io::Cursor::new(wire);
    let payload = tpkt::read_frame(&mut cursor).unwrap();
    let s7_bytes = cotp::strip_dt(&payload).unwrap();
    assert_eq!(s7_bytes, &request[..]);

    // fabricate a matching Read Variable reply: DBD0 (4 bytes), DBD4 (4
    // bytes), M0.3 (1 bit byte), all success.
    let mut resp = vec![0x32, 0x03, 0, 0, 0, 1, 0, 2, 0, 0, 0, 0];
    resp.extend_from_slice(&[0x04, 3]);
    let data_start = resp.len();
    resp.extend_from_slice(&[0xFF, 0x06, 0, 32]); // DWORD transport size, 32 bits
    resp.extend_from_slice(&0xDEAD_BEEFu32.to_be_bytes());
    resp.extend_from_slice(&[0xFF, 0x06, 0, 32]);
    resp.extend_from_slice(&0x0000_002Au32.to_be_bytes());
    resp.extend_from_slice(&[0xFF, 0x01, 0, 1, 0x01]); // BIT, 1 bit, padded to even
    resp.extend_from_slice(&[0x00]);
    let data_len = (resp.len() - data_start) as u16;
    s7comm::parse_read_var(&{
        let mut r = resp.clone();
        r[8..10].copy_from_slice(&data_len.to_be_bytes());
        r
    })
    .map(|items| {
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].data, 0xDEAD_BEEFu32.to_be_bytes().to_vec());
        assert_eq!(items[2].data, vec![0x01]);
    })
    .unwrap();
}

#[test]
fn oversized_db_read_chunks_and_each_chunk_frames_independently() {
    let addrs = vec![s7::parse("DB1.DBD0", None).unwrap(), S7Address { byte_size: 1000, ..s7::parse("DB1.DBD0", None).unwrap() }];
    let plans = batch::plan_reads(&addrs, 240).unwrap();
    assert_eq!(plans.len(), 2);
    let chunks = match &plans[1] {
        Plan::Chunked(index, chunks) => {
            assert_eq!(*index, 1);
            chunks.clone()
        }
        Plan::Batch(_) => panic!("expected the 1000-byte item to chunk"),
    };
    assert_eq!(chunks.len(), 5);

    for chunk in &chunks {
        let request = s7comm::build_read_var(2, std::slice::from_ref(chunk));
        let mut frame = cotp::dt_header().to_vec();
        frame.extend_from_slice(&request);
        let mut wire = Vec::new();
        tpkt::write_frame(&mut wire, &frame).unwrap();
        assert!(wire.len() <= 240 + tpkt::HEADER_LEN);
    }
}

#[test]
fn setup_communication_negotiates_and_feeds_the_batch_planner() {
    let req = s7comm::build_setup_communication(1, 960);
    assert_eq!(req[1], 1); // PDU_TYPE_JOB

    let mut resp = vec![0x32, 0x03, 0, 0, 0, 1, 0, 7, 0, 0, 0, 0];
    resp.extend_from_slice(&[0xF0, 0, 0, 0, 1, 0, 0]);
    resp[19..21].copy_from_slice(&240u16.to_be_bytes());
    let pdu_size = s7comm::parse_setup_communication(&resp).unwrap();
    assert_eq!(pdu_size, 240);

    let addrs = parse_all(&["DB1.DBD0"]);
    let plans = batch::plan_reads(&addrs, pdu_size).unwrap();
    assert_eq!(plans.len(), 1);
}
