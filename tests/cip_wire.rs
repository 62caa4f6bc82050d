//! Cross-module CIP/EIP wire tests: a full layer stack (encapsulation ->
//! CPF -> CIP request/response -> MSP) exercised end to end the way
//! `cip::client::Client` drives it internally, without opening a socket.

use plc_link::addr::cip as cip_addr;
use plc_link::cip::{cpf, encapsulation, forward_open, msp, request};

#[test]
fn unconnected_read_tag_round_trips_through_every_layer() {
    let path = cip_addr::parse("Program:Main.Counter").unwrap();
    let epath = cip_addr::epath_bytes(&path);
    let cip_request = request::build(request::SVC_READ_TAG, &epath, &1u16.to_le_bytes());

    let cpf_body = cpf::build_unconnected(&cip_request);
    let frame = encapsulation::build(encapsulation::CMD_SEND_RR_DATA, 0x1234, &cpf_body);

    // simulate the wire: a peer would parse the frame the same way the
    // client's `read_encap_frame` + `encapsulation::parse` do.
    let (header, body) = encapsulation::parse(&frame).unwrap();
    assert_eq!(header.command, encapsulation::CMD_SEND_RR_DATA);
    let echoed_request = cpf::unconnected_data(body).unwrap();
    assert_eq!(echoed_request, cip_request);

    // fabricate a Read Tag reply for that request and confirm the same
    // stack unwraps it back to a `Response`.
    let mut reply_data = vec![0u8; 2];
    reply_data.extend_from_slice(&42i32.to_le_bytes());
    let mut reply_body = vec![0x80 | request::SVC_READ_TAG, 0x00, 0x00, 0x00];
    reply_body.extend_from_slice(&reply_data);
    let reply_cpf = cpf::build_unconnected(&reply_body);
    let reply_frame = encapsulation::build(encapsulation::CMD_SEND_RR_DATA, 0x1234, &reply_cpf);

    let (_, reply_body_parsed) = encapsulation::parse(&reply_frame).unwrap();
    let reply_cip = cpf::unconnected_data(reply_body_parsed).unwrap();
    let response = request::parse(&reply_cip).unwrap();
    request::check_status(&response).unwrap();
    assert_eq!(response.data, reply_data);
}

#[test]
fn connected_write_tag_round_trips_with_sequence_count() {
    let path = cip_addr::parse("Recipe[3].Step").unwrap();
    let epath = cip_addr::epath_bytes(&path);
    let mut data = 0xC4u16.to_le_bytes().to_vec();
    data.extend_from_slice(&1u16.to_le_bytes());
    data.extend_from_slice(&7i32.to_le_bytes());
    let cip_request = request::build(request::SVC_WRITE_TAG, &epath, &data);

    let connection_id = 0xAABB_CCDD;
    let sequence_count = 5u16;
    let cpf_body = cpf::build_connected(connection_id, sequence_count, &cip_request);
    let frame = encapsulation::build(encapsulation::CMD_SEND_UNIT_DATA, 0x5678, &cpf_body);

    let (header, body) = encapsulation::parse(&frame).unwrap();
    assert_eq!(header.command, encapsulation::CMD_SEND_UNIT_DATA);
    let echoed = cpf::connected_data(body).unwrap();
    assert_eq!(echoed, cip_request);
}

#[test]
fn msp_batch_of_reads_survives_forward_open_sized_connection() {
    let config = forward_open::Config {
        connection_path: vec![0x20, 0x02, 0x24, 0x01],
        o_t_connection_size: 500,
        t_o_connection_size: 500,
        vendor_id: 0x1337,
        originator_serial: 1,
    };
    assert_eq!(forward_open::service_for(&config), request::SVC_FORWARD_OPEN_SMALL);

    // fabricate three sub-responses: two successes, one path-destination-
    // unknown, mirroring a batch where one tag name was mistyped.
    let sub_replies: Vec<Vec<u8>> = vec![
        vec![0x80 | request::SVC_READ_TAG, 0x00, request::STATUS_SUCCESS, 0x00, 0xC4, 0x00, 0x01, 0x00, 0x00, 0x00],
        vec![0x80 | request::SVC_READ_TAG, 0x00, request::STATUS_SUCCESS, 0x00, 0xC4, 0x00, 0x02, 0x00, 0x00, 0x00],
        vec![0x80 | request::SVC_READ_TAG, 0x00, 0x05, 0x00],
    ];
    let msp_body = msp::build(&sub_replies);

    // the MSP wrapper itself reports `0x1E` (embedded service error): one
    // sub-response failed, but the batch as a whole came back intact.
    let mut wrapped_reply = vec![0x80 | request::SVC_MULTIPLE_SERVICE_PACKET, 0x00, request::STATUS_EMBEDDED_SERVICE_ERROR, 0x00];
    wrapped_reply.extend_from_slice(&msp_body);
    let outer = request::parse(&wrapped_reply).unwrap();

    // `0x1E` fails the generic single-response check...
    assert!(request::check_status(&outer).is_err());
    // ...but the MSP sub-responses embedded in its data are still whole,
    // and each carries its own independent status.
    let sub_responses = msp::parse(&outer.data).unwrap();
    assert_eq!(sub_responses.len(), 3);
    assert!(request::check_status(&sub_responses[0]).is_ok());
    assert!(request::check_status(&sub_responses[1]).is_ok());
    assert!(request::check_status(&sub_responses[2]).is_err());
}
