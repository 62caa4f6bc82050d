//! Cross-module FINS tests: address grammar -> batching planner -> frame
//! encoding, exercised together the way `fins::client::Client::read` drives
//! them, without opening a socket.

use plc_link::addr::fins::{self, FinsAddress};
use plc_link::fins::batch::{self, WordPlan};
use plc_link::fins::frame;

fn parse_all(inputs: &[&str]) -> Vec<FinsAddress> {
    inputs.iter().map(|s| fins::parse(s, None).unwrap()).collect()
}

#[test]
fn contiguous_group_becomes_one_0x0101_request() {
    let addrs = parse_all(&["DM0", "DM1", "DM2"]);
    let plan = batch::plan(&addrs);
    let groups = match plan.word_plan {
        WordPlan::Groups(g) => g,
        WordPlan::MultiRead(_) => panic!("expected a per-group plan"),
    };
    assert_eq!(groups.len(), 1);

    let first = &addrs[groups[0][0]];
    let count = groups[0].len() as u16;
    let body = frame::build_memory_item(first.memory_area, first.word_address, first.bit_offset, count);
    let header = frame::Header::command(1, 2, 9);
    let built = frame::build_frame(header, frame::CMD_MEMORY_READ, &body);

    let (parsed_header, command, parsed_body) = frame::parse_frame(&built).unwrap();
    assert_eq!(parsed_header, header);
    assert_eq!(command, frame::CMD_MEMORY_READ);
    assert_eq!(parsed_body, &body[..]);
}

#[test]
fn scattered_single_words_consolidate_into_0x0104() {
    let inputs: Vec<String> = (0..10).map(|i| format!("DM{}", i * 100)).collect();
    let addrs = parse_all(&inputs.iter().map(String::as_str).collect::<Vec<_>>());
    let plan = batch::plan(&addrs);
    let chunks = match plan.word_plan {
        WordPlan::MultiRead(c) => c,
        WordPlan::Groups(_) => panic!("expected a multi-read plan"),
    };
    assert_eq!(chunks.len(), 1);

    let entries: Vec<[u8; 4]> = chunks[0]
        .iter()
        .map(|&i| frame::build_multi_read_entry(addrs[i].memory_area, addrs[i].word_address, addrs[i].bit_offset))
        .collect();
    let body = frame::build_multi_read_body(&entries);
    assert_eq!(body.len(), 40);

    let header = frame::Header::command(5, 1, 1);
    let built = frame::build_frame(header, frame::CMD_MULTI_MEMORY_READ, &body);
    let (_, command, parsed_body) = frame::parse_frame(&built).unwrap();
    assert_eq!(command, frame::CMD_MULTI_MEMORY_READ);
    assert_eq!(parsed_body, &body[..]);
}

#[test]
fn bit_address_is_excluded_from_word_grouping_and_framed_alone() {
    let addrs = parse_all(&["CIO50.7", "DM0"]);
    let plan = batch::plan(&addrs);
    assert_eq!(plan.bit_indices, vec![0]);

    let bit_addr = &addrs[plan.bit_indices[0]];
    let body = frame::build_memory_item(bit_addr.memory_area, bit_addr.word_address, bit_addr.bit_offset, 1);
    assert_eq!(body[0], 0x30); // CIO bit area code
    assert_eq!(body[3], 7); // bit offset
}

#[test]
fn nonzero_end_code_surfaces_before_body_is_trusted() {
    // a local-node error response should never be handed to the batch
    // decoder as if it were data.
    let response_body = [0x01, 0x03, 0xDE, 0xAD];
    let err = frame::check_end_code(&response_body).unwrap_err();
    assert!(matches!(err, plc_link::Error::FinsEndCode(0x01, 0x03, _)));
}
