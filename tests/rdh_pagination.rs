// mch-raw-core
// Copyright (c) 2026 MCH Raw Data Software Authors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! RDH pagination end to end: a `PageEncoder` session's output, walked
//! back through a `PageDecoder`, honors the page-boundary invariants of
//! spec §8 (memorySize/offsetToNext bounds, pageCounter sequencing, a
//! trailing stop page) and reproduces the original cluster.
//!
//! The literal byte-exact scenario 7 (a bare 16-byte `DataBlock` split at
//! 128-byte pages into one 80-byte data page and one 64-byte stop page)
//! is exercised directly against the page-splitting function in
//! `page::encoder::tests::split_into_pages_matches_scenario_seven`,
//! since it concerns pure page arithmetic rather than a full GBT-encoded
//! payload (which is always a multiple of 40 e-link-widths wide, never
//! a bare 16 bytes).

use mch_raw_core::config::Config;
use mch_raw_core::elecmap::{DsElecId, ElectronicMapping, FeeLinkId};
use mch_raw_core::page::decoder::PageDecoder;
use mch_raw_core::page::encoder::{Format, PageEncoder};
use mch_raw_core::rdh::{Rdh, RDH_SIZE};
use mch_raw_core::sampa::SampaCluster;

struct FeeId968Map;
impl ElectronicMapping for FeeId968Map {
    fn fee_link_to_solar(&self, fee_link: FeeLinkId) -> Option<u16> {
        if fee_link == FeeLinkId::new(968, 3).unwrap() { Some(7) } else { None }
    }
    fn solar_to_fee_link(&self, solar_id: u16) -> Option<FeeLinkId> {
        if solar_id == 7 { Some(FeeLinkId::new(968, 3).unwrap()) } else { None }
    }
    fn elec_to_det(&self, _: DsElecId) -> Option<(u32, u32)> {
        None
    }
}

#[test]
fn paged_output_honors_page_boundary_invariants_and_round_trips() {
    let map = FeeId968Map;
    let mut config = Config::new();
    config.with_page_size(8192).with_force_no_phase(true);
    let mut enc = PageEncoder::new(Format::Bare, config, &map);

    let ds = DsElecId::new(7, 0, 0).unwrap();
    let cluster = SampaCluster::sample(1, 0, vec![1, 2, 3]).unwrap();
    enc.add_channel_data(ds, 4, std::slice::from_ref(&cluster)).unwrap();
    enc.start_heartbeat_frame(100, 0).unwrap();

    let mut buf = Vec::new();
    enc.move_to_buffer(&mut buf);
    assert_eq!(buf.len() % config.page_size(), 0);

    // Walk every page and check the §8 invariants directly.
    let mut pos = 0;
    let mut seen_page_counters = Vec::new();
    let mut saw_stop = false;
    while pos + RDH_SIZE <= buf.len() {
        let rdh = Rdh::from_bytes(&buf[pos..], config.page_size()).unwrap();
        assert_eq!(rdh.version, 4);
        assert_eq!(rdh.header_size, RDH_SIZE as u8);
        assert!(rdh.memory_size as usize <= rdh.offset_to_next as usize);
        assert_eq!(rdh.offset_to_next as usize, config.page_size());
        seen_page_counters.push(rdh.page_counter);
        if rdh.stop_bit == 1 {
            saw_stop = true;
        }
        if rdh.offset_to_next == 0 {
            break;
        }
        pos += rdh.offset_to_next as usize;
    }
    assert!(saw_stop, "the burst must end with a stop page");
    // pageCounter values are {0, ..., n-1} on data pages then n on the
    // stop page: a contiguous run starting at zero.
    for (i, &pc) in seen_page_counters.iter().enumerate() {
        assert_eq!(pc as usize, i);
    }

    let mut dec = PageDecoder::new(&map, config);
    let mut received = Vec::new();
    dec.decode(&buf, &mut |ds, ch, c| received.push((ds, ch, c))).unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].0, ds);
    assert_eq!(received[0].1, 4);
    match &received[0].2 {
        SampaCluster::Sample { timestamp, samples, .. } => {
            assert_eq!(*timestamp, 1);
            assert_eq!(samples, &vec![1, 2, 3]);
        }
        _ => panic!("expected a sample cluster"),
    }
}

#[test]
fn a_heartbeat_with_no_payload_emits_a_single_rdh_only_stop_page() {
    let map = FeeId968Map;
    let mut config = Config::new();
    config.with_page_size(8192).with_force_no_phase(true);
    let mut enc = PageEncoder::new(Format::Bare, config, &map);

    // Register the session with one cluster, then heartbeat twice: the
    // second heartbeat has nothing new queued and must still produce a
    // record (an RDH-only stop page), per spec §8's boundary behavior.
    let ds = DsElecId::new(7, 0, 0).unwrap();
    let cluster = SampaCluster::sample(1, 0, vec![1]).unwrap();
    enc.add_channel_data(ds, 0, std::slice::from_ref(&cluster)).unwrap();
    enc.start_heartbeat_frame(0, 0).unwrap();
    let mut first = Vec::new();
    enc.move_to_buffer(&mut first);

    enc.start_heartbeat_frame(1, 0).unwrap();
    let mut second = Vec::new();
    enc.move_to_buffer(&mut second);

    assert_eq!(second.len(), config.page_size());
    let rdh = Rdh::from_bytes(&second, config.page_size()).unwrap();
    assert_eq!(rdh.stop_bit, 1);
    assert_eq!(rdh.memory_size as usize, RDH_SIZE);
    assert_eq!(rdh.page_counter, 0);
}
