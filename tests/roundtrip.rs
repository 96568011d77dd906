// mch-raw-core
// Copyright (c) 2026 MCH Raw Data Software Authors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end scenarios from spec §8, items 1-5: GBT-level encode then
//! decode reproduces the expected `(DsElecId, channel, cluster)` stream.

use mch_raw_core::elecmap::DsElecId;
use mch_raw_core::gbt::BareGbtEncoder;
use mch_raw_core::gbt::BareGbtDecoder;
use mch_raw_core::sampa::SampaCluster;

fn format_line(ds: DsElecId, channel: u8, cluster: &SampaCluster) -> String {
    match cluster {
        SampaCluster::Sample { timestamp, samples, .. } => {
            let q = samples.iter().map(|s| s.to_string()).collect::<Vec<_>>().join("-");
            format!("{ds}-ch-{channel}-ts-{timestamp}-q-{q}")
        }
        SampaCluster::ChargeSum { timestamp, charge_sum, .. } => {
            format!("{ds}-ch-{channel}-ts-{timestamp}-q-{charge_sum}")
        }
    }
}

fn decode_one_link(solar_id: u16, elink_index: u8, charge_sum_mode: bool, bytes: &[u8]) -> Vec<(u8, SampaCluster)> {
    let mut dec = BareGbtDecoder::new(solar_id, charge_sum_mode).unwrap();
    dec.append(bytes)
        .unwrap()
        .into_iter()
        .filter(|(idx, _)| *idx == elink_index)
        .map(|(_, c)| (c.channel_address, c.cluster))
        .collect()
}

#[test]
fn scenario_one_minimum_cluster_sample_mode() {
    let ds = DsElecId::new(0, 0, 2).unwrap();
    let mut enc = BareGbtEncoder::new(0, false, true).unwrap();
    let cluster = SampaCluster::sample(345, 0, vec![123, 456]).unwrap();
    enc.add_channel_data(ds.elink_index(), 29, std::slice::from_ref(&cluster)).unwrap();

    let mut bytes = Vec::new();
    enc.drain_to_bytes(&mut bytes).unwrap();

    let decoded = decode_one_link(0, ds.elink_index(), false, &bytes);
    assert_eq!(decoded.len(), 1);
    assert_eq!(format_line(ds, decoded[0].0, &decoded[0].1), "S0-J0-DS2-ch-29-ts-345-q-123-456");
}

#[test]
fn scenario_two_cluster_spanning_two_userlogic_words() {
    use mch_raw_core::elink::{UserLogicElinkDecoder, UserLogicElinkEncoder};

    let ds = DsElecId::new(0, 0, 2).unwrap();
    let mut enc = UserLogicElinkEncoder::new(ds.elink_index(), false).unwrap();
    let cluster = SampaCluster::sample(345, 0, vec![123, 456, 789, 901, 902]).unwrap();
    enc.add_channel_data(3, 29, std::slice::from_ref(&cluster)).unwrap();
    let words = enc.take_words();

    let mut dec = UserLogicElinkDecoder::new(ds.elink_index(), false).unwrap();
    let mut decoded = Vec::new();
    for w in words {
        decoded.extend(dec.append(w));
    }
    assert_eq!(decoded.len(), 1);
    let line = format_line(ds, decoded[0].channel_address, &decoded[0].cluster);
    assert_eq!(line, "S0-J0-DS2-ch-29-ts-345-q-123-456-789-901-902");
}

#[test]
fn scenario_three_two_channels_two_clusters_each_preserve_emission_order() {
    use mch_raw_core::elink::{UserLogicElinkDecoder, UserLogicElinkEncoder};

    let ds = DsElecId::new(0, 0, 2).unwrap();
    let mut enc = UserLogicElinkEncoder::new(ds.elink_index(), false).unwrap();
    let c_a = SampaCluster::sample(345, 0, vec![123, 456, 789, 901, 902]).unwrap();
    let c_b = SampaCluster::sample(346, 0, vec![1001, 1002, 1003, 1004, 1005, 1006, 1007]).unwrap();
    enc.add_channel_data(3, 29, std::slice::from_ref(&c_a)).unwrap();
    enc.add_channel_data(3, 17, std::slice::from_ref(&c_b)).unwrap();
    let words = enc.take_words();

    let mut dec = UserLogicElinkDecoder::new(ds.elink_index(), false).unwrap();
    let mut decoded = Vec::new();
    for w in words {
        decoded.extend(dec.append(w));
    }

    let lines: Vec<String> =
        decoded.iter().map(|d| format_line(ds, d.channel_address, &d.cluster)).collect();
    assert_eq!(
        lines,
        vec![
            "S0-J0-DS2-ch-29-ts-345-q-123-456-789-901-902".to_string(),
            "S0-J0-DS2-ch-17-ts-346-q-1001-1002-1003-1004-1005-1006-1007".to_string(),
        ]
    );
}

#[test]
fn scenario_four_charge_sum_single_cluster() {
    let ds = DsElecId::new(0, 0, 2).unwrap();
    let mut enc = BareGbtEncoder::new(0, true, true).unwrap();
    let cluster = SampaCluster::charge_sum(345, 0, 123456, 10).unwrap();
    enc.add_channel_data(ds.elink_index(), 29, std::slice::from_ref(&cluster)).unwrap();

    let mut bytes = Vec::new();
    enc.drain_to_bytes(&mut bytes).unwrap();

    let decoded = decode_one_link(0, ds.elink_index(), true, &bytes);
    assert_eq!(decoded.len(), 1);
    assert_eq!(format_line(ds, decoded[0].0, &decoded[0].1), "S0-J0-DS2-ch-29-ts-345-q-123456");
}

#[test]
fn scenario_five_two_channels_two_charge_sum_clusters_each() {
    let ds = DsElecId::new(0, 0, 2).unwrap();
    let mut enc = BareGbtEncoder::new(0, true, true).unwrap();
    let ch_a = vec![
        SampaCluster::charge_sum(345, 0, 123456, 10).unwrap(),
        SampaCluster::charge_sum(346, 0, 789012, 10).unwrap(),
    ];
    let ch_b = vec![
        SampaCluster::charge_sum(347, 0, 1357, 10).unwrap(),
        SampaCluster::charge_sum(348, 0, 791, 10).unwrap(),
    ];
    enc.add_channel_data(ds.elink_index(), 29, &ch_a).unwrap();
    enc.add_channel_data(ds.elink_index(), 17, &ch_b).unwrap();

    let mut bytes = Vec::new();
    enc.drain_to_bytes(&mut bytes).unwrap();

    let decoded = decode_one_link(0, ds.elink_index(), true, &bytes);
    let lines: Vec<String> =
        decoded.iter().map(|(ch, c)| format_line(ds, *ch, c)).collect();
    assert_eq!(
        lines,
        vec![
            "S0-J0-DS2-ch-29-ts-345-q-123456".to_string(),
            "S0-J0-DS2-ch-29-ts-346-q-789012".to_string(),
            "S0-J0-DS2-ch-17-ts-347-q-1357".to_string(),
            "S0-J0-DS2-ch-17-ts-348-q-791".to_string(),
        ]
    );
}
